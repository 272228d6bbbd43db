//! The public face of the engine.
//!
//! A [`Reader`] is built once from an archive handle: footer, TOC, tree,
//! chunk index. After that it is immutable and may be shared freely between
//! threads. [`Reader::close`] drops the index; every later call, including
//! reads through [`FileReader`]s opened earlier, returns [`Error::Closed`].

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::archive::ReadAt;
use crate::attr::{Attr, Mode};
use crate::chunk::ChunkDescriptor;
use crate::compression::{builtin_decompressors, Compression, Decompressor, StoredDecompressor};
use crate::error::{Error, Result};
use crate::footer::Footer;
use crate::path::TocPath;
use crate::toc::{StargzTocDecoder, TocDecoder};
use crate::tree::{Landmark, Tree, ROOT_ID};

/// Called with the instant a construction phase completed.
pub type Hook = Arc<dyn Fn(Instant) + Send + Sync>;

/// Optional hooks fired once per construction, in this order.
#[derive(Clone, Default)]
pub struct Telemetry {
    pub footer_located: Option<Hook>,
    pub toc_located: Option<Hook>,
    pub toc_parsed: Option<Hook>,
}

impl Telemetry {
    pub fn new() -> Telemetry {
        Telemetry::default()
    }

    pub fn on_footer_located<F: Fn(Instant) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.footer_located = Some(Arc::new(f));
        self
    }

    pub fn on_toc_located<F: Fn(Instant) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.toc_located = Some(Arc::new(f));
        self
    }

    pub fn on_toc_parsed<F: Fn(Instant) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.toc_parsed = Some(Arc::new(f));
        self
    }

    fn fire(hook: &Option<Hook>) {
        if let Some(hook) = hook {
            hook(Instant::now());
        }
    }
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("footer_located", &self.footer_located.is_some())
            .field("toc_located", &self.toc_located.is_some())
            .field("toc_parsed", &self.toc_parsed.is_some())
            .finish()
    }
}

/// Collaborators a reader is built with. Clones reuse them.
#[derive(Clone)]
pub struct ReaderOptions {
    decompressors: HashMap<Compression, Arc<dyn Decompressor>>,
    toc_decoder: Arc<dyn TocDecoder>,
    telemetry: Telemetry,
}

impl Default for ReaderOptions {
    /// Every built-in decompressor and the stargz TOC decoder.
    fn default() -> Self {
        ReaderOptions::bare().with_decompressors(builtin_decompressors())
    }
}

impl ReaderOptions {
    /// Only stored (uncompressed) archives can be read.
    pub fn bare() -> ReaderOptions {
        ReaderOptions {
            decompressors: HashMap::new(),
            toc_decoder: Arc::new(StargzTocDecoder),
            telemetry: Telemetry::default(),
        }
        .with_decompressor(Arc::new(StoredDecompressor))
    }

    /// Registers `d` for its scheme, replacing any earlier one.
    pub fn with_decompressor(mut self, d: Arc<dyn Decompressor>) -> Self {
        self.decompressors.insert(d.compression(), d);
        self
    }

    pub fn with_decompressors<I>(self, ds: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Decompressor>>,
    {
        ds.into_iter().fold(self, ReaderOptions::with_decompressor)
    }

    pub fn with_toc_decoder(mut self, decoder: Arc<dyn TocDecoder>) -> Self {
        self.toc_decoder = decoder;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    fn decompressor(&self, compression: Compression) -> Result<Arc<dyn Decompressor>> {
        self.decompressors
            .get(&compression)
            .cloned()
            .ok_or(Error::MissingDecompressor(compression))
    }
}

impl fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<_> = self.decompressors.keys().map(|c| c.id()).collect();
        schemes.sort_unstable();
        f.debug_struct("ReaderOptions")
            .field(
                "decompressors",
                &schemes.into_iter().map(Compression::from_id).collect::<Vec<_>>(),
            )
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

struct State {
    archive: Arc<dyn ReadAt>,
    decompressor: Arc<dyn Decompressor>,
    footer: Footer,
    toc_crc: u32,
    tree: Tree,
}

impl State {
    fn load(archive: Arc<dyn ReadAt>, options: &ReaderOptions) -> Result<State> {
        let decoder = &options.toc_decoder;

        let footer = decoder.read_footer(&*archive)?;
        Telemetry::fire(&options.telemetry.footer_located);

        let raw = decoder.read_toc(&*archive, &footer)?;
        Telemetry::fire(&options.telemetry.toc_located);

        let decompressor = options.decompressor(footer.compression)?;
        let toc = decoder.parse_toc(&raw, &footer, &*decompressor)?;
        Telemetry::fire(&options.telemetry.toc_parsed);

        let tree = Tree::build(&toc, footer.toc_offset)?;

        Ok(State {
            archive,
            decompressor,
            footer,
            toc_crc: crc32fast::hash(&raw),
            tree,
        })
    }

    /// Decompresses one chunk.
    fn read_chunk(&self, chunk: &ChunkDescriptor) -> Result<Vec<u8>> {
        tracing::trace!(
            file = chunk.file_id,
            offset = chunk.offset,
            length = chunk.length,
            "reading chunk"
        );
        let compressed = self
            .archive
            .read_range(chunk.compressed_offset, chunk.compressed_length)
            .map_err(Error::io(format!("reading chunk at {:#x}", chunk.compressed_offset)))?;
        let op = format!("decompressing chunk at {:#x}", chunk.compressed_offset);
        let data = self
            .decompressor
            .decompress(&compressed, Some(chunk.length as usize))
            .map_err(Error::io(op.clone()))?;
        if data.len() as u64 != chunk.length {
            return Err(Error::Io {
                op,
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("got {} bytes, expected {}", data.len(), chunk.length),
                ),
            });
        }
        Ok(data)
    }
}

#[derive(Default)]
struct Shared {
    state: RwLock<Option<Arc<State>>>,
}

impl Shared {
    fn get(&self) -> Result<Arc<State>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::Closed)
    }
}

/// Read-only view of one archive's metadata and content.
pub struct Reader {
    shared: Arc<Shared>,
    options: ReaderOptions,
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Reader");
        match self.shared.get() {
            Ok(state) => s
                .field("footer", &state.footer)
                .field("nodes", &state.tree.num_nodes()),
            Err(_) => s.field("closed", &true),
        };
        s.field("options", &self.options).finish()
    }
}

impl Reader {
    /// Opens `archive` with [`ReaderOptions::default`].
    pub fn new<R: ReadAt + 'static>(archive: R) -> Result<Reader> {
        Reader::with_options(Arc::new(archive), ReaderOptions::default())
    }

    pub fn with_options(archive: Arc<dyn ReadAt>, options: ReaderOptions) -> Result<Reader> {
        let state = State::load(archive, &options)?;
        tracing::debug!(
            nodes = state.tree.num_nodes(),
            compression = %state.footer.compression,
            "reader ready"
        );
        Ok(Reader {
            shared: Arc::new(Shared {
                state: RwLock::new(Some(Arc::new(state))),
            }),
            options,
        })
    }

    #[inline(always)]
    pub fn root_id(&self) -> u32 {
        ROOT_ID
    }

    pub fn get_attr(&self, id: u32) -> Result<Attr> {
        self.shared.get()?.tree.attrs().get_attr(id).cloned()
    }

    /// Resolves `name` inside directory `parent`.
    pub fn get_child(&self, parent: u32, name: &str) -> Result<(u32, Mode)> {
        let state = self.shared.get()?;
        let id = state.tree.child(parent, name)?;
        let mode = state.tree.attrs().get_attr(id)?.mode;
        Ok((id, mode))
    }

    /// Calls `f` with every child of `parent` in archive order until it
    /// returns `false`.
    pub fn foreach_child<F>(&self, parent: u32, mut f: F) -> Result<()>
    where
        F: FnMut(&str, u32, Mode) -> bool,
    {
        let state = self.shared.get()?;
        let attrs = state.tree.attrs();
        if !attrs.get_attr(parent)?.mode.is_dir() {
            return Ok(());
        }
        for entry in state.tree.children(parent)? {
            let mode = attrs.get_attr(entry.id)?.mode;
            if !f(&entry.name, entry.id, mode) {
                break;
            }
        }
        Ok(())
    }

    pub fn open_file(&self, id: u32) -> Result<FileReader> {
        let state = self.shared.get()?;
        let attr = state.tree.attrs().get_attr(id)?;
        if !attr.mode.is_regular() {
            return Err(Error::NotRegularFile { id });
        }
        Ok(FileReader {
            shared: Arc::clone(&self.shared),
            id,
            size: attr.size,
        })
    }

    pub fn num_of_nodes(&self) -> Result<usize> {
        Ok(self.shared.get()?.tree.num_nodes())
    }

    pub fn num_of_chunks(&self, id: u32) -> Result<usize> {
        let state = self.shared.get()?;
        state.tree.attrs().get_attr(id)?;
        state.tree.chunks().num_chunks(id)
    }

    /// Resolves a path from the root, normalizing it first.
    pub fn lookup<S: AsRef<str>>(&self, path: S) -> Result<u32> {
        let path = path.as_ref();
        let not_found = || Error::PathNotFound {
            path: path.to_string(),
        };
        let normalized = TocPath::new(path).map_err(|_| not_found())?;
        let state = self.shared.get()?;
        let id = normalized.iter().try_fold(ROOT_ID, |parent, name| {
            state.tree.child(parent, name).map_err(|_| not_found())
        });
        id
    }

    pub fn compression(&self) -> Result<Compression> {
        Ok(self.shared.get()?.footer.compression)
    }

    /// Whether the archive marks a prefetch section with `.prefetch.landmark`.
    pub fn has_prefetch_landmark(&self) -> Result<bool> {
        Ok(self.shared.get()?.tree.landmark() == Landmark::Prefetch)
    }

    /// Every path in the archive with its id, sorted by path. Hardlinked
    /// paths appear once per name.
    pub fn paths(&self) -> Result<Vec<(String, u32)>> {
        let state = self.shared.get()?;
        Ok(state
            .tree
            .paths()
            .into_iter()
            .map(|(path, id)| (path.to_string(), id))
            .collect())
    }

    /// Releases the index. Safe to call more than once.
    pub fn close(&self) {
        let previous = self
            .shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            tracing::debug!("reader closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.get().is_err()
    }

    /// Builds an independent reader over `archive`, which must hold the
    /// same table of contents. Node ids of the two readers match.
    pub fn clone_with(&self, archive: Arc<dyn ReadAt>) -> Result<Reader> {
        let expected = self.shared.get()?.toc_crc;
        let reader = Reader::with_options(archive, self.options.clone())?;
        if reader.shared.get()?.toc_crc != expected {
            return Err(Error::TocMismatch);
        }
        Ok(reader)
    }
}

/// Random access to the content of one regular file.
#[derive(Clone)]
pub struct FileReader {
    shared: Arc<Shared>,
    id: u32,
    size: u64,
}

impl fmt::Debug for FileReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileReader")
            .field("id", &self.id)
            .field("size", &self.size)
            .finish()
    }
}

impl FileReader {
    #[inline(always)]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline(always)]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn num_chunks(&self) -> Result<usize> {
        self.shared.get()?.tree.chunks().num_chunks(self.id)
    }

    /// The chunk covering `offset`, or `None` at or past the end of the file.
    pub fn chunk_for(&self, offset: u64) -> Result<Option<ChunkDescriptor>> {
        Ok(self
            .shared
            .get()?
            .tree
            .chunks()
            .lookup(self.id, offset)?
            .copied())
    }

    /// Fills `buf` from `offset`, crossing chunk boundaries as needed.
    /// Returns fewer bytes only at the end of the file, and 0 past it.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let state = self.shared.get()?;
        let chunks = state.tree.chunks();

        let mut read = 0usize;
        let mut chunk = chunks.lookup(self.id, offset)?;
        while let Some(current) = chunk {
            if read == buf.len() {
                break;
            }
            let pos = offset + read as u64;
            let data = state.read_chunk(current)?;
            let start = (pos - current.offset) as usize;
            let n = (data.len() - start).min(buf.len() - read);
            buf[read..read + n].copy_from_slice(&data[start..start + n]);
            read += n;
            chunk = chunks.next(current);
        }
        Ok(read)
    }

    /// Reads the whole file.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.size as usize];
        let n = self.read_at(&mut out, 0)?;
        out.truncate(n);
        Ok(out)
    }
}
