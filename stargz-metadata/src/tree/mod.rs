//! Builds the node tree from the flat entry list of a table of contents.

use std::collections::HashMap;

use crate::attr::{Attr, AttrStore, Mode, NodeKind};
use crate::chunk::ChunkIndex;
use crate::error::{Error, Result};
use crate::path::TocPath;
use crate::toc::{Toc, TocEntry, TocEntryKind, NO_PREFETCH_LANDMARK, PREFETCH_LANDMARK};

pub mod identity;

pub use self::identity::{IdentityResolver, LANDMARK_ID, ROOT_ID};

/// One name inside a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub id: u32,
}

#[derive(Debug, Default)]
struct Dir {
    /// Children in the order the archive introduced them.
    entries: Vec<DirEntry>,
    by_name: HashMap<String, usize>,
}

impl Dir {
    fn insert(&mut self, name: &str, id: u32) {
        self.by_name.insert(name.to_string(), self.entries.len());
        self.entries.push(DirEntry {
            name: name.to_string(),
            id,
        });
    }

    fn get(&self, name: &str) -> Option<&DirEntry> {
        self.by_name.get(name).and_then(|i| self.entries.get(*i))
    }
}

/// Which landmark file the archive carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landmark {
    /// `.prefetch.landmark`: entries before it are worth prefetching.
    Prefetch,
    /// `.no.prefetch.landmark`, declared or synthesized.
    NoPrefetch,
}

/// The immutable index a reader serves from.
#[derive(Debug)]
pub struct Tree {
    attrs: AttrStore,
    dirs: HashMap<u32, Dir>,
    chunks: ChunkIndex,
    ids: IdentityResolver,
    landmark: Landmark,
}

impl Tree {
    /// Builds the tree. `data_end` is where chunk data stops and the TOC
    /// starts; every chunk must lie before it.
    pub fn build(toc: &Toc, data_end: u64) -> Result<Tree> {
        let mut builder = Builder::new(data_end);
        for entry in toc.entries.iter() {
            builder.add(entry)?;
        }
        let tree = builder.finish()?;
        tracing::debug!(
            entries = toc.entries.len(),
            nodes = tree.attrs.len(),
            landmark = ?tree.landmark,
            "built node tree"
        );
        Ok(tree)
    }

    #[inline(always)]
    pub fn attrs(&self) -> &AttrStore {
        &self.attrs
    }

    #[inline(always)]
    pub fn chunks(&self) -> &ChunkIndex {
        &self.chunks
    }

    #[inline(always)]
    pub fn landmark(&self) -> Landmark {
        self.landmark
    }

    pub fn num_nodes(&self) -> usize {
        self.attrs.len()
    }

    /// Children of directory `id` in archive order.
    pub fn children(&self, id: u32) -> Result<&[DirEntry]> {
        match self.dirs.get(&id) {
            Some(dir) => Ok(&dir.entries),
            None if self.attrs.contains(id) => Ok(&[]),
            None => Err(Error::NotFound { id }),
        }
    }

    pub fn child(&self, parent: u32, name: &str) -> Result<u32> {
        let attr = self.attrs.get_attr(parent)?;
        self.dirs
            .get(&parent)
            .filter(|_| attr.mode.is_dir())
            .and_then(|dir| dir.get(name))
            .map(|entry| entry.id)
            .ok_or_else(|| Error::ChildNotFound {
                parent,
                name: name.to_string(),
            })
    }

    pub fn lookup(&self, path: &TocPath) -> Option<u32> {
        self.ids.get(path)
    }

    /// Every bound path with its id, sorted by path.
    pub fn paths(&self) -> Vec<(&TocPath, u32)> {
        self.ids.paths()
    }
}

fn attr_from_entry(entry: &TocEntry, kind: NodeKind) -> Attr {
    Attr {
        size: entry.size,
        mod_time: entry.mod_time,
        link_name: if kind == NodeKind::Symlink {
            entry.link_name.clone()
        } else {
            String::new()
        },
        mode: Mode::new(kind, entry.mode),
        uid: entry.uid,
        gid: entry.gid,
        dev_major: entry.dev_major,
        dev_minor: entry.dev_minor,
        xattrs: entry.xattrs.clone(),
        num_link: 1,
    }
}

fn node_kind(kind: TocEntryKind) -> Option<NodeKind> {
    Some(match kind {
        TocEntryKind::Directory => NodeKind::Directory,
        TocEntryKind::Regular => NodeKind::Regular,
        TocEntryKind::Symlink => NodeKind::Symlink,
        TocEntryKind::CharDevice => NodeKind::CharDevice,
        TocEntryKind::BlockDevice => NodeKind::BlockDevice,
        TocEntryKind::Fifo => NodeKind::Fifo,
        TocEntryKind::Hardlink => return None,
    })
}

fn landmark_kind(path: &TocPath) -> Option<Landmark> {
    if path.depth() != 1 {
        return None;
    }
    match path.as_str() {
        PREFETCH_LANDMARK => Some(Landmark::Prefetch),
        NO_PREFETCH_LANDMARK => Some(Landmark::NoPrefetch),
        _ => None,
    }
}

struct Builder {
    attrs: AttrStore,
    dirs: HashMap<u32, Dir>,
    chunks: ChunkIndex,
    ids: IdentityResolver,
    landmark: Option<Landmark>,
    data_end: u64,
}

impl Builder {
    fn new(data_end: u64) -> Builder {
        let mut attrs = AttrStore::default();
        attrs.set_attr(ROOT_ID, Attr::implicit_dir());
        let mut dirs = HashMap::new();
        dirs.insert(ROOT_ID, Dir::default());

        Builder {
            attrs,
            dirs,
            chunks: ChunkIndex::default(),
            ids: IdentityResolver::new(),
            landmark: None,
            data_end,
        }
    }

    fn add(&mut self, entry: &TocEntry) -> Result<()> {
        let path = TocPath::new(&entry.name).map_err(|e| Error::malformed(&entry.name, e))?;
        tracing::trace!(raw = %entry.name, %path, kind = ?entry.kind, "adding entry");

        if path.is_root() {
            return match entry.kind {
                TocEntryKind::Directory => {
                    self.merge_dir_attr(ROOT_ID, entry);
                    Ok(())
                }
                _ => Err(Error::malformed(
                    &entry.name,
                    "only a directory may name the archive root",
                )),
            };
        }

        let parent = self.ensure_parents(&path)?;
        // A non-root path always has a final component.
        let name = path.file_name().unwrap_or_default();

        let kind = match node_kind(entry.kind) {
            Some(kind) => kind,
            None => return self.add_hardlink(parent, name, &path, entry),
        };

        if let Some(existing) = self.ids.get(&path) {
            let existing_is_dir = self.attrs.get_attr(existing)?.mode.is_dir();
            if kind == NodeKind::Directory && existing_is_dir {
                self.merge_dir_attr(existing, entry);
                return Ok(());
            }
            return Err(Error::malformed(&path, "path is declared more than once"));
        }

        let id = match landmark_kind(&path) {
            Some(landmark) if kind == NodeKind::Regular => {
                if let Some(previous) = self.landmark {
                    return Err(Error::malformed(
                        &path,
                        format!("archive already has a {:?} landmark", previous),
                    ));
                }
                self.landmark = Some(landmark);
                self.ids.bind_landmark(&path);
                LANDMARK_ID
            }
            Some(_) => {
                return Err(Error::malformed(&path, "landmark must be a regular file"));
            }
            None => self.ids.resolve(&path).0,
        };

        self.attrs.set_attr(id, attr_from_entry(entry, kind));
        if kind == NodeKind::Regular {
            self.chunks
                .insert(id, &path, entry.size, entry.chunks.clone(), self.data_end)?;
        }
        if kind == NodeKind::Directory {
            self.dirs.entry(id).or_default();
        }
        self.attach(parent, name, id);
        Ok(())
    }

    fn add_hardlink(
        &mut self,
        parent: u32,
        name: &str,
        path: &TocPath,
        entry: &TocEntry,
    ) -> Result<()> {
        if self.ids.get(path).is_some() {
            return Err(Error::malformed(path, "path is declared more than once"));
        }

        let target = TocPath::new(&entry.link_name)
            .map_err(|e| Error::malformed(path, format!("bad hardlink target: {}", e)))?;
        let id = self.ids.get(&target).ok_or_else(|| {
            Error::malformed(path, format!("hardlink target '{}' does not exist", target))
        })?;

        let attr = self.attrs.get_attr_mut(id)?;
        if attr.mode.is_dir() {
            return Err(Error::malformed(
                path,
                format!("hardlink target '{}' is a directory", target),
            ));
        }
        attr.num_link += 1;

        self.ids.alias(path, id);
        self.attach(parent, name, id);
        Ok(())
    }

    /// Materializes every missing ancestor of `path` and returns the id of
    /// its parent directory.
    fn ensure_parents(&mut self, path: &TocPath) -> Result<u32> {
        let mut parent = ROOT_ID;
        for ancestor in path.ancestors() {
            let (id, created) = self.ids.resolve(&ancestor);
            if created {
                tracing::trace!(path = %ancestor, id, "implicit directory");
                self.attrs.set_attr(id, Attr::implicit_dir());
                self.dirs.insert(id, Dir::default());
                self.attach(parent, ancestor.file_name().unwrap_or_default(), id);
            } else if !self.attrs.get_attr(id)?.mode.is_dir() {
                return Err(Error::malformed(
                    path,
                    format!("ancestor '{}' is not a directory", ancestor),
                ));
            }
            parent = id;
        }
        Ok(parent)
    }

    fn attach(&mut self, parent: u32, name: &str, id: u32) {
        self.dirs.entry(parent).or_default().insert(name, id);
    }

    /// Replaces the declared attributes of directory `id`, keeping its links.
    fn merge_dir_attr(&mut self, id: u32, entry: &TocEntry) {
        let mut attr = attr_from_entry(entry, NodeKind::Directory);
        if let Ok(existing) = self.attrs.get_attr(id) {
            attr.num_link = existing.num_link;
        }
        self.attrs.set_attr(id, attr);
    }

    fn synthesize_landmark(&mut self) -> Result<()> {
        let path = TocPath::new(NO_PREFETCH_LANDMARK)
            .map_err(|e| Error::malformed(NO_PREFETCH_LANDMARK, e))?;
        if self.ids.get(&path).is_some() {
            return Err(Error::malformed(&path, "landmark must be a regular file"));
        }

        let mut attr = Attr::implicit_dir();
        attr.mode = Mode::new(NodeKind::Regular, 0o644);
        attr.num_link = 1;

        self.ids.bind_landmark(&path);
        self.attrs.set_attr(LANDMARK_ID, attr);
        self.chunks
            .insert(LANDMARK_ID, &path, 0, vec![], self.data_end)?;
        self.attach(ROOT_ID, NO_PREFETCH_LANDMARK, LANDMARK_ID);
        self.landmark = Some(Landmark::NoPrefetch);
        Ok(())
    }

    fn finish(mut self) -> Result<Tree> {
        if self.landmark.is_none() {
            self.synthesize_landmark()?;
        }

        // Every subdirectory's ".." is a link to its parent.
        let counts: Vec<(u32, u32)> = self
            .dirs
            .iter()
            .map(|(id, dir)| {
                let subdirs = dir
                    .entries
                    .iter()
                    .filter(|e| self.attrs.get_attr(e.id).map(|a| a.mode.is_dir()).unwrap_or(false))
                    .count();
                (*id, 2 + subdirs as u32)
            })
            .collect();
        for (id, num_link) in counts {
            self.attrs.get_attr_mut(id)?.num_link = num_link;
        }

        Ok(Tree {
            attrs: self.attrs,
            dirs: self.dirs,
            chunks: self.chunks,
            ids: self.ids,
            landmark: self.landmark.unwrap_or(Landmark::NoPrefetch),
        })
    }
}
