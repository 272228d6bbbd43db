use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

pub mod constants {
    pub const S_IFMT: u32 = 0o170_000;
    pub const S_IFSOCK: u32 = 0o140_000;
    pub const S_IFLNK: u32 = 0o120_000;
    pub const S_IFREG: u32 = 0o100_000;
    pub const S_IFBLK: u32 = 0o060_000;
    pub const S_IFDIR: u32 = 0o040_000;
    pub const S_IFCHR: u32 = 0o020_000;
    pub const S_IFIFO: u32 = 0o010_000;

    pub const S_ISUID: u32 = 0o4000;
    pub const S_ISGID: u32 = 0o2000;
    pub const S_ISVTX: u32 = 0o1000;

    /// Permission, setuid, setgid and sticky bits.
    pub const PERMISSION_MASK: u32 = 0o7777;

    /// Permissions given to directories the archive never declared.
    pub const IMPLICIT_DIR_PERMISSIONS: u32 = 0o755;
}

use self::constants::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
}

impl NodeKind {
    pub const fn type_bits(self) -> u32 {
        match self {
            NodeKind::Regular => S_IFREG,
            NodeKind::Directory => S_IFDIR,
            NodeKind::Symlink => S_IFLNK,
            NodeKind::CharDevice => S_IFCHR,
            NodeKind::BlockDevice => S_IFBLK,
            NodeKind::Fifo => S_IFIFO,
        }
    }

    fn type_char(self) -> char {
        match self {
            NodeKind::Regular => '-',
            NodeKind::Directory => 'd',
            NodeKind::Symlink => 'l',
            NodeKind::CharDevice => 'c',
            NodeKind::BlockDevice => 'b',
            NodeKind::Fifo => 'p',
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Regular => "regular file",
            NodeKind::Directory => "directory",
            NodeKind::Symlink => "symbolic link",
            NodeKind::CharDevice => "character device",
            NodeKind::BlockDevice => "block device",
            NodeKind::Fifo => "fifo",
        };
        f.write_str(s)
    }
}

/// A POSIX `st_mode`: the type bits of a [`NodeKind`] plus permission bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Mode(u32);

impl Mode {
    /// Builds a mode from a kind and permission bits; type bits in `perm`
    /// are discarded.
    pub const fn new(kind: NodeKind, perm: u32) -> Mode {
        Mode(kind.type_bits() | (perm & PERMISSION_MASK))
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn permissions(self) -> u32 {
        self.0 & PERMISSION_MASK
    }

    pub fn kind(self) -> NodeKind {
        match self.0 & S_IFMT {
            S_IFDIR => NodeKind::Directory,
            S_IFLNK => NodeKind::Symlink,
            S_IFCHR => NodeKind::CharDevice,
            S_IFBLK => NodeKind::BlockDevice,
            S_IFIFO => NodeKind::Fifo,
            _ => NodeKind::Regular,
        }
    }

    pub fn is_dir(self) -> bool {
        self.kind() == NodeKind::Directory
    }

    pub fn is_regular(self) -> bool {
        self.kind() == NodeKind::Regular
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = self.0;
        let mut out = String::with_capacity(10);
        out.push(self.kind().type_char());
        for &(shift, special, special_char) in &[(6, S_ISUID, 's'), (3, S_ISGID, 's'), (0, S_ISVTX, 't')] {
            let triple = (bits >> shift) & 0o7;
            out.push(if triple & 0o4 != 0 { 'r' } else { '-' });
            out.push(if triple & 0o2 != 0 { 'w' } else { '-' });
            let exec = triple & 0o1 != 0;
            out.push(match (bits & special != 0, exec) {
                (true, true) => special_char,
                (true, false) => special_char.to_ascii_uppercase(),
                (false, true) => 'x',
                (false, false) => '-',
            });
        }
        f.write_str(&out)
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#o})", self, self.0)
    }
}

/// The POSIX metadata of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attr {
    /// Byte length of a regular file; 0 for everything else.
    pub size: u64,
    pub mod_time: DateTime<Utc>,
    /// Target of a symlink, verbatim.
    pub link_name: String,
    pub mode: Mode,
    pub uid: u32,
    pub gid: u32,
    pub dev_major: u32,
    pub dev_minor: u32,
    pub xattrs: BTreeMap<String, Vec<u8>>,
    pub num_link: u32,
}

impl Attr {
    /// Attributes of a directory that no entry declared.
    pub fn implicit_dir() -> Attr {
        Attr {
            size: 0,
            mod_time: DateTime::<Utc>::from(std::time::UNIX_EPOCH),
            link_name: String::new(),
            mode: Mode::new(NodeKind::Directory, IMPLICIT_DIR_PERMISSIONS),
            uid: 0,
            gid: 0,
            dev_major: 0,
            dev_minor: 0,
            xattrs: BTreeMap::new(),
            num_link: 2,
        }
    }

    #[inline(always)]
    pub fn kind(&self) -> NodeKind {
        self.mode.kind()
    }
}

/// Attributes keyed by node id.
///
/// Ids start at 1, so id `n` lives at index `n - 1`.
#[derive(Debug, Default)]
pub struct AttrStore {
    attrs: Vec<Option<Attr>>,
}

impl AttrStore {
    pub fn set_attr(&mut self, id: u32, attr: Attr) {
        debug_assert_ne!(id, 0, "node ids start at 1");
        let index = (id as usize).saturating_sub(1);
        if self.attrs.len() <= index {
            self.attrs.resize(index + 1, None);
        }
        self.attrs[index] = Some(attr);
    }

    pub fn get_attr(&self, id: u32) -> Result<&Attr> {
        id.checked_sub(1)
            .and_then(|index| self.attrs.get(index as usize))
            .and_then(Option::as_ref)
            .ok_or(Error::NotFound { id })
    }

    pub(crate) fn get_attr_mut(&mut self, id: u32) -> Result<&mut Attr> {
        id.checked_sub(1)
            .and_then(|index| self.attrs.get_mut(index as usize))
            .and_then(Option::as_mut)
            .ok_or(Error::NotFound { id })
    }

    pub fn contains(&self, id: u32) -> bool {
        self.get_attr(id).is_ok()
    }

    /// Number of nodes with attributes.
    pub fn len(&self) -> usize {
        self.attrs.iter().filter(|a| a.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
