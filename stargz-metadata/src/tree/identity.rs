use std::collections::HashMap;

use crate::path::TocPath;

pub const ROOT_ID: u32 = 1;
pub const LANDMARK_ID: u32 = 2;

/// First id handed out to ordinary nodes.
pub const FIRST_NODE_ID: u32 = 3;

/// Maps canonical paths to node ids.
///
/// Ids are allocated from a counter in the order paths are first seen, so
/// two resolvers fed the same paths in the same order agree on every id.
#[derive(Debug)]
pub struct IdentityResolver {
    by_path: HashMap<TocPath, u32>,
    next: u32,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        IdentityResolver::new()
    }
}

impl IdentityResolver {
    pub fn new() -> IdentityResolver {
        let mut by_path = HashMap::new();
        by_path.insert(TocPath::root(), ROOT_ID);
        IdentityResolver {
            by_path,
            next: FIRST_NODE_ID,
        }
    }

    #[inline(always)]
    pub fn get(&self, path: &TocPath) -> Option<u32> {
        self.by_path.get(path).copied()
    }

    /// Returns the id already bound to `path`, or binds the next free one.
    /// The flag is true when the id was freshly allocated.
    pub fn resolve(&mut self, path: &TocPath) -> (u32, bool) {
        if let Some(id) = self.get(path) {
            return (id, false);
        }
        let id = self.next;
        self.next += 1;
        self.by_path.insert(path.clone(), id);
        (id, true)
    }

    /// Binds `path` to an existing id, as a hardlink does.
    pub fn alias(&mut self, path: &TocPath, id: u32) {
        self.by_path.insert(path.clone(), id);
    }

    /// Binds `path` to the reserved landmark id.
    pub fn bind_landmark(&mut self, path: &TocPath) {
        self.by_path.insert(path.clone(), LANDMARK_ID);
    }

    /// All bound paths, sorted.
    pub fn paths(&self) -> Vec<(&TocPath, u32)> {
        let mut out: Vec<_> = self.by_path.iter().map(|(p, id)| (p, *id)).collect();
        out.sort();
        out
    }
}
