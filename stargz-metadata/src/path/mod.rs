use relative_path::{Component, RelativePath};
use std::fmt;

mod error;

pub use self::error::IntoTocPathError;

/// The separator used between components of a `TocPath`.
pub const PATH_TOC_SEP: &str = "/";

/// A canonical, relative path of an entry inside the archive.
///
/// The root of the archive is the empty path. Any other path is a `/`-joined
/// list of non-empty components with no `.` or `..` chunks, no leading
/// separator and no repeated separators.
#[derive(Debug, Clone, Default, PartialOrd, Ord, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TocPath(pub(crate) String);

/// Splits a raw entry name into canonical components.
///
/// `..` pops the previous component and is dropped when it would climb above
/// the root, so `../x`, `./x`, `/x` and `x` are all the same path.
pub fn sanitize(raw: &str) -> Option<Vec<&str>> {
    let mut out = vec![];

    for component in RelativePath::new(raw).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(name) if name.is_empty() => {}
            Component::Normal(name) => {
                if name.contains('\0') {
                    return None;
                }
                out.push(name);
            }
        }
    }

    Some(out)
}

impl TocPath {
    pub fn new<S: AsRef<str>>(raw: S) -> std::result::Result<TocPath, IntoTocPathError> {
        let out = sanitize(raw.as_ref()).ok_or(IntoTocPathError::UnrepresentableStr)?;
        Ok(TocPath(out.join(PATH_TOC_SEP)))
    }

    #[inline(always)]
    pub fn root() -> TocPath {
        TocPath(String::new())
    }

    #[inline(always)]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit(PATH_TOC_SEP).next()
    }

    /// Number of components; the root has depth 0.
    pub fn depth(&self) -> usize {
        self.iter().count()
    }

    /// Iterates the components from the root downwards.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.split(PATH_TOC_SEP).filter(|x| !x.is_empty())
    }

    /// Every proper ancestor from the first component down to the parent.
    pub(crate) fn ancestors(&self) -> Vec<TocPath> {
        let parts: Vec<_> = self.iter().collect();
        (1..parts.len())
            .map(|n| TocPath(parts[..n].join(PATH_TOC_SEP)))
            .collect()
    }
}

impl fmt::Display for TocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TocPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitisation() {
        let path = TocPath::new("/something/../somethingelse/./foo.txt").unwrap();
        assert_eq!(path.0, "somethingelse/foo.txt");
        let path = TocPath::new("../something/../somethingelse/./foo.txt/.").unwrap();
        assert_eq!(path.0, "somethingelse/foo.txt");
    }

    #[test]
    fn prefixes_collapse() {
        for raw in &["foo/bar", "./foo/bar", "/foo/bar", "../foo/bar", "foo//bar/"] {
            assert_eq!(TocPath::new(raw).unwrap().as_str(), "foo/bar", "{}", raw);
        }
    }

    #[test]
    fn parent_dir_segments() {
        let path = TocPath::new("bar/../bar///////////////////foo").unwrap();
        assert_eq!(path.as_str(), "bar/foo");
    }

    #[test]
    fn idempotent() {
        let once = TocPath::new("./a//b/../c/").unwrap();
        let twice = TocPath::new(once.as_str()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn root_forms() {
        for raw in &["", ".", "./", "/", "../", "a/.."] {
            assert!(TocPath::new(raw).unwrap().is_root(), "{}", raw);
        }
    }

    #[test]
    fn nul_is_rejected() {
        assert_eq!(
            TocPath::new("foo/\0bar"),
            Err(IntoTocPathError::UnrepresentableStr)
        );
    }

    #[test]
    fn parent_and_name() {
        let path = TocPath::new("a/b/c").unwrap();
        assert_eq!(path.file_name(), Some("c"));
        assert_eq!(path.depth(), 3);
        assert_eq!(
            path.ancestors(),
            vec![TocPath::new("a").unwrap(), TocPath::new("a/b").unwrap()]
        );
        assert!(TocPath::new("a").unwrap().ancestors().is_empty());
        assert_eq!(TocPath::root().file_name(), None);
        assert_eq!(TocPath::root().depth(), 0);
    }
}
