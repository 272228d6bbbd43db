use crate::compression::Compression;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No node with id {id}")]
    NotFound { id: u32 },

    #[error("No child named '{name}' in directory {parent}")]
    ChildNotFound { parent: u32, name: String },

    #[error("Path not found in archive. Path: '{path}'")]
    PathNotFound { path: String },

    #[error("Malformed table of contents at '{path}': {reason}")]
    Malformed { path: String, reason: String },

    #[error("Invalid footer: {0}")]
    InvalidFooter(String),

    #[error("Invalid table of contents")]
    InvalidToc(#[source] serde_json::Error),

    #[error("I/O failure while {op}")]
    Io {
        op: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Node {id} is not a regular file")]
    NotRegularFile { id: u32 },

    #[error("No decompressor registered for {0}")]
    MissingDecompressor(Compression),

    #[error("Table of contents differs from the one the reader was built from")]
    TocMismatch,

    #[error("Reader is closed")]
    Closed,
}

impl Error {
    pub(crate) fn malformed<P: ToString, R: ToString>(path: P, reason: R) -> Error {
        Error::Malformed {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn io<S: Into<String>>(op: S) -> impl FnOnce(std::io::Error) -> Error {
        let op = op.into();
        move |source| Error::Io { op, source }
    }

    /// True for the lookup failures that leave the reader fully usable.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. } | Error::ChildNotFound { .. } | Error::PathNotFound { .. }
        )
    }
}
