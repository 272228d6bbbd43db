use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot open archive `{}`", .path.display())]
    OpenArchive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read archive `{}`", .path.display())]
    ReadArchive {
        path: PathBuf,
        #[source]
        source: stargz_metadata::Error,
    },

    #[error("No entry `{path}` in archive")]
    NotFound {
        path: String,
        #[source]
        source: stargz_metadata::Error,
    },

    #[error("Cannot read `{path}`")]
    ReadFile {
        path: String,
        #[source]
        source: stargz_metadata::Error,
    },

    #[error("Cannot serialize attributes")]
    Serialize(#[source] serde_json::Error),

    #[error("Cannot write output")]
    Output(#[source] std::io::Error),
}
