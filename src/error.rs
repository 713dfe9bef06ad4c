use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("invalid chunking configuration: {0}")]
    InvalidChunking(String),

    #[error("document already ingested: {0}")]
    DuplicateDocument(String),

    #[error("{missing} of {total} chunks have no embedding yet")]
    MissingEmbeddings { missing: usize, total: usize },

    #[error("embedding provider failed: {0}")]
    Embedding(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}
