use crate::formatting::too_large_message;

/// Core error type for the download bots.
///
/// Adapter crates map their specific errors into this type so the pipeline
/// can report failures to the chat consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download failed: {0}")]
    Fetch(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("{}", too_large_message(*size, *limit))]
    TooLarge { size: u64, limit: u64 },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
