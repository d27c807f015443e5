use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The request never produced a usable HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered but reported failure or returned no usable result.
    #[error("remote service error: {0}")]
    RemoteService(String),

    #[error("student not found: {0}")]
    NotFound(Uuid),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
