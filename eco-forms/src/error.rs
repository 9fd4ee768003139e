use thiserror::Error;

pub type Result<T> = std::result::Result<T, FormError>;

#[derive(Debug, Error)]
pub enum FormError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for FormError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<tokio::task::JoinError> for FormError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}
