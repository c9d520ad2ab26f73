use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Recording error: {0}")]
    Record(#[from] demrec_engine::RecordError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
