use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Series source error: {0}")]
    Source(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
