use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Encode error: {0}")]
    EncodeError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Flush worker error: {0}")]
    WorkerError(String),
}

pub type Result<T> = std::result::Result<T, MetricsError>;

impl<T> From<std::sync::PoisonError<T>> for MetricsError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for MetricsError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for MetricsError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::EncodeError(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for MetricsError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::DecodeError(err.to_string())
    }
}
