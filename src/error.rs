use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Transport or handshake failure. Absorbed by the connection supervisor.
    #[error("broker connection failed: {0}")]
    Connection(String),

    /// Serialization or send failure for a single message.
    #[error("publish failed: {0}")]
    Publish(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("notification {0} not found")]
    NotFound(Uuid),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl Error {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
