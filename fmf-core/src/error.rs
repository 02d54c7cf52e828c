use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Channel service unavailable")]
    Unavailable,
}

impl Error {
    /// Whether the broker refused or dropped a connection attempt.
    ///
    /// These are the expected failures while a broker is down; retry loops
    /// log them as warnings and everything else as errors.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Unavailable)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
