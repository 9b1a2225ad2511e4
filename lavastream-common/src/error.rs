//! Common error types for lavastream

use thiserror::Error;

/// Common result type for lavastream operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the player and the serialization layer
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialized data does not follow the expected wire layout
    #[error("Wire format error: {0}")]
    WireFormat(String),

    /// Encoded data uses a version this build cannot read or write
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
