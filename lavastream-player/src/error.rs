//! Error types for lavastream-player
//!
//! Every error converts into a [`FriendlyError`] with a severity chosen by
//! kind, which is what listeners and the wire format see.

use lavastream_common::friendly::{FriendlyError, Severity};
use thiserror::Error;

/// Main error type for the player crate
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Container structure is malformed or inconsistent
    #[error("Container format error: {0}")]
    ContainerFormat(String),

    /// Valid container, but nothing in it can be played
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Codec creation or decode/encode failure
    #[error("Codec error: {0}")]
    Codec(String),

    /// Seek requested on a source without an index or length
    #[error("Cannot seek on a stream.")]
    NotSeekable,

    /// Native handle used after its owner released it
    #[error("Native {0} handle used after release")]
    ReleasedHandle(&'static str),

    /// Native library could not be resolved or loaded
    #[error("Native library error: {0}")]
    NativeLibrary(String),

    /// Playback was stopped while an operation was in progress
    #[error("Playback stopped")]
    Stopped,

    /// Error already carrying a user-facing message and severity
    #[error("{0}")]
    Friendly(#[from] FriendlyError),

    /// Shared wire/config layer errors
    #[error(transparent)]
    Common(#[from] lavastream_common::Error),
}

/// Convenience Result type using the player Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn container(message: impl Into<String>) -> Self {
        Error::ContainerFormat(message.into())
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Error::Codec(message.into())
    }

    /// Severity this error is reported with when it reaches a listener
    pub fn severity(&self) -> Severity {
        match self {
            Error::Friendly(friendly) => friendly.severity,
            Error::Unsupported(_) | Error::NotSeekable | Error::Stopped => Severity::Common,
            Error::ContainerFormat(_) | Error::Io(_) => Severity::Suspicious,
            Error::Codec(_)
            | Error::ReleasedHandle(_)
            | Error::NativeLibrary(_)
            | Error::Common(_) => Severity::Fault,
        }
    }

    /// Returns the friendly form of this error unchanged if it already is
    /// one, otherwise wraps it with `message` and `severity`.
    pub fn wrap_unfriendly(self, message: &str, severity: Severity) -> FriendlyError {
        match self {
            Error::Friendly(friendly) => friendly,
            other => FriendlyError::from_error(message, severity, "lavastream_player::Error", &other),
        }
    }

    /// Friendly form using the error's own message and severity
    pub fn into_friendly(self) -> FriendlyError {
        match self {
            Error::Friendly(friendly) => friendly,
            other => {
                let severity = other.severity();
                let message = other.to_string();
                FriendlyError::from_error(&message, severity, "lavastream_player::Error", &other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_by_kind() {
        assert_eq!(Error::container("bad size").severity(), Severity::Suspicious);
        assert_eq!(Error::NotSeekable.severity(), Severity::Common);
        assert_eq!(Error::codec("opus").severity(), Severity::Fault);
    }

    #[test]
    fn test_wrap_keeps_friendly_errors() {
        let friendly = FriendlyError::new("Nope.", Severity::Common);
        let wrapped = Error::Friendly(friendly.clone())
            .wrap_unfriendly("Something broke when playing the track.", Severity::Fault);
        assert_eq!(wrapped, friendly);

        let wrapped = Error::codec("bad packet")
            .wrap_unfriendly("Something broke when playing the track.", Severity::Fault);
        assert_eq!(wrapped.severity, Severity::Fault);
        assert_eq!(wrapped.cause_depth(), 1);
    }
}
