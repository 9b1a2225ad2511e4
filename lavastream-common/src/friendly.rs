//! User-facing errors with a severity and a preserved cause chain
//!
//! A [`FriendlyError`] is what leaves the player when a track fails: a message
//! an end user can read, a [`Severity`] telling whether the library itself is
//! likely at fault, and the technical cause chain. The cause chain is kept as
//! [`DecodedError`] values (class name + message) so that it survives a round
//! trip through the wire format without needing the original error types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How much a failure points at the library itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Cause is known and expected; nothing is wrong with the library
    Common,

    /// Probably caused by outside data, e.g. a malformed container
    Suspicious,

    /// Probable library bug or native resource failure
    Fault,
}

impl Severity {
    /// Ordinal used on the wire
    pub fn ordinal(self) -> i32 {
        match self {
            Severity::Common => 0,
            Severity::Suspicious => 1,
            Severity::Fault => 2,
        }
    }

    /// Inverse of [`Severity::ordinal`]
    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        match ordinal {
            0 => Some(Severity::Common),
            1 => Some(Severity::Suspicious),
            2 => Some(Severity::Fault),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Common => "common",
            Severity::Suspicious => "suspicious",
            Severity::Fault => "fault",
        };
        f.write_str(name)
    }
}

/// One link of a cause chain, detached from its original error type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedError {
    /// Type name of the original error
    pub class_name: Option<String>,

    /// Message of the original error
    pub original_message: Option<String>,

    /// Next link, if any
    pub cause: Option<Box<DecodedError>>,
}

impl DecodedError {
    pub fn new(
        class_name: impl Into<String>,
        original_message: impl Into<String>,
        cause: Option<DecodedError>,
    ) -> Self {
        Self {
            class_name: Some(class_name.into()),
            original_message: Some(original_message.into()),
            cause: cause.map(Box::new),
        }
    }

    /// Captures an arbitrary error and its `source()` chain.
    ///
    /// Rust errors do not carry a runtime class name, so `class_name` is the
    /// supplied label for the outermost link and `"error"` for the sources
    /// below it.
    pub fn capture(class_name: &str, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut messages = vec![error.to_string()];
        let mut next = error.source();
        while let Some(source) = next {
            messages.push(source.to_string());
            next = source.source();
        }

        let outermost = messages.remove(0);
        let mut chain: Option<DecodedError> = None;
        for message in messages.into_iter().rev() {
            chain = Some(DecodedError::new("error", message, chain));
        }

        DecodedError::new(class_name, outermost, chain)
    }

    /// Iterates this link and every deeper link
    pub fn chain(&self) -> impl Iterator<Item = &DecodedError> {
        std::iter::successors(Some(self), |e| e.cause.as_deref())
    }
}

impl fmt::Display for DecodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.class_name.as_deref().unwrap_or("null"),
            self.original_message.as_deref().unwrap_or("null")
        )
    }
}

impl std::error::Error for DecodedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

/// An error with a message understandable to end users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendlyError {
    pub message: Option<String>,
    pub severity: Severity,
    pub cause: Option<DecodedError>,
}

impl FriendlyError {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: Some(message.into()),
            severity,
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: DecodedError) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Builds a friendly error whose cause is captured from `error`
    pub fn from_error(
        message: impl Into<String>,
        severity: Severity,
        class_name: &str,
        error: &(dyn std::error::Error + 'static),
    ) -> Self {
        Self::new(message, severity).with_cause(DecodedError::capture(class_name, error))
    }

    /// Depth of the cause chain
    pub fn cause_depth(&self) -> usize {
        self.cause.as_ref().map(|c| c.chain().count()).unwrap_or(0)
    }
}

impl fmt::Display for FriendlyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.message.as_deref().unwrap_or("unknown error"),
            self.severity
        )
    }
}

impl std::error::Error for FriendlyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}
