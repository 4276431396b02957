//! Resource Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. The same taxonomy is shared by every
//! crate in the resource pipeline (registries, sources, cache), since the
//! question a caller asks is always the same: "was this a miss I can recover
//! from by trying the next candidate, or did something actually break?"

use derive_more::{Display, Error};
use std::fmt::Display as FmtDisplay;
use std::path::PathBuf;

/// A resource error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for resource operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// [`NotFound`](Self::NotFound) is recoverable by trying the next candidate,
/// [`NotAvailable`](Self::NotAvailable) means there was never a candidate to
/// begin with.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Path, type, record or provider is absent (or declined).
    #[display("{what}: {subject}")]
    NotFound { what: &'static str, subject: String },
    /// Backing file does not exist.
    #[display("file not found: {}", _0.display())]
    FileNotFound(#[error(not(source))] PathBuf),
    /// Backing file exists but could not be opened.
    #[display("failed to access file: {}", _0.display())]
    FileAccess(#[error(not(source))] PathBuf),
    /// Reading from an open stream failed.
    #[display("failed to read from {}", _0.display())]
    FileRead(#[error(not(source))] PathBuf),
    /// Writing (saving) failed.
    #[display("failed to write to {}", _0.display())]
    FileWrite(#[error(not(source))] PathBuf),
    /// A read asked for more bytes than the stream had left.
    #[display("unexpected end of stream: {}", _0.display())]
    EndOfStream(#[error(not(source))] PathBuf),
    /// Malformed content, detected after a loader already claimed the data.
    #[display("format error: {_0}")]
    Format(#[error(not(source))] String),
    /// Wrapped failure from a third-party codec or the operating system.
    #[display("{library} error: {message}")]
    Platform { library: &'static str, message: String },
    /// No provider is registered at all for a category.
    #[display("no {_0} available")]
    NotAvailable(#[error(not(source))] String),
    /// Path contains invalid characters or escapes its root.
    #[display("invalid path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// Exclude filter failed to compile.
    #[display("invalid pattern: {_0}")]
    InvalidPattern(#[error(not(source))] String),
}

impl ErrorKind {
    pub fn not_found(what: &'static str, subject: impl Into<String>) -> Self {
        Self::NotFound { what, subject: subject.into() }
    }

    /// Wrap a third-party error, keeping only its message.
    #[track_caller]
    pub fn platform(library: &'static str, err: impl FmtDisplay) -> Error {
        exn::Exn::from(Self::Platform { library, message: err.to_string() })
    }

    /// Returns `true` for misses: the caller may try the next candidate.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::FileNotFound(_))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FileAccess(_) | Self::FileRead(_) | Self::FileWrite(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exn::ResultExt;

    #[test]
    fn error_kind_display() {
        assert_eq!(
            ErrorKind::not_found("mismatched mime type", "image/x-foo").to_string(),
            "mismatched mime type: image/x-foo"
        );
        assert_eq!(ErrorKind::NotAvailable("image savers".to_string()).to_string(), "no image savers available");
        assert_eq!(
            ErrorKind::EndOfStream(PathBuf::from("a/b.bin")).to_string(),
            "unexpected end of stream: a/b.bin"
        );
    }

    #[test]
    fn error_kind_classification() {
        assert!(ErrorKind::not_found("resource not found", "x").is_not_found());
        assert!(ErrorKind::FileNotFound(PathBuf::from("x")).is_not_found());
        assert!(!ErrorKind::NotAvailable("x".to_string()).is_not_found());
        assert!(!ErrorKind::Format("bad".to_string()).is_retryable());
        assert!(ErrorKind::FileRead(PathBuf::from("x")).is_retryable());
    }

    #[test]
    fn error_from_io() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short"));
        let err: Result<()> = result.or_raise(|| ErrorKind::FileRead(PathBuf::from("x")));
        assert_eq!(*err.unwrap_err(), ErrorKind::FileRead(PathBuf::from("x")));
    }

    #[test]
    fn platform_keeps_message() {
        let err = ErrorKind::platform("zip", "invalid central directory");
        assert_eq!((*err).to_string(), "zip error: invalid central directory");
    }
}
