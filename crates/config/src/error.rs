//! Configuration Error Types

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A configuration layer could not be read or didn't match the schema.
    #[display("failed to load configuration: {_0}")]
    Load(#[error(not(source))] String),
    /// A `key=value` override from the command line is malformed.
    #[display("invalid override: {_0}")]
    InvalidOverride(#[error(not(source))] String),
}
