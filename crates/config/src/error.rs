//! Configuration Error Types

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A configuration source could not be read or did not match the
    /// expected shape.
    #[display("could not load configuration")]
    Load,
    /// Loaded fine, but a value is unusable.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] &'static str),
}
