//! Content Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! "Not found" is deliberately absent from [`ErrorKind`]: a missing record
//! or an unknown content type is reported as `Ok(None)`/`Ok(false)` by the
//! repository, so that an `Err` always means the operation itself failed.

use derive_more::{Display, Error};

/// A content repository error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for content repository operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// Serialization/deserialization error, or a value that does not fit
    /// its column.
    #[display("invalid content data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// A table or column name that cannot be safely used as an SQL identifier.
    #[display("invalid identifier: {_0:?}")]
    InvalidIdentifier(#[error(not(source))] String),
    /// A filter value that could not be parsed.
    #[display("invalid filter: {_0}")]
    InvalidFilter(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // SQLITE_BUSY and friends surface as `Database`; everything else is
        // bad input and will fail the same way again.
        matches!(self, Self::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Database, true)]
    #[case(ErrorKind::Migration, false)]
    #[case(ErrorKind::InvalidData("privileges"), false)]
    #[case(ErrorKind::InvalidIdentifier("".to_string()), false)]
    #[case(ErrorKind::InvalidFilter("limit".to_string()), false)]
    fn test_is_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorKind::InvalidData("topics").to_string(), "invalid content data: topics");
        assert_eq!(
            ErrorKind::InvalidIdentifier("bad\0name".to_string()).to_string(),
            "invalid identifier: \"bad\\0name\""
        );
    }
}
