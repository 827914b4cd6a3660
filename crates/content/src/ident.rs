//! SQL identifier quoting for the per-type extension tables.
//!
//! Extension table and column names come from the content-type and
//! custom-field registries, so they are data rather than code. They are
//! never interpolated into SQL unquoted.

use crate::error::{ErrorKind, Result};

/// Tables owned by the content store itself; a content type may not claim
/// one of these as its extension table.
pub(crate) const RESERVED_TABLES: [&str; 6] = ["content", "content_types", "custom_fields", "links", "topic_maps", "users"];
/// The key column every extension table carries.
pub(crate) const EXTENSION_KEY: &str = "content_id";

/// Quote an identifier for SQLite (`"name"`, with embedded quotes doubled).
pub(crate) fn quote(name: &str) -> Result<String> {
    if name.is_empty() || name.contains('\0') || name.to_ascii_lowercase().starts_with("sqlite_") {
        exn::bail!(ErrorKind::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote an extension table name, rejecting the store's own tables.
pub(crate) fn quote_table(name: &str) -> Result<String> {
    if RESERVED_TABLES.iter().any(|t| t.eq_ignore_ascii_case(name)) {
        exn::bail!(ErrorKind::InvalidIdentifier(name.to_string()));
    }
    quote(name)
}

/// Quote a custom field column name, rejecting the extension key column.
pub(crate) fn quote_field(name: &str) -> Result<String> {
    if name.eq_ignore_ascii_case(EXTENSION_KEY) {
        exn::bail!(ErrorKind::InvalidIdentifier(name.to_string()));
    }
    quote(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("blog_posts", "\"blog_posts\"")]
    #[case("with space", "\"with space\"")]
    #[case("evil\"; DROP TABLE content; --", "\"evil\"\"; DROP TABLE content; --\"")]
    fn test_quote(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(quote(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("nul\0byte")]
    #[case("sqlite_master")]
    fn test_quote_rejects(#[case] input: &str) {
        let err = quote(input).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidIdentifier(input.to_string()));
    }

    #[rstest]
    #[case("content")]
    #[case("Links")]
    #[case("topic_maps")]
    fn test_reserved_tables(#[case] input: &str) {
        assert!(quote_table(input).is_err());
    }

    #[test]
    fn test_reserved_field() {
        assert!(quote_field("content_id").is_err());
        assert!(quote_field("body").is_ok());
    }
}
