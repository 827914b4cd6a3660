use crate::error::{ErrorKind, Result};
use crate::models::sets::{self, IdSet};
use exn::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use time::UtcDateTime;

/// Input for [`Repository::create`](crate::Repository::create).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewContent {
    pub type_id: u64,
    pub author_id: u64,
    /// Empty for non-standard (log-style) entries.
    pub title: String,
    /// URL path hint; the title is slugified when absent.
    pub url_path: Option<String>,
    pub topics: IdSet,
    pub privileges: IdSet,
    /// Column name to value, written verbatim into the type's extension table.
    pub custom_fields: BTreeMap<String, String>,
}
impl NewContent {
    pub fn new(type_id: u64, author_id: u64) -> Self {
        Self { type_id, author_id, ..Self::default() }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_url_path(mut self, url_path: impl Into<String>) -> Self {
        self.url_path = Some(url_path.into());
        self
    }

    pub fn with_topics(mut self, topics: impl IntoIterator<Item = u64>) -> Self {
        self.topics = topics.into_iter().collect();
        self
    }

    pub fn with_privileges(mut self, privileges: impl IntoIterator<Item = u64>) -> Self {
        self.privileges = privileges.into_iter().collect();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_fields.insert(name.into(), value.into());
        self
    }
}

/// Input for [`Repository::update`](crate::Repository::update).
///
/// Title, topics and privileges replace the stored values wholesale. Custom
/// fields are merged: only the supplied columns are overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentUpdate {
    pub title: String,
    /// When absent, the current URL path is kept.
    pub url_path: Option<String>,
    pub topics: IdSet,
    pub privileges: IdSet,
    pub custom_fields: BTreeMap<String, String>,
}
impl ContentUpdate {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), ..Self::default() }
    }

    pub fn with_url_path(mut self, url_path: impl Into<String>) -> Self {
        self.url_path = Some(url_path.into());
        self
    }

    pub fn with_topics(mut self, topics: impl IntoIterator<Item = u64>) -> Self {
        self.topics = topics.into_iter().collect();
        self
    }

    pub fn with_privileges(mut self, privileges: impl IntoIterator<Item = u64>) -> Self {
        self.privileges = privileges.into_iter().collect();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_fields.insert(name.into(), value.into());
        self
    }
}

/// Author details joined from the user table.
///
/// Everything except the identifier is optional: the user record is owned
/// elsewhere and may have been removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorView {
    pub id: u64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// A content record as returned by queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentView {
    pub id: u64,
    pub link_id: u64,
    pub created_at: UtcDateTime,
    pub modified_at: UtcDateTime,
    pub author: AuthorView,
    pub type_id: u64,
    pub type_name: Option<String>,
    pub is_standard: bool,
    /// Stored title for standard content, `Entry #<id>` otherwise.
    pub title: String,
    pub url_path: String,
    /// `url_path` resolved against the configured site URL.
    pub url: String,
    /// `None` means unrestricted.
    pub privileges: Option<IdSet>,
    pub topics: Option<IdSet>,
    /// Only populated when the query selected a single content type (by id
    /// or type filter); empty otherwise.
    pub custom_fields: BTreeMap<String, Option<String>>,
}

/// Display title for a record: the stored title for standard content, or a
/// synthesized label for minimal entries.
pub fn display_title(id: u64, is_standard: bool, title: &str) -> String {
    match is_standard {
        true => title.to_string(),
        false => format!("Entry #{id}"),
    }
}

/// Join a canonical path onto the site's base URL.
pub fn resolve_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub(crate) fn to_db_id(id: u64, what: &'static str) -> Result<i64> {
    i64::try_from(id).or_raise(|| ErrorKind::InvalidData(what))
}

pub(crate) fn from_db_id(id: i64, what: &'static str) -> Result<u64> {
    u64::try_from(id).or_raise(|| ErrorKind::InvalidData(what))
}

/// One row of the composed content query, minus any extension columns.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ContentRow {
    pub(crate) content_id: i64,
    pub(crate) link_id: i64,
    pub(crate) content_type_id: i64,
    pub(crate) content_is_standard: bool,
    pub(crate) content_title: String,
    pub(crate) content_privileges: String,
    pub(crate) content_topics: String,
    pub(crate) content_date: i64,
    pub(crate) content_modified: i64,
    pub(crate) user_id: i64,
    pub(crate) user_username: Option<String>,
    pub(crate) user_first_name: Option<String>,
    pub(crate) user_last_name: Option<String>,
    pub(crate) user_email: Option<String>,
    pub(crate) content_type_friendly_name: Option<String>,
    pub(crate) link_url_path: Option<String>,
}
impl ContentRow {
    pub(crate) fn into_view(self, site_url: &str, custom_fields: BTreeMap<String, Option<String>>) -> Result<ContentView> {
        let id = from_db_id(self.content_id, "content id")?;
        let url_path = self.link_url_path.ok_or_raise(|| ErrorKind::InvalidData("link"))?;
        Ok(ContentView {
            id,
            link_id: from_db_id(self.link_id, "link id")?,
            created_at: UtcDateTime::from_unix_timestamp(self.content_date)
                .or_raise(|| ErrorKind::InvalidData("content date"))?,
            modified_at: UtcDateTime::from_unix_timestamp(self.content_modified)
                .or_raise(|| ErrorKind::InvalidData("modified date"))?,
            author: AuthorView {
                id: from_db_id(self.user_id, "author id")?,
                username: self.user_username,
                first_name: self.user_first_name,
                last_name: self.user_last_name,
                email: self.user_email,
            },
            type_id: from_db_id(self.content_type_id, "content type id")?,
            type_name: self.content_type_friendly_name,
            is_standard: self.content_is_standard,
            title: display_title(id, self.content_is_standard, &self.content_title),
            url: resolve_url(site_url, &url_path),
            url_path,
            privileges: sets::decode(&self.content_privileges, "privileges")?,
            topics: sets::decode(&self.content_topics, "topics")?,
            custom_fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn row(is_standard: bool) -> ContentRow {
        ContentRow {
            content_id: 12,
            link_id: 4,
            content_type_id: 1,
            content_is_standard: is_standard,
            content_title: if is_standard { "Hello".to_string() } else { String::new() },
            content_privileges: String::new(),
            content_topics: "[3,7]".to_string(),
            content_date: 1_760_000_000,
            content_modified: 1_760_000_060,
            user_id: 1,
            user_username: Some("jo".to_string()),
            user_first_name: None,
            user_last_name: None,
            user_email: None,
            content_type_friendly_name: Some("Blog Posts".to_string()),
            link_url_path: Some("hello".to_string()),
        }
    }

    #[rstest]
    #[case(7, true, "Hello", "Hello")]
    #[case(7, false, "", "Entry #7")]
    #[case(7, false, "ignored", "Entry #7")]
    fn test_display_title(#[case] id: u64, #[case] standard: bool, #[case] title: &str, #[case] expected: &str) {
        assert_eq!(display_title(id, standard, title), expected);
    }

    #[rstest]
    #[case("https://example.com", "hello", "https://example.com/hello")]
    #[case("https://example.com/", "hello", "https://example.com/hello")]
    #[case("https://example.com/site/", "/hello", "https://example.com/site/hello")]
    #[case("", "hello", "/hello")]
    fn test_resolve_url(#[case] base: &str, #[case] path: &str, #[case] expected: &str) {
        assert_eq!(resolve_url(base, path), expected);
    }

    #[test]
    fn test_row_to_view() {
        let view = row(true).into_view("https://example.com", BTreeMap::new()).unwrap();
        assert_eq!(view.title, "Hello");
        assert_eq!(view.url, "https://example.com/hello");
        assert_eq!(view.privileges, None);
        assert_eq!(view.topics, Some([3, 7].into_iter().collect()));
        assert_eq!(view.author.username.as_deref(), Some("jo"));
        assert!(view.custom_fields.is_empty());
    }

    #[test]
    fn test_non_standard_row_to_view() {
        let view = row(false).into_view("/", BTreeMap::new()).unwrap();
        assert!(!view.is_standard);
        assert_eq!(view.title, "Entry #12");
    }

    #[test]
    fn test_row_without_link() {
        let mut row = row(true);
        row.link_url_path = None;
        let err = row.into_view("/", BTreeMap::new()).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData("link"));
    }

    #[test]
    fn test_builders() {
        let new = NewContent::new(2, 9).with_title("Hi").with_topics([0, 4]).with_field("body", "text");
        assert_eq!(new.type_id, 2);
        assert_eq!(new.topics.len(), 2);
        assert_eq!(new.custom_fields.get("body").map(String::as_str), Some("text"));
        let update = ContentUpdate::new("Hi again").with_url_path("hi");
        assert_eq!(update.url_path.as_deref(), Some("hi"));
    }
}
