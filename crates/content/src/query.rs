//! Content query composition.
//!
//! A listing is assembled from independent filters, each contributing at
//! most one predicate (and the topic filter one extra join). When the filter
//! pins the result to a single content type, by id or by type, that type's
//! extension table is joined as well and its custom fields come back inline.
//! Heterogeneous listings never touch extension tables: there is no single
//! table to join.

use crate::error::{ErrorKind, Result};
use crate::ident;
use crate::models::{ContentRow, ContentView, to_db_id};
use crate::registry::{ContentType, CustomField, Registries};
use exn::ResultExt;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqliteConnection};
use std::collections::BTreeMap;
use std::str::FromStr;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcDateTime};
use tracing::instrument;

/// Prefix given to extension columns in the result set, so that a custom
/// field can never shadow one of the shared columns.
const EXTENSION_ALIAS_PREFIX: &str = "ext__";

/// Column a listing is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortColumn {
    #[default]
    Date,
    Modified,
    /// Orders by the stored title. Non-standard entries store an empty
    /// title, so they sort as `""` rather than as their `Entry #<id>` label.
    Title,
    Id,
    Author,
    Type,
}
impl SortColumn {
    fn sql(self) -> &'static str {
        match self {
            Self::Date => "content.content_date",
            Self::Modified => "content.content_modified",
            Self::Title => "content.content_title",
            Self::Id => "content.content_id",
            Self::Author => "users.user_username",
            Self::Type => "content_types.content_type_friendly_name",
        }
    }
}
impl FromStr for SortColumn {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "date" | "content_date" | "created" => Self::Date,
            "modified" | "content_modified" | "modified_date" => Self::Modified,
            "title" | "content_title" => Self::Title,
            "id" | "content_id" => Self::Id,
            "author" | "username" | "user_username" => Self::Author,
            "type" | "type_name" => Self::Type,
            _ => exn::bail!(ErrorKind::InvalidFilter(format!("sort: {s}"))),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}
impl SortDirection {
    fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}
impl FromStr for SortDirection {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => exn::bail!(ErrorKind::InvalidFilter(format!("sort_dir: {s}"))),
        }
    }
}

/// Content listing filter. Every field is optional; unset fields do not
/// constrain the result. Set fields are combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub id: Option<u64>,
    pub type_id: Option<u64>,
    pub topic: Option<u64>,
    /// Case-insensitive substring of the author's username.
    pub author_like: Option<String>,
    /// Inclusive lower bound on the creation date.
    pub start: Option<UtcDateTime>,
    /// Inclusive upper bound on the creation date.
    pub end: Option<UtcDateTime>,
    pub is_standard: Option<bool>,
    pub sort: Option<SortColumn>,
    pub sort_dir: Option<SortDirection>,
    pub limit: Option<u32>,
    /// Only applies together with `limit`.
    pub offset: Option<u32>,
}

impl Filter {
    pub fn by_id(id: u64) -> Self {
        Self { id: Some(id), ..Self::default() }
    }

    pub fn with_type(mut self, type_id: u64) -> Self {
        self.type_id = Some(type_id);
        self
    }

    pub fn with_topic(mut self, topic: u64) -> Self {
        self.topic = Some(topic);
        self
    }

    pub fn with_author_like(mut self, fragment: impl Into<String>) -> Self {
        self.author_like = Some(fragment.into());
        self
    }

    pub fn between(mut self, start: Option<UtcDateTime>, end: Option<UtcDateTime>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn standard_only(mut self, is_standard: bool) -> Self {
        self.is_standard = Some(is_standard);
        self
    }

    pub fn sorted_by(mut self, column: SortColumn, direction: SortDirection) -> Self {
        self.sort = Some(column);
        self.sort_dir = Some(direction);
        self
    }

    pub fn paginate(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// Build a filter from untyped key/value pairs, such as a request's
    /// query string.
    ///
    /// Unrecognized keys are ignored. Recognized keys with unparseable
    /// values are an [`ErrorKind::InvalidFilter`] error.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut filter = Self::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                "id" => filter.id = Some(parse_number(key, value)?),
                "type" => filter.type_id = Some(parse_number(key, value)?),
                "topic" => filter.topic = Some(parse_number(key, value)?),
                "author_like" => filter.author_like = Some(value.to_string()),
                "start" | "start_date" => filter.start = Some(parse_date(key, value)?),
                "end" | "end_date" => filter.end = Some(parse_date(key, value)?),
                "is_standard" => filter.is_standard = Some(parse_flag(key, value)?),
                "sort" => filter.sort = Some(value.parse()?),
                "sort_dir" => filter.sort_dir = Some(value.parse()?),
                "limit" => filter.limit = Some(parse_number(key, value)?),
                "offset" => filter.offset = Some(parse_number(key, value)?),
                _ => tracing::trace!(key, "Ignoring unrecognized filter key"),
            }
        }
        Ok(filter)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    match value.parse::<T>() {
        Ok(number) => Ok(number),
        Err(_) => exn::bail!(ErrorKind::InvalidFilter(format!("{key}: {value}"))),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => exn::bail!(ErrorKind::InvalidFilter(format!("{key}: {value}"))),
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (taken as UTC), or `YYYY-MM-DD`
/// (midnight UTC).
fn parse_date(key: &str, value: &str) -> Result<UtcDateTime> {
    use time::format_description::well_known::Rfc3339;
    if let Ok(dt) = OffsetDateTime::parse(value, &Rfc3339) {
        return Ok(dt.to_utc());
    }
    if let Ok(dt) = PrimitiveDateTime::parse(value, format_description!("[year]-[month]-[day] [hour]:[minute]:[second]")) {
        return Ok(dt.as_utc());
    }
    if let Ok(date) = Date::parse(value, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().as_utc());
    }
    exn::bail!(ErrorKind::InvalidFilter(format!("{key}: {value}")))
}

fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len() + 2);
    escaped.push('%');
    for c in fragment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

struct ExtensionColumn {
    name: String,
    quoted: String,
    alias: String,
}

/// A single type's extension table, joined into a listing.
pub(crate) struct Extension {
    table: String,
    columns: Vec<ExtensionColumn>,
}
impl Extension {
    pub(crate) fn new(content_type: &ContentType, fields: &[CustomField]) -> Result<Self> {
        let columns = fields
            .iter()
            .map(|field| -> Result<ExtensionColumn> {
                let alias = format!("{EXTENSION_ALIAS_PREFIX}{}", field.name);
                Ok(ExtensionColumn {
                    name: field.name.clone(),
                    quoted: ident::quote_field(&field.name)?,
                    alias,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            table: ident::quote_table(&content_type.system_name)?,
            columns,
        })
    }

    fn read(&self, row: &SqliteRow) -> Result<BTreeMap<String, Option<String>>> {
        self.columns
            .iter()
            .map(|column| -> Result<(String, Option<String>)> {
                let value: Option<String> = row
                    .try_get(column.alias.as_str())
                    .or_raise(|| ErrorKind::InvalidData("custom field"))?;
                Ok((column.name.clone(), value))
            })
            .collect()
    }
}

/// Assemble the listing query for `filter`, joining `extension` if given.
pub(crate) fn compose(filter: &Filter, extension: Option<&Extension>) -> Result<QueryBuilder<'static, Sqlite>> {
    let mut qb = QueryBuilder::new(include_str!("../queries/select_content_columns.sql"));
    if let Some(ext) = extension {
        for column in &ext.columns {
            qb.push(format!(",\n    CAST(ext.{} AS TEXT) AS {}", column.quoted, ident::quote(&column.alias)?));
        }
    }
    qb.push("\n");
    qb.push(include_str!("../queries/select_content_joins.sql"));
    if let Some(ext) = extension {
        qb.push(format!("LEFT JOIN {} AS ext ON ext.{} = content.content_id\n", ext.table, ident::EXTENSION_KEY));
    }
    if filter.topic.is_some() {
        qb.push("INNER JOIN topic_maps ON topic_maps.content_id = content.content_id\n");
    }

    qb.push("WHERE 1 = 1");
    if let Some(start) = filter.start {
        qb.push(" AND content.content_date >= ").push_bind(start.unix_timestamp());
    }
    if let Some(end) = filter.end {
        qb.push(" AND content.content_date <= ").push_bind(end.unix_timestamp());
    }
    if let Some(fragment) = &filter.author_like {
        qb.push(" AND users.user_username LIKE ")
            .push_bind(escape_like(fragment))
            .push(" ESCAPE '\\'");
    }
    if let Some(type_id) = filter.type_id {
        qb.push(" AND content.content_type_id = ").push_bind(to_db_id(type_id, "content type id")?);
    }
    if let Some(id) = filter.id {
        qb.push(" AND content.content_id = ").push_bind(to_db_id(id, "content id")?);
    }
    if let Some(is_standard) = filter.is_standard {
        qb.push(" AND content.content_is_standard = ").push_bind(is_standard);
    }
    if let Some(topic) = filter.topic {
        qb.push(" AND topic_maps.topic_id = ").push_bind(to_db_id(topic, "topic id")?);
    }

    let column = filter.sort.unwrap_or_default();
    let direction = filter.sort_dir.unwrap_or_default().sql();
    qb.push(format!("\nORDER BY {} {direction}", column.sql()));
    if column != SortColumn::Id {
        qb.push(format!(", content.content_id {direction}"));
    }
    if let Some(limit) = filter.limit {
        qb.push("\nLIMIT ").push_bind(i64::from(limit));
        qb.push(" OFFSET ").push_bind(i64::from(filter.offset.unwrap_or(0)));
    }
    Ok(qb)
}

/// Determine which extension table (if any) a filter pins the listing to.
///
/// `Ok(None)` means the lookup matched no content at all, and the listing as
/// a whole is empty. `Ok(Some(None))` means no extension join is needed.
async fn resolve_extension(
    conn: &mut SqliteConnection,
    registries: &Registries,
    filter: &Filter,
) -> Result<Option<Option<Extension>>> {
    let lookup = match (filter.id, filter.type_id) {
        (Some(id), _) => sqlx::query_scalar::<_, i64>(include_str!("../queries/type_of_content.sql"))
            .bind(to_db_id(id, "content id")?),
        (None, Some(type_id)) => sqlx::query_scalar::<_, i64>(include_str!("../queries/content_of_type.sql"))
            .bind(to_db_id(type_id, "content type id")?),
        (None, None) => return Ok(Some(None)),
    };
    let Some(type_id) = lookup.fetch_optional(&mut *conn).await.or_raise(|| ErrorKind::Database)? else {
        return Ok(None);
    };
    let type_id = u64::try_from(type_id).or_raise(|| ErrorKind::InvalidData("content type id"))?;
    let Some(content_type) = registries.types.resolve(conn, type_id).await? else {
        tracing::warn!(type_id, "Content references an unregistered type; custom fields unavailable");
        return Ok(Some(None));
    };
    let fields = registries.fields.fields_for_group(conn, content_type.custom_field_group).await?;
    Ok(Some(Some(Extension::new(&content_type, &fields)?)))
}

/// Run a listing. Zero matching rows is reported as `None`, never as an
/// empty list.
#[instrument(skip(conn, registries, site_url))]
pub(crate) async fn fetch(
    conn: &mut SqliteConnection,
    registries: &Registries,
    site_url: &str,
    filter: &Filter,
) -> Result<Option<Vec<ContentView>>> {
    let Some(extension) = resolve_extension(conn, registries, filter).await? else {
        return Ok(None);
    };
    let mut qb = compose(filter, extension.as_ref())?;
    let rows = qb.build().fetch_all(&mut *conn).await.or_raise(|| ErrorKind::Database)?;
    tracing::debug!(rows = rows.len(), extension = extension.is_some(), "Content query complete");
    if rows.is_empty() {
        return Ok(None);
    }
    let views = rows
        .iter()
        .map(|row| -> Result<ContentView> {
            let content = ContentRow::from_row(row).or_raise(|| ErrorKind::Database)?;
            let custom_fields = match &extension {
                Some(ext) => ext.read(row)?,
                None => BTreeMap::new(),
            };
            content.into_view(site_url, custom_fields)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(views))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    fn blog_extension() -> Extension {
        let content_type = ContentType {
            id: 1,
            name: "Blog Posts".to_string(),
            singular_name: "Blog Post".to_string(),
            system_name: "blog_posts".to_string(),
            custom_field_group: 1,
        };
        let fields = [CustomField {
            id: 1,
            group: 1,
            name: "body".to_string(),
            friendly_name: "Body".to_string(),
            order: 0,
        }];
        Extension::new(&content_type, &fields).unwrap()
    }

    #[test]
    fn test_compose_defaults() {
        let qb = compose(&Filter::default(), None).unwrap();
        let sql = qb.sql();
        assert!(sql.contains("LEFT JOIN users"));
        assert!(sql.contains("LEFT JOIN content_types"));
        assert!(sql.contains("LEFT JOIN links"));
        assert!(!sql.contains("topic_maps"));
        assert!(!sql.contains("ext."));
        assert!(sql.ends_with("ORDER BY content.content_date DESC, content.content_id DESC"));
    }

    #[test]
    fn test_compose_with_extension_and_topic() {
        let ext = blog_extension();
        let filter = Filter::by_id(5).with_topic(3);
        let qb = compose(&filter, Some(&ext)).unwrap();
        let sql = qb.sql();
        assert!(sql.contains(r#"CAST(ext."body" AS TEXT) AS "ext__body""#));
        assert!(sql.contains(r#"LEFT JOIN "blog_posts" AS ext ON ext.content_id = content.content_id"#));
        assert!(sql.contains("INNER JOIN topic_maps"));
        assert!(sql.contains("AND topic_maps.topic_id = ?"));
        assert!(sql.contains("AND content.content_id = ?"));
    }

    #[test]
    fn test_compose_sort_and_pagination() {
        let filter = Filter::default().sorted_by(SortColumn::Id, SortDirection::Asc).paginate(10, 20);
        let qb = compose(&filter, None).unwrap();
        assert!(qb.sql().ends_with("ORDER BY content.content_id ASC\nLIMIT ? OFFSET ?"));
    }

    #[rstest]
    #[case("jo", "%jo%")]
    #[case("100%", "%100\\%%")]
    #[case("a_b", "%a\\_b%")]
    #[case("back\\slash", "%back\\\\slash%")]
    fn test_escape_like(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape_like(input), expected);
    }

    #[rstest]
    #[case("2025-03-01T12:30:00Z", datetime!(2025-03-01 12:30:00 UTC))]
    #[case("2025-03-01T12:30:00+02:00", datetime!(2025-03-01 10:30:00 UTC))]
    #[case("2025-03-01 12:30:00", datetime!(2025-03-01 12:30:00 UTC))]
    #[case("2025-03-01", datetime!(2025-03-01 00:00:00 UTC))]
    fn test_parse_date(#[case] input: &str, #[case] expected: OffsetDateTime) {
        assert_eq!(parse_date("start", input).unwrap(), expected.to_utc());
    }

    #[test]
    fn test_from_pairs() {
        let filter = Filter::from_pairs([
            ("type", "2"),
            ("topic", "7"),
            ("author_like", "jo"),
            ("start_date", "2025-01-01"),
            ("is_standard", "1"),
            ("sort", "title"),
            ("sort_dir", "ASC"),
            ("limit", "5"),
            ("offset", "10"),
            ("favourite_colour", "blue"),
        ])
        .unwrap();
        assert_eq!(filter.type_id, Some(2));
        assert_eq!(filter.topic, Some(7));
        assert_eq!(filter.author_like.as_deref(), Some("jo"));
        assert_eq!(filter.start, Some(datetime!(2025-01-01 00:00:00 UTC).to_utc()));
        assert_eq!(filter.is_standard, Some(true));
        assert_eq!(filter.sort, Some(SortColumn::Title));
        assert_eq!(filter.sort_dir, Some(SortDirection::Asc));
        assert_eq!((filter.limit, filter.offset), (Some(5), Some(10)));
        assert_eq!(filter.id, None);
    }

    #[rstest]
    #[case("id", "five")]
    #[case("limit", "-1")]
    #[case("is_standard", "maybe")]
    #[case("sort", "content_title; DROP TABLE content")]
    #[case("sort_dir", "sideways")]
    #[case("end", "yesterday")]
    fn test_from_pairs_rejects(#[case] key: &str, #[case] value: &str) {
        let err = Filter::from_pairs([(key, value)]).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidFilter(_)));
    }
}
