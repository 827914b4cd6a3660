//! Content repository: create, update, delete and query polymorphic content.
//!
//! A record is split across the shared `content` row, a link owning its URL
//! path, its `topic_maps` rows and one row in its type's extension table.
//! Every write below touches all of them inside a single transaction.

use crate::db::begin_write;
use crate::error::{ErrorKind, Result};
use crate::ident;
use crate::models::{
    ContentUpdate, ContentView, IdSet, NewContent, encode_set, normalize_privileges, normalize_topics, to_db_id,
};
use crate::query::{self, Filter};
use crate::registry::{CONTENT_ROUTE, ContentType, NewLink, Registries};
use crate::slug;
use exn::ResultExt;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use time::UtcDateTime;
use tracing::instrument;

/// Repository for content records.
///
/// Negative outcomes are values, not errors: an unknown content type, a
/// missing record or an empty listing come back as `Ok(None)` / `Ok(false)`,
/// so an `Err` always means the operation itself failed.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    registries: Registries,
    /// Base URL that canonical paths are resolved against.
    site_url: String,
}
impl Repository {
    pub fn new(pool: SqlitePool, registries: Registries, site_url: impl Into<String>) -> Self {
        Self { pool, registries, site_url: site_url.into() }
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Create a content record and return its identifier.
    ///
    /// Returns `Ok(None)` without writing anything if the content type is
    /// not registered. Custom fields are written verbatim; a field the type
    /// does not define fails the whole operation.
    #[instrument(skip(self, new), fields(type_id = new.type_id))]
    pub async fn create(&self, new: &NewContent) -> Result<Option<u64>> {
        let mut tx = begin_write(&self.pool).await?;
        let Some(content_type) = self.registries.types.resolve(&mut tx, new.type_id).await? else {
            tracing::debug!("Unknown content type; nothing created");
            return Ok(None);
        };
        let topics = normalize_topics(&new.topics);
        let privileges = normalize_privileges(&new.privileges);

        let candidate = initial_path(new, &content_type);
        let path = self.registries.links.unique_path(&mut tx, &candidate).await?;
        let link = NewLink {
            path,
            topics: topics.clone(),
            title: new.title.clone(),
            type_label: content_type.singular_name.clone(),
            route: CONTENT_ROUTE,
        };
        let link_id = self.registries.links.create(&mut tx, &link).await?;

        let now = UtcDateTime::now().unix_timestamp();
        let result = sqlx::query(include_str!("../queries/insert_content.sql"))
            .bind(to_db_id(link_id, "link id")?)
            .bind(to_db_id(content_type.id, "content type id")?)
            .bind(!new.title.is_empty())
            .bind(&new.title)
            .bind(encode_set(&privileges, "privileges")?)
            .bind(encode_set(&topics, "topics")?)
            .bind(now)
            .bind(now)
            .bind(to_db_id(new.author_id, "author id")?)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let content_id = result.last_insert_rowid();

        insert_topic_maps(&mut tx, content_id, &topics).await?;
        insert_extension(&mut tx, &content_type, content_id, &new.custom_fields).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;

        let content_id = u64::try_from(content_id).or_raise(|| ErrorKind::InvalidData("content id"))?;
        tracing::info!(content_id, path = %link.path, "Created content");
        Ok(Some(content_id))
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Update a content record in place.
    ///
    /// Title, topics and privileges are replaced; the URL path only changes
    /// when `update.url_path` is given. Custom fields not named in the update
    /// keep their values. Returns `Ok(false)` if the record does not exist.
    #[instrument(skip(self, update))]
    pub async fn update(&self, id: u64, update: &ContentUpdate) -> Result<bool> {
        let mut tx = begin_write(&self.pool).await?;
        let Some(current) = first(query::fetch(&mut tx, &self.registries, &self.site_url, &Filter::by_id(id)).await?)
        else {
            return Ok(false);
        };
        let Some(content_type) = self.registries.types.resolve(&mut tx, current.type_id).await? else {
            tracing::warn!(type_id = current.type_id, "Content references an unregistered type; not updated");
            return Ok(false);
        };
        let topics = normalize_topics(&update.topics);
        let privileges = normalize_privileges(&update.privileges);

        let path = match update.url_path.as_deref().map(slug::clean) {
            Some(hint) if !hint.is_empty() => hint,
            _ => current.url_path.clone(),
        };
        if path != current.url_path {
            let path = self.registries.links.unique_path(&mut tx, &path).await?;
            self.registries.links.update_path(&mut tx, current.link_id, &path).await?;
            tracing::debug!(from = %current.url_path, to = %path, "Moved content");
        }
        self.registries.links.update_title(&mut tx, current.link_id, &update.title).await?;
        self.registries.links.update_topics(&mut tx, current.link_id, &topics).await?;

        let content_id = to_db_id(id, "content id")?;
        sqlx::query(include_str!("../queries/update_content.sql"))
            .bind(&update.title)
            .bind(encode_set(&privileges, "privileges")?)
            .bind(encode_set(&topics, "topics")?)
            .bind(UtcDateTime::now().unix_timestamp())
            .bind(content_id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;

        sqlx::query(include_str!("../queries/delete_topic_maps.sql"))
            .bind(content_id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        insert_topic_maps(&mut tx, content_id, &topics).await?;
        update_extension(&mut tx, &content_type, content_id, &update.custom_fields).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::info!("Updated content");
        Ok(true)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete a content record along with its link, topic mappings and
    /// extension row. Returns `Ok(false)` if the record does not exist.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: u64) -> Result<bool> {
        let mut tx = begin_write(&self.pool).await?;
        let Some(current) = first(query::fetch(&mut tx, &self.registries, &self.site_url, &Filter::by_id(id)).await?)
        else {
            return Ok(false);
        };
        let content_id = to_db_id(id, "content id")?;
        // Topic mappings go with the content row (ON DELETE CASCADE).
        sqlx::query(include_str!("../queries/delete_content.sql"))
            .bind(content_id)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        self.registries.links.delete(&mut tx, current.link_id).await?;
        match self.registries.types.resolve(&mut tx, current.type_id).await? {
            Some(content_type) => delete_extension(&mut tx, &content_type, content_id).await?,
            None => tracing::warn!(type_id = current.type_id, "Content type is gone; no extension row to remove"),
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::info!(path = %current.url_path, "Deleted content");
        Ok(true)
    }

    // =========================================================================
    // Get/List
    // =========================================================================

    /// Get a single content record, including its custom fields.
    pub async fn get(&self, id: u64) -> Result<Option<ContentView>> {
        Ok(first(self.list(&Filter::by_id(id)).await?))
    }

    /// List content matching `filter`. No matches is `Ok(None)`, never an
    /// empty list.
    ///
    /// Custom fields are only populated when the filter names an `id` or a
    /// `type`, since only then is there a single extension table to join.
    pub async fn list(&self, filter: &Filter) -> Result<Option<Vec<ContentView>>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        query::fetch(&mut conn, &self.registries, &self.site_url, filter).await
    }
}

fn first(views: Option<Vec<ContentView>>) -> Option<ContentView> {
    views.and_then(|views| views.into_iter().next())
}

/// The slug a new record asks for before uniquifying: the path hint, else
/// the title, else the type's singular name for untitled entries. A hint
/// that slugifies to nothing counts as no hint.
fn initial_path(new: &NewContent, content_type: &ContentType) -> String {
    [new.url_path.as_deref().unwrap_or_default(), new.title.as_str(), content_type.singular_name.as_str()]
        .into_iter()
        .map(slug::clean)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or_else(|| "entry".to_string())
}

async fn insert_topic_maps(conn: &mut SqliteConnection, content_id: i64, topics: &IdSet) -> Result<()> {
    for topic in topics {
        sqlx::query(include_str!("../queries/insert_topic_map.sql"))
            .bind(to_db_id(*topic, "topic id")?)
            .bind(content_id)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
    }
    Ok(())
}

fn quote_fields(fields: &BTreeMap<String, String>) -> Result<Vec<(String, &str)>> {
    let mut columns = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        columns.push((ident::quote_field(name)?, value.as_str()));
    }
    Ok(columns)
}

async fn insert_extension(
    conn: &mut SqliteConnection,
    content_type: &ContentType,
    content_id: i64,
    fields: &BTreeMap<String, String>,
) -> Result<()> {
    let table = ident::quote_table(&content_type.system_name)?;
    let columns = quote_fields(fields)?;
    let sql = format!(
        "INSERT INTO {table} ({key}{names}) VALUES (?{placeholders})",
        key = ident::EXTENSION_KEY,
        names = columns.iter().map(|(c, _)| format!(", {c}")).collect::<String>(),
        placeholders = ", ?".repeat(columns.len()),
    );
    let mut statement = sqlx::query(&sql).persistent(false).bind(content_id);
    for (_, value) in &columns {
        statement = statement.bind(*value);
    }
    statement.execute(&mut *conn).await.or_raise(|| ErrorKind::Database)?;
    Ok(())
}

async fn update_extension(
    conn: &mut SqliteConnection,
    content_type: &ContentType,
    content_id: i64,
    fields: &BTreeMap<String, String>,
) -> Result<()> {
    if fields.is_empty() {
        return Ok(());
    }
    let table = ident::quote_table(&content_type.system_name)?;
    let columns = quote_fields(fields)?;
    let sql = format!(
        "UPDATE {table} SET {assignments} WHERE {key} = ?",
        assignments = columns.iter().map(|(c, _)| format!("{c} = ?")).collect::<Vec<_>>().join(", "),
        key = ident::EXTENSION_KEY,
    );
    let mut statement = sqlx::query(&sql).persistent(false);
    for (_, value) in &columns {
        statement = statement.bind(*value);
    }
    statement.bind(content_id).execute(&mut *conn).await.or_raise(|| ErrorKind::Database)?;
    Ok(())
}

async fn delete_extension(conn: &mut SqliteConnection, content_type: &ContentType, content_id: i64) -> Result<()> {
    let table = ident::quote_table(&content_type.system_name)?;
    let sql = format!("DELETE FROM {table} WHERE {key} = ?", key = ident::EXTENSION_KEY);
    sqlx::query(&sql)
        .persistent(false)
        .bind(content_id)
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}
