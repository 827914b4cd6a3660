use super::fields::{NewCustomField, SqliteCustomFields};
use super::ContentTypeRegistry;
use crate::db::begin_write;
use crate::error::{Error, ErrorKind, Result};
use crate::ident;
use crate::models::{from_db_id, to_db_id};
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::instrument;

/// A content type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub id: u64,
    /// Plural display name, e.g. "Blog Posts".
    pub name: String,
    /// Singular display name, e.g. "Blog Post". Used as the link type label.
    pub singular_name: String,
    /// Name of the extension table holding this type's custom fields.
    pub system_name: String,
    pub custom_field_group: u64,
}

/// A content type about to be registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewContentType {
    pub name: String,
    pub singular_name: String,
    pub system_name: String,
    pub fields: Vec<NewCustomField>,
}
impl NewContentType {
    pub fn new(name: impl Into<String>, singular_name: impl Into<String>, system_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            singular_name: singular_name.into(),
            system_name: system_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: NewCustomField) -> Self {
        self.fields.push(field);
        self
    }
}

#[derive(sqlx::FromRow)]
struct ContentTypeRow {
    content_type_id: i64,
    content_type_friendly_name: String,
    content_type_singular_name: String,
    content_type_system_name: String,
    content_type_custom_field_group: i64,
}
impl TryFrom<ContentTypeRow> for ContentType {
    type Error = Error;
    fn try_from(row: ContentTypeRow) -> Result<Self> {
        Ok(Self {
            id: from_db_id(row.content_type_id, "content type id")?,
            name: row.content_type_friendly_name,
            singular_name: row.content_type_singular_name,
            system_name: row.content_type_system_name,
            custom_field_group: from_db_id(row.content_type_custom_field_group, "custom field group")?,
        })
    }
}

/// Content-type registry stored in the `content_types` table, with one
/// extension table per type.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteContentTypes;

impl SqliteContentTypes {
    /// List every registered content type, by name.
    pub async fn list(&self, pool: &SqlitePool) -> Result<Vec<ContentType>> {
        let rows: Vec<ContentTypeRow> = sqlx::query_as(include_str!("../../queries/list_content_types.sql"))
            .fetch_all(pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(ContentType::try_from).collect()
    }

    /// Register a content type.
    ///
    /// Allocates a fresh custom-field group, records the fields in it (in the
    /// order given) and creates the extension table with one `TEXT` column per
    /// field. Nothing is written unless every step succeeds.
    #[instrument(skip(self, pool, new), fields(system_name = %new.system_name))]
    pub async fn create(&self, pool: &SqlitePool, new: &NewContentType) -> Result<ContentType> {
        let table = ident::quote_table(&new.system_name)?;
        let columns = new
            .fields
            .iter()
            .map(|f| ident::quote_field(&f.name))
            .collect::<Result<Vec<_>>>()?;
        let mut tx = begin_write(pool).await?;
        let group: i64 = sqlx::query_scalar(include_str!("../../queries/next_field_group.sql"))
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let result = sqlx::query(include_str!("../../queries/insert_content_type.sql"))
            .bind(&new.name)
            .bind(&new.singular_name)
            .bind(&new.system_name)
            .bind(group)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let id = from_db_id(result.last_insert_rowid(), "content type id")?;
        let group = from_db_id(group, "custom field group")?;
        for (order, field) in new.fields.iter().enumerate() {
            SqliteCustomFields::insert(&mut tx, group, field, order).await?;
        }
        let ddl = format!(
            "CREATE TABLE {table} ({key} INTEGER PRIMARY KEY{columns})",
            key = ident::EXTENSION_KEY,
            columns = columns.iter().map(|c| format!(", {c} TEXT")).collect::<String>(),
        );
        sqlx::query(&ddl).persistent(false).execute(&mut *tx).await.or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::info!(id, fields = new.fields.len(), "Registered content type");
        Ok(ContentType {
            id,
            name: new.name.clone(),
            singular_name: new.singular_name.clone(),
            system_name: new.system_name.clone(),
            custom_field_group: group,
        })
    }
}

#[async_trait]
impl ContentTypeRegistry for SqliteContentTypes {
    async fn resolve(&self, conn: &mut SqliteConnection, type_id: u64) -> Result<Option<ContentType>> {
        let row: Option<ContentTypeRow> = sqlx::query_as(include_str!("../../queries/get_content_type.sql"))
            .bind(to_db_id(type_id, "content type id")?)
            .fetch_optional(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(ContentType::try_from).transpose()
    }
}
