use super::CustomFieldRegistry;
use super::types::ContentType;
use crate::db::begin_write;
use crate::error::{Error, ErrorKind, Result};
use crate::ident;
use crate::models::{from_db_id, to_db_id};
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::{SqliteConnection, SqlitePool};

/// A custom field definition belonging to a field group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomField {
    pub id: u64,
    pub group: u64,
    /// Column name in the extension table.
    pub name: String,
    pub friendly_name: String,
    pub order: i64,
}

/// A custom field about to be registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewCustomField {
    pub name: String,
    pub friendly_name: String,
}
impl NewCustomField {
    pub fn new(name: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self { name: name.into(), friendly_name: friendly_name.into() }
    }
}

#[derive(sqlx::FromRow)]
struct CustomFieldRow {
    custom_field_id: i64,
    custom_field_group: i64,
    custom_field_name: String,
    custom_field_friendly_name: String,
    custom_field_order: i64,
}
impl TryFrom<CustomFieldRow> for CustomField {
    type Error = Error;
    fn try_from(row: CustomFieldRow) -> Result<Self> {
        Ok(Self {
            id: from_db_id(row.custom_field_id, "custom field id")?,
            group: from_db_id(row.custom_field_group, "custom field group")?,
            name: row.custom_field_name,
            friendly_name: row.custom_field_friendly_name,
            order: row.custom_field_order,
        })
    }
}

/// Custom-field registry stored in the `custom_fields` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteCustomFields;

impl SqliteCustomFields {
    pub(crate) async fn insert(
        conn: &mut SqliteConnection,
        group: u64,
        field: &NewCustomField,
        order: usize,
    ) -> Result<u64> {
        let result = sqlx::query(include_str!("../../queries/insert_custom_field.sql"))
            .bind(to_db_id(group, "custom field group")?)
            .bind(&field.name)
            .bind(&field.friendly_name)
            .bind(i64::try_from(order).or_raise(|| ErrorKind::InvalidData("custom field order"))?)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        from_db_id(result.last_insert_rowid(), "custom field id")
    }

    /// Append a field to an existing content type, adding the matching
    /// column to its extension table. Existing records read `NULL` for it.
    pub async fn add(&self, pool: &SqlitePool, content_type: &ContentType, field: &NewCustomField) -> Result<CustomField> {
        let table = ident::quote_table(&content_type.system_name)?;
        let column = ident::quote_field(&field.name)?;
        let mut tx = begin_write(pool).await?;
        let order = self.fields_for_group(&mut tx, content_type.custom_field_group).await?.len();
        let id = Self::insert(&mut tx, content_type.custom_field_group, field, order).await?;
        sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} TEXT"))
            .persistent(false)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::info!(content_type = content_type.id, field = %field.name, "Added custom field");
        Ok(CustomField {
            id,
            group: content_type.custom_field_group,
            name: field.name.clone(),
            friendly_name: field.friendly_name.clone(),
            order: i64::try_from(order).or_raise(|| ErrorKind::InvalidData("custom field order"))?,
        })
    }
}

#[async_trait]
impl CustomFieldRegistry for SqliteCustomFields {
    async fn fields_for_group(&self, conn: &mut SqliteConnection, group: u64) -> Result<Vec<CustomField>> {
        let rows: Vec<CustomFieldRow> = sqlx::query_as(include_str!("../../queries/fields_for_group.sql"))
            .bind(to_db_id(group, "custom field group")?)
            .fetch_all(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(CustomField::try_from).collect()
    }
}
