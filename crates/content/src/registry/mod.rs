//! Collaborator registries consulted by the content repository.
//!
//! The repository does not own URL routing, content-type definitions or
//! custom-field schemas. It talks to them through the traits in this module.
//! Every method receives the caller's connection, so registry writes made
//! during a content operation commit or roll back together with it.
//!
//! SQLite-backed implementations sharing the content database are provided
//! and used by [`Registries::default()`].

mod fields;
mod links;
mod types;

pub use self::fields::{CustomField, NewCustomField, SqliteCustomFields};
pub use self::links::{CONTENT_ROUTE, NewLink, Route, SqliteLinks};
pub use self::types::{ContentType, NewContentType, SqliteContentTypes};
use crate::error::Result;
use crate::models::IdSet;
use async_trait::async_trait;
use sqlx::SqliteConnection;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

/// Resolves content-type identifiers to their definitions.
#[async_trait]
pub trait ContentTypeRegistry: Send + Sync {
    /// Look up a content type. Unknown identifiers yield `None`.
    async fn resolve(&self, conn: &mut SqliteConnection, type_id: u64) -> Result<Option<ContentType>>;
}

/// Provides the custom-field schema of a field group.
#[async_trait]
pub trait CustomFieldRegistry: Send + Sync {
    /// All fields of the group, in display order. Unknown groups yield an
    /// empty list.
    async fn fields_for_group(&self, conn: &mut SqliteConnection, group: u64) -> Result<Vec<CustomField>>;
}

/// Owns URL paths and their routing records.
#[async_trait]
pub trait LinkRegistry: Send + Sync {
    /// Return `candidate`, or a variant of it, that no link currently uses.
    async fn unique_path(&self, conn: &mut SqliteConnection, candidate: &str) -> Result<String>;

    /// Register a new link and return its identifier. The path must already
    /// be unique (see [`unique_path`](Self::unique_path)).
    async fn create(&self, conn: &mut SqliteConnection, link: &NewLink) -> Result<u64>;

    async fn update_path(&self, conn: &mut SqliteConnection, link_id: u64, path: &str) -> Result<()>;

    async fn update_title(&self, conn: &mut SqliteConnection, link_id: u64, title: &str) -> Result<()>;

    /// Replace the topic index used for searching links by topic.
    async fn update_topics(&self, conn: &mut SqliteConnection, link_id: u64, topics: &IdSet) -> Result<()>;

    async fn delete(&self, conn: &mut SqliteConnection, link_id: u64) -> Result<()>;
}

/// The set of registries a [`Repository`](crate::Repository) works against.
#[derive(Clone)]
pub struct Registries {
    pub types: Arc<dyn ContentTypeRegistry>,
    pub fields: Arc<dyn CustomFieldRegistry>,
    pub links: Arc<dyn LinkRegistry>,
}
impl Default for Registries {
    /// Registries backed by tables in the content database itself.
    fn default() -> Self {
        Self {
            types: Arc::new(SqliteContentTypes),
            fields: Arc::new(SqliteCustomFields),
            links: Arc::new(SqliteLinks),
        }
    }
}
impl Debug for Registries {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Registries").finish_non_exhaustive()
    }
}
