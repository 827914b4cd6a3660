//! Database connection and pool management.

use exn::ResultExt;
use sqlx::pool::PoolConnectionMetadata;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Embedded migrations that are run automatically on connect.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// Request handlers each hold a connection for the duration of one operation.
const MAX_CONNECTIONS: u32 = 5;

/// Database connection pool for the content store.
///
/// This is the main entry point for interacting with the content database.
/// It manages the SQLite connection pool; hand it to a
/// [`Repository`](crate::Repository) to read and write content.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max: Option<u32>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // Query-based PRAGMAs must be applied to EVERY pooled connection,
            // not only the first one handed out.
            .after_connect(|conn, meta| Box::pin(async move {
                Self::apply_pragmas(conn, meta).await
            }))
            .max_connections(max.unwrap_or(MAX_CONNECTIONS))
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Connect to the content database at the given path.
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with_limit(path, None).await
    }

    /// Connect to the content database at the given path, overriding the
    /// maximum number of pooled connections.
    pub async fn connect_with_limit(path: impl AsRef<Path>, max_connections: Option<u32>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Opening content database");
        let options = Self::base_options().filename(path).create_if_missing(true);
        Self::new(options, max_connections).await
    }

    /// Connect to an in-memory database (useful for testing).
    ///
    /// Note:
    /// - In-memory databases are destroyed when the connection closes.
    /// - Not gated behind `#[cfg(test)]` so that the binary crate can use it
    ///   in its own tests.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = Self::base_options().filename(":memory:");
        // Each in-memory connection is its own database, so the pool must
        // never open a second one.
        Self::new(options, Some(1)).await
    }

    /// Base connection options shared between file and in-memory databases.
    fn base_options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            // Enforces content -> links and the topic_maps cascade.
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // Writers queue behind each other's transactions (see
            // `begin_write`) for up to this long.
            .busy_timeout(std::time::Duration::from_secs(5))
            .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::None)
    }

    /// Apply additional PRAGMA settings that aren't exposed via SqliteConnectOptions.
    async fn apply_pragmas(conn: &mut SqliteConnection, _meta: PoolConnectionMetadata) -> sqlx::Result<()> {
        sqlx::query(
            r#"
                PRAGMA locking_mode = NORMAL;
                PRAGMA wal_autocheckpoint = 800;
                PRAGMA cache_size = -8192;
                PRAGMA temp_store = MEMORY;
            "#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Run database migrations.
    ///
    /// This is called automatically by every `connect*` constructor.
    #[instrument("performing database migrations", skip(self))]
    async fn migrate(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.or_raise(|| ErrorKind::Migration)
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    ///
    /// Waits for all connections to be returned to the pool and then closes
    /// them. The Database instance should not be used afterwards.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

/// Open a transaction for a multi-step write.
///
/// Every content write reads (type, current record, free URL paths) before
/// it writes. Under WAL, a deferred transaction cannot upgrade its read lock
/// once another writer has committed and fails with SQLITE_BUSY regardless
/// of the busy timeout. `BEGIN IMMEDIATE` takes the write lock up front, so
/// concurrent writers wait their turn and the reads stay valid until commit.
pub(crate) async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE").await.or_raise(|| ErrorKind::Database)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        db.close().await;
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_schema_is_created() {
        let db = Database::connect_in_memory().await.unwrap();
        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(db.pool())
                .await
                .unwrap();
        for expected in ["content", "content_types", "custom_fields", "links", "topic_maps", "users"] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
        db.close().await;
    }

    #[tokio::test]
    async fn test_pragmas_are_applied() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1, "foreign_keys should be ON");
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 800, "WAL checkpoint should be 800");
        db.close().await;
    }

    #[tokio::test]
    async fn test_write_transaction_holds_lock() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path().join("content.db")).await.unwrap();
        let mut tx = begin_write(db.pool()).await.unwrap();
        sqlx::query("INSERT INTO users (user_username) VALUES ('jo')").execute(&mut *tx).await.unwrap();
        // A second writer queues behind the first rather than failing.
        let pool = db.pool().clone();
        let second = tokio::spawn(async move {
            let mut tx = begin_write(&pool).await.unwrap();
            sqlx::query("INSERT INTO users (user_username) VALUES ('bob')").execute(&mut *tx).await.unwrap();
            tx.commit().await.unwrap();
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.commit().await.unwrap();
        second.await.unwrap();
        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(db.pool()).await.unwrap();
        assert_eq!(users, 2);
        db.close().await;
    }

    #[tokio::test]
    async fn test_connect_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.db");
        let db = Database::connect_with_limit(&path, Some(2)).await.unwrap();
        assert!(path.exists());
        db.close().await;
    }
}
