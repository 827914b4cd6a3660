use super::LinkRegistry;
use crate::error::{ErrorKind, Result};
use crate::models::{IdSet, encode_set, to_db_id};
use async_trait::async_trait;
use exn::ResultExt;
use sqlx::SqliteConnection;

/// The handler triple a link dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub module: &'static str,
    pub controller: &'static str,
    pub action: &'static str,
}

/// Every content link routes to the content viewer.
pub const CONTENT_ROUTE: Route = Route {
    module: "publish",
    controller: "content",
    action: "view",
};

/// A link about to be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub path: String,
    pub topics: IdSet,
    pub title: String,
    /// Human label of what the link points at (the content type's singular name).
    pub type_label: String,
    pub route: Route,
}

/// Link registry stored in the `links` table of the content database.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteLinks;

impl SqliteLinks {
    async fn path_exists(conn: &mut SqliteConnection, path: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(include_str!("../../queries/link_path_exists.sql"))
            .bind(path)
            .fetch_one(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)
    }
}

#[async_trait]
impl LinkRegistry for SqliteLinks {
    async fn unique_path(&self, conn: &mut SqliteConnection, candidate: &str) -> Result<String> {
        if !Self::path_exists(conn, candidate).await? {
            return Ok(candidate.to_string());
        }
        let mut suffix: u64 = 1;
        loop {
            let path = format!("{candidate}-{suffix}");
            if !Self::path_exists(conn, &path).await? {
                tracing::debug!(candidate, path = %path, "URL path already taken; suffixed");
                return Ok(path);
            }
            suffix += 1;
        }
    }

    async fn create(&self, conn: &mut SqliteConnection, link: &NewLink) -> Result<u64> {
        let result = sqlx::query(include_str!("../../queries/insert_link.sql"))
            .bind(&link.path)
            .bind(encode_set(&link.topics, "link topics")?)
            .bind(&link.title)
            .bind(&link.type_label)
            .bind(link.route.module)
            .bind(link.route.controller)
            .bind(link.route.action)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(result.last_insert_rowid()).or_raise(|| ErrorKind::InvalidData("link id"))
    }

    async fn update_path(&self, conn: &mut SqliteConnection, link_id: u64, path: &str) -> Result<()> {
        sqlx::query(include_str!("../../queries/update_link_path.sql"))
            .bind(path)
            .bind(to_db_id(link_id, "link id")?)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn update_title(&self, conn: &mut SqliteConnection, link_id: u64, title: &str) -> Result<()> {
        sqlx::query(include_str!("../../queries/update_link_title.sql"))
            .bind(title)
            .bind(to_db_id(link_id, "link id")?)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn update_topics(&self, conn: &mut SqliteConnection, link_id: u64, topics: &IdSet) -> Result<()> {
        sqlx::query(include_str!("../../queries/update_link_topics.sql"))
            .bind(encode_set(topics, "link topics")?)
            .bind(to_db_id(link_id, "link id")?)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn delete(&self, conn: &mut SqliteConnection, link_id: u64) -> Result<()> {
        sqlx::query(include_str!("../../queries/delete_link.sql"))
            .bind(to_db_id(link_id, "link id")?)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn link(path: &str) -> NewLink {
        NewLink {
            path: path.to_string(),
            topics: [3, 7].into_iter().collect(),
            title: "Hello".to_string(),
            type_label: "Post".to_string(),
            route: CONTENT_ROUTE,
        }
    }

    #[tokio::test]
    async fn test_unique_path_suffixes_collisions() {
        let db = Database::connect_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(SqliteLinks.unique_path(&mut conn, "hello").await.unwrap(), "hello");
        SqliteLinks.create(&mut conn, &link("hello")).await.unwrap();
        assert_eq!(SqliteLinks.unique_path(&mut conn, "hello").await.unwrap(), "hello-1");
        SqliteLinks.create(&mut conn, &link("hello-1")).await.unwrap();
        assert_eq!(SqliteLinks.unique_path(&mut conn, "hello").await.unwrap(), "hello-2");
    }

    #[tokio::test]
    async fn test_create_and_update() {
        let db = Database::connect_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let id = SqliteLinks.create(&mut conn, &link("hello")).await.unwrap();
        SqliteLinks.update_path(&mut conn, id, "goodbye").await.unwrap();
        SqliteLinks.update_title(&mut conn, id, "Goodbye").await.unwrap();
        SqliteLinks.update_topics(&mut conn, id, &IdSet::new()).await.unwrap();
        let row: (String, String, String, String) = sqlx::query_as(
            "SELECT link_url_path, link_title, link_topics, link_module FROM links WHERE link_id = ?",
        )
        .bind(id as i64)
        .fetch_one(&mut *conn)
        .await
        .unwrap();
        assert_eq!(row, ("goodbye".into(), "Goodbye".into(), "".into(), "publish".into()));
    }

    #[tokio::test]
    async fn test_duplicate_path_is_rejected_by_schema() {
        let db = Database::connect_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        SqliteLinks.create(&mut conn, &link("hello")).await.unwrap();
        let err = SqliteLinks.create(&mut conn, &link("hello")).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Database);
    }

    #[tokio::test]
    async fn test_delete() {
        let db = Database::connect_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let id = SqliteLinks.create(&mut conn, &link("hello")).await.unwrap();
        SqliteLinks.delete(&mut conn, id).await.unwrap();
        assert_eq!(SqliteLinks.unique_path(&mut conn, "hello").await.unwrap(), "hello");
    }
}
