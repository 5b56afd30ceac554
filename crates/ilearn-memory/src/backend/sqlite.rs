//! Transactional row store on SQLite.
//!
//! One table per collection, each with a unique text column:
//!
//! ```sql
//! memories(id INTEGER PRIMARY KEY, memory_json TEXT NOT NULL UNIQUE, created_at TIMESTAMP)
//! rules(id INTEGER PRIMARY KEY, rule_text TEXT NOT NULL UNIQUE, created_at TIMESTAMP)
//! ```
//!
//! The schema matches databases created by earlier deployments, so an
//! existing `ai_memory.db` opens as-is.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info};

use super::{CollectionName, PersistenceBackend, PersistenceStrategy};
use crate::error::{MemoryError, Result};

/// Row-store backend. Blocking SQLite calls run on the blocking pool.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open or create a database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        conn.busy_timeout(std::time::Duration::from_secs(10))?;
        create_schema(&conn)?;

        info!("SQLite store opened at {:?}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Create an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Database file, if not in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of stored rows in `collection`.
    pub async fn row_count(&self, collection: CollectionName) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", collection.table());
        self.with_conn(move |conn| {
            let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await?
    }
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS memories (
            id INTEGER PRIMARY KEY,
            memory_json TEXT NOT NULL UNIQUE,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS rules (
            id INTEGER PRIMARY KEY,
            rule_text TEXT NOT NULL UNIQUE,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .map_err(MemoryError::from)
}

#[async_trait]
impl PersistenceBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn strategy(&self, _collection: CollectionName) -> PersistenceStrategy {
        PersistenceStrategy::Incremental
    }

    async fn load_all(&self, collection: CollectionName) -> Result<Vec<String>> {
        // `created_at` has one-second resolution; `id` keeps insertion order within a second.
        let sql = format!(
            "SELECT {} FROM {} ORDER BY created_at, id",
            collection.column(),
            collection.table()
        );
        let rows = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        debug!(%collection, rows = rows.len(), "Loaded rows from SQLite");
        Ok(rows)
    }

    async fn insert_if_absent(&self, collection: CollectionName, record: &str) -> Result<()> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES (?1)",
            collection.table(),
            collection.column()
        );
        let record = record.to_string();
        self.with_conn(move |conn| {
            conn.execute(&sql, params![record])?;
            Ok(())
        })
        .await
    }

    async fn delete_where(&self, collection: CollectionName, record: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            collection.table(),
            collection.column()
        );
        let record = record.to_string();
        self.with_conn(move |conn| {
            conn.execute(&sql, params![record])?;
            Ok(())
        })
        .await
    }

    async fn replace_all(&self, collection: CollectionName, records: &[String]) -> Result<()> {
        let delete = format!("DELETE FROM {}", collection.table());
        let insert = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES (?1)",
            collection.table(),
            collection.column()
        );
        let records = records.to_vec();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(&delete, [])?;
            {
                let mut stmt = tx.prepare(&insert)?;
                for record in &records {
                    stmt.execute(params![record])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_all(&self, collection: CollectionName) -> Result<()> {
        let sql = format!("DELETE FROM {}", collection.table());
        self.with_conn(move |conn| {
            conn.execute(&sql, [])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_insert_if_absent_ignores_duplicates() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .insert_if_absent(CollectionName::Rules, "[CORE_RULE|0.5] X")
            .await
            .unwrap();
        backend
            .insert_if_absent(CollectionName::Rules, "[CORE_RULE|0.5] X")
            .await
            .unwrap();
        assert_eq!(backend.row_count(CollectionName::Rules).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_load_all_keeps_insertion_order() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        for text in ["c", "a", "b"] {
            backend
                .insert_if_absent(CollectionName::Memories, text)
                .await
                .unwrap();
        }
        let rows = backend.load_all(CollectionName::Memories).await.unwrap();
        assert_eq!(rows, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_delete_where_and_delete_all() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        for text in ["a", "b", "c"] {
            backend
                .insert_if_absent(CollectionName::Rules, text)
                .await
                .unwrap();
        }
        backend
            .delete_where(CollectionName::Rules, "b")
            .await
            .unwrap();
        assert_eq!(
            backend.load_all(CollectionName::Rules).await.unwrap(),
            vec!["a", "c"]
        );

        backend.delete_all(CollectionName::Rules).await.unwrap();
        assert!(backend.load_all(CollectionName::Rules).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collections_are_separate_tables() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .insert_if_absent(CollectionName::Rules, "rule")
            .await
            .unwrap();
        assert!(backend.load_all(CollectionName::Memories).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_all() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .insert_if_absent(CollectionName::Rules, "old")
            .await
            .unwrap();
        backend
            .replace_all(CollectionName::Rules, &["x".to_string(), "y".to_string()])
            .await
            .unwrap();
        assert_eq!(
            backend.load_all(CollectionName::Rules).await.unwrap(),
            vec!["x", "y"]
        );
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs_and_reopens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app_data").join("ai_memory.db");

        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend
                .insert_if_absent(CollectionName::Rules, "persisted")
                .await
                .unwrap();
        }

        let reopened = SqliteBackend::open(&path).unwrap();
        assert_eq!(reopened.path(), Some(path.as_path()));
        assert_eq!(
            reopened.load_all(CollectionName::Rules).await.unwrap(),
            vec!["persisted"]
        );
    }
}
