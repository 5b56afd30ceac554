//! Persistence backends that mirror each collection durably.
//!
//! A backend never owns the authoritative state; the in-memory collection
//! does. Backends come in two write strategies:
//!
//! - **Incremental** (row store): one insert-or-ignore per added record, one
//!   delete per removed record.
//! - **Snapshot**: every mutation replaces the whole stored collection with
//!   the complete current list.
//!
//! ```text
//!            PersistenceBackend
//!                    │
//!   ┌─────────┬──────┴──────┬─────────────┐
//!   ▼         ▼             ▼             ▼
//! noop     sqlite      hub dataset    directory
//!  (ram)  (incremental)  (snapshot)    (snapshot)
//! ```

mod directory;
mod hub;
mod noop;
mod sqlite;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ilearn_config::{StorageBackend, StorageConfig, env::HF_TOKEN_ENV, resolve_secret};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{MemoryError, Result};

pub use directory::DirectorySnapshotBackend;
pub use hub::{HubConfig, HubSnapshotBackend};
pub use noop::NoopBackend;
pub use sqlite::SqliteBackend;

/// The two managed collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionName {
    Memories,
    Rules,
}

impl CollectionName {
    /// Table name in the row store.
    pub fn table(&self) -> &'static str {
        match self {
            CollectionName::Memories => "memories",
            CollectionName::Rules => "rules",
        }
    }

    /// Column that carries the serialized record.
    pub fn column(&self) -> &'static str {
        match self {
            CollectionName::Memories => "memory_json",
            CollectionName::Rules => "rule_text",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.table()
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a backend wants to receive mutations for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceStrategy {
    /// Per-record insert/delete.
    Incremental,
    /// Whole-collection replacement.
    Snapshot,
    /// Nothing is persisted.
    Disabled,
}

/// Durable mirror of the collections.
///
/// Records cross this boundary in their serialized form (memory JSON or
/// rule text). Implementations must be `Send + Sync`; the collection
/// serializes writes per collection.
#[async_trait]
pub trait PersistenceBackend: Send + Sync + fmt::Debug {
    /// Short name used in logs and stats.
    fn name(&self) -> &str;

    /// Write strategy for `collection`.
    fn strategy(&self, collection: CollectionName) -> PersistenceStrategy;

    /// Every stored record, oldest first.
    async fn load_all(&self, collection: CollectionName) -> Result<Vec<String>>;

    /// Store one record; an existing identical record is left alone.
    async fn insert_if_absent(&self, collection: CollectionName, record: &str) -> Result<()> {
        let _ = record;
        Err(self.unsupported("insert_if_absent", collection))
    }

    /// Delete every stored record equal to `record`.
    async fn delete_where(&self, collection: CollectionName, record: &str) -> Result<()> {
        let _ = record;
        Err(self.unsupported("delete_where", collection))
    }

    /// Replace the stored collection with `records`.
    async fn replace_all(&self, collection: CollectionName, records: &[String]) -> Result<()> {
        let _ = records;
        Err(self.unsupported("replace_all", collection))
    }

    /// Delete everything stored for `collection`.
    async fn delete_all(&self, collection: CollectionName) -> Result<()> {
        self.replace_all(collection, &[]).await
    }

    #[doc(hidden)]
    fn unsupported(&self, operation: &str, collection: CollectionName) -> MemoryError {
        MemoryError::BackendUnavailable(format!(
            "{} backend does not support {operation} for {collection}",
            self.name()
        ))
    }
}

/// A shared backend that can be used across tasks.
pub type SharedBackend = Arc<dyn PersistenceBackend>;

/// Build the backend selected by `[storage]`.
///
/// The hub token is resolved from `HF_TOKEN` first, then the config file.
pub fn open_backend(config: &StorageConfig) -> Result<SharedBackend> {
    let backend: SharedBackend = match config.backend {
        StorageBackend::Ram => Arc::new(NoopBackend),
        StorageBackend::Sqlite => Arc::new(SqliteBackend::open(&config.sqlite.path)?),
        StorageBackend::HfDataset => {
            let token = resolve_secret(HF_TOKEN_ENV, config.hub.token.as_deref());
            if let Some(ref secret) = token {
                info!(source = %secret.source, "Resolved dataset hub token");
            }
            let hub = HubConfig {
                endpoint: config.hub.endpoint.clone(),
                token: token.map(|s| s.value),
                memory_repo: config.hub.memory_repo.clone(),
                rules_repo: config.hub.rules_repo.clone(),
                private: config.hub.private,
                timeout: std::time::Duration::from_secs(config.hub.timeout_secs),
            };
            Arc::new(HubSnapshotBackend::new(hub)?)
        }
        StorageBackend::Directory => Arc::new(DirectorySnapshotBackend::new(
            &config.directory.path,
            config.directory.memory_repo.clone(),
            config.directory.rules_repo.clone(),
        )),
    };
    info!(backend = backend.name(), "Persistence backend ready");
    Ok(backend)
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot file format
// ─────────────────────────────────────────────────────────────────────────────

/// Path of the snapshot file inside a dataset repository.
pub(crate) const SNAPSHOT_FILE: &str = "data/train.jsonl";

/// Encode records as JSON lines, one `{"<column>": "<record>"}` object each.
pub(crate) fn encode_snapshot(collection: CollectionName, records: &[String]) -> Result<String> {
    let mut out = String::new();
    for record in records {
        let mut row = Map::new();
        row.insert(
            collection.column().to_string(),
            Value::String(record.clone()),
        );
        out.push_str(&serde_json::to_string(&row)?);
        out.push('\n');
    }
    Ok(out)
}

/// Decode a JSON-lines snapshot. Lines without the expected string column
/// are skipped with a warning.
pub(crate) fn decode_snapshot(collection: CollectionName, contents: &str) -> Vec<String> {
    let column = collection.column();
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| {
            let value: Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(e) => {
                    warn!(%collection, line = n + 1, error = %e, "Skipping unreadable snapshot line");
                    return None;
                }
            };
            match value.get(column).and_then(Value::as_str) {
                Some(s) => Some(s.to_string()),
                None => {
                    warn!(%collection, line = n + 1, column, "Snapshot line lacks column");
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_names() {
        assert_eq!(CollectionName::Memories.table(), "memories");
        assert_eq!(CollectionName::Memories.column(), "memory_json");
        assert_eq!(CollectionName::Rules.table(), "rules");
        assert_eq!(CollectionName::Rules.column(), "rule_text");
    }

    #[test]
    fn test_snapshot_lines() {
        let records = vec!["[CORE_RULE|1] a".to_string(), "b \"quoted\"".to_string()];
        let text = encode_snapshot(CollectionName::Rules, &records).unwrap();
        assert_eq!(
            text,
            "{\"rule_text\":\"[CORE_RULE|1] a\"}\n{\"rule_text\":\"b \\\"quoted\\\"\"}\n"
        );
        assert_eq!(decode_snapshot(CollectionName::Rules, &text), records);
    }

    #[test]
    fn test_decode_snapshot_skips_bad_lines() {
        let text = "{\"rule_text\":\"keep\"}\nnot json\n\n{\"memory_json\":\"wrong column\"}\n{\"rule_text\":5}\n";
        assert_eq!(decode_snapshot(CollectionName::Rules, text), vec!["keep"]);
    }

    #[test]
    fn test_empty_snapshot() {
        assert_eq!(encode_snapshot(CollectionName::Memories, &[]).unwrap(), "");
        assert!(decode_snapshot(CollectionName::Memories, "").is_empty());
    }

    #[tokio::test]
    async fn test_open_ram_backend() {
        let backend = open_backend(&StorageConfig::default()).unwrap();
        assert_eq!(backend.name(), "ram");
        assert_eq!(
            backend.strategy(CollectionName::Rules),
            PersistenceStrategy::Disabled
        );
    }
}
