//! Snapshot persistence on the local filesystem.
//!
//! Mirrors the dataset hub layout: `<root>/<repo>/data/train.jsonl`. Writes
//! go to a temporary sibling first and are renamed over the target, so a
//! reader never sees a half-written snapshot.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{
    CollectionName, PersistenceBackend, PersistenceStrategy, SNAPSHOT_FILE, decode_snapshot,
    encode_snapshot,
};
use crate::error::{MemoryError, Result};

#[derive(Debug, Clone)]
pub struct DirectorySnapshotBackend {
    root: PathBuf,
    memory_repo: Option<String>,
    rules_repo: Option<String>,
}

impl DirectorySnapshotBackend {
    pub fn new(
        root: impl AsRef<Path>,
        memory_repo: Option<String>,
        rules_repo: Option<String>,
    ) -> Self {
        let backend = Self {
            root: root.as_ref().to_path_buf(),
            memory_repo: memory_repo.filter(|r| !r.trim().is_empty()),
            rules_repo: rules_repo.filter(|r| !r.trim().is_empty()),
        };
        for collection in [CollectionName::Memories, CollectionName::Rules] {
            if backend.snapshot_path(collection).is_none() {
                warn!(%collection, "Snapshot persistence disabled: no repository name configured");
            }
        }
        backend
    }

    /// Snapshot file for `collection`, if persistence is enabled for it.
    pub fn snapshot_path(&self, collection: CollectionName) -> Option<PathBuf> {
        let repo = match collection {
            CollectionName::Memories => self.memory_repo.as_deref(),
            CollectionName::Rules => self.rules_repo.as_deref(),
        }?;
        Some(self.root.join(repo).join(SNAPSHOT_FILE))
    }
}

#[async_trait]
impl PersistenceBackend for DirectorySnapshotBackend {
    fn name(&self) -> &str {
        "directory"
    }

    fn strategy(&self, collection: CollectionName) -> PersistenceStrategy {
        if self.snapshot_path(collection).is_some() {
            PersistenceStrategy::Snapshot
        } else {
            PersistenceStrategy::Disabled
        }
    }

    async fn load_all(&self, collection: CollectionName) -> Result<Vec<String>> {
        let Some(path) = self.snapshot_path(collection) else {
            return Ok(Vec::new());
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(decode_snapshot(collection, &contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No snapshot stored yet");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_all(&self, collection: CollectionName, records: &[String]) -> Result<()> {
        let path = self.snapshot_path(collection).ok_or_else(|| {
            MemoryError::BackendUnavailable(format!(
                "no snapshot repository configured for {collection}"
            ))
        })?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = encode_snapshot(collection, records)?;
        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), records = records.len(), "Wrote snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backend(dir: &TempDir) -> DirectorySnapshotBackend {
        DirectorySnapshotBackend::new(
            dir.path(),
            Some("memories".to_string()),
            Some("rules".to_string()),
        )
    }

    #[tokio::test]
    async fn test_load_before_any_write_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(backend(&dir).load_all(CollectionName::Rules).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_all_then_load() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir);
        let rules = vec!["[CORE_RULE|1] a".to_string(), "[CORE_RULE|1] b".to_string()];
        store.replace_all(CollectionName::Rules, &rules).await.unwrap();

        let path = dir.path().join("rules").join("data").join("train.jsonl");
        assert!(path.is_file());
        assert!(!path.with_extension("jsonl.tmp").exists());

        let reopened = backend(&dir);
        assert_eq!(reopened.load_all(CollectionName::Rules).await.unwrap(), rules);
    }

    #[tokio::test]
    async fn test_delete_all_writes_empty_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir);
        store
            .replace_all(CollectionName::Memories, &["{}".to_string()])
            .await
            .unwrap();
        store.delete_all(CollectionName::Memories).await.unwrap();
        assert!(store.load_all(CollectionName::Memories).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_repo_disables_collection() {
        let dir = TempDir::new().unwrap();
        let store = DirectorySnapshotBackend::new(dir.path(), None, Some("rules".to_string()));
        assert_eq!(
            store.strategy(CollectionName::Memories),
            PersistenceStrategy::Disabled
        );
        assert!(matches!(
            store.replace_all(CollectionName::Memories, &[]).await,
            Err(MemoryError::BackendUnavailable(_))
        ));
    }
}
