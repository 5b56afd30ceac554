//! RAM-only mode: nothing survives the process.

use async_trait::async_trait;

use super::{CollectionName, PersistenceBackend, PersistenceStrategy};
use crate::error::Result;

/// Backend that persists nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

#[async_trait]
impl PersistenceBackend for NoopBackend {
    fn name(&self) -> &str {
        "ram"
    }

    fn strategy(&self, _collection: CollectionName) -> PersistenceStrategy {
        PersistenceStrategy::Disabled
    }

    async fn load_all(&self, _collection: CollectionName) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn insert_if_absent(&self, _collection: CollectionName, _record: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_where(&self, _collection: CollectionName, _record: &str) -> Result<()> {
        Ok(())
    }

    async fn replace_all(&self, _collection: CollectionName, _records: &[String]) -> Result<()> {
        Ok(())
    }
}
