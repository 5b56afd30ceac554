//! Collection manager: one record list, one vector index, one backend mirror.
//!
//! Records get a stable [`RecordId`] on entry; the index is keyed by that id,
//! never by list position, so re-sorting the list cannot desynchronize it.
//!
//! Locking: the whole state sits behind one `RwLock`. Every mutation holds
//! the write guard from embedding through the backend write, so writers on
//! a collection are serialized and readers never see a half-applied change.
//! `None` inside the lock means "not initialized".

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;

use ilearn_embed::SharedEmbedder;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{CollectionName, PersistenceStrategy, SharedBackend};
use crate::error::{MemoryError, Result};
use crate::index::{DEFAULT_COMPACTION_RATIO, FlatIndex};
use crate::types::{MemoryRecord, RecordId};

// ─────────────────────────────────────────────────────────────────────────────
// Collection kinds
// ─────────────────────────────────────────────────────────────────────────────

/// Per-domain policy for a [`Collection`].
pub trait CollectionKind: Send + Sync + 'static {
    /// Record type held by the collection.
    type Record: Clone + Send + Sync + fmt::Debug + 'static;

    /// Which backend table/repository the collection maps to.
    const NAME: CollectionName;

    /// Clean up a record before it enters the collection. `None` rejects it
    /// as empty.
    fn normalize(record: Self::Record) -> Option<Self::Record>;

    /// Identity for kinds whose records are unique and kept sorted.
    /// Kinds returning `None` keep insertion order and allow duplicates.
    fn identity(record: &Self::Record) -> Option<&str> {
        let _ = record;
        None
    }

    /// Stored form of a record.
    fn encode(record: &Self::Record) -> Result<String>;

    /// Parse the stored form.
    fn decode(serialized: &str) -> Result<Self::Record>;

    /// Text handed to the embedder.
    fn searchable_text(record: &Self::Record) -> String;
}

/// Interaction memories: insertion order, duplicates allowed.
#[derive(Debug)]
pub struct Memories;

impl CollectionKind for Memories {
    type Record = MemoryRecord;
    const NAME: CollectionName = CollectionName::Memories;

    fn normalize(record: MemoryRecord) -> Option<MemoryRecord> {
        Some(record)
    }

    fn encode(record: &MemoryRecord) -> Result<String> {
        record.to_json()
    }

    fn decode(serialized: &str) -> Result<MemoryRecord> {
        MemoryRecord::from_json(serialized)
    }

    fn searchable_text(record: &MemoryRecord) -> String {
        record.searchable_text()
    }
}

/// Behavioral rules: unique by exact trimmed text, kept sorted.
#[derive(Debug)]
pub struct Rules;

impl CollectionKind for Rules {
    type Record = String;
    const NAME: CollectionName = CollectionName::Rules;

    fn normalize(record: String) -> Option<String> {
        let trimmed = record.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == record.len() {
            Some(record)
        } else {
            Some(trimmed.to_string())
        }
    }

    fn identity(record: &String) -> Option<&str> {
        Some(record.as_str())
    }

    fn encode(record: &String) -> Result<String> {
        Ok(record.clone())
    }

    fn decode(serialized: &str) -> Result<String> {
        Ok(serialized.to_string())
    }

    fn searchable_text(record: &String) -> String {
        record.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes and reports
// ─────────────────────────────────────────────────────────────────────────────

/// What happened to a record passed to [`Collection::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOutcome {
    /// Stored and indexed.
    Added,
    /// An identical record already exists.
    Duplicate,
    /// Empty after normalization.
    Empty,
    /// The collection is not initialized (degraded mode).
    Rejected,
}

/// Snapshot of a collection's size.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub name: &'static str,
    pub initialized: bool,
    pub records: usize,
    pub indexed: usize,
    pub tombstones: usize,
}

/// Result of [`Collection::reindex`].
#[derive(Debug, Clone, Serialize)]
pub struct ReindexReport {
    pub collection: &'static str,
    pub records: usize,
    pub dimensions: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

struct CollectionState<R> {
    records: HashMap<RecordId, R>,
    /// Ids in list order: insertion order, or sorted by identity.
    order: Vec<RecordId>,
    by_identity: HashMap<String, RecordId>,
    index: FlatIndex,
    next_id: RecordId,
    /// The backend snapshot could not be read, so the list is not the whole
    /// dataset and must not overwrite it.
    snapshot_suspended: bool,
}

impl<R: Clone> CollectionState<R> {
    fn new(index: FlatIndex) -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
            by_identity: HashMap::new(),
            index,
            next_id: 0,
            snapshot_suspended: false,
        }
    }

    fn ordered(&self) -> impl Iterator<Item = &R> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
        self.by_identity.clear();
        self.index.reset();
    }
}

enum Change<'a> {
    Inserted(&'a str),
    Removed(&'a str),
    Cleared,
}

// ─────────────────────────────────────────────────────────────────────────────
// Collection
// ─────────────────────────────────────────────────────────────────────────────

/// One managed collection of `K` records.
pub struct Collection<K: CollectionKind> {
    embedder: Option<SharedEmbedder>,
    backend: SharedBackend,
    compaction_ratio: f32,
    state: RwLock<Option<CollectionState<K::Record>>>,
    _kind: PhantomData<K>,
}

impl<K: CollectionKind> fmt::Debug for Collection<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &K::NAME)
            .field("backend", &self.backend.name())
            .field(
                "embedder",
                &self.embedder.as_ref().map(|e| e.name().to_string()),
            )
            .finish_non_exhaustive()
    }
}

impl<K: CollectionKind> Collection<K> {
    /// Create an uninitialized collection. Without an embedder,
    /// [`initialize`](Self::initialize) fails with `ProviderUnavailable`.
    pub fn new(embedder: Option<SharedEmbedder>, backend: SharedBackend) -> Self {
        Self {
            embedder,
            backend,
            compaction_ratio: DEFAULT_COMPACTION_RATIO,
            state: RwLock::new(None),
            _kind: PhantomData,
        }
    }

    /// Set the index compaction threshold.
    pub fn with_compaction_ratio(mut self, ratio: f32) -> Self {
        self.compaction_ratio = ratio;
        self
    }

    pub fn name(&self) -> CollectionName {
        K::NAME
    }

    fn embedder(&self) -> Result<&SharedEmbedder> {
        self.embedder.as_ref().ok_or_else(|| {
            MemoryError::ProviderUnavailable("no embedding provider configured".to_string())
        })
    }

    fn new_index(&self, dimensions: usize) -> FlatIndex {
        FlatIndex::with_compaction_ratio(dimensions, self.compaction_ratio)
    }

    /// Load persisted records, embed them in one batch, and build the index.
    ///
    /// A second call on an initialized collection is a no-op. Backend read
    /// failures are logged and the collection starts empty, with snapshot
    /// writes suspended until a later reload; rows that fail to decode are
    /// skipped. Embedding failures leave the collection
    /// uninitialized.
    pub async fn initialize(&self, cancel: &CancellationToken) -> Result<()> {
        let mut guard = self.state.write().await;
        if guard.is_some() {
            return Ok(());
        }
        let embedder = self.embedder()?;

        let loaded = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MemoryError::Cancelled),
            rows = self.backend.load_all(K::NAME) => rows,
        };
        let (rows, load_failed) = match loaded {
            Ok(rows) => (rows, false),
            Err(e) => {
                error!(collection = %K::NAME, backend = self.backend.name(), error = %e, "Failed to load persisted records; starting empty");
                (Vec::new(), true)
            }
        };

        let total_rows = rows.len();
        let mut seen = HashSet::new();
        let mut staged = Vec::with_capacity(rows.len());
        for row in rows {
            let record = match K::decode(&row) {
                Ok(record) => record,
                Err(e) => {
                    warn!(collection = %K::NAME, error = %e, "Skipping undecodable persisted record");
                    continue;
                }
            };
            let Some(record) = K::normalize(record) else {
                continue;
            };
            if K::identity(&record).is_none_or(|key| seen.insert(key.to_string())) {
                staged.push(record);
            }
        }

        let texts: Vec<String> = staged.iter().map(K::searchable_text).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MemoryError::Cancelled),
                vectors = embedder.embed_batch(&refs) => vectors?,
            }
        };
        if vectors.len() != staged.len() {
            return Err(MemoryError::InvalidData(format!(
                "embedder returned {} vectors for {} records",
                vectors.len(),
                staged.len()
            )));
        }

        let mut state = CollectionState::new(self.new_index(embedder.dimensions()));
        if load_failed && self.backend.strategy(K::NAME) == PersistenceStrategy::Snapshot {
            warn!(collection = %K::NAME, backend = self.backend.name(), "Snapshot writes suspended until the collection is reloaded");
            state.snapshot_suspended = true;
        }
        for (record, vector) in staged.into_iter().zip(vectors) {
            if let Err(e) = Self::insert(&mut state, record, &vector) {
                warn!(collection = %K::NAME, error = %e, "Skipping record with unusable embedding");
            }
        }

        info!(
            collection = %K::NAME,
            backend = self.backend.name(),
            loaded = total_rows,
            records = state.order.len(),
            "Collection initialized"
        );
        *guard = Some(state);
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has completed.
    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Drop in-memory state, returning to the uninitialized state.
    pub async fn close(&self) {
        *self.state.write().await = None;
        debug!(collection = %K::NAME, "Collection closed");
    }

    fn insert(
        state: &mut CollectionState<K::Record>,
        record: K::Record,
        vector: &[f32],
    ) -> Result<RecordId> {
        let id = state.next_id;
        state.index.add(id, vector)?;
        state.next_id += 1;

        let position = match K::identity(&record) {
            Some(key) => {
                state.by_identity.insert(key.to_string(), id);
                state.order.partition_point(|other| {
                    state
                        .records
                        .get(other)
                        .and_then(|r| K::identity(r))
                        .is_some_and(|other_key| other_key < key)
                })
            }
            None => state.order.len(),
        };
        state.order.insert(position, id);
        state.records.insert(id, record);
        Ok(id)
    }

    /// Add a record.
    ///
    /// Returns `Rejected` when uninitialized, `Empty`/`Duplicate` per the
    /// kind's policy. Embedding errors abort the add with no state change;
    /// backend write failures are logged and the in-memory add is kept.
    pub async fn add(&self, record: K::Record) -> Result<AddOutcome> {
        let mut guard = self.state.write().await;
        let Some(state) = guard.as_mut() else {
            debug!(collection = %K::NAME, "Add rejected: collection not initialized");
            return Ok(AddOutcome::Rejected);
        };
        let Some(record) = K::normalize(record) else {
            return Ok(AddOutcome::Empty);
        };
        if let Some(key) = K::identity(&record)
            && state.by_identity.contains_key(key)
        {
            debug!(collection = %K::NAME, "Duplicate record ignored");
            return Ok(AddOutcome::Duplicate);
        }

        let serialized = K::encode(&record)?;
        let vector = self.embedder()?.embed(&K::searchable_text(&record)).await?;
        let id = Self::insert(state, record, &vector)?;
        debug!(collection = %K::NAME, id, "Record added");

        self.persist(Some(&*state), Change::Inserted(&serialized)).await;
        Ok(AddOutcome::Added)
    }

    /// Remove the record with this identity. Returns `false` if absent or
    /// uninitialized. Kinds without identity never match.
    pub async fn remove(&self, identity: &str) -> Result<bool> {
        let mut guard = self.state.write().await;
        let Some(state) = guard.as_mut() else {
            return Ok(false);
        };
        let Some(id) = state.by_identity.remove(identity.trim()) else {
            return Ok(false);
        };
        let Some(record) = state.records.remove(&id) else {
            return Ok(false);
        };
        state.order.retain(|other| *other != id);
        state.index.remove(id);
        debug!(collection = %K::NAME, id, "Record removed");

        let serialized = K::encode(&record)?;
        self.persist(Some(&*state), Change::Removed(&serialized)).await;
        Ok(true)
    }

    /// Up to `k` records nearest to `query`, nearest first, with squared L2
    /// distances.
    pub async fn retrieve_scored(&self, query: &str, k: usize) -> Result<Vec<(K::Record, f32)>> {
        let guard = self.state.read().await;
        let Some(state) = guard.as_ref() else {
            return Ok(Vec::new());
        };
        if k == 0 || state.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder()?.embed(query).await?;
        let hits = state.index.search(&query_vector, k)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                state
                    .records
                    .get(&hit.id)
                    .map(|record| (record.clone(), hit.distance))
            })
            .collect())
    }

    /// Up to `k` records nearest to `query`, nearest first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<K::Record>> {
        Ok(self
            .retrieve_scored(query, k)
            .await?
            .into_iter()
            .map(|(record, _)| record)
            .collect())
    }

    /// Every record in list order.
    pub async fn get_all(&self) -> Vec<K::Record> {
        let guard = self.state.read().await;
        guard
            .as_ref()
            .map(|state| state.ordered().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of records in the list.
    pub async fn len(&self) -> usize {
        self.state
            .read()
            .await
            .as_ref()
            .map_or(0, |state| state.order.len())
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of live vectors in the index.
    pub async fn index_count(&self) -> usize {
        self.state
            .read()
            .await
            .as_ref()
            .map_or(0, |state| state.index.count())
    }

    pub async fn stats(&self) -> CollectionStats {
        let guard = self.state.read().await;
        match guard.as_ref() {
            Some(state) => CollectionStats {
                name: K::NAME.as_str(),
                initialized: true,
                records: state.order.len(),
                indexed: state.index.count(),
                tombstones: state.index.tombstones(),
            },
            None => CollectionStats {
                name: K::NAME.as_str(),
                initialized: false,
                records: 0,
                indexed: 0,
                tombstones: 0,
            },
        }
    }

    /// Empty the list and index and clear the backend.
    ///
    /// The backend is cleared even when the collection is uninitialized.
    pub async fn clear(&self) {
        let mut guard = self.state.write().await;
        if let Some(state) = guard.as_mut() {
            state.clear();
            state.snapshot_suspended = false;
        }
        self.persist(guard.as_ref(), Change::Cleared).await;
        info!(collection = %K::NAME, "Collection cleared");
    }

    /// Re-embed every record and rebuild the index from scratch.
    ///
    /// The old index stays in place until the new one is complete, so a
    /// cancelled or failed rebuild changes nothing.
    pub async fn reindex(&self, cancel: &CancellationToken) -> Result<ReindexReport> {
        let mut guard = self.state.write().await;
        let state = guard
            .as_mut()
            .ok_or_else(|| MemoryError::NotInitialized(K::NAME.to_string()))?;
        let embedder = self.embedder()?;

        let mut ids: Vec<RecordId> = state.records.keys().copied().collect();
        ids.sort_unstable();
        let texts: Vec<String> = ids
            .iter()
            .filter_map(|id| state.records.get(id))
            .map(K::searchable_text)
            .collect();

        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MemoryError::Cancelled),
                vectors = embedder.embed_batch(&refs) => vectors?,
            }
        };

        if vectors.len() != ids.len() {
            return Err(MemoryError::InvalidData(format!(
                "embedder returned {} vectors for {} records",
                vectors.len(),
                ids.len()
            )));
        }

        let mut index = self.new_index(embedder.dimensions());
        for (id, vector) in ids.iter().zip(&vectors) {
            index.add(*id, vector)?;
        }
        state.index = index;

        info!(collection = %K::NAME, records = ids.len(), "Index rebuilt");
        Ok(ReindexReport {
            collection: K::NAME.as_str(),
            records: ids.len(),
            dimensions: embedder.dimensions(),
        })
    }

    /// Mirror a committed change to the backend. Failures are logged only.
    async fn persist(&self, state: Option<&CollectionState<K::Record>>, change: Change<'_>) {
        let strategy = self.backend.strategy(K::NAME);
        let result = match (strategy, change) {
            (PersistenceStrategy::Disabled, _) => return,
            (_, Change::Cleared) => self.backend.delete_all(K::NAME).await,
            (PersistenceStrategy::Incremental, Change::Inserted(record)) => {
                self.backend.insert_if_absent(K::NAME, record).await
            }
            (PersistenceStrategy::Incremental, Change::Removed(record)) => {
                self.backend.delete_where(K::NAME, record).await
            }
            (PersistenceStrategy::Snapshot, _) if state.is_some_and(|s| s.snapshot_suspended) => {
                warn!(collection = %K::NAME, backend = self.backend.name(), "Snapshot write skipped; persisted data was never loaded");
                return;
            }
            (PersistenceStrategy::Snapshot, _) => {
                let encoded: Result<Vec<String>> = state
                    .map(|s| s.ordered().map(K::encode).collect())
                    .unwrap_or_else(|| Ok(Vec::new()));
                match encoded {
                    Ok(records) => self.backend.replace_all(K::NAME, &records).await,
                    Err(e) => Err(e),
                }
            }
        };

        match result {
            Ok(()) => {}
            Err(e @ MemoryError::BackendUnavailable(_)) => {
                warn!(collection = %K::NAME, backend = self.backend.name(), error = %e, "Backend write skipped");
            }
            Err(e) => {
                error!(collection = %K::NAME, backend = self.backend.name(), error = %e, "Backend write failed; in-memory state kept");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
