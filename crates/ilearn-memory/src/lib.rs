//! Semantic memory for a conversational agent.
//!
//! Two collections live side by side: **memories** (past interactions with
//! their takeaways) and **rules** (tagged behavioral rules learned over
//! time). Each keeps its records in memory next to an exact vector index and
//! mirrors every change to a persistence backend.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  MemorySystem                                                     │
//! │  - lazy one-time initialize, close                                │
//! │  - add / retrieve / remove / get_all / clear                      │
//! │  - bulk import, rule operations, reindex, stats                   │
//! └───────────────┬───────────────────────────────┬───────────────────┘
//!                 ▼                               ▼
//!     Collection<Memories>              Collection<Rules>
//!     records + FlatIndex               records + FlatIndex
//!                 │                               │
//!                 └──────────────┬────────────────┘
//!                                ▼
//!                      PersistenceBackend
//!              ram │ sqlite │ hf_dataset │ directory
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ilearn_config::IndexConfig;
//! use ilearn_embed::HashingEmbedder;
//! use ilearn_memory::{MemorySystem, NoopBackend};
//!
//! # async fn run() -> ilearn_memory::Result<()> {
//! let system = MemorySystem::new(
//!     Some(Arc::new(HashingEmbedder::new(384))),
//!     Arc::new(NoopBackend),
//!     &IndexConfig::default(),
//! );
//!
//! system.add_rule("[CORE_RULE|0.9] Always greet the user politely.").await?;
//! let rules = system.retrieve_rules("greet politely", Some(1)).await;
//! assert_eq!(rules.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod collection;
pub mod error;
pub mod import;
pub mod index;
pub mod learning;
pub mod store;
pub mod types;
pub mod validation;

pub use backend::{
    CollectionName, DirectorySnapshotBackend, HubConfig, HubSnapshotBackend, NoopBackend,
    PersistenceBackend, PersistenceStrategy, SharedBackend, SqliteBackend, open_backend,
};
pub use collection::{
    AddOutcome, Collection, CollectionKind, CollectionStats, Memories, ReindexReport, Rules,
};
pub use error::{MemoryError, Result};
pub use import::ImportReport;
pub use index::{FlatIndex, Neighbor};
pub use learning::{ApplyReport, RuleAction, RuleOperation, parse_rule_operations};
pub use store::{MemorySystem, StoreStats};
pub use types::{MemoryRecord, RecordId, RuleKind, RuleTag, has_rule_tag};
pub use validation::ValidationError;
