//! The memory system facade: one owned instance per application.
//!
//! Owns the memories and rules collections and their shared backend, runs
//! lazy one-time initialization, and exposes the domain operations. Reads
//! never fail; they log and return an empty result instead.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ilearn_config::{IlearnConfig, IndexConfig, RecallConfig};
use ilearn_embed::SharedEmbedder;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{NoopBackend, SharedBackend, open_backend};
use crate::collection::{
    AddOutcome, Collection, CollectionStats, Memories, ReindexReport, Rules,
};
use crate::error::{MemoryError, Result};
use crate::import::{ImportReport, memory_lines, parse_memory_line, parse_rules_file};
use crate::learning::{ApplyReport, RuleAction, RuleOperation};
use crate::types::MemoryRecord;
use crate::validation::validate_tagged_rule;

/// Where lazy initialization stands.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InitState {
    Pending,
    Ready,
    /// Initialization failed; lazy callers stop retrying until an explicit
    /// [`MemorySystem::initialize`].
    Failed(String),
}

/// Facade-level statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub backend: String,
    pub embedder: Option<String>,
    pub dimensions: Option<usize>,
    pub initialized: bool,
    pub init_error: Option<String>,
    pub memories: CollectionStats,
    pub rules: CollectionStats,
}

/// Dual-collection semantic store for memories and rules.
pub struct MemorySystem {
    embedder: Option<SharedEmbedder>,
    backend: SharedBackend,
    memories: Collection<Memories>,
    rules: Collection<Rules>,
    init: Mutex<InitState>,
    recall: RecallConfig,
}

impl fmt::Debug for MemorySystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySystem")
            .field("backend", &self.backend.name())
            .field(
                "embedder",
                &self.embedder.as_ref().map(|e| e.name().to_string()),
            )
            .field("recall", &self.recall)
            .finish_non_exhaustive()
    }
}

impl MemorySystem {
    /// Create an uninitialized system. Without an embedder every read is
    /// empty and every write is rejected.
    pub fn new(
        embedder: Option<SharedEmbedder>,
        backend: SharedBackend,
        index: &IndexConfig,
    ) -> Self {
        let memories = Collection::new(embedder.clone(), Arc::clone(&backend))
            .with_compaction_ratio(index.compaction_ratio);
        let rules = Collection::new(embedder.clone(), Arc::clone(&backend))
            .with_compaction_ratio(index.compaction_ratio);
        Self {
            embedder,
            backend,
            memories,
            rules,
            init: Mutex::new(InitState::Pending),
            recall: RecallConfig::default(),
        }
    }

    /// Build from configuration. A backend that fails to open is logged
    /// and replaced by in-memory storage.
    pub fn from_config(config: &IlearnConfig, embedder: Option<SharedEmbedder>) -> Self {
        let backend = match open_backend(&config.storage()) {
            Ok(backend) => backend,
            Err(e) => {
                error!(error = %e, "Failed to open persistence backend; falling back to in-memory storage");
                Arc::new(NoopBackend)
            }
        };
        Self::new(embedder, backend, &config.index()).with_recall(config.recall())
    }

    /// Override default retrieval limits.
    pub fn with_recall(mut self, recall: RecallConfig) -> Self {
        self.recall = recall;
        self
    }

    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    pub fn embedder(&self) -> Option<&SharedEmbedder> {
        self.embedder.as_ref()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Initialize both collections, retrying after an earlier failure.
    pub async fn initialize(&self) -> Result<()> {
        self.initialize_cancellable(&CancellationToken::new()).await
    }

    /// [`initialize`](Self::initialize) that stops early when `cancel` fires.
    /// A cancelled initialization can be started again.
    pub async fn initialize_cancellable(&self, cancel: &CancellationToken) -> Result<()> {
        let mut state = self.init.lock().await;
        if *state == InitState::Ready {
            return Ok(());
        }
        match self.run_initialize(cancel).await {
            Ok(()) => {
                *state = InitState::Ready;
                Ok(())
            }
            Err(MemoryError::Cancelled) => {
                *state = InitState::Pending;
                Err(MemoryError::Cancelled)
            }
            Err(e) => {
                *state = InitState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn run_initialize(&self, cancel: &CancellationToken) -> Result<()> {
        let result = match self.memories.initialize(cancel).await {
            Ok(()) => self.rules.initialize(cancel).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                let memories = self.memories.len().await;
                let rules = self.rules.len().await;
                info!(
                    backend = self.backend.name(),
                    memories,
                    rules,
                    "Memory system initialized"
                );
                Ok(())
            }
            Err(e) => {
                // Both collections or neither.
                self.memories.close().await;
                self.rules.close().await;
                match &e {
                    MemoryError::Cancelled => warn!("Memory system initialization cancelled"),
                    MemoryError::ProviderUnavailable(_) => {
                        warn!(error = %e, "Embedding provider unavailable; running without semantic memory")
                    }
                    _ => error!(error = %e, "Memory system initialization failed"),
                }
                Err(e)
            }
        }
    }

    /// Lazy initialization used by every operation. Returns whether the
    /// system is ready; an earlier failure is not retried here.
    async fn ensure_initialized(&self) -> bool {
        let mut state = self.init.lock().await;
        match &*state {
            InitState::Ready => true,
            InitState::Failed(reason) => {
                debug!(%reason, "Memory system unavailable");
                false
            }
            InitState::Pending => match self.run_initialize(&CancellationToken::new()).await {
                Ok(()) => {
                    *state = InitState::Ready;
                    true
                }
                Err(MemoryError::Cancelled) => false,
                Err(e) => {
                    *state = InitState::Failed(e.to_string());
                    false
                }
            },
        }
    }

    /// Whether initialization has completed.
    pub async fn is_initialized(&self) -> bool {
        *self.init.lock().await == InitState::Ready
    }

    /// Drop in-memory state. The next operation initializes again.
    pub async fn close(&self) {
        let mut state = self.init.lock().await;
        self.memories.close().await;
        self.rules.close().await;
        *state = InitState::Pending;
        info!("Memory system closed");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Memories
    // ─────────────────────────────────────────────────────────────────────

    /// Record one interaction, stamped with the current time.
    pub async fn add_memory(
        &self,
        user_input: &str,
        metrics: Map<String, Value>,
        bot_response: &str,
    ) -> Result<AddOutcome> {
        self.add_memory_record(MemoryRecord::new(user_input, metrics, bot_response))
            .await
    }

    /// Add a pre-built memory record.
    pub async fn add_memory_record(&self, record: MemoryRecord) -> Result<AddOutcome> {
        self.ensure_initialized().await;
        self.memories.add(record).await
    }

    /// Memories nearest to `query`; `k` defaults to the configured limit.
    pub async fn retrieve_memories(&self, query: &str, k: Option<usize>) -> Vec<MemoryRecord> {
        self.ensure_initialized().await;
        let k = k.unwrap_or(self.recall.memory_limit);
        self.memories
            .retrieve(query, k)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Memory retrieval failed");
                Vec::new()
            })
    }

    /// Every memory in insertion order.
    pub async fn get_all_memories(&self) -> Vec<MemoryRecord> {
        self.ensure_initialized().await;
        self.memories.get_all().await
    }

    /// Delete every memory, in memory and in the backend.
    pub async fn clear_memories(&self) {
        self.memories.clear().await;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Rules
    // ─────────────────────────────────────────────────────────────────────

    /// Add a rule. Identical text (after trimming) is stored once.
    pub async fn add_rule(&self, rule: &str) -> Result<AddOutcome> {
        self.ensure_initialized().await;
        self.rules.add(rule.to_string()).await
    }

    /// Rules nearest to `query`; `k` defaults to the configured limit.
    pub async fn retrieve_rules(&self, query: &str, k: Option<usize>) -> Vec<String> {
        self.ensure_initialized().await;
        let k = k.unwrap_or(self.recall.rule_limit);
        self.rules.retrieve(query, k).await.unwrap_or_else(|e| {
            warn!(error = %e, "Rule retrieval failed");
            Vec::new()
        })
    }

    /// Remove a rule by exact text. Returns whether it existed.
    pub async fn remove_rule(&self, rule: &str) -> bool {
        self.ensure_initialized().await;
        self.rules.remove(rule).await.unwrap_or_else(|e| {
            warn!(error = %e, "Rule removal failed");
            false
        })
    }

    /// Every rule, sorted.
    pub async fn get_all_rules(&self) -> Vec<String> {
        self.ensure_initialized().await;
        self.rules.get_all().await
    }

    /// Delete every rule, in memory and in the backend.
    pub async fn clear_rules(&self) {
        self.rules.clear().await;
    }

    /// Apply reflection output: `add` stores the insight, `update` first
    /// removes the replaced rule.
    pub async fn apply_rule_operations(&self, operations: &[RuleOperation]) -> ApplyReport {
        self.ensure_initialized().await;
        let mut report = ApplyReport::default();

        for op in operations {
            let insight = match validate_tagged_rule(&op.insight) {
                Ok(insight) => insight,
                Err(e) => {
                    warn!(action = %op.action, error = %e, "Skipping rule operation");
                    report.skipped += 1;
                    continue;
                }
            };

            if op.action == RuleAction::Update {
                match op.old_insight_to_replace.as_deref() {
                    Some(old) => {
                        if self.remove_rule(old).await {
                            report.removed += 1;
                        } else {
                            debug!(old, "Rule to replace not found; adding new rule");
                        }
                    }
                    None => debug!("Update without a rule to replace; adding new rule"),
                }
            }

            match self.rules.add(insight.to_string()).await {
                Ok(AddOutcome::Added) => match op.action {
                    RuleAction::Add => report.added += 1,
                    RuleAction::Update => report.updated += 1,
                },
                Ok(AddOutcome::Duplicate) => report.duplicates += 1,
                Ok(AddOutcome::Empty | AddOutcome::Rejected) => report.skipped += 1,
                Err(e) => {
                    warn!(action = %op.action, error = %e, "Failed to store rule");
                    report.skipped += 1;
                }
            }
        }

        info!(
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            duplicates = report.duplicates,
            skipped = report.skipped,
            "Applied rule operations"
        );
        report
    }

    // ─────────────────────────────────────────────────────────────────────
    // Bulk import
    // ─────────────────────────────────────────────────────────────────────

    /// Import rules from a `---`-separated text file.
    pub async fn load_rules_from_file(&self, path: impl AsRef<Path>) -> Result<ImportReport> {
        let path = path.as_ref();
        let Some(contents) = read_import_file(path).await? else {
            return Ok(ImportReport::default());
        };
        self.ensure_initialized().await;

        let mut report = ImportReport::default();
        for (n, parsed) in parse_rules_file(&contents).into_iter().enumerate() {
            let rule = match parsed {
                Ok(rule) => rule,
                Err(e) => {
                    warn!(path = %path.display(), chunk = n + 1, error = %e, "Skipping rule");
                    report.skipped += 1;
                    continue;
                }
            };
            match self.rules.add(rule).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    warn!(path = %path.display(), chunk = n + 1, error = %e, "Failed to add rule");
                    report.skipped += 1;
                }
            }
        }

        info!(path = %path.display(), added = report.added, duplicates = report.duplicates, skipped = report.skipped, "Imported rules");
        Ok(report)
    }

    /// Import memories from a JSON-lines file.
    pub async fn load_memories_from_file(&self, path: impl AsRef<Path>) -> Result<ImportReport> {
        let path = path.as_ref();
        let Some(contents) = read_import_file(path).await? else {
            return Ok(ImportReport::default());
        };
        self.ensure_initialized().await;

        let mut report = ImportReport::default();
        for (line_no, line) in memory_lines(&contents) {
            let record = match parse_memory_line(line) {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %path.display(), line = line_no, error = %e, "Skipping memory");
                    report.skipped += 1;
                    continue;
                }
            };
            match self.memories.add(record).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    warn!(path = %path.display(), line = line_no, error = %e, "Failed to add memory");
                    report.skipped += 1;
                }
            }
        }

        info!(path = %path.display(), added = report.added, skipped = report.skipped, "Imported memories");
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────

    /// Re-embed both collections and rebuild their indexes.
    pub async fn reindex(&self, cancel: &CancellationToken) -> Result<Vec<ReindexReport>> {
        if !self.ensure_initialized().await {
            let reason = match &*self.init.lock().await {
                InitState::Failed(reason) => reason.clone(),
                _ => "initialization did not complete".to_string(),
            };
            return Err(MemoryError::NotInitialized(reason));
        }
        let memories = self.memories.reindex(cancel).await?;
        let rules = self.rules.reindex(cancel).await?;
        Ok(vec![memories, rules])
    }

    /// Sizes and configuration, without triggering initialization.
    pub async fn stats(&self) -> StoreStats {
        let state = self.init.lock().await.clone();
        StoreStats {
            backend: self.backend.name().to_string(),
            embedder: self.embedder.as_ref().map(|e| e.name().to_string()),
            dimensions: self.embedder.as_ref().map(|e| e.dimensions()),
            initialized: state == InitState::Ready,
            init_error: match state {
                InitState::Failed(reason) => Some(reason),
                _ => None,
            },
            memories: self.memories.stats().await,
            rules: self.rules.stats().await,
        }
    }
}

/// Read an import file; a missing file is a warning and `None`.
async fn read_import_file(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Import file not found");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ilearn_config::{StorageBackend, StorageConfig};
    use ilearn_embed::{HashingEmbedder, MockEmbedder};
    use serde_json::json;
    use tempfile::TempDir;

    use crate::learning::parse_rule_operations;

    fn system() -> MemorySystem {
        MemorySystem::new(
            Some(Arc::new(MockEmbedder::new(32))),
            Arc::new(NoopBackend),
            &IndexConfig::default(),
        )
    }

    fn hashing_system() -> MemorySystem {
        MemorySystem::new(
            Some(Arc::new(HashingEmbedder::new(256))),
            Arc::new(NoopBackend),
            &IndexConfig::default(),
        )
    }

    fn takeaway(text: &str) -> Map<String, Value> {
        json!({ "takeaway": text }).as_object().cloned().unwrap()
    }

    async fn assert_consistent(system: &MemorySystem) {
        let stats = system.stats().await;
        assert_eq!(stats.memories.records, stats.memories.indexed);
        assert_eq!(stats.rules.records, stats.rules.indexed);
    }

    #[tokio::test]
    async fn test_lazy_initialization() {
        let system = system();
        assert!(!system.is_initialized().await);
        assert!(system.get_all_rules().await.is_empty());
        assert!(system.is_initialized().await);
    }

    #[tokio::test]
    async fn test_greet_rule_is_retrieved() {
        let system = hashing_system();
        let rule = "[CORE_RULE|0.9] Always greet the user politely.";
        system.add_rule(rule).await.unwrap();
        system
            .add_rule("[GENERAL_LEARNING|0.4] Dates are stored in UTC.")
            .await
            .unwrap();
        assert_eq!(
            system.retrieve_rules("greet politely", Some(1)).await,
            vec![rule.to_string()]
        );
    }

    #[tokio::test]
    async fn test_same_rule_twice_is_stored_once() {
        let system = system();
        system.add_rule("[CORE_RULE|0.5] X").await.unwrap();
        let second = system.add_rule("[CORE_RULE|0.5] X").await.unwrap();
        assert_eq!(second, AddOutcome::Duplicate);
        assert_eq!(system.get_all_rules().await.len(), 1);
        assert_consistent(&system).await;
    }

    #[tokio::test]
    async fn test_memories_have_no_removal() {
        let system = system();
        system
            .add_memory("hi", takeaway("greeting"), "hello!")
            .await
            .unwrap();
        assert!(!system.remove_rule("hi").await);
        let all = system.get_all_memories().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].takeaway().as_deref(), Some("greeting"));
    }

    #[tokio::test]
    async fn test_remove_rule_keeps_index_in_step() {
        let system = system();
        system.add_rule("A").await.unwrap();
        system.add_rule("B").await.unwrap();
        assert!(system.remove_rule("A").await);
        assert_eq!(system.get_all_rules().await, vec!["B"]);
        assert_eq!(system.stats().await.rules.indexed, 1);
    }

    #[tokio::test]
    async fn test_retrieve_on_empty_collection() {
        let system = system();
        system.initialize().await.unwrap();
        assert!(system.retrieve_memories("anything", Some(5)).await.is_empty());
    }

    #[tokio::test]
    async fn test_default_limits_come_from_recall_config() {
        let system = system().with_recall(RecallConfig {
            memory_limit: 2,
            rule_limit: 1,
        });
        for i in 0..4 {
            system
                .add_memory(&format!("q{i}"), takeaway("t"), "a")
                .await
                .unwrap();
            system.add_rule(&format!("rule {i}")).await.unwrap();
        }
        assert_eq!(system.retrieve_memories("q", None).await.len(), 2);
        assert_eq!(system.retrieve_rules("rule", None).await.len(), 1);
        assert_eq!(system.retrieve_rules("rule", Some(10)).await.len(), 4);
    }

    #[tokio::test]
    async fn test_clear_is_total() {
        let system = system();
        system.add_memory("a", takeaway("t"), "b").await.unwrap();
        system.add_rule("r").await.unwrap();
        system.clear_memories().await;
        system.clear_rules().await;
        assert!(system.get_all_memories().await.is_empty());
        assert!(system.get_all_rules().await.is_empty());
        assert!(system.retrieve_memories("a", Some(3)).await.is_empty());
        assert!(system.retrieve_rules("r", Some(3)).await.is_empty());
        assert_consistent(&system).await;
    }

    #[tokio::test]
    async fn test_rules_stay_sorted_after_mixed_mutations() {
        let system = system();
        for rule in ["m", "c", "x", "a", "c", "q"] {
            system.add_rule(rule).await.unwrap();
        }
        system.remove_rule("x").await;
        system.add_rule("b").await.unwrap();
        assert_eq!(system.get_all_rules().await, vec!["a", "b", "c", "m", "q"]);
        assert_consistent(&system).await;
    }

    #[tokio::test]
    async fn test_degraded_without_embedder() {
        let system = MemorySystem::new(None, Arc::new(NoopBackend), &IndexConfig::default());
        assert_eq!(
            system.add_rule("[CORE_RULE|1] x").await.unwrap(),
            AddOutcome::Rejected
        );
        assert!(system.retrieve_rules("x", None).await.is_empty());
        assert!(system.get_all_memories().await.is_empty());

        let stats = system.stats().await;
        assert!(!stats.initialized);
        assert!(stats.init_error.is_some());

        assert!(matches!(
            system.initialize().await,
            Err(MemoryError::ProviderUnavailable(_))
        ));
        assert!(matches!(
            system.reindex(&CancellationToken::new()).await,
            Err(MemoryError::NotInitialized(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_initialize_can_be_retried() {
        let system = system();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            system.initialize_cancellable(&cancel).await,
            Err(MemoryError::Cancelled)
        ));
        assert!(!system.is_initialized().await);
        system.initialize().await.unwrap();
        assert!(system.is_initialized().await);
    }

    #[tokio::test]
    async fn test_close_then_reuse() {
        let system = system();
        system.add_rule("r").await.unwrap();
        system.close().await;
        assert!(!system.is_initialized().await);
        // In-memory storage: state is gone after close.
        assert!(system.get_all_rules().await.is_empty());
        assert!(system.is_initialized().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_initializes_once() {
        let system = Arc::new(system());
        let mut handles = Vec::new();
        for i in 0..16 {
            let system = Arc::clone(&system);
            handles.push(tokio::spawn(async move {
                system.add_rule(&format!("rule {i:02}")).await.unwrap()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), AddOutcome::Added);
        }
        assert_eq!(system.get_all_rules().await.len(), 16);
        assert_consistent(&system).await;
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_operation_futures_are_send() {
        let system = system();
        let cancel = CancellationToken::new();
        assert_send(&system.initialize());
        assert_send(&system.initialize_cancellable(&cancel));
        assert_send(&system.add_rule("rule"));
        assert_send(&system.retrieve_memories("q", None));
        assert_send(&system.apply_rule_operations(&[]));
        assert_send(&system.load_rules_from_file("rules.txt"));
        assert_send(&system.reindex(&cancel));
        assert_send(&system.stats());
    }

    #[tokio::test]
    async fn test_load_rules_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rules.txt");
        std::fs::write(
            &path,
            "[CORE_RULE|0.9] Be kind.\n\n---\n\nno tag\n\n---\n\n[core_rule|0.9] Be brief.\n\n---\n\n[CORE_RULE|0.9] Be kind.\n",
        )
        .unwrap();

        let system = system();
        let report = system.load_rules_from_file(&path).await.unwrap();
        assert_eq!(
            report,
            ImportReport {
                added: 2,
                duplicates: 1,
                skipped: 1
            }
        );
        assert_eq!(
            system.get_all_rules().await,
            vec!["[CORE_RULE|0.9] Be kind.", "[core_rule|0.9] Be brief."]
        );
    }

    #[tokio::test]
    async fn test_load_memories_from_file_skips_bad_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memories.jsonl");
        let lines = [
            r#"{"user_input":"hi","bot_response":"hello","metrics":{"takeaway":"greet"}}"#,
            "",
            "{broken",
            r#"{"user_input":"no response","metrics":{}}"#,
            r#"{"user_input":"bye","bot_response":"see you","metrics":{"takeaway":"farewell"}}"#,
        ];
        std::fs::write(&path, lines.join("\n")).unwrap();

        let system = system();
        let report = system.load_memories_from_file(&path).await.unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(report.skipped, 2);

        let all = system.get_all_memories().await;
        assert_eq!(all[0].user_input, "hi");
        assert_eq!(all[1].user_input, "bye");
    }

    #[tokio::test]
    async fn test_missing_import_file_is_empty_report() {
        let system = system();
        let report = system
            .load_rules_from_file("/nonexistent/rules.txt")
            .await
            .unwrap();
        assert_eq!(report, ImportReport::default());
    }

    #[tokio::test]
    async fn test_apply_rule_operations() {
        let system = system();
        system.add_rule("[CORE_RULE|0.6] Greet users.").await.unwrap();

        let ops = parse_rule_operations(
            r#"<operations_list>
<operation><action>update</action>
  <insight>[CORE_RULE|0.8] Greet users by name.</insight>
  <old_insight_to_replace>[CORE_RULE|0.6] Greet users.</old_insight_to_replace></operation>
<operation><action>add</action><insight>[GENERAL_LEARNING|0.3] Users like lists.</insight></operation>
<operation><action>add</action><insight>[CORE_RULE|0.8] Greet users by name.</insight></operation>
</operations_list>"#,
        );
        let report = system.apply_rule_operations(&ops).await;
        assert_eq!(
            report,
            ApplyReport {
                added: 1,
                updated: 1,
                removed: 1,
                duplicates: 1,
                skipped: 0
            }
        );
        assert_eq!(
            system.get_all_rules().await,
            vec![
                "[CORE_RULE|0.8] Greet users by name.",
                "[GENERAL_LEARNING|0.3] Users like lists."
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_skips_untagged_insight() {
        let system = system();
        let report = system
            .apply_rule_operations(&[RuleOperation {
                action: RuleAction::Add,
                insight: "no tag".to_string(),
                old_insight_to_replace: None,
            }])
            .await;
        assert_eq!(report.skipped, 1);
        assert!(system.get_all_rules().await.is_empty());
    }

    #[tokio::test]
    async fn test_reindex_reports_both_collections() {
        let system = system();
        system.add_memory("q", takeaway("t"), "a").await.unwrap();
        system.add_rule("r1").await.unwrap();
        system.add_rule("r2").await.unwrap();
        let reports = system.reindex(&CancellationToken::new()).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].collection, "memories");
        assert_eq!(reports[0].records, 1);
        assert_eq!(reports[1].records, 2);
    }

    #[tokio::test]
    async fn test_sqlite_config_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let mut config = IlearnConfig::default();
        let mut storage = StorageConfig {
            backend: StorageBackend::Sqlite,
            ..Default::default()
        };
        storage.sqlite.path = dir.path().join("ai_memory.db");
        config.storage = Some(storage);

        let embedder: SharedEmbedder = Arc::new(MockEmbedder::new(16));
        {
            let system = MemorySystem::from_config(&config, Some(Arc::clone(&embedder)));
            assert_eq!(system.backend().name(), "sqlite");
            system.add_rule("[CORE_RULE|1] persisted").await.unwrap();
            system.add_memory("u", takeaway("t"), "b").await.unwrap();
        }

        let system = MemorySystem::from_config(&config, Some(embedder));
        assert_eq!(system.get_all_rules().await, vec!["[CORE_RULE|1] persisted"]);
        assert_eq!(system.get_all_memories().await.len(), 1);
        assert_eq!(
            system
                .retrieve_rules("[CORE_RULE|1] persisted", Some(1))
                .await,
            vec!["[CORE_RULE|1] persisted".to_string()]
        );
    }

    #[tokio::test]
    async fn test_stats_without_initializing() {
        let system = system();
        let stats = system.stats().await;
        assert_eq!(stats.backend, "ram");
        assert_eq!(stats.embedder.as_deref(), Some("mock"));
        assert_eq!(stats.dimensions, Some(32));
        assert!(!stats.initialized);
        assert!(!system.is_initialized().await);
    }
}
