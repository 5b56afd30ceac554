//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [storage]                # which persistence backend mirrors the collections
//! [storage.sqlite]         # row-store settings
//! [storage.hub]            # hosted dataset snapshot settings
//! [storage.directory]      # local snapshot settings
//! [embedding]              # embedding provider
//! [index]                  # vector index tuning
//! [recall]                 # default result counts
//! [logging]                # log file output
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. a project-local
/// override that only changes the backend) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IlearnConfig {
    /// Persistence backend configuration.
    pub storage: Option<StorageConfig>,

    /// Embedding provider configuration.
    pub embedding: Option<EmbeddingConfig>,

    /// Vector index configuration.
    pub index: Option<IndexConfig>,

    /// Default retrieval sizes.
    pub recall: Option<RecallConfig>,

    /// Log output configuration.
    pub logging: Option<LoggingConfig>,
}

impl IlearnConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections replace wholesale; there is no field-level merging inside a
    /// section.
    pub fn merge(&mut self, other: IlearnConfig) {
        if other.storage.is_some() {
            self.storage = other.storage;
        }
        if other.embedding.is_some() {
            self.embedding = other.embedding;
        }
        if other.index.is_some() {
            self.index = other.index;
        }
        if other.recall.is_some() {
            self.recall = other.recall;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Storage section, falling back to defaults.
    pub fn storage(&self) -> StorageConfig {
        self.storage.clone().unwrap_or_default()
    }

    /// Embedding section, falling back to defaults.
    pub fn embedding(&self) -> EmbeddingConfig {
        self.embedding.clone().unwrap_or_default()
    }

    /// Index section, falling back to defaults.
    pub fn index(&self) -> IndexConfig {
        self.index.clone().unwrap_or_default()
    }

    /// Recall section, falling back to defaults.
    pub fn recall(&self) -> RecallConfig {
        self.recall.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Persistence backend configuration.
///
/// ```toml
/// [storage]
/// backend = "sqlite"       # "ram", "sqlite", "hf_dataset", or "directory"
///
/// [storage.sqlite]
/// path = "app_data/ai_memory.db"
///
/// [storage.hub]
/// memory_repo = "me/ilearn-memories"
/// rules_repo = "me/ilearn-rules"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which backend mirrors the collections.
    pub backend: StorageBackend,
    /// Row-store settings.
    pub sqlite: SqliteConfig,
    /// Hosted dataset snapshot settings.
    pub hub: HubConfig,
    /// Local directory snapshot settings.
    pub directory: DirectoryConfig,
}

/// Supported persistence backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// In-memory only; nothing survives the process.
    #[default]
    Ram,
    /// Transactional SQLite row store.
    Sqlite,
    /// Hugging Face dataset repositories, replaced wholesale on every write.
    HfDataset,
    /// Local directory snapshots, replaced wholesale on every write.
    Directory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RAM" | "MEMORY" | "NONE" => Ok(Self::Ram),
            "SQLITE" => Ok(Self::Sqlite),
            "HF_DATASET" | "HUB" => Ok(Self::HfDataset),
            "DIRECTORY" | "DIR" => Ok(Self::Directory),
            _ => Err(ConfigError::InvalidValue {
                key: "storage.backend".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ram => "ram",
            Self::Sqlite => "sqlite",
            Self::HfDataset => "hf_dataset",
            Self::Directory => "directory",
        };
        f.write_str(name)
    }
}

/// SQLite row-store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file. Parent directories are created on open.
    pub path: PathBuf,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("app_data/ai_memory.db"),
        }
    }
}

/// Hugging Face dataset snapshot settings.
///
/// A missing token or repository name disables persistence for the
/// affected collection without raising an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Hub base URL.
    pub endpoint: String,
    /// Access token (prefer the `HF_TOKEN` env var).
    pub token: Option<String>,
    /// Dataset repository for memories (`owner/name`).
    pub memory_repo: Option<String>,
    /// Dataset repository for rules (`owner/name`).
    pub rules_repo: Option<String>,
    /// Create repositories as private.
    pub private: bool,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://huggingface.co".to_string(),
            token: None,
            memory_repo: None,
            rules_repo: None,
            private: true,
            timeout_secs: 60,
        }
    }
}

impl HubConfig {
    /// Whether a plaintext token sits in the config file.
    pub fn has_plaintext_token(&self) -> bool {
        self.token.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// Local directory snapshot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Root directory; each repository is a subdirectory.
    pub path: PathBuf,
    /// Repository name for memories.
    pub memory_repo: Option<String>,
    /// Repository name for rules.
    pub rules_repo: Option<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("app_data/snapshots"),
            memory_repo: Some("memories".to_string()),
            rules_repo: Some("rules".to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Embedding provider configuration.
///
/// ```toml
/// [embedding]
/// provider = "local"        # "local", "openai", "hashing", or "mock"
/// dimensions = 384
///
/// [embedding.openai]
/// model = "text-embedding-3-small"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider name.
    pub provider: EmbeddingProvider,
    /// Output embedding dimensions. Default depends on provider.
    pub dimensions: Option<usize>,
    /// OpenAI-specific embedding settings.
    pub openai: Option<EmbeddingOpenAiConfig>,
    /// Local ONNX-specific settings.
    pub local: Option<EmbeddingLocalConfig>,
}

impl EmbeddingConfig {
    /// Effective dimensions for the configured provider.
    pub fn effective_dimensions(&self) -> usize {
        if let Some(d) = self.dimensions {
            return d;
        }
        match self.provider {
            EmbeddingProvider::OpenAi => self
                .openai
                .as_ref()
                .and_then(|c| c.dimensions)
                .unwrap_or(1536),
            EmbeddingProvider::Local | EmbeddingProvider::Hashing | EmbeddingProvider::Mock => {
                384
            }
        }
    }
}

/// Supported embedding providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local ONNX Runtime inference (default).
    #[default]
    Local,
    /// OpenAI embeddings API.
    OpenAi,
    /// Offline token hashing.
    Hashing,
    /// Mock embedder for testing.
    Mock,
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Local => "local",
            Self::OpenAi => "openai",
            Self::Hashing => "hashing",
            Self::Mock => "mock",
        };
        f.write_str(name)
    }
}

/// OpenAI embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingOpenAiConfig {
    /// Model name. Default: "text-embedding-3-small".
    pub model: String,
    /// Override dimensions (OpenAI supports reduced output).
    pub dimensions: Option<usize>,
    /// Custom base URL (for proxies).
    pub base_url: Option<String>,
    /// API key (prefer the `OPENAI_API_KEY` env var).
    pub api_key: Option<String>,
}

impl Default for EmbeddingOpenAiConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            base_url: None,
            api_key: None,
        }
    }
}

/// Local ONNX embedding settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingLocalConfig {
    /// Path to ONNX model file.
    pub model_path: Option<PathBuf>,
    /// Path to tokenizer.json file.
    pub tokenizer_path: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Index / Recall / Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Vector index tuning.
///
/// ```toml
/// [index]
/// compaction_ratio = 0.25
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Fraction of tombstoned slots that triggers compaction after a removal.
    pub compaction_ratio: f32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            compaction_ratio: 0.25,
        }
    }
}

/// Default number of results per retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// Memories returned when the caller does not specify `k`.
    pub memory_limit: usize,
    /// Rules returned when the caller does not specify `k`.
    pub rule_limit: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            memory_limit: 3,
            rule_limit: 5,
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write a daily-rotated JSON log file in addition to the console.
    pub file: bool,
    /// Directory for log files. Default: `<config dir>/logs`.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: true,
            dir: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
