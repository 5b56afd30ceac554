//! Configuration system for the ilearn memory store.
//!
//! Provides TOML-based configuration with:
//! - Storage backend selection (`ram`, `sqlite`, `hf_dataset`, `directory`)
//! - Embedding provider selection
//! - Config file layering (user config + project-local overrides)
//! - Environment overrides compatible with env-only deployments
//! - Secret resolution (env var → config file)

pub mod discovery;
pub mod env;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, load_explicit,
    save_config, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, resolve_secret};
pub use types::*;
