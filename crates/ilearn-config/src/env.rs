//! Environment variable overrides.
//!
//! Applied after file discovery so that deployments configured purely through
//! the environment keep working:
//!
//! | variable                 | overrides                    |
//! |--------------------------|------------------------------|
//! | `STORAGE_BACKEND`        | `storage.backend`            |
//! | `SQLITE_DB_PATH`         | `storage.sqlite.path`        |
//! | `HF_MEMORY_DATASET_REPO` | `storage.hub.memory_repo`    |
//! | `HF_RULES_DATASET_REPO`  | `storage.hub.rules_repo`     |
//!
//! `HF_TOKEN` is not copied into the config; it is resolved as a secret at
//! the point of use (see [`crate::secrets`]).

use std::path::PathBuf;

use crate::{IlearnConfig, StorageBackend};

pub const STORAGE_BACKEND_ENV: &str = "STORAGE_BACKEND";
pub const SQLITE_DB_PATH_ENV: &str = "SQLITE_DB_PATH";
pub const HF_TOKEN_ENV: &str = "HF_TOKEN";
pub const HF_MEMORY_REPO_ENV: &str = "HF_MEMORY_DATASET_REPO";
pub const HF_RULES_REPO_ENV: &str = "HF_RULES_DATASET_REPO";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Outcome of applying environment overrides.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    /// Variables that were applied.
    pub applied: Vec<String>,
    /// Variables that were set but unusable.
    pub warnings: Vec<String>,
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut IlearnConfig) -> EnvOverrides {
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

/// Apply overrides from an arbitrary lookup.
///
/// An unrecognised `STORAGE_BACKEND` keeps the configured backend and is
/// reported as a warning.
pub fn apply_overrides_from<F>(config: &mut IlearnConfig, lookup: F) -> EnvOverrides
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
    let mut applied = Vec::new();
    let mut warnings = Vec::new();

    let mut storage = config.storage();
    if let Some(value) = get(STORAGE_BACKEND_ENV) {
        match value.parse::<StorageBackend>() {
            Ok(backend) => {
                storage.backend = backend;
                applied.push(STORAGE_BACKEND_ENV.to_string());
            }
            Err(e) => {
                tracing::warn!(var = STORAGE_BACKEND_ENV, error = %e, "Ignoring environment override");
                warnings.push(format!(
                    "{STORAGE_BACKEND_ENV} ignored: {e}; using '{}'",
                    storage.backend
                ));
            }
        }
    }
    if let Some(value) = get(SQLITE_DB_PATH_ENV) {
        storage.sqlite.path = PathBuf::from(value);
        applied.push(SQLITE_DB_PATH_ENV.to_string());
    }
    if let Some(value) = get(HF_MEMORY_REPO_ENV) {
        storage.hub.memory_repo = Some(value);
        applied.push(HF_MEMORY_REPO_ENV.to_string());
    }
    if let Some(value) = get(HF_RULES_REPO_ENV) {
        storage.hub.rules_repo = Some(value);
        applied.push(HF_RULES_REPO_ENV.to_string());
    }

    if !applied.is_empty() {
        tracing::debug!(vars = ?applied, "Applied environment overrides");
        config.storage = Some(storage);
    }
    EnvOverrides { applied, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_no_env_leaves_config_untouched() {
        let mut config = IlearnConfig::new();
        let overrides = apply_overrides_from(&mut config, lookup(&[]));
        assert!(overrides.applied.is_empty());
        assert!(overrides.warnings.is_empty());
        assert!(config.storage.is_none());
    }

    #[test]
    fn test_env_selects_sqlite_backend_and_path() {
        let mut config = IlearnConfig::new();
        let overrides = apply_overrides_from(
            &mut config,
            lookup(&[
                ("STORAGE_BACKEND", "SQLITE"),
                ("SQLITE_DB_PATH", "/tmp/mem.db"),
            ]),
        );

        assert_eq!(overrides.applied.len(), 2);
        let storage = config.storage();
        assert_eq!(storage.backend, StorageBackend::Sqlite);
        assert_eq!(storage.sqlite.path, PathBuf::from("/tmp/mem.db"));
    }

    #[test]
    fn test_env_overrides_hub_repos_but_keeps_file_values() {
        let mut config = IlearnConfig::from_toml(
            r#"
[storage]
backend = "hf_dataset"

[storage.hub]
memory_repo = "file/memories"
rules_repo = "file/rules"
"#,
        )
        .unwrap();
        apply_overrides_from(
            &mut config,
            lookup(&[("HF_RULES_DATASET_REPO", "env/rules")]),
        );

        let hub = config.storage().hub;
        assert_eq!(hub.memory_repo.as_deref(), Some("file/memories"));
        assert_eq!(hub.rules_repo.as_deref(), Some("env/rules"));
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = IlearnConfig::new();
        let overrides = apply_overrides_from(&mut config, lookup(&[("STORAGE_BACKEND", "  ")]));
        assert!(overrides.applied.is_empty());
    }

    #[test]
    fn test_invalid_backend_warns_and_keeps_configured_backend() {
        let mut config = IlearnConfig::from_toml(
            r#"
[storage]
backend = "sqlite"
"#,
        )
        .unwrap();
        let overrides = apply_overrides_from(
            &mut config,
            lookup(&[("STORAGE_BACKEND", "redis"), ("SQLITE_DB_PATH", "/tmp/m.db")]),
        );

        assert_eq!(overrides.applied, vec!["SQLITE_DB_PATH".to_string()]);
        assert_eq!(overrides.warnings.len(), 1);
        assert!(overrides.warnings[0].contains("redis"));
        let storage = config.storage();
        assert_eq!(storage.backend, StorageBackend::Sqlite);
        assert_eq!(storage.sqlite.path, PathBuf::from("/tmp/m.db"));
    }
}
