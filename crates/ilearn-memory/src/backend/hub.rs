//! Snapshot persistence on Hugging Face dataset repositories.
//!
//! Each collection maps to one dataset repository holding a single
//! `data/train.jsonl` file. Every write commits the full collection as a
//! replacement of that file; startup downloads it back.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{
    CollectionName, PersistenceBackend, PersistenceStrategy, SNAPSHOT_FILE, decode_snapshot,
    encode_snapshot,
};
use crate::error::{MemoryError, Result};

/// Connection settings for the dataset hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Hub base URL, e.g. `https://huggingface.co`.
    pub endpoint: String,
    /// Write token.
    pub token: Option<String>,
    /// Repository (`owner/name`) for memories.
    pub memory_repo: Option<String>,
    /// Repository (`owner/name`) for rules.
    pub rules_repo: Option<String>,
    /// Create repositories as private.
    pub private: bool,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://huggingface.co".to_string(),
            token: None,
            memory_repo: None,
            rules_repo: None,
            private: true,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Snapshot backend over the hub HTTP API.
#[derive(Debug)]
pub struct HubSnapshotBackend {
    client: reqwest::Client,
    config: HubConfig,
    /// Repositories already confirmed to exist in this process.
    ensured: Mutex<HashSet<String>>,
}

impl HubSnapshotBackend {
    /// Create the backend. A missing token or repository disables the
    /// affected collection and logs one warning here.
    pub fn new(mut config: HubConfig) -> Result<Self> {
        config.endpoint = config.endpoint.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        let backend = Self {
            client,
            config,
            ensured: Mutex::new(HashSet::new()),
        };
        for collection in [CollectionName::Memories, CollectionName::Rules] {
            if let Err(reason) = backend.target(collection) {
                warn!(%collection, "Dataset persistence disabled: {reason}");
            }
        }
        Ok(backend)
    }

    fn repo_for(&self, collection: CollectionName) -> Option<&str> {
        let repo = match collection {
            CollectionName::Memories => self.config.memory_repo.as_deref(),
            CollectionName::Rules => self.config.rules_repo.as_deref(),
        };
        repo.filter(|r| !r.trim().is_empty())
    }

    /// Repository and token for `collection`, or why persistence is off.
    fn target(&self, collection: CollectionName) -> std::result::Result<(&str, &str), String> {
        let token = self
            .config
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "no HF_TOKEN configured".to_string())?;
        let repo = self
            .repo_for(collection)
            .ok_or_else(|| format!("no dataset repository configured for {collection}"))?;
        Ok((repo, token))
    }

    async fn ensure_repo(&self, repo: &str, token: &str) -> Result<()> {
        if self.ensured.lock().contains(repo) {
            return Ok(());
        }

        let (organization, name) = match repo.split_once('/') {
            Some((org, name)) => (Some(org), name),
            None => (None, repo),
        };
        let body = json!({
            "type": "dataset",
            "name": name,
            "organization": organization,
            "private": self.config.private,
        });

        let response = self
            .client
            .post(format!("{}/api/repos/create", self.config.endpoint))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(repo, "Created dataset repository");
        } else if status == StatusCode::CONFLICT {
            debug!(repo, "Dataset repository already exists");
        } else {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }

        self.ensured.lock().insert(repo.to_string());
        Ok(())
    }
}

fn status_error(status: StatusCode, body: &str) -> MemoryError {
    let message = format!("hub returned {status}: {}", body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            MemoryError::BackendUnavailable(message)
        }
        _ => MemoryError::TransientBackend(message),
    }
}

#[async_trait]
impl PersistenceBackend for HubSnapshotBackend {
    fn name(&self) -> &str {
        "hf_dataset"
    }

    fn strategy(&self, collection: CollectionName) -> PersistenceStrategy {
        if self.target(collection).is_ok() {
            PersistenceStrategy::Snapshot
        } else {
            PersistenceStrategy::Disabled
        }
    }

    async fn load_all(&self, collection: CollectionName) -> Result<Vec<String>> {
        let Ok((repo, token)) = self.target(collection) else {
            return Ok(Vec::new());
        };

        let url = format!(
            "{}/datasets/{repo}/resolve/main/{SNAPSHOT_FILE}",
            self.config.endpoint
        );
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(repo, "No snapshot stored yet");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }

        let contents = response.text().await?;
        let records = decode_snapshot(collection, &contents);
        info!(repo, records = records.len(), "Downloaded dataset snapshot");
        Ok(records)
    }

    async fn replace_all(&self, collection: CollectionName, records: &[String]) -> Result<()> {
        let (repo, token) = self.target(collection).map_err(MemoryError::BackendUnavailable)?;
        self.ensure_repo(repo, token).await?;

        let contents = encode_snapshot(collection, records)?;
        let header = json!({
            "key": "header",
            "value": {
                "summary": format!("Update {collection} ({} records)", records.len()),
                "description": "",
            }
        });
        let file = json!({
            "key": "file",
            "value": {
                "content": BASE64.encode(contents.as_bytes()),
                "path": SNAPSHOT_FILE,
                "encoding": "base64",
            }
        });
        let body = format!("{header}\n{file}\n");

        info!(repo, records = records.len(), "Pushing snapshot to dataset hub");
        let response = self
            .client
            .post(format!(
                "{}/api/datasets/{repo}/commit/main",
                self.config.endpoint
            ))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }
        Ok(())
    }
}
