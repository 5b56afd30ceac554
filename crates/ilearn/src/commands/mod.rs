//! CLI command handlers.

pub mod config;
pub mod maintenance;
pub mod memories;
pub mod rules;

use std::io::Write;

use anyhow::Result;
use console::Style;
use ilearn_config::{
    EmbeddingConfig, EmbeddingProvider, IlearnConfig, LoadedConfig, env::OPENAI_API_KEY_ENV,
    resolve_secret,
};
use ilearn_embed::{EmbedderSpec, SharedEmbedder};
use ilearn_memory::MemorySystem;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shared context for all commands.
#[derive(Debug)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Resolved configuration and where it came from.
    pub loaded: LoadedConfig,
    /// Fires on Ctrl-C.
    pub cancel: CancellationToken,
}

impl Context {
    pub fn config(&self) -> &IlearnConfig {
        &self.loaded.config
    }

    /// Build the memory system. Fails when the embedding provider cannot be
    /// loaded, since no command is useful without it.
    pub fn open_system(&self) -> Result<MemorySystem> {
        let embedder = self.build_embedder().map_err(|e| {
            anyhow::anyhow!("Embedding provider unavailable: {e}")
        })?;
        Ok(MemorySystem::from_config(self.config(), Some(embedder)))
    }

    /// Build the memory system, running degraded if the embedder is missing.
    pub fn open_system_degraded(&self) -> MemorySystem {
        let embedder = match self.build_embedder() {
            Ok(embedder) => Some(embedder),
            Err(e) => {
                warn!(error = %e, "Embedding provider unavailable");
                None
            }
        };
        MemorySystem::from_config(self.config(), embedder)
    }

    fn build_embedder(&self) -> ilearn_embed::Result<SharedEmbedder> {
        let spec = build_embedder_spec(&self.config().embedding());
        debug!(provider = %spec.provider, "Building embedder");
        ilearn_embed::build_embedder(&spec)
    }
}

/// Build an EmbedderSpec from EmbeddingConfig.
pub fn build_embedder_spec(config: &EmbeddingConfig) -> EmbedderSpec {
    let provider = match config.provider {
        EmbeddingProvider::Local => "local",
        EmbeddingProvider::OpenAi => "openai",
        EmbeddingProvider::Hashing => "hashing",
        EmbeddingProvider::Mock => "mock",
    };

    let openai_config = config.openai.as_ref();
    let local_config = config.local.as_ref();

    // OPENAI_API_KEY first, then the config file.
    let openai_api_key = resolve_secret(
        OPENAI_API_KEY_ENV,
        openai_config.and_then(|c| c.api_key.as_deref()),
    )
    .map(|secret| secret.value);

    EmbedderSpec {
        provider: provider.to_string(),
        openai_api_key,
        openai_model: openai_config.map(|c| c.model.clone()),
        openai_base_url: openai_config.and_then(|c| c.base_url.clone()),
        local_model_path: local_config.and_then(|c| c.model_path.clone()),
        local_tokenizer_path: local_config.and_then(|c| c.tokenizer_path.clone()),
        dimensions: Some(config.effective_dimensions()),
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_header(title: &str) {
    let dim = Style::new().dim();
    println!("{}", console::style(title).bold());
    println!("{}", dim.apply_to("─".repeat(50)));
}

/// Ask before a destructive operation unless `yes` was given.
pub fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    eprint!("{prompt} [y/N] ");
    std::io::stderr().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

pub fn truncate(s: &str, max_len: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_len {
        s
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ilearn_config::EmbeddingOpenAiConfig;

    #[test]
    fn test_spec_for_hashing() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Hashing,
            dimensions: Some(64),
            ..Default::default()
        };
        let spec = build_embedder_spec(&config);
        assert_eq!(spec.provider, "hashing");
        assert_eq!(spec.dimensions, Some(64));
        assert!(spec.openai_model.is_none());
    }

    #[test]
    fn test_spec_for_openai_carries_model() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::OpenAi,
            openai: Some(EmbeddingOpenAiConfig {
                model: "text-embedding-3-large".to_string(),
                dimensions: Some(256),
                ..Default::default()
            }),
            ..Default::default()
        };
        let spec = build_embedder_spec(&config);
        assert_eq!(spec.provider, "openai");
        assert_eq!(spec.openai_model.as_deref(), Some("text-embedding-3-large"));
        assert_eq!(spec.dimensions, Some(256));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a\nb", 10), "a b");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate("ééééééééé", 5), "éé...");
    }
}
