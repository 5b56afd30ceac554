//! Config command - configuration inspection.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;
use ilearn_config::{
    IlearnConfig, StorageBackend,
    env::{HF_TOKEN_ENV, OPENAI_API_KEY_ENV},
    resolve_secret,
};
use serde_json::json;

use super::{Context, print_json};

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration and where it came from
    Show,

    /// Show the user configuration file path
    Path,

    /// Write a default user config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(ctx),
        ConfigCommand::Init { force } => cmd_init(force, ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;
    let config = &loaded.config;
    let storage = config.storage();
    let embedding = config.embedding();

    if ctx.json_output {
        return print_json(&json!({
            "sources": loaded.loaded_from(),
            "env_overrides": loaded.env_overrides,
            "warnings": loaded.warnings,
            "config": redacted(config),
        }));
    }

    println!("# ilearn Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }
    if !loaded.env_overrides.is_empty() {
        println!("Environment overrides: {}\n", loaded.env_overrides.join(", "));
    }

    println!("Storage:");
    println!("  backend      {}", storage.backend);
    match storage.backend {
        StorageBackend::Ram => {}
        StorageBackend::Sqlite => println!("  path         {}", storage.sqlite.path.display()),
        StorageBackend::HfDataset => {
            println!("  endpoint     {}", storage.hub.endpoint);
            println!("  memory repo  {}", storage.hub.memory_repo.as_deref().unwrap_or("(none)"));
            println!("  rules repo   {}", storage.hub.rules_repo.as_deref().unwrap_or("(none)"));
            println!(
                "  token        {}",
                key_status(HF_TOKEN_ENV, storage.hub.token.as_deref())
            );
        }
        StorageBackend::Directory => {
            println!("  path         {}", storage.directory.path.display());
            println!(
                "  memory repo  {}",
                storage.directory.memory_repo.as_deref().unwrap_or("(none)")
            );
            println!(
                "  rules repo   {}",
                storage.directory.rules_repo.as_deref().unwrap_or("(none)")
            );
        }
    }
    println!();

    println!("Embedding:");
    println!("  provider     {}", embedding.provider);
    println!("  dimensions   {}", embedding.effective_dimensions());
    if let Some(openai) = &embedding.openai {
        println!("  model        {}", openai.model);
        println!(
            "  api key      {}",
            key_status(OPENAI_API_KEY_ENV, openai.api_key.as_deref())
        );
    }
    println!();

    let recall = config.recall();
    println!("Recall:");
    println!("  memories     {}", recall.memory_limit);
    println!("  rules        {}", recall.rule_limit);
    println!();

    if !loaded.warnings.is_empty() {
        let yellow = Style::new().yellow();
        for warning in &loaded.warnings {
            println!("{} {}", yellow.apply_to("warning:"), warning);
        }
    }
    Ok(())
}

/// Copy of `config` with secrets masked.
fn redacted(config: &IlearnConfig) -> IlearnConfig {
    const MASK: &str = "********";
    let mut config = config.clone();
    if let Some(storage) = config.storage.as_mut()
        && storage.hub.token.is_some()
    {
        storage.hub.token = Some(MASK.to_string());
    }
    if let Some(openai) = config.embedding.as_mut().and_then(|e| e.openai.as_mut())
        && openai.api_key.is_some()
    {
        openai.api_key = Some(MASK.to_string());
    }
    config
}

fn key_status(env_var: &str, config_value: Option<&str>) -> String {
    match resolve_secret(env_var, config_value) {
        Some(secret) => format!("set ({})", secret.source),
        None => "not set".to_string(),
    }
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let path = ilearn_config::user_config_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    if ctx.json_output {
        print_json(&json!({ "path": path }))
    } else {
        println!("{}", path.display());
        Ok(())
    }
}

fn cmd_init(force: bool, ctx: &Context) -> Result<()> {
    let path = ilearn_config::user_config_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let config = IlearnConfig {
        storage: Some(Default::default()),
        embedding: Some(Default::default()),
        index: Some(Default::default()),
        recall: Some(Default::default()),
        logging: Some(Default::default()),
    };
    ilearn_config::save_config(&config, &path)?;

    if ctx.json_output {
        print_json(&json!({ "path": path }))
    } else {
        println!(
            "{} Wrote {}",
            Style::new().green().apply_to("✓"),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_masks_secrets() {
        let config = IlearnConfig::from_toml(
            r#"
[storage.hub]
token = "hf_secret"

[embedding.openai]
api_key = "sk-secret"
"#,
        )
        .unwrap();
        let text = serde_json::to_string(&redacted(&config)).unwrap();
        assert!(!text.contains("hf_secret"));
        assert!(!text.contains("sk-secret"));
        assert!(text.contains("********"));
    }
}
