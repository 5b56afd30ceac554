//! Memories command - interaction memory operations.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use console::{Style, style};
use ilearn_memory::{AddOutcome, MemoryRecord};
use serde_json::{Map, Value, json};

use super::{Context, confirm, print_header, print_json, truncate};

/// Arguments for the memories command.
#[derive(Args, Debug)]
pub struct MemoriesArgs {
    #[command(subcommand)]
    pub command: MemoriesCommand,
}

#[derive(Subcommand, Debug)]
pub enum MemoriesCommand {
    /// Record one interaction
    Add {
        /// What the user said
        #[arg(long)]
        user: String,

        /// What the agent answered
        #[arg(long)]
        response: String,

        /// Lesson learned from the interaction
        #[arg(short, long)]
        takeaway: Option<String>,

        /// Extra metric as KEY=VALUE (VALUE parsed as JSON when possible)
        #[arg(short, long = "metric", value_name = "KEY=VALUE")]
        metrics: Vec<String>,
    },

    /// Semantic search through memories
    Search {
        /// Search query
        query: String,

        /// Maximum results to return (default from config)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List every memory, oldest first
    List,

    /// Delete every memory
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Import memories from a JSON-lines file
    Import {
        /// File with one {"user_input", "bot_response", "metrics"} object per line
        file: PathBuf,
    },
}

/// Run the memories command.
pub async fn run(args: MemoriesArgs, ctx: &Context) -> Result<()> {
    match args.command {
        MemoriesCommand::Add {
            user,
            response,
            takeaway,
            metrics,
        } => cmd_add(&user, &response, takeaway, &metrics, ctx).await,
        MemoriesCommand::Search { query, limit } => cmd_search(&query, limit, ctx).await,
        MemoriesCommand::List => cmd_list(ctx).await,
        MemoriesCommand::Clear { yes } => cmd_clear(yes, ctx).await,
        MemoriesCommand::Import { file } => cmd_import(&file, ctx).await,
    }
}

fn parse_metrics(takeaway: Option<String>, pairs: &[String]) -> Result<Map<String, Value>> {
    let mut metrics = Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Invalid metric '{pair}': expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid metric '{pair}': empty key");
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        metrics.insert(key.to_string(), value);
    }
    if let Some(takeaway) = takeaway {
        metrics.insert("takeaway".to_string(), Value::String(takeaway));
    }
    Ok(metrics)
}

async fn cmd_add(
    user: &str,
    response: &str,
    takeaway: Option<String>,
    pairs: &[String],
    ctx: &Context,
) -> Result<()> {
    let metrics = parse_metrics(takeaway, pairs)?;
    let system = ctx.open_system()?;
    system.initialize_cancellable(&ctx.cancel).await?;
    let outcome = system.add_memory(user, metrics, response).await?;

    if ctx.json_output {
        print_json(&json!({ "outcome": outcome }))?;
    } else if outcome == AddOutcome::Added {
        println!("{} Memory stored", Style::new().green().apply_to("✓"));
    } else {
        println!("{}", Style::new().yellow().apply_to(format!("Memory not stored ({outcome:?})")));
    }
    Ok(())
}

async fn cmd_search(query: &str, limit: Option<usize>, ctx: &Context) -> Result<()> {
    let dim = Style::new().dim();
    let system = ctx.open_system()?;
    system.initialize_cancellable(&ctx.cancel).await?;

    if ctx.verbose {
        eprintln!(
            "{}",
            dim.apply_to(format!("Searching: \"{}\" (limit: {:?})", query, limit))
        );
    }

    let results = system.retrieve_memories(query, limit).await;
    if ctx.json_output {
        print_json(&results)?;
    } else if results.is_empty() {
        println!("{}", dim.apply_to("No results found"));
    } else {
        print_header("Memory Search Results");
        println!();
        for (i, record) in results.iter().enumerate() {
            print_memory(i + 1, record);
        }
    }
    Ok(())
}

async fn cmd_list(ctx: &Context) -> Result<()> {
    let dim = Style::new().dim();
    let system = ctx.open_system()?;
    system.initialize_cancellable(&ctx.cancel).await?;

    let all = system.get_all_memories().await;
    if ctx.json_output {
        print_json(&all)?;
    } else if all.is_empty() {
        println!("{}", dim.apply_to("No memories stored"));
    } else {
        print_header(&format!("Memories ({})", all.len()));
        println!();
        for (i, record) in all.iter().enumerate() {
            print_memory(i + 1, record);
        }
    }
    Ok(())
}

fn print_memory(n: usize, record: &MemoryRecord) {
    let dim = Style::new().dim();
    println!("{}. {}", style(n).cyan(), truncate(&record.user_input, 70));
    println!("   {} {}", dim.apply_to("AI:"), truncate(&record.bot_response, 66));
    println!(
        "   {} {}",
        dim.apply_to("Takeaway:"),
        record.takeaway().as_deref().unwrap_or("N/A")
    );
    println!("   {}", dim.apply_to(&record.timestamp));
    println!();
}

async fn cmd_clear(yes: bool, ctx: &Context) -> Result<()> {
    if !confirm("Delete every memory?", yes)? {
        println!("{}", Style::new().dim().apply_to("Aborted."));
        return Ok(());
    }
    let system = ctx.open_system_degraded();
    system.clear_memories().await;

    if ctx.json_output {
        print_json(&json!({ "cleared": "memories" }))?;
    } else {
        println!("{} Memories cleared", Style::new().green().apply_to("✓"));
    }
    Ok(())
}

async fn cmd_import(file: &std::path::Path, ctx: &Context) -> Result<()> {
    let system = ctx.open_system()?;
    system.initialize_cancellable(&ctx.cancel).await?;
    let report = system.load_memories_from_file(file).await?;

    if ctx.json_output {
        print_json(&report)?;
    } else {
        print_header("Memory Import");
        println!("  Added:      {}", style(report.added).green());
        if report.skipped > 0 {
            println!(
                "  Skipped:    {}",
                Style::new().yellow().apply_to(report.skipped)
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metrics() {
        let metrics = parse_metrics(
            Some("be brief".to_string()),
            &["score=0.8".to_string(), "note=plain text".to_string()],
        )
        .unwrap();
        assert_eq!(metrics["takeaway"], "be brief");
        assert_eq!(metrics["score"], 0.8);
        assert_eq!(metrics["note"], "plain text");
    }

    #[test]
    fn test_parse_metrics_rejects_missing_equals() {
        assert!(parse_metrics(None, &["oops".to_string()]).is_err());
        assert!(parse_metrics(None, &["=1".to_string()]).is_err());
    }
}
