//! Rules command - behavioral rule operations.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use console::{Style, style};
use ilearn_memory::{AddOutcome, RuleTag, parse_rule_operations};
use serde_json::json;

use super::{Context, confirm, print_header, print_json};

/// Arguments for the rules command.
#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub command: RulesCommand,
}

#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// Add a rule, e.g. "[CORE_RULE|0.9] Always greet the user politely."
    Add {
        /// Rule text
        rule: String,
    },

    /// Semantic search through rules
    Search {
        /// Search query
        query: String,

        /// Maximum results to return (default from config)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List every rule, sorted
    List,

    /// Remove a rule by its exact text
    Remove {
        /// Rule text
        rule: String,
    },

    /// Delete every rule
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Import rules from a file of `---`-separated entries
    Import {
        /// Rules file
        file: PathBuf,
    },

    /// Apply an <operations_list> block of add/update operations
    Apply {
        /// File holding the model output ("-" for stdin)
        file: PathBuf,

        /// Show the parsed operations without applying them
        #[arg(long)]
        dry_run: bool,
    },
}

/// Run the rules command.
pub async fn run(args: RulesArgs, ctx: &Context) -> Result<()> {
    match args.command {
        RulesCommand::Add { rule } => cmd_add(&rule, ctx).await,
        RulesCommand::Search { query, limit } => cmd_search(&query, limit, ctx).await,
        RulesCommand::List => cmd_list(ctx).await,
        RulesCommand::Remove { rule } => cmd_remove(&rule, ctx).await,
        RulesCommand::Clear { yes } => cmd_clear(yes, ctx).await,
        RulesCommand::Import { file } => cmd_import(&file, ctx).await,
        RulesCommand::Apply { file, dry_run } => cmd_apply(&file, dry_run, ctx).await,
    }
}

async fn cmd_add(rule: &str, ctx: &Context) -> Result<()> {
    let system = ctx.open_system()?;
    system.initialize_cancellable(&ctx.cancel).await?;
    let outcome = system.add_rule(rule).await?;

    if ctx.json_output {
        print_json(&json!({ "outcome": outcome }))?;
        return Ok(());
    }
    match outcome {
        AddOutcome::Added => {
            println!("{} Rule stored", Style::new().green().apply_to("✓"));
            if RuleTag::parse(rule.trim()).is_none() {
                println!(
                    "{}",
                    Style::new()
                        .yellow()
                        .apply_to("  Note: rule has no [TYPE|SCORE] tag")
                );
            }
        }
        AddOutcome::Duplicate => println!("{}", Style::new().dim().apply_to("Rule already stored")),
        other => println!(
            "{}",
            Style::new()
                .yellow()
                .apply_to(format!("Rule not stored ({other:?})"))
        ),
    }
    Ok(())
}

async fn cmd_search(query: &str, limit: Option<usize>, ctx: &Context) -> Result<()> {
    let dim = Style::new().dim();
    let system = ctx.open_system()?;
    system.initialize_cancellable(&ctx.cancel).await?;

    let results = system.retrieve_rules(query, limit).await;
    if ctx.json_output {
        print_json(&results)?;
    } else if results.is_empty() {
        println!("{}", dim.apply_to("No results found"));
    } else {
        print_header("Rule Search Results");
        for (i, rule) in results.iter().enumerate() {
            println!("{}. {}", style(i + 1).cyan(), rule);
        }
    }
    Ok(())
}

async fn cmd_list(ctx: &Context) -> Result<()> {
    let dim = Style::new().dim();
    let system = ctx.open_system()?;
    system.initialize_cancellable(&ctx.cancel).await?;

    let all = system.get_all_rules().await;
    if ctx.json_output {
        print_json(&all)?;
    } else if all.is_empty() {
        println!("{}", dim.apply_to("No rules stored"));
    } else {
        print_header(&format!("Rules ({})", all.len()));
        for rule in &all {
            match RuleTag::parse(rule) {
                Some(tag) => println!("  {} {}", style(tag.kind).cyan(), rule),
                None => println!("  {} {}", dim.apply_to("-"), rule),
            }
        }
    }
    Ok(())
}

async fn cmd_remove(rule: &str, ctx: &Context) -> Result<()> {
    let system = ctx.open_system()?;
    system.initialize_cancellable(&ctx.cancel).await?;
    let removed = system.remove_rule(rule).await;

    if ctx.json_output {
        print_json(&json!({ "removed": removed }))?;
    } else if removed {
        println!("{} Rule removed", Style::new().green().apply_to("✓"));
    } else {
        println!("{}", Style::new().dim().apply_to("No such rule"));
    }
    Ok(())
}

async fn cmd_clear(yes: bool, ctx: &Context) -> Result<()> {
    if !confirm("Delete every rule?", yes)? {
        println!("{}", Style::new().dim().apply_to("Aborted."));
        return Ok(());
    }
    let system = ctx.open_system_degraded();
    system.clear_rules().await;

    if ctx.json_output {
        print_json(&json!({ "cleared": "rules" }))?;
    } else {
        println!("{} Rules cleared", Style::new().green().apply_to("✓"));
    }
    Ok(())
}

async fn cmd_import(file: &Path, ctx: &Context) -> Result<()> {
    let system = ctx.open_system()?;
    system.initialize_cancellable(&ctx.cancel).await?;
    let report = system.load_rules_from_file(file).await?;

    if ctx.json_output {
        print_json(&report)?;
    } else {
        print_header("Rule Import");
        println!("  Added:       {}", style(report.added).green());
        println!("  Duplicates:  {}", report.duplicates);
        if report.skipped > 0 {
            println!(
                "  Skipped:     {}",
                Style::new().yellow().apply_to(report.skipped)
            );
        }
    }
    Ok(())
}

fn read_input(file: &Path) -> Result<String> {
    if file.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
    }
}

async fn cmd_apply(file: &Path, dry_run: bool, ctx: &Context) -> Result<()> {
    let text = read_input(file)?;
    let operations = parse_rule_operations(&text);

    if dry_run {
        if ctx.json_output {
            print_json(&operations)?;
        } else {
            print_header(&format!("Parsed Operations ({})", operations.len()));
            for op in &operations {
                println!("  {} {}", style(op.action).cyan(), op.insight);
                if let Some(old) = &op.old_insight_to_replace {
                    println!("    {} {}", Style::new().dim().apply_to("replaces"), old);
                }
            }
        }
        return Ok(());
    }

    let system = ctx.open_system()?;
    system.initialize_cancellable(&ctx.cancel).await?;
    let report = system.apply_rule_operations(&operations).await;

    if ctx.json_output {
        print_json(&report)?;
    } else {
        print_header("Rule Operations Applied");
        println!("  Added:       {}", style(report.added).green());
        println!("  Updated:     {}", style(report.updated).green());
        println!("  Removed:     {}", report.removed);
        println!("  Duplicates:  {}", report.duplicates);
        if report.skipped > 0 {
            println!(
                "  Skipped:     {}",
                Style::new().yellow().apply_to(report.skipped)
            );
        }
    }
    Ok(())
}
