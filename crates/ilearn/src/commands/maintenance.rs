//! Reindex and stats commands.

use anyhow::Result;
use console::{Style, style};
use ilearn_memory::CollectionStats;
use tracing::warn;

use super::{Context, print_header, print_json};

/// Re-embed both collections with the configured provider.
pub async fn reindex(ctx: &Context) -> Result<()> {
    let system = ctx.open_system()?;
    system.initialize_cancellable(&ctx.cancel).await?;
    let reports = system.reindex(&ctx.cancel).await?;

    if ctx.json_output {
        print_json(&reports)?;
    } else {
        print_header("Reindex Complete");
        for report in &reports {
            println!(
                "  {:<10} {} records, {} dims",
                report.collection,
                style(report.records).green(),
                report.dimensions
            );
        }
    }
    Ok(())
}

/// Show collection sizes, backend, and embedder.
pub async fn stats(ctx: &Context) -> Result<()> {
    let system = ctx.open_system_degraded();
    if let Err(e) = system.initialize_cancellable(&ctx.cancel).await {
        warn!(error = %e, "Running without semantic memory");
    }
    let stats = system.stats().await;

    if ctx.json_output {
        return print_json(&stats);
    }

    let dim = Style::new().dim();
    print_header("Memory Statistics");
    println!();
    print_collection(&stats.memories);
    print_collection(&stats.rules);
    println!();

    print_header("Configuration");
    println!();
    println!("  Backend:     {}", style(&stats.backend).cyan());
    match &stats.embedder {
        Some(name) => println!("  Embedder:    {}", style(name).cyan()),
        None => println!("  Embedder:    {}", dim.apply_to("(unavailable)")),
    }
    if let Some(dims) = stats.dimensions {
        println!("  Dimensions:  {}", style(dims).cyan());
    }
    match &stats.init_error {
        Some(reason) => println!(
            "  Status:      {}",
            Style::new().red().apply_to(format!("degraded: {reason}"))
        ),
        None => println!("  Status:      {}", Style::new().green().apply_to("ok")),
    }
    println!();
    Ok(())
}

fn print_collection(stats: &CollectionStats) {
    let dim = Style::new().dim();
    let tombstones = if stats.tombstones > 0 {
        format!(" ({} tombstones)", stats.tombstones)
    } else {
        String::new()
    };
    println!(
        "  {:<10} {} records, {} indexed{}",
        stats.name,
        style(stats.records).cyan(),
        stats.indexed,
        dim.apply_to(tombstones)
    );
}
