//! Embedding coverage overview.
//!
//! Prints how much of the stored content actually has embeddings, and how
//! much was embedded recently. Used by `recall stats` to confirm the write
//! path and backfills are keeping up.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::store;

/// Run the stats command: query coverage counts and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = store::get_stats(&pool).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Case Recall — Embedding Stats");
    println!("=============================");
    println!();
    println!("  Database:          {}", config.db.path.display());
    println!("  Size:              {}", format_bytes(db_size));
    println!();
    println!(
        "  Messages:          {} / {} embedded ({}%)",
        stats.embedded_messages,
        stats.total_messages,
        percentage(stats.embedded_messages, stats.total_messages)
    );
    println!(
        "  Documents:         {} ({} embedded chunks)",
        stats.total_documents, stats.embedded_document_chunks
    );
    println!("  Embedded (7 days): {}", stats.embedded_last_7_days);
    println!();

    pool.close().await;
    Ok(())
}

fn percentage(part: i64, whole: i64) -> i64 {
    if whole > 0 {
        (part * 100) / whole
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
