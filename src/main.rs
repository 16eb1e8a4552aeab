//! # Case Recall CLI (`recall`)
//!
//! Operational interface for the retrieval engine: schema setup, searches,
//! conversation context, embedding backfill, and coverage stats.
//!
//! ```bash
//! recall --config ./config/recall.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `recall init` | Create the SQLite database and run schema migrations |
//! | `recall search "<query>"` | Unified similarity search over messages and documents |
//! | `recall context <ticket>` | Most recent messages of a ticket |
//! | `recall backfill` | Embed messages missing embeddings |
//! | `recall stats` | Embedding coverage summary |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use case_recall::config;
use case_recall::db;
use case_recall::embedding::Embedder;
use case_recall::migrate;
use case_recall::models::{ResultKind, UnifiedResult};
use case_recall::search::{merge_results, SimilaritySearch};
use case_recall::{backfill, stats};

/// Case Recall CLI — similarity search over embedded case content.
#[derive(Parser)]
#[command(
    name = "recall",
    about = "Case Recall — semantic retrieval over case messages and documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent.
    Init,

    /// Search embedded content by similarity.
    Search {
        /// The search query string.
        query: String,

        /// Restrict the search to one content family: `messages`,
        /// `documents`, or `all`.
        #[arg(long, default_value = "all")]
        kind: String,

        /// Scope the search to a single ticket.
        #[arg(long)]
        ticket: Option<String>,

        /// Include private (internal) messages in the results.
        #[arg(long)]
        include_private: bool,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show the most recent messages of a ticket, newest first.
    Context {
        /// Ticket id.
        ticket: String,

        /// Maximum number of messages to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Embed messages that are missing embeddings for the configured model.
    Backfill {
        /// Maximum number of messages to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Show counts without performing any embedding.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print embedding coverage statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Search {
            query,
            kind,
            ticket,
            include_private,
            limit,
        } => {
            run_search(&cfg, &query, &kind, ticket.as_deref(), include_private, limit).await?;
        }
        Commands::Context { ticket, limit } => {
            run_context(&cfg, &ticket, limit).await?;
        }
        Commands::Backfill { limit, dry_run } => {
            backfill::run_backfill(&cfg, limit, dry_run).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_search(
    cfg: &config::Config,
    query: &str,
    kind: &str,
    ticket: Option<&str>,
    include_private: bool,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let exclude_private = !include_private;
    let embedder = Embedder::from_config(&cfg.embedding)?;
    let pool = db::connect(cfg).await?;
    let engine = SimilaritySearch::new(pool.clone(), embedder, cfg.search.clone());

    let results: Vec<UnifiedResult> = match kind {
        "messages" => {
            let limit = limit.unwrap_or(cfg.search.message_limit);
            let hits = engine
                .find_similar_messages(query, limit, ticket, exclude_private)
                .await;
            merge_results(hits, Vec::new(), limit)
        }
        "documents" => {
            let limit = limit.unwrap_or(cfg.search.document_limit);
            let hits = engine.find_similar_documents(query, limit, ticket).await;
            merge_results(Vec::new(), hits, limit)
        }
        "all" => {
            let limit = limit.unwrap_or(cfg.search.unified_limit);
            engine
                .find_similar_content(query, limit, ticket, exclude_private)
                .await
        }
        other => anyhow::bail!("Unknown search kind: {}. Use messages, documents, or all.", other),
    };

    if results.is_empty() {
        println!("No results.");
        pool.close().await;
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let tag = match result.kind {
            ResultKind::Message => "message",
            ResultKind::Document => "document",
        };
        println!(
            "{}. [{:.3}] {} / ticket {}",
            i + 1,
            result.similarity,
            tag,
            result.ticket_id
        );
        println!("    excerpt: \"{}\"", excerpt(&result.content, 160));
        println!("    id: {}", result.id);
        println!();
    }

    pool.close().await;
    Ok(())
}

async fn run_context(
    cfg: &config::Config,
    ticket: &str,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    let pool = db::connect(cfg).await?;
    let engine = SimilaritySearch::new(
        pool.clone(),
        Embedder::from_config(&cfg.embedding)?,
        cfg.search.clone(),
    );

    let limit = limit.unwrap_or(cfg.search.context_limit);
    let messages = engine.conversation_context(ticket, limit).await;

    if messages.is_empty() {
        println!("No messages.");
        pool.close().await;
        return Ok(());
    }

    for message in &messages {
        let author = message.author_name.as_deref().unwrap_or("(unknown)");
        let when = message
            .source_created_at
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "[{}] {} ({}){}",
            when,
            author,
            message.author_role,
            if message.is_private { " [private]" } else { "" }
        );
        println!("    {}", excerpt(&message.content, 200));
    }

    pool.close().await;
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let trimmed = flat.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}…", cut)
}
