use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding::Embedder;
use crate::store;

/// Embed messages that have no embedding for the configured model.
///
/// The normal write path embeds each message as it is created; this command
/// catches up after provider outages or a model change. Failures are
/// per-message and non-fatal, matching the write path's contract.
pub async fn run_backfill(config: &Config, limit: Option<usize>, dry_run: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let embedder = Embedder::from_config(&config.embedding)?;
    let pool = db::connect(config).await?;

    let pending = find_pending_messages(&pool, embedder.model_id(), limit).await?;

    if dry_run {
        println!("backfill (dry-run)");
        println!("  messages needing embeddings: {}", pending.len());
        pool.close().await;
        return Ok(());
    }

    if pending.is_empty() {
        println!("backfill");
        println!("  all messages up to date");
        pool.close().await;
        return Ok(());
    }

    let total = pending.len();
    let mut embedded = 0u64;
    let mut skipped = 0u64;

    for item in &pending {
        match store::write_message_embedding(&pool, &embedder, &item.message_id, &item.body, 0)
            .await
        {
            Some(_) => embedded += 1,
            // Too-short or provider failure; already logged by the write path
            None => skipped += 1,
        }
    }

    println!("backfill");
    println!("  total pending: {}", total);
    println!("  embedded: {}", embedded);
    println!("  skipped: {}", skipped);

    pool.close().await;
    Ok(())
}

struct PendingMessage {
    message_id: String,
    body: String,
}

async fn find_pending_messages(
    pool: &SqlitePool,
    model: &str,
    limit: Option<usize>,
) -> Result<Vec<PendingMessage>> {
    let limit_val = limit.map_or(i64::MAX, |l| l as i64);

    let rows = sqlx::query(
        r#"
        SELECT m.id, m.body
        FROM messages m
        LEFT JOIN message_embeddings e ON e.message_id = m.id AND e.model = ?
        WHERE e.id IS NULL
        ORDER BY m.created_at DESC
        LIMIT ?
        "#,
    )
    .bind(model)
    .bind(limit_val)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| PendingMessage {
            message_id: row.get("id"),
            body: row.get("body"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use crate::store::fixtures::insert_message;
    use crate::store::insert_message_embedding;

    #[tokio::test]
    async fn pending_excludes_already_embedded() {
        let pool = db::connect_memory().await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();

        insert_message(&pool, "m1", "t1", "first message body", false, 1).await;
        insert_message(&pool, "m2", "t1", "second message body", false, 2).await;
        insert_message_embedding(&pool, "m1", 0, "model-a", &[1.0, 0.0], "snapshot")
            .await
            .unwrap();

        let pending = find_pending_messages(&pool, "model-a", None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].message_id, "m2");

        // A different model sees both as pending
        let pending_b = find_pending_messages(&pool, "model-b", None).await.unwrap();
        assert_eq!(pending_b.len(), 2);

        let capped = find_pending_messages(&pool, "model-b", Some(1)).await.unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn no_limit_passes_positive_bound_to_query() {
        let pool = db::connect_memory().await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();

        for i in 0..3i64 {
            insert_message(&pool, &format!("m{}", i), "t1", "pending message body", false, i).await;
        }

        // The unlimited case must bind an explicit i64::MAX, not rely on
        // SQLite's negative-LIMIT behavior after an integer wrap.
        let pending = find_pending_messages(&pool, "model-a", None).await.unwrap();
        assert_eq!(pending.len(), 3);
    }
}
