//! Similarity search over stored embeddings.
//!
//! All searches share one algorithm: embed the query, scan a recency-bounded
//! candidate window, score each candidate with cosine similarity, keep
//! everything above the relevance floor, rank, truncate. The unified search
//! fans out to the message and document scans concurrently and merges their
//! results under a single limit.
//!
//! The search surface never fails visibly: provider outages, store errors,
//! and corrupt rows all degrade to empty (or partial) results and are only
//! observable in the logs.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::embedding::{blob_to_vec, cosine_similarity, Embedder};
use crate::models::{DocumentSimilarityResult, SimilarityResult, UnifiedResult};
use crate::store;

/// The retrieval engine's caller-facing search service.
///
/// Holds the connection pool, the injected provider handle, and the search
/// tunables for its lifetime.
#[derive(Clone)]
pub struct SimilaritySearch {
    pool: SqlitePool,
    embedder: Embedder,
    config: SearchConfig,
}

impl SimilaritySearch {
    pub fn new(pool: SqlitePool, embedder: Embedder, config: SearchConfig) -> Self {
        Self {
            pool,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Find messages similar to `query`, ranked by cosine similarity.
    ///
    /// Returns at most `limit` results, each scoring strictly above the
    /// configured threshold. Empty when the query cannot be embedded or the
    /// scan fails.
    pub async fn find_similar_messages(
        &self,
        query: &str,
        limit: usize,
        ticket_id: Option<&str>,
        exclude_private: bool,
    ) -> Vec<SimilarityResult> {
        match self
            .similar_messages(query, limit, ticket_id, exclude_private)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "message similarity search failed");
                Vec::new()
            }
        }
    }

    async fn similar_messages(
        &self,
        query: &str,
        limit: usize,
        ticket_id: Option<&str>,
        exclude_private: bool,
    ) -> Result<Vec<SimilarityResult>> {
        let query_vec = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "query embedding unavailable");
                return Ok(Vec::new());
            }
        };

        let candidates = store::list_message_candidates(
            &self.pool,
            ticket_id,
            exclude_private,
            self.embedder.model_id(),
            self.config.message_window,
        )
        .await?;

        let mut results: Vec<SimilarityResult> = candidates
            .into_iter()
            .filter_map(|c| {
                let vector = blob_to_vec(&c.embedding);
                let similarity = cosine_similarity(&query_vec, &vector) as f64;
                if similarity <= self.config.similarity_threshold {
                    return None;
                }
                Some(SimilarityResult {
                    content_id: c.message_id,
                    ticket_id: c.ticket_id,
                    content: c.content,
                    author_role: c.author_role,
                    author_name: c.author_name,
                    is_private: c.is_private,
                    source_created_at: c.message_created_at,
                    similarity,
                })
            })
            .collect();

        // Similarity descending; content id breaks ties so ordering is
        // stable across calls.
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.content_id.cmp(&b.content_id))
        });
        results.truncate(limit);

        Ok(results)
    }

    /// Find document chunks similar to `query`. Same algorithm as the
    /// message search; documents have no privacy flag.
    pub async fn find_similar_documents(
        &self,
        query: &str,
        limit: usize,
        ticket_id: Option<&str>,
    ) -> Vec<DocumentSimilarityResult> {
        match self.similar_documents(query, limit, ticket_id).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "document similarity search failed");
                Vec::new()
            }
        }
    }

    async fn similar_documents(
        &self,
        query: &str,
        limit: usize,
        ticket_id: Option<&str>,
    ) -> Result<Vec<DocumentSimilarityResult>> {
        let query_vec = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "query embedding unavailable");
                return Ok(Vec::new());
            }
        };

        let candidates = store::list_document_candidates(
            &self.pool,
            ticket_id,
            self.embedder.model_id(),
            self.config.document_window,
        )
        .await?;

        let mut results: Vec<DocumentSimilarityResult> = candidates
            .into_iter()
            .filter_map(|c| {
                let vector = blob_to_vec(&c.embedding);
                let similarity = cosine_similarity(&query_vec, &vector) as f64;
                if similarity <= self.config.similarity_threshold {
                    return None;
                }
                Some(DocumentSimilarityResult {
                    content_id: c.document_id,
                    ticket_id: c.ticket_id,
                    content: c.content,
                    filename: c.filename,
                    document_kind: c.kind,
                    chunk_index: c.chunk_index,
                    similarity,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.content_id.cmp(&b.content_id))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        results.truncate(limit);

        Ok(results)
    }

    /// Search messages and documents concurrently and merge into one ranked
    /// list of at most `limit` entries.
    ///
    /// Each branch gets an over-fetch budget (`ceil(limit × multiplier)`,
    /// defaults 0.7 and 0.5) so the final truncation picks the globally best
    /// results instead of pre-allocating a fixed split per source.
    pub async fn find_similar_content(
        &self,
        query: &str,
        limit: usize,
        ticket_id: Option<&str>,
        exclude_private: bool,
    ) -> Vec<UnifiedResult> {
        let message_budget = branch_budget(limit, self.config.message_budget);
        let document_budget = branch_budget(limit, self.config.document_budget);

        let (messages, documents) = tokio::join!(
            self.find_similar_messages(query, message_budget, ticket_id, exclude_private),
            self.find_similar_documents(query, document_budget, ticket_id),
        );

        merge_results(messages, documents, limit)
    }

    /// Fetch the most recent messages of a ticket in the search result
    /// shape, newest first.
    ///
    /// Not similarity-based: `similarity` is the sentinel `1.0`, meaning
    /// "same thread", and is not comparable to a measured cosine score.
    pub async fn conversation_context(&self, ticket_id: &str, limit: usize) -> Vec<SimilarityResult> {
        let rows = match store::recent_messages(&self.pool, ticket_id, limit as i64).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, ticket_id, "conversation context fetch failed");
                return Vec::new();
            }
        };

        rows.into_iter()
            .map(|m| SimilarityResult {
                content_id: m.id,
                ticket_id: m.ticket_id,
                content: m.body,
                author_role: m.author_role,
                author_name: m.author_name,
                is_private: m.is_private,
                source_created_at: Some(m.created_at),
                similarity: 1.0,
            })
            .collect()
    }
}

/// Per-branch over-fetch budget for the unified search.
fn branch_budget(limit: usize, multiplier: f64) -> usize {
    (limit as f64 * multiplier).ceil() as usize
}

/// Merge message and document hits into one ranked list.
///
/// Both inputs are already threshold-filtered and ranked; this maps them
/// into the tagged unified shape, re-sorts globally, and truncates.
pub fn merge_results(
    messages: Vec<SimilarityResult>,
    documents: Vec<DocumentSimilarityResult>,
    limit: usize,
) -> Vec<UnifiedResult> {
    let mut merged: Vec<UnifiedResult> = messages
        .into_iter()
        .map(UnifiedResult::from_message)
        .chain(documents.into_iter().map(UnifiedResult::from_document))
        .collect();

    merged.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    merged.truncate(limit);

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::db;
    use crate::embedding::test_support::FixedProvider;
    use crate::migrate;
    use crate::models::ResultKind;
    use crate::store::fixtures::{insert_document, insert_message};
    use crate::store::{insert_document_embedding, insert_message_embedding};

    /// Unit vector whose cosine against the query direction `[1, 0]` is
    /// exactly `sim`.
    fn vec_at(sim: f32) -> Vec<f32> {
        vec![sim, (1.0 - sim * sim).max(0.0).sqrt()]
    }

    async fn engine_with_query_vec(query_vec: Vec<f32>) -> SimilaritySearch {
        let pool = db::connect_memory().await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        let embedder = Embedder::new(FixedProvider::new(query_vec), 10);
        SimilaritySearch::new(pool, embedder, SearchConfig::default())
    }

    fn pool_of(engine: &SimilaritySearch) -> &SqlitePool {
        &engine.pool
    }

    const QUERY: &str = "claim form missing a signature on page two";

    #[tokio::test]
    async fn message_search_thresholds_ranks_and_limits() {
        let engine = engine_with_query_vec(vec![1.0, 0.0]).await;
        let pool = pool_of(&engine);

        for (id, sim, ts) in [
            ("m-low", 0.6f32, 1),
            ("m-mid", 0.75, 2),
            ("m-high", 0.95, 3),
            ("m-upper", 0.9, 4),
        ] {
            insert_message(pool, id, "t1", "body", false, ts).await;
            insert_message_embedding(pool, id, 0, "stub-model", &vec_at(sim), "snapshot")
                .await
                .unwrap();
        }

        let results = engine.find_similar_messages(QUERY, 10, None, true).await;

        // 0.6 falls below the floor; the rest come back highest first
        let ids: Vec<&str> = results.iter().map(|r| r.content_id.as_str()).collect();
        assert_eq!(ids, ["m-high", "m-upper", "m-mid"]);
        assert!(results.iter().all(|r| r.similarity > 0.7));
        let mut prev = f64::INFINITY;
        for r in &results {
            assert!(r.similarity <= prev);
            prev = r.similarity;
        }

        // Limit truncation
        let top2 = engine.find_similar_messages(QUERY, 2, None, true).await;
        assert_eq!(top2.len(), 2);
        assert_eq!(top2[0].content_id, "m-high");

        let none = engine.find_similar_messages(QUERY, 0, None, true).await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn equal_scores_break_ties_by_content_id() {
        let engine = engine_with_query_vec(vec![1.0, 0.0]).await;
        let pool = pool_of(&engine);

        // Same vector, so identical similarity; insertion recency order is
        // b-before-a, but ranking must come back id-ascending.
        insert_message(pool, "m-b", "t1", "body", false, 2).await;
        insert_message(pool, "m-a", "t1", "body", false, 1).await;
        for id in ["m-b", "m-a"] {
            insert_message_embedding(pool, id, 0, "stub-model", &vec_at(0.9), "snapshot")
                .await
                .unwrap();
        }

        let results = engine.find_similar_messages(QUERY, 10, None, true).await;
        let ids: Vec<&str> = results.iter().map(|r| r.content_id.as_str()).collect();
        assert_eq!(ids, ["m-a", "m-b"]);
    }

    #[tokio::test]
    async fn unavailable_provider_degrades_to_empty() {
        let pool = db::connect_memory().await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        insert_message(&pool, "m1", "t1", "body", false, 1).await;
        insert_message_embedding(&pool, "m1", 0, "disabled", &vec_at(0.9), "snapshot")
            .await
            .unwrap();

        let engine =
            SimilaritySearch::new(pool, Embedder::disabled(), SearchConfig::default());
        assert!(engine.find_similar_messages(QUERY, 10, None, true).await.is_empty());
        assert!(engine.find_similar_documents(QUERY, 5, None).await.is_empty());
        assert!(engine.find_similar_content(QUERY, 10, None, true).await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_candidate_blob_is_skipped() {
        let engine = engine_with_query_vec(vec![1.0, 0.0]).await;
        let pool = pool_of(&engine);

        insert_message(pool, "m-good", "t1", "body", false, 1).await;
        insert_message_embedding(pool, "m-good", 0, "stub-model", &vec_at(0.9), "snapshot")
            .await
            .unwrap();

        // A truncated BLOB decodes to the wrong length and scores 0.
        insert_message(pool, "m-corrupt", "t1", "body", false, 2).await;
        sqlx::query(
            r#"
            INSERT INTO message_embeddings
                (id, message_id, chunk_index, model, dims, embedding, content, created_at)
            VALUES ('e-corrupt', 'm-corrupt', 0, 'stub-model', 2, X'0102', 'snapshot', 2)
            "#,
        )
        .execute(pool)
        .await
        .unwrap();

        let results = engine.find_similar_messages(QUERY, 10, None, true).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content_id, "m-good");
    }

    #[tokio::test]
    async fn document_search_scopes_by_ticket() {
        let engine = engine_with_query_vec(vec![1.0, 0.0]).await;
        let pool = pool_of(&engine);

        insert_document(pool, "d1", "t1", "claim.pdf").await;
        insert_document(pool, "d2", "t2", "invoice.pdf").await;
        insert_document_embedding(pool, "d1", 0, "stub-model", &vec_at(0.95), "chunk one")
            .await
            .unwrap();
        insert_document_embedding(pool, "d2", 0, "stub-model", &vec_at(0.9), "chunk two")
            .await
            .unwrap();

        let all = engine.find_similar_documents(QUERY, 5, None).await;
        assert_eq!(all.len(), 2);

        let scoped = engine.find_similar_documents(QUERY, 5, Some("t2")).await;
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].content_id, "d2");
        assert_eq!(scoped[0].filename, "invoice.pdf");
    }

    #[tokio::test]
    async fn unified_search_merges_both_sources() {
        let engine = engine_with_query_vec(vec![1.0, 0.0]).await;
        let pool = pool_of(&engine);

        for (id, sim) in [("m1", 0.95f32), ("m2", 0.85), ("m3", 0.75)] {
            insert_message(pool, id, "t1", "body", false, 1).await;
            insert_message_embedding(pool, id, 0, "stub-model", &vec_at(sim), "snapshot")
                .await
                .unwrap();
        }
        for (id, sim) in [("d1", 0.90f32), ("d2", 0.80)] {
            insert_document(pool, id, "t1", "file.pdf").await;
            insert_document_embedding(pool, id, 0, "stub-model", &vec_at(sim), "chunk")
                .await
                .unwrap();
        }

        let results = engine.find_similar_content(QUERY, 4, None, true).await;
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["m1", "d1", "m2", "d2"]);
        assert_eq!(results[0].kind, ResultKind::Message);
        assert_eq!(results[1].kind, ResultKind::Document);
        assert_eq!(results[1].metadata["filename"], "file.pdf");
    }

    #[tokio::test]
    async fn context_fetch_uses_sentinel_score() {
        let pool = db::connect_memory().await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        for i in 0..7i64 {
            insert_message(&pool, &format!("m{}", i), "t1", &format!("body {}", i), false, i).await;
        }
        insert_message(&pool, "other", "t2", "elsewhere", false, 100).await;

        // Works with no embedding provider at all
        let engine =
            SimilaritySearch::new(pool, Embedder::disabled(), SearchConfig::default());
        let context = engine.conversation_context("t1", 5).await;

        assert_eq!(context.len(), 5);
        assert!(context.iter().all(|r| r.similarity == 1.0));
        assert!(context.iter().all(|r| r.ticket_id == "t1"));
        let ids: Vec<&str> = context.iter().map(|r| r.content_id.as_str()).collect();
        assert_eq!(ids, ["m6", "m5", "m4", "m3", "m2"]);
    }

    #[test]
    fn merge_interleaves_and_truncates() {
        let msg = |id: &str, sim: f64| SimilarityResult {
            content_id: id.to_string(),
            ticket_id: "t1".to_string(),
            content: String::new(),
            author_role: "customer".to_string(),
            author_name: None,
            is_private: false,
            source_created_at: None,
            similarity: sim,
        };
        let doc = |id: &str, sim: f64| DocumentSimilarityResult {
            content_id: id.to_string(),
            ticket_id: "t1".to_string(),
            content: String::new(),
            filename: "f.pdf".to_string(),
            document_kind: "attachment".to_string(),
            chunk_index: 0,
            similarity: sim,
        };

        let merged = merge_results(
            vec![msg("m1", 0.95), msg("m2", 0.85), msg("m3", 0.75)],
            vec![doc("d1", 0.90), doc("d2", 0.80)],
            4,
        );

        let sims: Vec<f64> = merged.iter().map(|r| r.similarity).collect();
        assert_eq!(sims, [0.95, 0.90, 0.85, 0.80]);
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn branch_budgets_round_up() {
        assert_eq!(branch_budget(10, 0.7), 7);
        assert_eq!(branch_budget(10, 0.5), 5);
        assert_eq!(branch_budget(4, 0.7), 3);
        assert_eq!(branch_budget(4, 0.5), 2);
        assert_eq!(branch_budget(1, 0.5), 1);
        assert_eq!(branch_budget(0, 0.7), 0);
    }
}
