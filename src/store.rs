//! Embedding persistence and candidate retrieval.
//!
//! Two content families share one layout: message embeddings and
//! document-chunk embeddings. Rows are written once and never updated;
//! deleting the owning message or document cascades to its embeddings.
//!
//! The candidate listings are the throughput control for the brute-force
//! scan: they join embeddings to source metadata, order by source recency,
//! and cap the result at a window. Content older than the window is never
//! scored.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use crate::embedding::{vec_to_blob, Embedder};
use crate::models::RetrievalStats;
use crate::normalize::normalize;

/// Joined row for the message scan: embedding plus source-message metadata.
#[derive(Debug, Clone)]
pub struct MessageCandidate {
    pub message_id: String,
    pub ticket_id: String,
    pub content: String,
    pub author_role: String,
    pub author_name: Option<String>,
    pub is_private: bool,
    pub message_created_at: Option<i64>,
    pub embedding: Vec<u8>,
}

/// Joined row for the document scan: embedding plus source-document metadata.
#[derive(Debug, Clone)]
pub struct DocumentCandidate {
    pub document_id: String,
    pub ticket_id: String,
    pub content: String,
    pub filename: String,
    pub kind: String,
    pub chunk_index: i64,
    pub embedding: Vec<u8>,
}

/// Embed a message body and persist the record.
///
/// Returns the new record id, or `None` when no embedding could be produced
/// or stored. Failures are logged and absorbed — a missing embedding must
/// never fail the message write it rides along with.
pub async fn write_message_embedding(
    pool: &SqlitePool,
    embedder: &Embedder,
    message_id: &str,
    content: &str,
    chunk_index: i64,
) -> Option<String> {
    let vector = match embedder.embed(content).await {
        Ok(v) => v,
        Err(e) => {
            warn!(message_id, error = %e, "skipping message embedding");
            return None;
        }
    };

    match insert_message_embedding(
        pool,
        message_id,
        chunk_index,
        embedder.model_id(),
        &vector,
        &normalize(content),
    )
    .await
    {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(message_id, error = %e, "failed to store message embedding");
            None
        }
    }
}

/// Embed one document chunk and persist the record. Same non-fatal contract
/// as [`write_message_embedding`].
pub async fn write_document_embedding(
    pool: &SqlitePool,
    embedder: &Embedder,
    document_id: &str,
    content: &str,
    chunk_index: i64,
) -> Option<String> {
    let vector = match embedder.embed(content).await {
        Ok(v) => v,
        Err(e) => {
            warn!(document_id, error = %e, "skipping document embedding");
            return None;
        }
    };

    match insert_document_embedding(
        pool,
        document_id,
        chunk_index,
        embedder.model_id(),
        &vector,
        &normalize(content),
    )
    .await
    {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(document_id, error = %e, "failed to store document embedding");
            None
        }
    }
}

pub async fn insert_message_embedding(
    pool: &SqlitePool,
    message_id: &str,
    chunk_index: i64,
    model: &str,
    vector: &[f32],
    content: &str,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO message_embeddings (id, message_id, chunk_index, model, dims, embedding, content, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(message_id)
    .bind(chunk_index)
    .bind(model)
    .bind(vector.len() as i64)
    .bind(vec_to_blob(vector))
    .bind(content)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn insert_document_embedding(
    pool: &SqlitePool,
    document_id: &str,
    chunk_index: i64,
    model: &str,
    vector: &[f32],
    content: &str,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO document_embeddings (id, document_id, chunk_index, model, dims, embedding, content, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(document_id)
    .bind(chunk_index)
    .bind(model)
    .bind(vector.len() as i64)
    .bind(vec_to_blob(vector))
    .bind(content)
    .bind(Utc::now().timestamp())
    .execute(pool)
    .await?;

    Ok(id)
}

/// List the most recent message embeddings for scoring, joined to their
/// source messages. Only rows produced by `model` are candidates, so
/// vectors from different model versions are never compared.
pub async fn list_message_candidates(
    pool: &SqlitePool,
    ticket_id: Option<&str>,
    exclude_private: bool,
    model: &str,
    window: i64,
) -> Result<Vec<MessageCandidate>> {
    let mut sql = String::from(
        r#"
        SELECT e.message_id, e.content, e.embedding,
               m.ticket_id, m.author_role, m.author_name, m.is_private, m.created_at
        FROM message_embeddings e
        JOIN messages m ON m.id = e.message_id
        WHERE e.model = ?
        "#,
    );
    if exclude_private {
        sql.push_str(" AND m.is_private = 0");
    }
    if ticket_id.is_some() {
        sql.push_str(" AND m.ticket_id = ?");
    }
    sql.push_str(" ORDER BY m.created_at DESC LIMIT ?");

    let mut query = sqlx::query(&sql).bind(model);
    if let Some(ticket) = ticket_id {
        query = query.bind(ticket);
    }
    let rows = query.bind(window).fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|row| MessageCandidate {
            message_id: row.get("message_id"),
            ticket_id: row.get("ticket_id"),
            content: row.get("content"),
            author_role: row.get("author_role"),
            author_name: row.get("author_name"),
            is_private: row.get::<i64, _>("is_private") != 0,
            message_created_at: Some(row.get("created_at")),
            embedding: row.get("embedding"),
        })
        .collect())
}

/// List the most recent document-chunk embeddings for scoring, joined to
/// their source documents. Documents carry no privacy flag.
pub async fn list_document_candidates(
    pool: &SqlitePool,
    ticket_id: Option<&str>,
    model: &str,
    window: i64,
) -> Result<Vec<DocumentCandidate>> {
    let mut sql = String::from(
        r#"
        SELECT e.document_id, e.content, e.embedding, e.chunk_index,
               d.ticket_id, d.filename, d.kind
        FROM document_embeddings e
        JOIN documents d ON d.id = e.document_id
        WHERE e.model = ?
        "#,
    );
    if ticket_id.is_some() {
        sql.push_str(" AND d.ticket_id = ?");
    }
    sql.push_str(" ORDER BY d.created_at DESC, e.chunk_index ASC LIMIT ?");

    let mut query = sqlx::query(&sql).bind(model);
    if let Some(ticket) = ticket_id {
        query = query.bind(ticket);
    }
    let rows = query.bind(window).fetch_all(pool).await?;

    Ok(rows
        .iter()
        .map(|row| DocumentCandidate {
            document_id: row.get("document_id"),
            ticket_id: row.get("ticket_id"),
            content: row.get("content"),
            filename: row.get("filename"),
            kind: row.get("kind"),
            chunk_index: row.get("chunk_index"),
            embedding: row.get("embedding"),
        })
        .collect())
}

/// Source-message row for the conversation-context fetch.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub ticket_id: String,
    pub body: String,
    pub author_role: String,
    pub author_name: Option<String>,
    pub is_private: bool,
    pub created_at: i64,
}

/// Fetch the most recent messages of a ticket, newest first. Bypasses
/// embeddings entirely.
pub async fn recent_messages(
    pool: &SqlitePool,
    ticket_id: &str,
    limit: i64,
) -> Result<Vec<MessageRow>> {
    let rows = sqlx::query(
        r#"
        SELECT id, ticket_id, body, author_role, author_name, is_private, created_at
        FROM messages
        WHERE ticket_id = ?
        ORDER BY created_at DESC
        LIMIT ?
        "#,
    )
    .bind(ticket_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| MessageRow {
            id: row.get("id"),
            ticket_id: row.get("ticket_id"),
            body: row.get("body"),
            author_role: row.get("author_role"),
            author_name: row.get("author_name"),
            is_private: row.get::<i64, _>("is_private") != 0,
            created_at: row.get("created_at"),
        })
        .collect())
}

/// Embedding coverage counts across both content families.
pub async fn get_stats(pool: &SqlitePool) -> Result<RetrievalStats> {
    let total_messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(pool)
        .await?;

    let embedded_messages: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT message_id) FROM message_embeddings")
            .fetch_one(pool)
            .await?;

    let total_documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;

    let embedded_document_chunks: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM document_embeddings")
            .fetch_one(pool)
            .await?;

    let cutoff = Utc::now().timestamp() - 7 * 86_400;
    let embedded_last_7_days: i64 = sqlx::query_scalar(
        r#"
        SELECT (SELECT COUNT(*) FROM message_embeddings WHERE created_at >= ?1)
             + (SELECT COUNT(*) FROM document_embeddings WHERE created_at >= ?1)
        "#,
    )
    .bind(cutoff)
    .fetch_one(pool)
    .await?;

    Ok(RetrievalStats {
        total_messages,
        embedded_messages,
        total_documents,
        embedded_document_chunks,
        embedded_last_7_days,
    })
}
