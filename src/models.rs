//! Result shapes returned by the retrieval engine.
//!
//! These types are what the surrounding case-management application sees:
//! ranked similarity hits for messages and document chunks, and a tagged
//! unified shape merging both behind one score.

use serde::Serialize;

/// A ranked hit from the message similarity search.
///
/// Also used by the conversation-context fetch, where `similarity` is the
/// sentinel `1.0` ("same thread") rather than a measured cosine score.
/// Callers must not compare the sentinel against real scores.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityResult {
    pub content_id: String,
    pub ticket_id: String,
    pub content: String,
    pub author_role: String,
    pub author_name: Option<String>,
    pub is_private: bool,
    pub source_created_at: Option<i64>,
    pub similarity: f64,
}

/// A ranked hit from the document-chunk similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSimilarityResult {
    pub content_id: String,
    pub ticket_id: String,
    pub content: String,
    pub filename: String,
    pub document_kind: String,
    pub chunk_index: i64,
    pub similarity: f64,
}

/// Discriminant for [`UnifiedResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Message,
    Document,
}

/// One entry in the merged message + document ranking.
///
/// Kind-specific fields live in `metadata` so both families fit a single
/// ranked list.
#[derive(Debug, Clone, Serialize)]
pub struct UnifiedResult {
    pub kind: ResultKind,
    pub id: String,
    pub ticket_id: String,
    pub content: String,
    pub similarity: f64,
    pub metadata: serde_json::Value,
}

impl UnifiedResult {
    pub fn from_message(r: SimilarityResult) -> Self {
        Self {
            kind: ResultKind::Message,
            id: r.content_id,
            ticket_id: r.ticket_id,
            content: r.content,
            similarity: r.similarity,
            metadata: serde_json::json!({
                "author_role": r.author_role,
                "author_name": r.author_name,
                "is_private": r.is_private,
                "source_created_at": r.source_created_at,
            }),
        }
    }

    pub fn from_document(r: DocumentSimilarityResult) -> Self {
        Self {
            kind: ResultKind::Document,
            id: r.content_id,
            ticket_id: r.ticket_id,
            content: r.content,
            similarity: r.similarity,
            metadata: serde_json::json!({
                "filename": r.filename,
                "document_kind": r.document_kind,
                "chunk_index": r.chunk_index,
            }),
        }
    }
}

/// Embedding coverage counts, a cheap health indicator for the engine.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalStats {
    pub total_messages: i64,
    pub embedded_messages: i64,
    pub total_documents: i64,
    pub embedded_document_chunks: i64,
    pub embedded_last_7_days: i64,
}
