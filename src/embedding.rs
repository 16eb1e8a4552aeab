//! Embedding provider adapter and vector utilities.
//!
//! The engine needs exactly one configured vector-provider handle for its
//! lifetime; it is injected at construction as an [`Embedder`] rather than
//! discovered from ambient state. A missing credential degrades to
//! [`EmbedError::NoProvider`] on every call, which makes the unavailable
//! path trivially testable with a stub.
//!
//! Also home to the numeric core:
//! - [`cosine_similarity`] — the relevance score between two vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 BLOB codecs for
//!   SQLite storage

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::EmbeddingConfig;
use crate::normalize::normalize;

/// Why an embedding could not be produced.
///
/// All variants are non-fatal: the write path records nothing and the search
/// paths return empty. Nothing here is ever propagated to the application as
/// a hard failure.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("no embedding provider configured")]
    NoProvider,
    #[error("text too short to embed ({len} chars, minimum {min})")]
    TooShort { len: usize, min: usize },
    #[error("embedding provider error: {0}")]
    Provider(String),
}

/// An external text-to-vector model, treated as an opaque, stateless call.
///
/// Implementations must return vectors of [`dims`](VectorProvider::dims)
/// length for every successful call.
#[async_trait]
pub trait VectorProvider: Send + Sync {
    /// Identifier of the model version producing the vectors.
    fn model_id(&self) -> &str;
    /// Vector dimensionality.
    fn dims(&self) -> usize;
    /// Produce a vector for already-normalized text. One attempt, no retry;
    /// a failed call means "no embedding for this item right now".
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// The injected provider handle plus input gating.
///
/// [`Embedder::embed`] normalizes input first and refuses to spend provider
/// quota on texts shorter than `min_chars` after cleanup.
#[derive(Clone)]
pub struct Embedder {
    provider: Option<Arc<dyn VectorProvider>>,
    min_chars: usize,
}

impl Embedder {
    pub fn new(provider: Arc<dyn VectorProvider>, min_chars: usize) -> Self {
        Self {
            provider: Some(provider),
            min_chars,
        }
    }

    /// An embedder with no provider handle. Every call fails `NoProvider`
    /// without attempting I/O.
    pub fn disabled() -> Self {
        Self {
            provider: None,
            min_chars: 0,
        }
    }

    /// Build from configuration. Returns a disabled embedder when the
    /// provider is `"disabled"`; fails when an enabled provider is
    /// misconfigured (missing model, dims, or credential).
    pub fn from_config(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        match config.provider.as_str() {
            "disabled" => Ok(Self::disabled()),
            "openai" => Ok(Self::new(
                Arc::new(OpenAiProvider::new(config)?),
                config.min_chars,
            )),
            other => anyhow::bail!("Unknown embedding provider: {}", other),
        }
    }

    /// Model id of the configured provider, or `"disabled"`.
    pub fn model_id(&self) -> &str {
        self.provider
            .as_deref()
            .map(|p| p.model_id())
            .unwrap_or("disabled")
    }

    /// Dimensionality of the configured provider, or 0.
    pub fn dims(&self) -> usize {
        self.provider.as_deref().map(|p| p.dims()).unwrap_or(0)
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Normalize `text` and produce its embedding vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let provider = self.provider.as_deref().ok_or(EmbedError::NoProvider)?;

        let cleaned = normalize(text);
        let len = cleaned.chars().count();
        if len < self.min_chars {
            return Err(EmbedError::TooShort {
                len,
                min: self.min_chars,
            });
        }

        provider.embed(&cleaned).await
    }
}

// ============ OpenAI provider ============

/// Embedding provider calling the OpenAI embeddings API.
///
/// Requires `OPENAI_API_KEY` at construction time. A single request per
/// call; any transport or status failure maps to [`EmbedError::Provider`].
pub struct OpenAiProvider {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1/embeddings".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url,
            api_key,
            client,
        })
    }
}

#[async_trait]
impl VectorProvider for OpenAiProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(EmbedError::Provider(format!(
                "API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EmbedError::Provider(e.to_string()))?;

        parse_embedding_response(&json)
    }
}

/// Extract the first `data[].embedding` array from an embeddings response.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>, EmbedError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbedError::Provider("missing embedding in response".to_string()))?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

// ============ Vector utilities ============

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Trailing bytes that do not form a full f32 are dropped, so a truncated
/// BLOB decodes to a shorter vector. The length guard in
/// [`cosine_similarity`] then scores it 0 rather than erroring.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Vectors of unequal length score `0.0`
/// by definition, as does any comparison involving a zero vector — a zero
/// vector is maximally dissimilar to everything, never a match.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stub provider returning a fixed vector and counting calls.
    pub struct FixedProvider {
        pub vector: Vec<f32>,
        pub calls: AtomicUsize,
    }

    impl FixedProvider {
        pub fn new(vector: Vec<f32>) -> Arc<Self> {
            Arc::new(Self {
                vector,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VectorProvider for FixedProvider {
        fn model_id(&self) -> &str {
            "stub-model"
        }
        fn dims(&self) -> usize {
            self.vector.len()
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.vector.clone())
        }
    }

    /// Stub provider that always fails, counting calls.
    pub struct FailingProvider {
        pub calls: AtomicUsize,
    }

    impl FailingProvider {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl VectorProvider for FailingProvider {
        fn model_id(&self) -> &str {
            "stub-model"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EmbedError::Provider("stub outage".to_string()))
        }
    }
}
