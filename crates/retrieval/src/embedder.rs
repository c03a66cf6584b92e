//! Embedding gateway
//!
//! The retrieval layer never computes embeddings itself; it calls an
//! [`Embedder`] and treats the vectors as opaque. [`HttpEmbedder`]
//! talks to an OpenAI-compatible `/embeddings` endpoint;
//! [`HashEmbedder`] is a deterministic offline stand-in for tests and
//! air-gapped use.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use corpus_core::{Error, Result};
use serde::Deserialize;

/// Text-to-vector gateway.
///
/// Implementations must be deterministic about dimension: every
/// vector returned has exactly `dimension()` components. Failures
/// surface as [`Error::Embedding`] and must leave no trace in the
/// store (the caller embeds before it writes).
pub trait Embedder: Send + Sync {
    /// Embedding dimension, fixed for the lifetime of the gateway
    fn dimension(&self) -> usize;

    /// Embed one text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch; the result is index-aligned with `texts`
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

// ============================================================================
// HTTP gateway (OpenAI-compatible /embeddings)
// ============================================================================

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Gateway backed by an OpenAI-compatible embeddings endpoint
pub struct HttpEmbedder {
    agent: ureq::Agent,
    url: String,
    model: String,
    api_key: Option<String>,
    dimension: usize,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    /// Gateway for `model` at `url` (the full `/embeddings` endpoint),
    /// producing `dimension`-sized vectors.
    pub fn new(url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build();
        HttpEmbedder {
            agent,
            url: url.into(),
            model: model.into(),
            api_key: None,
            dimension,
        }
    }

    /// Attach a bearer token
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Override the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::AgentBuilder::new().timeout(timeout).build();
        self
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut req = self.agent.post(&self.url);
        if let Some(key) = &self.api_key {
            req = req.set("Authorization", &format!("Bearer {}", key));
        }

        let response = req.send_json(body).map_err(|e| match e {
            ureq::Error::Status(code, resp) => {
                let detail = resp.into_string().unwrap_or_default();
                Error::Embedding(format!(
                    "embedding endpoint returned {}: {}",
                    code,
                    detail.chars().take(256).collect::<String>()
                ))
            }
            ureq::Error::Transport(t) => {
                Error::Embedding(format!("embedding request failed: {}", t))
            }
        })?;

        let parsed: EmbeddingsResponse = response
            .into_json()
            .map_err(|e| Error::Embedding(format!("malformed embedding response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "embedding response has {} items for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        let mut items = parsed.data;
        items.sort_by_key(|item| item.index);

        let mut vectors = Vec::with_capacity(items.len());
        for item in items {
            if item.embedding.len() != self.dimension {
                return Err(Error::Embedding(format!(
                    "embedding has {} components, expected {}",
                    item.embedding.len(),
                    self.dimension
                )));
            }
            vectors.push(item.embedding);
        }
        Ok(vectors)
    }
}

impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text])?;
        Ok(vectors.remove(0))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(
            target: "corpus::embedder",
            count = texts.len(),
            model = %self.model,
            "embedding batch"
        );
        self.request(texts)
    }
}

// ============================================================================
// Deterministic offline gateway
// ============================================================================

/// Hash-based embedder: stable, content-sensitive vectors with no
/// network dependency. Same text always maps to the same unit vector;
/// texts sharing tokens land near each other.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "embedding dimension must be > 0");
        HashEmbedder { dimension }
    }

    fn token_component(token: &str, slot: usize) -> f32 {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        slot.hash(&mut hasher);
        let bits = hasher.finish();
        // Map the hash into [-1, 1).
        (bits as f64 / u64::MAX as f64 * 2.0 - 1.0) as f32
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            for (slot, component) in vector.iter_mut().enumerate() {
                *component += Self::token_component(&token, slot);
            }
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for component in &mut vector {
                *component /= norm;
            }
        }
        Ok(vector)
    }
}
