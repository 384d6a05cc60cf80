//! Text embedding for the semantic index.
//!
//! [`HashEmbedder`] works offline and deterministically: each word token is
//! hashed into a signed bucket and the result is L2-normalised. It captures
//! lexical overlap only, which is enough for recalling stated facts.
//! [`HttpEmbedder`] calls an OpenAI-compatible `/v1/embeddings` endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use buddy_common::{BuddyError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::MemoryConfig;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Expected vector length, when known ahead of time.
    fn dimension(&self) -> Option<usize>;
}

/// Words too common to carry meaning in a bag-of-words vector.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "to", "of", "and", "or", "in", "on",
    "at", "for", "it", "that", "this", "with", "as", "do", "does", "did", "what", "whats",
];

pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
    }

    /// Synchronous core, shared with tests.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for token in Self::tokens(text) {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dim as u64) as usize;
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dim)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible embeddings endpoint.
pub struct HttpEmbedder {
    base_url: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(base_url: Option<String>, model: String, api_key: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| "https://api.openai.com".to_string());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let mut req = self.http_client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: text,
        });
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            BuddyError::UpstreamUnavailable(format!("Embedding request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BuddyError::UpstreamUnavailable(format!(
                "Embedding API error {status}: {body}"
            )));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            BuddyError::UpstreamUnavailable(format!("Failed to parse embedding response: {e}"))
        })?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| BuddyError::UpstreamUnavailable("No embedding returned".into()))?;

        debug!(model = %self.model, dim = embedding.len(), "Embedded text");
        Ok(embedding)
    }

    fn dimension(&self) -> Option<usize> {
        None
    }
}

/// Choose the embedder named by `config.embedding_provider`.
pub fn build_embedder(config: &MemoryConfig) -> Result<Arc<dyn Embedder>> {
    match config.embedding_provider.as_str() {
        "hash" => {
            info!(dim = config.embedding_dim, "Using hash embedder");
            Ok(Arc::new(HashEmbedder::new(config.embedding_dim)))
        }
        "openai" => {
            info!(model = %config.embedding_model, "Using HTTP embedder");
            Ok(Arc::new(HttpEmbedder::new(
                config.embedding_api_url.clone(),
                config.embedding_model.clone(),
                config.embedding_api_key.clone(),
            )))
        }
        other => Err(BuddyError::Config(format!(
            "Unknown embedding provider: {other}"
        ))),
    }
}

// ── Vector math ──────────────────────────────────────────────────────

/// Little-endian BLOB bytes to a vector.
pub(crate) fn bytes_to_f32_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub(crate) fn f32_vec_to_bytes(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Cosine similarity. Returns 0.0 for empty, zero or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-12 {
        0.0
    } else {
        (dot / denom) as f32
    }
}
