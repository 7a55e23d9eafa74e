//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, the deterministic [`HashingProvider`], and pure helper
//! functions for vector serialization and similarity computation.
//!
//! Network and model-backed providers (OpenAI, Ollama, fastembed) live in
//! the `domain-ledger` app crate.

use anyhow::anyhow;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{LedgerError, Result};

/// Trait for embedding providers.
///
/// Implementations are created by the application and handed to the
/// indexer and search engine at construction time.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    ///
    /// Fails with [`LedgerError::InvalidInput`] when `text` is empty or
    /// whitespace-only. The same text always yields the same vector.
    async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(LedgerError::invalid("Text cannot be empty"));
        }
        let mut vectors = self.embed_texts(&[text.to_string()]).await?;
        if vectors.len() != 1 {
            return Err(LedgerError::Infrastructure(anyhow!(
                "{} returned {} vectors for one input",
                self.model_name(),
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase alphanumeric token contributes a word feature (weight
/// 1.0) and the character trigrams of `<token>` (weight 0.5 each). A feature
/// lands in the bucket given by the first eight bytes of its SHA-256 digest,
/// big-endian, modulo `dims`. The result is L2-normalized.
///
/// There is no model to load, so it is always ready and works offline.
#[derive(Debug, Clone)]
pub struct HashingProvider {
    dims: usize,
}

impl HashingProvider {
    pub const MODEL_NAME: &'static str = "feature-hash-v1";

    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// Synchronous embedding of one text.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            self.add_feature(&mut vec, &format!("w:{}", token), 1.0);

            let padded: Vec<char> = format!("<{}>", token).chars().collect();
            for tri in padded.windows(3) {
                let tri: String = tri.iter().collect();
                self.add_feature(&mut vec, &format!("g:{}", tri), 0.5);
            }
        }
        normalize(&mut vec);
        vec
    }

    fn add_feature(&self, vec: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_be_bytes(head) % self.dims as u64) as usize;
        vec[bucket] += weight;
    }
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn model_name(&self) -> &str {
        Self::MODEL_NAME
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Scale `vec` to unit length in place. Zero vectors are left alone.
pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use domain_ledger_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`]. Trailing bytes that do not
/// form a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity, i.e. `1 - cosine_distance`.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, zero
/// vectors, and vectors of different lengths.
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

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("User-Auth, (String): e_mail"),
            vec!["user", "auth", "string", "e", "mail"]
        );
    }

    #[test]
    fn test_hashing_is_deterministic_and_normalized() {
        let p = HashingProvider::new(384);
        let a = p.embed_one("user authentication policy");
        let b = p.embed_one("user authentication policy");
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_closer_text_scores_higher() {
        let p = HashingProvider::default();
        let q = p.embed_one("user authentication policy");
        let near = p.embed_one("user accounts and login sessions with an admin only policy");
        let far = p.embed_one("customer purchase orders expire after 30 days");
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[tokio::test]
    async fn test_generate_rejects_blank_text() {
        let p = HashingProvider::default();
        for text in ["", "   ", "\n\t"] {
            let err = p.generate(text).await.unwrap_err();
            assert!(matches!(err, LedgerError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn test_generate_matches_batch() {
        let p = HashingProvider::new(64);
        let single = p.generate("snake case").await.unwrap();
        let batch = p
            .embed_texts(&["snake case".to_string(), "other".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(single, batch[0]);
    }
}
