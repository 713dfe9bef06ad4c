//! Embedding providers.
//!
//! The session never owns a provider; one is passed in wherever vectors
//! are produced (`embed_pending`, dense and hybrid search).

use crate::{
    error::{Error, Result},
    tokenizer::{TokenizeOptions, tokenize},
};

/// Default output dimension of [`HashingEmbedder`].
pub const DEFAULT_DIMENSION: usize = 256;

/// Number of chunk texts sent to a provider per call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Produces one fixed-dimension vector per input text.
pub trait Embedder: Send + Sync {
    /// Identifier recorded alongside stored vectors and in exports.
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Embed `texts`, returning exactly one vector per text in order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query string.
pub fn embed_query(embedder: &dyn Embedder, query: &str) -> Result<Vec<f32>> {
    embedder
        .embed(&[query.to_string()])?
        .into_iter()
        .next()
        .ok_or_else(|| {
            Error::Embedding(format!(
                "{} returned no vector for the query",
                embedder.name()
            ))
        })
}

/// Check a provider response before it is stored.
pub(crate) fn check_batch(
    embedder: &dyn Embedder,
    expected: usize,
    vectors: &[Vec<f32>],
) -> Result<()> {
    if vectors.len() != expected {
        return Err(Error::Embedding(format!(
            "{} returned {} vectors for {expected} texts",
            embedder.name(),
            vectors.len()
        )));
    }
    if let Some(bad) = vectors
        .iter()
        .find(|v| v.len() != embedder.dimension())
    {
        return Err(Error::Embedding(format!(
            "{} returned a {}-dimensional vector, expected {}",
            embedder.name(),
            bad.len(),
            embedder.dimension()
        )));
    }
    Ok(())
}

/// Signed feature hashing of tokenizer terms.
///
/// Every term is hashed into one of `dimension` buckets with a sign taken
/// from the hash, and the result is L2-normalized. Texts sharing terms
/// end up close in cosine space. Deterministic across runs and platforms.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    name: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::Config(
                "embedding dimension must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            name: format!("hashing-{dimension}"),
        })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for term in tokenize(text, TokenizeOptions::default()) {
            let hash = fnv1a(term.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            name: format!("hashing-{DEFAULT_DIMENSION}"),
        }
    }
}

impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// 64-bit FNV-1a. Stable across toolchains, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::cosine_similarity;

    #[test]
    fn vectors_have_requested_dimension_and_unit_norm() {
        let embedder = HashingEmbedder::new(64).unwrap();
        let vectors = embedder
            .embed(&["rust ownership rules".to_string()])
            .unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].len(), 64);
        let norm: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_the_zero_vector() {
        let embedder = HashingEmbedder::default();
        let vectors = embedder.embed(&["the of".to_string()]).unwrap();
        assert!(vectors[0].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn deterministic() {
        let embedder = HashingEmbedder::default();
        let texts = vec!["same input".to_string(), "same input".to_string()];
        let vectors = embedder.embed(&texts).unwrap();
        assert_eq!(vectors[0], vectors[1]);
    }

    #[test]
    fn shared_terms_are_more_similar() {
        let embedder = HashingEmbedder::default();
        let query = embed_query(&embedder, "borrow checker").unwrap();
        let vectors = embedder
            .embed(&[
                "the borrow checker enforces ownership".to_string(),
                "bake bread at high heat".to_string(),
            ])
            .unwrap();
        assert!(
            cosine_similarity(&query, &vectors[0])
                > cosine_similarity(&query, &vectors[1])
        );
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(matches!(HashingEmbedder::new(0), Err(Error::Config(_))));
    }

    #[test]
    fn fnv_matches_reference_values() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn batch_check_catches_count_and_dimension() {
        let embedder = HashingEmbedder::new(4).unwrap();
        assert!(check_batch(&embedder, 2, &[vec![0.0; 4]]).is_err());
        assert!(check_batch(&embedder, 1, &[vec![0.0; 3]]).is_err());
        assert!(check_batch(&embedder, 1, &[vec![0.0; 4]]).is_ok());
    }
}
