mod minilm;
mod openai;

pub use minilm::MiniLmEmbeddingProvider;
pub use openai::OpenAiEmbeddingProvider;

use async_trait::async_trait;

use crate::error::Result;
use crate::retrieval::tokenize;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Short name recorded as the provenance of built index entries.
    fn name(&self) -> &str;
}

/// Feature-hashing bag of words. Needs no model or network, so it is the
/// default embedder and the one used in tests.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dim: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];

        for token in tokenize(text) {
            let mut h: u64 = 1469598103934665603;
            for b in token.as_bytes() {
                h ^= *b as u64;
                h = h.wrapping_mul(1099511628211);
            }
            let idx = (h as usize) % self.dim;
            v[idx] += 1.0;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }

        v
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self { dim: 768 }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn name(&self) -> &str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::cosine_similarity;

    #[tokio::test]
    async fn hash_embeddings_are_normalized_and_case_insensitive() {
        let e = HashEmbeddingProvider::new(64);
        let a = e.embed("What is Poker?").await.unwrap();
        let b = e.embed("what is poker").await.unwrap();

        let norm = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn hash_embeddings_handle_cyrillic() {
        let e = HashEmbeddingProvider::default();
        let a = e.embed("Что такое покер?").await.unwrap();
        assert!(a.iter().any(|x| *x > 0.0));
    }

    #[tokio::test]
    async fn blank_text_embeds_to_zero_vector() {
        let e = HashEmbeddingProvider::new(16);
        let v = e.embed("  ?! ").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
