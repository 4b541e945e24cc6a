use std::sync::Arc;

use async_trait::async_trait;

use super::{rank, Retriever};
use crate::embed::EmbeddingProvider;
use crate::error::{FaqError, Result};
use crate::model::{FaqEntry, FaqRecord, RetrievalResult};

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, na, nb) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f32, 0.0f32, 0.0f32), |(d, aa, bb), (x, y)| {
            (d + (x * y), aa + (x * x), bb + (y * y))
        });

    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

/// Indices and cosine scores of the `k` embeddings closest to the query.
pub fn top_k(query_embedding: &[f32], embeddings: &[Vec<f32>], k: usize) -> Vec<(usize, f32)> {
    let scored: Vec<(usize, f32)> = embeddings
        .iter()
        .enumerate()
        .map(|(i, emb)| (i, cosine_similarity(query_embedding, emb)))
        .collect();

    rank(scored, k)
}

/// Cosine similarity over question embeddings.
pub struct DenseRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    records: Vec<FaqRecord>,
    embeddings: Vec<Vec<f32>>,
}

impl DenseRetriever {
    /// Embed every question of the corpus.
    pub async fn build(embedder: Arc<dyn EmbeddingProvider>, records: Vec<FaqRecord>) -> Result<Self> {
        let questions: Vec<String> = records.iter().map(|r| r.question.clone()).collect();
        let embeddings = embedder.embed_batch(&questions).await?;
        tracing::info!(
            embedder = embedder.name(),
            records = records.len(),
            "dense index built"
        );
        Ok(Self {
            embedder,
            records,
            embeddings,
        })
    }

    /// Reuse embeddings from a prebuilt index. The embedder must be the one
    /// the index was built with.
    pub fn from_entries(embedder: Arc<dyn EmbeddingProvider>, entries: Vec<FaqEntry>) -> Self {
        let records = entries.iter().map(FaqEntry::record).collect();
        let embeddings = entries.into_iter().map(|e| e.embedding).collect();
        Self {
            embedder,
            records,
            embeddings,
        }
    }

    pub fn to_entries(&self) -> Vec<FaqEntry> {
        self.records
            .iter()
            .cloned()
            .zip(self.embeddings.iter().cloned())
            .map(|(record, embedding)| {
                FaqEntry::new(record, embedding, Some(self.embedder.name().to_string()))
            })
            .collect()
    }

    fn dimension(&self) -> Option<usize> {
        self.embeddings.first().map(Vec::len)
    }
}

#[async_trait]
impl Retriever for DenseRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        if self.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        if let Some(dim) = self.dimension() {
            if dim != query_embedding.len() {
                return Err(FaqError::Config(format!(
                    "index embeddings have dimension {dim} but embedder '{}' produced {}",
                    self.embedder.name(),
                    query_embedding.len()
                )));
            }
        }

        Ok(top_k(&query_embedding, &self.embeddings, k)
            .into_iter()
            .map(|(i, score)| RetrievalResult {
                record: self.records[i].clone(),
                score,
            })
            .collect())
    }

    fn records(&self) -> &[FaqRecord] {
        &self.records
    }
}
