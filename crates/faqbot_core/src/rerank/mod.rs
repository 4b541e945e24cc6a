mod cross_encoder;

pub use cross_encoder::CrossEncoderReranker;

use async_trait::async_trait;

use crate::error::{FaqError, Result};
use crate::model::RetrievalResult;
use crate::retrieval::rank;

/// Scores (query, candidate question) pairs. Higher is more relevant; scores
/// are expected in `[0, 1]` so the relevance gate can compare them with the
/// same threshold as retrieval scores.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn score_batch(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>>;
}

/// Re-score candidates and keep the best `top_n`. The reranker score
/// replaces the retrieval score; ties keep retrieval order.
pub async fn rerank(
    reranker: &dyn Reranker,
    query: &str,
    candidates: Vec<RetrievalResult>,
    top_n: usize,
) -> Result<Vec<RetrievalResult>> {
    if candidates.is_empty() {
        return Ok(candidates);
    }

    let documents: Vec<&str> = candidates
        .iter()
        .map(|c| c.record.question.as_str())
        .collect();
    let scores = reranker.score_batch(query, &documents).await?;
    if scores.len() != candidates.len() {
        return Err(FaqError::Model(format!(
            "reranker returned {} scores for {} candidates",
            scores.len(),
            candidates.len()
        )));
    }

    let scored: Vec<(RetrievalResult, f32)> = candidates.into_iter().zip(scores).collect();
    Ok(rank(scored, top_n)
        .into_iter()
        .map(|(mut candidate, score)| {
            candidate.score = score;
            candidate
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FaqRecord;

    /// Scores by shared-prefix length, enough to reorder a fixture.
    struct PrefixReranker;

    #[async_trait]
    impl Reranker for PrefixReranker {
        async fn score_batch(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
            Ok(documents
                .iter()
                .map(|d| {
                    let shared = query.chars().zip(d.chars()).take_while(|(a, b)| a == b).count();
                    shared as f32 / query.chars().count().max(1) as f32
                })
                .collect())
        }
    }

    struct ShortReranker;

    #[async_trait]
    impl Reranker for ShortReranker {
        async fn score_batch(&self, _query: &str, _documents: &[&str]) -> Result<Vec<f32>> {
            Ok(vec![0.5])
        }
    }

    fn candidate(question: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            record: FaqRecord {
                id: question.to_string(),
                question: question.to_string(),
                answer: String::new(),
            },
            score,
        }
    }

    #[tokio::test]
    async fn reorders_and_truncates() {
        let candidates = vec![
            candidate("How tall is Everest?", 0.9),
            candidate("What is poker?", 0.8),
            candidate("What is bridge?", 0.7),
        ];

        let out = rerank(&PrefixReranker, "What is poker", candidates, 2)
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].record.question, "What is poker?");
        assert!((out[0].score - 1.0).abs() < 1e-6);
        assert_eq!(out[1].record.question, "What is bridge?");
    }

    #[tokio::test]
    async fn ties_keep_retrieval_order() {
        let candidates = vec![candidate("b", 0.9), candidate("a", 0.8)];
        let out = rerank(&PrefixReranker, "zzz", candidates, 5).await.unwrap();
        let order: Vec<&str> = out.iter().map(|c| c.record.id.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn score_count_mismatch_is_an_error() {
        let candidates = vec![candidate("a", 0.9), candidate("b", 0.8)];
        assert!(rerank(&ShortReranker, "q", candidates, 2).await.is_err());
    }

    #[tokio::test]
    async fn empty_input_is_passed_through() {
        let out = rerank(&PrefixReranker, "q", Vec::new(), 3).await.unwrap();
        assert!(out.is_empty());
    }
}
