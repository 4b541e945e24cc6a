mod dense;
mod lexical;

pub use dense::{cosine_similarity, top_k, DenseRetriever};
pub use lexical::{Bm25Index, LexicalRetriever};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{FaqRecord, RetrievalResult};

/// First pipeline stage: score every record against the query and keep the
/// best `k`, highest score first. An empty corpus yields an empty list.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>>;

    fn records(&self) -> &[FaqRecord];

    fn len(&self) -> usize {
        self.records().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lower-cased alphanumeric runs. Unicode aware, so Cyrillic corpora
/// tokenize the same way Latin ones do.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Sort by descending score and keep `k`. The sort is stable, so ties keep
/// corpus order.
pub(crate) fn rank<T>(mut scored: Vec<(T, f32)>, k: usize) -> Vec<(T, f32)> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored
}
