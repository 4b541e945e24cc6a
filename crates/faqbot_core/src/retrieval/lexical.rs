use std::collections::HashMap;

use async_trait::async_trait;

use super::{rank, tokenize, Retriever};
use crate::error::Result;
use crate::model::{FaqRecord, RetrievalResult};

pub const DEFAULT_K1: f32 = 1.5;
pub const DEFAULT_B: f32 = 0.75;

/// Okapi BM25 over tokenized documents.
///
/// Scores are divided by the larger of two self-scores: the document's own
/// terms scored against the document, and the query's terms scored against
/// the query. Query terms the document lacks therefore lower the score. A
/// query equal to a stored question scores 1.0, so lexical scores share the
/// gate threshold with cosine scores.
#[derive(Debug, Clone)]
pub struct Bm25Index {
    idf: HashMap<String, f32>,
    /// Weight of a term no document contains.
    unseen_idf: f32,
    /// Per document: term -> saturated, length-normalised term frequency.
    tf_norm: Vec<HashMap<String, f32>>,
    self_scores: Vec<f32>,
    k1: f32,
    b: f32,
    avgdl: f32,
}

impl Bm25Index {
    pub fn new<S: AsRef<str>>(docs: &[S], k1: f32, b: f32) -> Self {
        let tokenized: Vec<Vec<String>> = docs.iter().map(|d| tokenize(d.as_ref())).collect();
        let n = tokenized.len() as f32;

        let total_tokens: usize = tokenized.iter().map(Vec::len).sum();
        let avgdl = if tokenized.is_empty() || total_tokens == 0 {
            1.0
        } else {
            total_tokens as f32 / n
        };

        let mut df: HashMap<&str, usize> = HashMap::new();
        for doc in &tokenized {
            let mut seen: Vec<&str> = doc.iter().map(String::as_str).collect();
            seen.sort_unstable();
            seen.dedup();
            for term in seen {
                *df.entry(term).or_insert(0) += 1;
            }
        }

        let idf_of = |dft: f32| ((n - dft + 0.5) / (dft + 0.5) + 1.0).ln();
        let idf: HashMap<String, f32> = df
            .iter()
            .map(|(term, &dft)| (term.to_string(), idf_of(dft as f32)))
            .collect();

        let tf_norm: Vec<HashMap<String, f32>> = tokenized
            .iter()
            .map(|doc| {
                let dl = doc.len() as f32;
                let mut raw_tf: HashMap<&str, usize> = HashMap::new();
                for term in doc {
                    *raw_tf.entry(term.as_str()).or_insert(0) += 1;
                }
                raw_tf
                    .into_iter()
                    .map(|(term, tf)| {
                        (term.to_string(), saturate(tf as f32, dl, avgdl, k1, b))
                    })
                    .collect()
            })
            .collect();

        let mut index = Self {
            idf,
            unseen_idf: idf_of(0.0),
            tf_norm,
            self_scores: Vec::new(),
            k1,
            b,
            avgdl,
        };
        let self_scores = tokenized
            .iter()
            .enumerate()
            .map(|(i, doc)| index.raw_score(doc, i))
            .collect();
        index.self_scores = self_scores;
        index
    }

    pub fn len(&self) -> usize {
        self.tf_norm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tf_norm.is_empty()
    }

    fn raw_score(&self, query_terms: &[String], doc: usize) -> f32 {
        let doc_tf = &self.tf_norm[doc];
        query_terms
            .iter()
            .map(|term| {
                let idf = self.idf.get(term).copied().unwrap_or(0.0);
                let tf = doc_tf.get(term).copied().unwrap_or(0.0);
                idf * tf
            })
            .sum()
    }

    /// BM25 of the query against itself, as if it were a document of this
    /// corpus.
    fn query_self_score(&self, query_terms: &[String]) -> f32 {
        let dl = query_terms.len() as f32;
        let mut raw_tf: HashMap<&str, usize> = HashMap::new();
        for term in query_terms {
            *raw_tf.entry(term.as_str()).or_insert(0) += 1;
        }
        query_terms
            .iter()
            .map(|term| {
                let idf = self.idf.get(term).copied().unwrap_or(self.unseen_idf);
                let tf = raw_tf.get(term.as_str()).copied().unwrap_or(0) as f32;
                idf * saturate(tf, dl, self.avgdl, self.k1, self.b)
            })
            .sum()
    }

    /// Normalised score of `query` against every document, in corpus order.
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let terms = tokenize(query);
        let query_self = self.query_self_score(&terms);
        (0..self.len())
            .map(|i| {
                let scale = self.self_scores[i].max(query_self);
                if scale <= 0.0 {
                    0.0
                } else {
                    (self.raw_score(&terms, i) / scale).min(1.0)
                }
            })
            .collect()
    }
}

fn saturate(tf: f32, dl: f32, avgdl: f32, k1: f32, b: f32) -> f32 {
    tf * (k1 + 1.0) / (tf + k1 * (1.0 - b + b * dl / avgdl))
}

/// BM25 over the stored questions.
pub struct LexicalRetriever {
    records: Vec<FaqRecord>,
    index: Bm25Index,
}

impl LexicalRetriever {
    pub fn new(records: Vec<FaqRecord>) -> Self {
        Self::with_params(records, DEFAULT_K1, DEFAULT_B)
    }

    pub fn with_params(records: Vec<FaqRecord>, k1: f32, b: f32) -> Self {
        let questions: Vec<&str> = records.iter().map(|r| r.question.as_str()).collect();
        let index = Bm25Index::new(&questions, k1, b);
        tracing::info!(records = records.len(), "lexical index built");
        Self { records, index }
    }
}

#[async_trait]
impl Retriever for LexicalRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        let scored: Vec<(usize, f32)> = self.index.scores(query).into_iter().enumerate().collect();

        Ok(rank(scored, k)
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
