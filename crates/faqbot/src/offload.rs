//! Runs local model inference on the blocking pool.
//!
//! Candle forward passes are synchronous CPU work. Awaited in place they hold
//! a runtime worker for the whole pass and stall concurrent requests.

use std::sync::Arc;

use async_trait::async_trait;
use faqbot_core::{EmbeddingProvider, FaqError, Reranker, Result};
use tokio::runtime::Handle;

fn join_error(err: tokio::task::JoinError) -> FaqError {
    FaqError::Model(format!("inference task failed: {err}"))
}

pub struct OffloadedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
}

impl OffloadedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl EmbeddingProvider for OffloadedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || handle.block_on(inner.embed(&text)))
            .await
            .map_err(join_error)?
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

pub struct OffloadedReranker {
    inner: Arc<dyn Reranker>,
}

impl OffloadedReranker {
    pub fn new(inner: Arc<dyn Reranker>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Reranker for OffloadedReranker {
    async fn score_batch(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        let inner = Arc::clone(&self.inner);
        let query = query.to_string();
        let documents: Vec<String> = documents.iter().map(|d| d.to_string()).collect();
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || {
            let documents: Vec<&str> = documents.iter().map(String::as_str).collect();
            handle.block_on(inner.score_batch(&query, &documents))
        })
        .await
        .map_err(join_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Holds its thread the way a forward pass does.
    struct BusyModel;

    #[async_trait]
    impl EmbeddingProvider for BusyModel {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(vec![text.len() as f32])
        }

        fn name(&self) -> &str {
            "busy"
        }
    }

    #[async_trait]
    impl Reranker for BusyModel {
        async fn score_batch(&self, _query: &str, documents: &[&str]) -> Result<Vec<f32>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(documents.iter().map(|d| 1.0 / d.len() as f32).collect())
        }
    }

    fn ticker() -> (Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let task = tokio::spawn(async move {
            loop {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });
        (ticks, task)
    }

    // The default test runtime has a single thread: the ticker only advances
    // if inference leaves it free.
    #[tokio::test]
    async fn embedding_leaves_the_runtime_free() {
        let embedder = OffloadedEmbedder::new(Arc::new(BusyModel));
        let (ticks, task) = ticker();

        let vector = embedder.embed("poker").await.unwrap();
        task.abort();

        assert_eq!(vector, vec![5.0]);
        assert_eq!(embedder.name(), "busy");
        assert!(ticks.load(Ordering::SeqCst) > 3);
    }

    #[tokio::test]
    async fn reranking_leaves_the_runtime_free() {
        let reranker = OffloadedReranker::new(Arc::new(BusyModel));
        let (ticks, task) = ticker();

        let scores = reranker.score_batch("q", &["ab", "abcd"]).await.unwrap();
        task.abort();

        assert_eq!(scores, vec![0.5, 0.25]);
        assert!(ticks.load(Ordering::SeqCst) > 3);
    }
}
