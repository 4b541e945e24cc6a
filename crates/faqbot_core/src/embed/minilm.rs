use async_trait::async_trait;
use candle_core::Device;
use std::path::Path;

use super::EmbeddingProvider;
use crate::bert::{
    load_tokenizer, mean_pool_normalized, mmap_safetensors, BertConfig, BertEncoder,
};
use crate::error::{FaqError, Result};

/// Local sentence-transformer embeddings (all-MiniLM-L6-v2 safetensors):
/// mean pooling over the last hidden layer, L2 normalized.
///
/// `embed` runs the forward pass on the calling thread.
pub struct MiniLmEmbeddingProvider {
    encoder: BertEncoder,
    tokenizer: tokenizers::Tokenizer,
}

impl MiniLmEmbeddingProvider {
    pub fn load(model_path: &Path, tokenizer_path: &Path) -> Result<Self> {
        let device = Device::Cpu;
        let vb = mmap_safetensors(model_path, &device)?;
        let encoder = BertEncoder::load(&vb, BertConfig::minilm_l6())?;
        let tokenizer = load_tokenizer(tokenizer_path)?;

        Ok(Self { encoder, tokenizer })
    }

    fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| FaqError::Model(format!("tokenize: {e}")))?;
        let hidden = self
            .encoder
            .forward(encoding.get_ids(), encoding.get_type_ids())?;

        mean_pool_normalized(&hidden)
    }
}

#[async_trait]
impl EmbeddingProvider for MiniLmEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_sync(text)
    }

    fn name(&self) -> &str {
        "all-MiniLM-L6-v2"
    }
}
