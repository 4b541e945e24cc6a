use async_trait::async_trait;
use candle_core::{Device, Module};
use candle_nn::Linear;
use std::path::Path;

use super::Reranker;
use crate::bert::{load_tokenizer, mmap_safetensors, BertConfig, BertEncoder};
use crate::error::{FaqError, Result};

/// BERT sequence-classification cross-encoder (ms-marco-MiniLM-L-6-v2
/// safetensors). Query and candidate are encoded as one pair; the logit of
/// the `[CLS]` head goes through a sigmoid. Scoring blocks the calling
/// thread.
pub struct CrossEncoderReranker {
    encoder: BertEncoder,
    pooler: Linear,
    classifier: Linear,
    tokenizer: tokenizers::Tokenizer,
}

impl CrossEncoderReranker {
    pub fn load(model_path: &Path, tokenizer_path: &Path) -> Result<Self> {
        let device = Device::Cpu;
        let vb = mmap_safetensors(model_path, &device)?;
        let config = BertConfig::minilm_l6();
        let h = config.hidden_size;

        let encoder = BertEncoder::load(&vb.pp("bert"), config)?;
        let pooler = candle_nn::linear(h, h, vb.pp("bert").pp("pooler").pp("dense"))?;
        let classifier = candle_nn::linear(h, 1, vb.pp("classifier"))?;
        let tokenizer = load_tokenizer(tokenizer_path)?;

        Ok(Self {
            encoder,
            pooler,
            classifier,
            tokenizer,
        })
    }

    fn score_pair(&self, query: &str, document: &str) -> Result<f32> {
        let encoding = self
            .tokenizer
            .encode((query, document), true)
            .map_err(|e| FaqError::Model(format!("tokenize: {e}")))?;
        let hidden = self
            .encoder
            .forward(encoding.get_ids(), encoding.get_type_ids())?;

        let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logit: f32 = self
            .classifier
            .forward(&pooled)?
            .flatten_all()?
            .to_vec1::<f32>()?
            .first()
            .copied()
            .unwrap_or(f32::NEG_INFINITY);

        Ok(sigmoid(logit))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    async fn score_batch(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        documents
            .iter()
            .map(|doc| self.score_pair(query, doc))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_maps_logits_into_unit_interval() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(12.0) > 0.99);
        assert!(sigmoid(-12.0) < 0.01);
        assert_eq!(sigmoid(f32::NEG_INFINITY), 0.0);
    }

    #[tokio::test]
    async fn relevant_pair_outscores_irrelevant_pair() {
        let base = Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .unwrap()
            .parent()
            .unwrap()
            .join("models");
        let model_path = base.join("ms-marco-MiniLM-L-6-v2.safetensors");
        let tokenizer_path = base.join("ms-marco-MiniLM-L-6-v2-tokenizer.json");
        if !model_path.exists() || !tokenizer_path.exists() {
            eprintln!("Skipping: ms-marco-MiniLM-L-6-v2 model or tokenizer not found");
            return;
        }

        let reranker = CrossEncoderReranker::load(&model_path, &tokenizer_path).unwrap();
        let scores = reranker
            .score_batch(
                "how do you play poker",
                &["What are the rules of poker?", "What is the capital of France?"],
            )
            .await
            .unwrap();
        assert!(scores[0] > scores[1]);
    }
}
