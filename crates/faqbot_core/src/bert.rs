//! BERT encoder shared by the MiniLM sentence embedder and the MiniLM
//! cross-encoder reranker. Both checkpoints have the same geometry and differ
//! only in tensor prefix and in the head applied to the hidden states.

use std::path::Path;

use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{Embedding, LayerNorm, Linear, VarBuilder};

use crate::error::{FaqError, Result};

/// Geometry of the MiniLM-L6 checkpoints.
pub(crate) struct BertConfig {
    pub hidden_size: usize,
    intermediate_size: usize,
    num_heads: usize,
    num_layers: usize,
    vocab_size: usize,
    pub max_position_embeddings: usize,
    type_vocab_size: usize,
    layer_norm_eps: f64,
}

impl BertConfig {
    pub fn minilm_l6() -> Self {
        Self {
            hidden_size: 384,
            intermediate_size: 1536,
            num_heads: 12,
            num_layers: 6,
            vocab_size: 30522,
            max_position_embeddings: 512,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
        }
    }

    fn head_dim(&self) -> usize {
        self.hidden_size / self.num_heads
    }
}

struct Embeddings {
    words: Embedding,
    positions: Embedding,
    token_types: Embedding,
    norm: LayerNorm,
}

impl Embeddings {
    fn load(vb: VarBuilder, cfg: &BertConfig) -> Result<Self> {
        let h = cfg.hidden_size;
        Ok(Self {
            words: candle_nn::embedding(cfg.vocab_size, h, vb.pp("word_embeddings"))?,
            positions: candle_nn::embedding(
                cfg.max_position_embeddings,
                h,
                vb.pp("position_embeddings"),
            )?,
            token_types: candle_nn::embedding(
                cfg.type_vocab_size,
                h,
                vb.pp("token_type_embeddings"),
            )?,
            norm: candle_nn::layer_norm(h, cfg.layer_norm_eps, vb.pp("LayerNorm"))?,
        })
    }

    fn forward(&self, ids: &Tensor, type_ids: &Tensor, positions: &Tensor) -> Result<Tensor> {
        let summed = self
            .words
            .forward(ids)?
            .add(&self.positions.forward(positions)?)?
            .add(&self.token_types.forward(type_ids)?)?;
        Ok(self.norm.forward(&summed)?)
    }
}

/// Multi-head self-attention followed by its output projection and
/// residual post-norm.
struct Attention {
    qkv: [Linear; 3],
    out: Linear,
    norm: LayerNorm,
    num_heads: usize,
    head_dim: usize,
}

impl Attention {
    fn load(vb: VarBuilder, cfg: &BertConfig) -> Result<Self> {
        let h = cfg.hidden_size;
        let proj = |name: &str| candle_nn::linear(h, h, vb.pp("self").pp(name));
        Ok(Self {
            qkv: [proj("query")?, proj("key")?, proj("value")?],
            out: candle_nn::linear(h, h, vb.pp("output").pp("dense"))?,
            norm: candle_nn::layer_norm(h, cfg.layer_norm_eps, vb.pp("output").pp("LayerNorm"))?,
            num_heads: cfg.num_heads,
            head_dim: cfg.head_dim(),
        })
    }

    /// (batch, seq, hidden) -> (batch, heads, seq, head_dim)
    fn heads(&self, x: &Tensor, proj: &Linear) -> Result<Tensor> {
        let (b, s, _) = x.dims3()?;
        Ok(proj
            .forward(x)?
            .reshape((b, s, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (b, s, h) = x.dims3()?;
        let [q, k, v] = &self.qkv;
        let (q, k, v) = (self.heads(x, q)?, self.heads(x, k)?, self.heads(x, v)?);

        let scores = (q.matmul(&k.t()?)? / (self.head_dim as f64).sqrt())?;
        let probs = candle_nn::ops::softmax_last_dim(&scores)?;
        let context = probs
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, s, h))?;

        let projected = self.out.forward(&context)?;
        Ok(self.norm.forward(&(x + projected)?)?)
    }
}

struct FeedForward {
    up: Linear,
    down: Linear,
    norm: LayerNorm,
}

impl FeedForward {
    fn load(vb: VarBuilder, cfg: &BertConfig) -> Result<Self> {
        Ok(Self {
            up: candle_nn::linear(
                cfg.hidden_size,
                cfg.intermediate_size,
                vb.pp("intermediate").pp("dense"),
            )?,
            down: candle_nn::linear(
                cfg.intermediate_size,
                cfg.hidden_size,
                vb.pp("output").pp("dense"),
            )?,
            norm: candle_nn::layer_norm(
                cfg.hidden_size,
                cfg.layer_norm_eps,
                vb.pp("output").pp("LayerNorm"),
            )?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let y = self.down.forward(&self.up.forward(x)?.gelu_erf()?)?;
        Ok(self.norm.forward(&(x + y)?)?)
    }
}

pub(crate) struct BertEncoder {
    embeddings: Embeddings,
    layers: Vec<(Attention, FeedForward)>,
    max_len: usize,
    device: Device,
}

impl BertEncoder {
    /// `vb` must point at the level holding `embeddings.*` and `encoder.*`.
    pub fn load(vb: &VarBuilder, config: BertConfig) -> Result<Self> {
        let embeddings = Embeddings::load(vb.pp("embeddings"), &config)?;
        let layers = (0..config.num_layers)
            .map(|i| {
                let layer = vb.pp("encoder").pp("layer").pp(i.to_string());
                Ok((
                    Attention::load(layer.pp("attention"), &config)?,
                    FeedForward::load(layer, &config)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            embeddings,
            layers,
            max_len: config.max_position_embeddings,
            device: vb.device().clone(),
        })
    }

    /// Hidden states shaped `(1, seq_len, hidden)`. Sequences longer than the
    /// position table are truncated.
    pub fn forward(&self, token_ids: &[u32], type_ids: &[u32]) -> Result<Tensor> {
        let len = token_ids.len().min(self.max_len);
        if len == 0 {
            return Err(FaqError::Model("empty token sequence".to_string()));
        }

        let types: Vec<u32> = (0..len)
            .map(|i| type_ids.get(i).copied().unwrap_or(0))
            .collect();
        let ids = Tensor::new(&token_ids[..len], &self.device)?.unsqueeze(0)?;
        let types = Tensor::new(types.as_slice(), &self.device)?.unsqueeze(0)?;
        let positions = Tensor::arange(0u32, len as u32, &self.device)?.unsqueeze(0)?;

        let mut hidden = self.embeddings.forward(&ids, &types, &positions)?;
        for (attention, ffn) in &self.layers {
            hidden = ffn.forward(&attention.forward(&hidden)?)?;
        }
        Ok(hidden)
    }
}

/// Last-dimension mean over the sequence axis, then L2 normalization.
pub(crate) fn mean_pool_normalized(hidden: &Tensor) -> Result<Vec<f32>> {
    let pooled = hidden.mean(1)?.squeeze(0)?;
    let norm = pooled.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?;
    let pooled = match norm.to_vec1::<f32>()?.first() {
        Some(n) if *n > 0.0 => pooled.broadcast_div(&norm)?,
        _ => pooled,
    };
    Ok(pooled.to_vec1::<f32>()?)
}

pub(crate) fn mmap_safetensors(path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    if !path.exists() {
        return Err(FaqError::Config(format!(
            "model file not found: {}",
            path.display()
        )));
    }
    // SAFETY: the file is not modified while mapped.
    let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? };
    Ok(vb)
}

pub(crate) fn load_tokenizer(path: &Path) -> Result<tokenizers::Tokenizer> {
    tokenizers::Tokenizer::from_file(path)
        .map_err(|e| FaqError::Model(format!("load tokenizer {}: {e}", path.display())))
}
