mod bert;
pub mod config;
pub mod corpus;
pub mod embed;
pub mod error;
pub mod eval;
pub mod gate;
mod http;
pub mod interaction_log;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod rerank;
pub mod responder;
pub mod retrieval;
pub mod storage;
pub mod translate;

pub use config::{
    Credentials, EmbedderKind, Messages, PipelineConfig, ResponseMode, RetrievalStrategy,
    DEFAULT_EMBEDDING_DIM, DEFAULT_REQUIRED_PASS_RATE, DEFAULT_THRESHOLD, DEFAULT_TOP_K,
    DEFAULT_TOP_N,
};
pub use corpus::load_corpus;
pub use embed::{
    EmbeddingProvider, HashEmbeddingProvider, MiniLmEmbeddingProvider, OpenAiEmbeddingProvider,
};
pub use error::{FaqError, Result};
pub use eval::{
    calibrate_threshold, evaluate_cases, load_cases, probe_cases, score_probes, threshold_grid,
    CaseExpectation, CaseProbe, EvalCase, EvalOutcome, EvalSummary,
};
pub use gate::{GateOutcome, RelevanceGate};
pub use interaction_log::InteractionLog;
pub use llm::{ChatModel, Message, OpenAiChatClient};
pub use model::{AnswerSource, Decision, FaqEntry, FaqRecord, Reply, RetrievalResult};
pub use pipeline::Pipeline;
pub use rerank::{rerank, CrossEncoderReranker, Reranker};
pub use responder::{Answer, Responder};
pub use retrieval::{
    cosine_similarity, tokenize, top_k, Bm25Index, DenseRetriever, LexicalRetriever, Retriever,
};
pub use storage::{load_index_jsonl, save_index_jsonl};
pub use translate::{LibreTranslateClient, Translator};
