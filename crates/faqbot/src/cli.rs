use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use faqbot_core::{EmbedderKind, ResponseMode, RetrievalStrategy, DEFAULT_REQUIRED_PASS_RATE};

#[derive(Debug, Parser)]
#[command(name = "faqbot", version, about = "FAQ chatbot over a question/answer corpus")]
pub struct Cli {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand. Unset flags keep the value from the
/// config file, or its default.
#[derive(Debug, Args)]
pub struct PipelineArgs {
    /// TOML pipeline configuration.
    #[arg(long, global = true, env = "FAQBOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Corpus file (.csv with question/answer columns, or .jsonl).
    #[arg(long, global = true, env = "FAQBOT_CORPUS", conflicts_with = "index")]
    pub corpus: Option<PathBuf>,

    /// Prebuilt JSONL index from `build-index` (dense retrieval only).
    #[arg(long, global = true, env = "FAQBOT_INDEX")]
    pub index: Option<PathBuf>,

    #[arg(long, global = true)]
    pub strategy: Option<RetrievalStrategy>,

    #[arg(long, global = true)]
    pub embedder: Option<EmbedderKind>,

    /// Safetensors weights for the minilm embedder.
    #[arg(long, global = true)]
    pub model_path: Option<PathBuf>,

    /// tokenizer.json matching --model-path.
    #[arg(long, global = true)]
    pub tokenizer_path: Option<PathBuf>,

    #[arg(long, global = true, env = "FAQBOT_THRESHOLD")]
    pub threshold: Option<f32>,

    #[arg(long, global = true)]
    pub top_k: Option<usize>,

    #[arg(long, global = true)]
    pub top_n: Option<usize>,

    #[arg(long, global = true)]
    pub responder: Option<ResponseMode>,

    /// Enable the cross-encoder reranker (paths come from the config file).
    #[arg(long, global = true)]
    pub rerank: bool,

    /// Enable query/answer translation.
    #[arg(long, global = true)]
    pub translate: bool,

    #[arg(long, global = true, env = "FAQBOT_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Embed every corpus question once and write a JSONL index.
    BuildIndex {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Answer one question and exit.
    Query {
        #[arg(long)]
        question: String,
        /// Print the full reply as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Interactive prompt on stdin.
    Chat,
    /// HTTP endpoint: POST /query, GET /health.
    Serve {
        #[arg(long, env = "FAQBOT_ADDR", default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
    /// Telegram long-poll bot.
    Telegram {
        #[arg(long, env = "TELEGRAM_API_BASE", default_value = "https://api.telegram.org")]
        api_base: String,
        /// Long-poll timeout in seconds.
        #[arg(long, default_value_t = 30)]
        poll_timeout: u64,
    },
    /// Run labeled cases through retrieval and the gate.
    Eval {
        #[arg(long)]
        cases: PathBuf,
        #[arg(long, default_value_t = DEFAULT_REQUIRED_PASS_RATE)]
        min_pass_rate: f32,
        /// Also sweep thresholds and report the best one.
        #[arg(long)]
        calibrate: bool,
    },
}
