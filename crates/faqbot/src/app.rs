//! Builds pipeline components from configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use faqbot_core::{
    load_corpus, load_index_jsonl, Credentials, CrossEncoderReranker, DenseRetriever,
    EmbedderKind, EmbeddingProvider, HashEmbeddingProvider, InteractionLog, LexicalRetriever,
    LibreTranslateClient, MiniLmEmbeddingProvider, OpenAiChatClient, OpenAiEmbeddingProvider,
    Pipeline, PipelineConfig, Responder, ResponseMode, RetrievalStrategy, Retriever,
};

use crate::cli::PipelineArgs;
use crate::offload::{OffloadedEmbedder, OffloadedReranker};

/// Where the knowledge base comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Corpus(PathBuf),
    Index(PathBuf),
}

impl DataSource {
    pub fn from_args(args: &PipelineArgs) -> Result<Self> {
        match (&args.corpus, &args.index) {
            (Some(corpus), None) => Ok(DataSource::Corpus(corpus.clone())),
            (None, Some(index)) => Ok(DataSource::Index(index.clone())),
            (Some(_), Some(_)) => bail!("--corpus and --index are mutually exclusive"),
            (None, None) => bail!("a knowledge base is required: pass --corpus or --index"),
        }
    }
}

/// Config file (or defaults) with command-line overrides applied, validated.
pub fn load_config(args: &PipelineArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    if let Some(kind) = args.embedder {
        config.embedder.kind = kind;
    }
    if let Some(path) = &args.model_path {
        config.embedder.model_path = Some(path.clone());
    }
    if let Some(path) = &args.tokenizer_path {
        config.embedder.tokenizer_path = Some(path.clone());
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if let Some(top_k) = args.top_k {
        config.top_k = top_k;
    }
    if let Some(top_n) = args.top_n {
        config.top_n = top_n;
    }
    if let Some(mode) = args.responder {
        config.responder = mode;
    }
    if args.rerank {
        config.reranker.enabled = true;
    }
    if args.translate {
        config.translation.enabled = true;
    }
    if let Some(path) = &args.log_file {
        config.log_file = Some(path.clone());
    }

    config.validate()?;
    Ok(config)
}

/// Fail fast on credentials the configured components need.
pub fn check_credentials(config: &PipelineConfig, creds: &Credentials) -> Result<()> {
    if config.needs_openai() {
        creds.openai_api_key()?;
    }
    Ok(())
}

pub fn build_embedder(
    config: &PipelineConfig,
    creds: &Credentials,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.embedder.kind {
        EmbedderKind::Hash => Arc::new(HashEmbeddingProvider::new(config.embedder.dim)),
        EmbedderKind::Minilm => {
            let (Some(model), Some(tokenizer)) =
                (&config.embedder.model_path, &config.embedder.tokenizer_path)
            else {
                bail!("the minilm embedder needs --model-path and --tokenizer-path");
            };
            tracing::info!(model = %model.display(), "loading embedding model");
            let local = MiniLmEmbeddingProvider::load(model, tokenizer)?;
            Arc::new(OffloadedEmbedder::new(Arc::new(local)))
        }
        EmbedderKind::Openai => Arc::new(OpenAiEmbeddingProvider::new(
            &config.openai.base_url,
            &config.openai.embedding_model,
            creds.openai_api_key()?,
            Duration::from_secs(config.openai.timeout_secs),
        )?),
    };
    Ok(embedder)
}

pub async fn build_retriever(
    config: &PipelineConfig,
    creds: &Credentials,
    source: &DataSource,
) -> Result<Box<dyn Retriever>> {
    match (config.strategy, source) {
        (RetrievalStrategy::Lexical, DataSource::Corpus(path)) => {
            Ok(Box::new(LexicalRetriever::new(load_corpus(path)?)))
        }
        (RetrievalStrategy::Lexical, DataSource::Index(path)) => {
            let records = load_index_jsonl(path)?.iter().map(|e| e.record()).collect();
            Ok(Box::new(LexicalRetriever::new(records)))
        }
        (RetrievalStrategy::Dense, DataSource::Corpus(path)) => {
            let records = load_corpus(path)?;
            let embedder = build_embedder(config, creds)?;
            Ok(Box::new(DenseRetriever::build(embedder, records).await?))
        }
        (RetrievalStrategy::Dense, DataSource::Index(path)) => {
            let entries = load_index_jsonl(path)?;
            let embedder = build_embedder(config, creds)?;
            if let Some(source) = entries.first().and_then(|e| e.source.as_deref()) {
                if source != embedder.name() {
                    tracing::warn!(
                        index = source,
                        embedder = embedder.name(),
                        "index was built with a different embedder"
                    );
                }
            }
            tracing::info!(records = entries.len(), index = %path.display(), "prebuilt index loaded");
            Ok(Box::new(DenseRetriever::from_entries(embedder, entries)))
        }
    }
}

pub async fn build_pipeline(
    config: &PipelineConfig,
    creds: &Credentials,
    source: &DataSource,
) -> Result<Pipeline> {
    check_credentials(config, creds)?;

    let retriever = build_retriever(config, creds, source).await?;
    let mut pipeline = Pipeline::new(retriever, config);

    if config.reranker.enabled {
        let (Some(model), Some(tokenizer)) =
            (&config.reranker.model_path, &config.reranker.tokenizer_path)
        else {
            bail!("the reranker needs reranker.model_path and reranker.tokenizer_path");
        };
        tracing::info!(model = %model.display(), "loading reranker");
        let local = CrossEncoderReranker::load(model, tokenizer)?;
        pipeline = pipeline.with_reranker(Box::new(OffloadedReranker::new(Arc::new(local))));
    }

    if config.translation.enabled {
        let client = LibreTranslateClient::new(
            &config.translation.base_url,
            creds.translate_api_key.clone(),
            Duration::from_secs(config.translation.timeout_secs),
        )?;
        pipeline = pipeline.with_translator(Box::new(client));
    }

    if config.responder == ResponseMode::Generative {
        let client = OpenAiChatClient::new(
            &config.openai.base_url,
            &config.openai.chat_model,
            creds.openai_api_key()?,
            config.openai.temperature,
            Duration::from_secs(config.openai.timeout_secs),
        )?;
        pipeline = pipeline.with_responder(Responder::Generative(Arc::new(client)));
    }

    if let Some(path) = &config.log_file {
        let log = InteractionLog::open(path)
            .with_context(|| format!("open interaction log {}", path.display()))?;
        pipeline = pipeline.with_log(log);
    }

    tracing::info!(
        strategy = %config.strategy,
        threshold = config.threshold,
        top_k = config.top_k,
        top_n = config.top_n,
        responder = %config.responder,
        rerank = config.reranker.enabled,
        translate = config.translation.enabled,
        "pipeline ready"
    );
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::Cli;

    fn args(extra: &[&str]) -> PipelineArgs {
        let mut argv = vec!["faqbot"];
        argv.extend_from_slice(extra);
        argv.push("chat");
        Cli::try_parse_from(argv).unwrap().pipeline
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faqbot.toml");
        std::fs::write(&path, "threshold = 0.8\ntop_k = 7\nstrategy = \"lexical\"\n").unwrap();

        let config = load_config(&args(&[
            "--config",
            path.to_str().unwrap(),
            "--threshold",
            "0.6",
        ]))
        .unwrap();
        assert_eq!(config.threshold, 0.6);
        assert_eq!(config.top_k, 7);
        assert_eq!(config.strategy, RetrievalStrategy::Lexical);
    }

    #[test]
    fn generative_mode_requires_an_api_key() {
        let config = load_config(&args(&["--responder", "generative"])).unwrap();
        let err = check_credentials(&config, &Credentials::default()).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn data_source_needs_exactly_one_input() {
        assert!(DataSource::from_args(&args(&[])).is_err());
        assert_eq!(
            DataSource::from_args(&args(&["--corpus", "faq.csv"])).unwrap(),
            DataSource::Corpus(PathBuf::from("faq.csv"))
        );
    }

    #[tokio::test]
    async fn lexical_pipeline_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("faq.csv");
        std::fs::write(&corpus, "question,answer\nWhat is poker?,A card game.\n").unwrap();

        let config = load_config(&args(&["--strategy", "lexical"])).unwrap();
        let pipeline = build_pipeline(&config, &Credentials::default(), &DataSource::Corpus(corpus))
            .await
            .unwrap();
        let reply = pipeline.answer("What is poker?").await.unwrap();
        assert_eq!(reply.text, "A card game.");
    }
}
