//! Pipeline configuration.
//!
//! One [`PipelineConfig`] is built at startup (TOML file, then command-line
//! overrides) and handed to each component's constructor. Credentials are
//! kept apart in [`Credentials`] and come from the environment only.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FaqError, Result};

/// Uncalibrated default. Run `faqbot eval` on labeled cases before relying
/// on it; observed working values range from 0.5 to 0.78 depending on the
/// embedder.
pub const DEFAULT_THRESHOLD: f32 = 0.55;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_TOP_N: usize = 3;
pub const DEFAULT_REQUIRED_PASS_RATE: f32 = 0.85;
pub const DEFAULT_EMBEDDING_DIM: usize = 768;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_TRANSLATE_URL: &str = "http://localhost:5000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const TELEGRAM_BOT_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const TRANSLATE_API_KEY_VAR: &str = "TRANSLATE_API_KEY";

macro_rules! str_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "unknown {} '{other}' (expected one of: {})",
                        stringify!($name),
                        [$($text),+].join(", ")
                    )),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    #[default]
    Dense,
    Lexical,
}

str_enum!(RetrievalStrategy { Dense => "dense", Lexical => "lexical" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    #[default]
    Hash,
    Minilm,
    Openai,
}

str_enum!(EmbedderKind { Hash => "hash", Minilm => "minilm", Openai => "openai" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    #[default]
    Verbatim,
    Generative,
}

str_enum!(ResponseMode { Verbatim => "verbatim", Generative => "generative" });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub kind: EmbedderKind,
    /// Dimension of the hash embedder.
    pub dim: usize,
    /// MiniLM safetensors file.
    pub model_path: Option<PathBuf>,
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            kind: EmbedderKind::Hash,
            dim: DEFAULT_EMBEDDING_DIM,
            model_path: None,
            tokenizer_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    pub enabled: bool,
    /// Cross-encoder safetensors file.
    pub model_path: Option<PathBuf>,
    pub tokenizer_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            temperature: 0.0,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Language the corpus is written in; queries are translated into it.
    pub pivot_language: String,
    /// Assumed query language when detection fails.
    pub fallback_language: String,
    pub timeout_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: DEFAULT_TRANSLATE_URL.to_string(),
            pivot_language: "en".to_string(),
            fallback_language: "en".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// User-facing texts, written in the pivot language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub greeting: String,
    pub no_match: String,
    pub suggestions_header: String,
    pub error: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            greeting: "Hi! I'm the FAQ bot. Ask me a question :)".to_string(),
            no_match: "Sorry, I couldn't find a confident answer to that.".to_string(),
            suggestions_header: "Maybe you meant:".to_string(),
            error: "Sorry, something went wrong while answering. Please try again later."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub strategy: RetrievalStrategy,
    pub threshold: f32,
    /// Candidates fetched by the retriever.
    pub top_k: usize,
    /// Candidates kept after reranking; also the number of suggestions.
    pub top_n: usize,
    pub embedder: EmbedderConfig,
    pub reranker: RerankerConfig,
    pub responder: ResponseMode,
    pub openai: OpenAiConfig,
    pub translation: TranslationConfig,
    pub messages: Messages,
    pub log_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: RetrievalStrategy::Dense,
            threshold: DEFAULT_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            top_n: DEFAULT_TOP_N,
            embedder: EmbedderConfig::default(),
            reranker: RerankerConfig::default(),
            responder: ResponseMode::Verbatim,
            openai: OpenAiConfig::default(),
            translation: TranslationConfig::default(),
            messages: Messages::default(),
            log_file: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| FaqError::Config(format!("invalid config: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FaqError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() {
            return Err(FaqError::Config("threshold must be a finite number".to_string()));
        }
        if self.top_k == 0 || self.top_n == 0 {
            return Err(FaqError::Config("top_k and top_n must be at least 1".to_string()));
        }
        if self.top_n > self.top_k {
            return Err(FaqError::Config(format!(
                "top_n ({}) must not exceed top_k ({})",
                self.top_n, self.top_k
            )));
        }
        if self.strategy == RetrievalStrategy::Dense
            && self.embedder.kind == EmbedderKind::Minilm
            && (self.embedder.model_path.is_none() || self.embedder.tokenizer_path.is_none())
        {
            return Err(FaqError::Config(
                "the minilm embedder needs embedder.model_path and embedder.tokenizer_path"
                    .to_string(),
            ));
        }
        if self.reranker.enabled
            && (self.reranker.model_path.is_none() || self.reranker.tokenizer_path.is_none())
        {
            return Err(FaqError::Config(
                "the reranker needs reranker.model_path and reranker.tokenizer_path".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether any configured component calls the OpenAI API.
    pub fn needs_openai(&self) -> bool {
        self.responder == ResponseMode::Generative
            || (self.strategy == RetrievalStrategy::Dense
                && self.embedder.kind == EmbedderKind::Openai)
    }
}

/// Secrets read from the environment at startup.
#[derive(Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub translate_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("telegram_bot_token", &mask(&self.telegram_bot_token))
            .field("translate_api_key", &mask(&self.translate_api_key))
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            openai_api_key: var(OPENAI_API_KEY_VAR),
            telegram_bot_token: var(TELEGRAM_BOT_TOKEN_VAR),
            translate_api_key: var(TRANSLATE_API_KEY_VAR),
        }
    }

    pub fn openai_api_key(&self) -> Result<&str> {
        require(&self.openai_api_key, OPENAI_API_KEY_VAR)
    }

    pub fn telegram_bot_token(&self) -> Result<&str> {
        require(&self.telegram_bot_token, TELEGRAM_BOT_TOKEN_VAR)
    }
}

fn require<'a>(value: &'a Option<String>, var: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| FaqError::Config(format!("{var} is not set (environment or .env file)")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
        assert!(!config.needs_openai());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            strategy = "lexical"
            threshold = 0.7
            responder = "generative"

            [translation]
            enabled = true
            fallback_language = "ru"
            "#,
        )
        .unwrap();

        assert_eq!(config.strategy, RetrievalStrategy::Lexical);
        assert_eq!(config.threshold, 0.7);
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert!(config.translation.enabled);
        assert_eq!(config.translation.pivot_language, "en");
        assert_eq!(config.translation.fallback_language, "ru");
        assert_eq!(config.openai.chat_model, DEFAULT_CHAT_MODEL);
        assert!(config.needs_openai());
    }

    #[test]
    fn unknown_strategy_is_a_config_error() {
        let err = PipelineConfig::from_toml_str("strategy = \"fuzzy\"").unwrap_err();
        assert!(matches!(err, FaqError::Config(_)));
    }

    #[test]
    fn top_n_above_top_k_is_rejected() {
        let config = PipelineConfig {
            top_k: 2,
            top_n: 3,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn minilm_without_paths_is_rejected() {
        let mut config = PipelineConfig::default();
        config.embedder.kind = EmbedderKind::Minilm;
        assert!(config.validate().is_err());

        config.strategy = RetrievalStrategy::Lexical;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn enums_parse_from_cli_strings() {
        assert_eq!("Lexical".parse::<RetrievalStrategy>(), Ok(RetrievalStrategy::Lexical));
        assert_eq!("openai".parse::<EmbedderKind>(), Ok(EmbedderKind::Openai));
        assert!("sparse".parse::<RetrievalStrategy>().unwrap_err().contains("dense, lexical"));
    }

    #[test]
    fn missing_credentials_are_descriptive() {
        let creds = Credentials::default();
        let err = creds.openai_api_key().unwrap_err();
        assert!(err.to_string().contains(OPENAI_API_KEY_VAR));
        assert!(format!("{creds:?}").contains("<unset>"));
    }
}
