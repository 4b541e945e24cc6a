use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaqError {
    /// Missing credentials, unreadable config file, invalid settings.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to load FAQ data from {}: {reason}", path.display())]
    DataLoad { path: PathBuf, reason: String },

    /// An external service (embeddings, LLM, translation, bot API) failed.
    #[error("{service} request failed: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    #[error("model error: {0}")]
    Model(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl FaqError {
    pub fn data_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DataLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn upstream(service: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Upstream {
            service,
            message: err.to_string(),
        }
    }
}

impl From<candle_core::Error> for FaqError {
    fn from(err: candle_core::Error) -> Self {
        Self::Model(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FaqError>;
