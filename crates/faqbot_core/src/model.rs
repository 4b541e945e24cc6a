use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A question/answer pair from the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqRecord {
    pub id: String,
    pub question: String,
    pub answer: String,
}

/// A record together with the embedding of its question, as stored in a
/// prebuilt index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqEntry {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub source: Option<String>,
}

impl FaqEntry {
    pub fn new(record: FaqRecord, embedding: Vec<f32>, source: Option<String>) -> Self {
        Self {
            id: record.id,
            question: record.question,
            answer: record.answer,
            embedding,
            created_at: Utc::now(),
            source,
        }
    }

    pub fn record(&self) -> FaqRecord {
        FaqRecord {
            id: self.id.clone(),
            question: self.question.clone(),
            answer: self.answer.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub record: FaqRecord,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Confident,
    NoConfidentMatch,
}

/// Which path produced the text of a reply. Written to the interaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Stored answer returned verbatim.
    Faq,
    /// Answer synthesized by the language model.
    Llm,
    /// The language model failed and the stored answer was used instead.
    LlmFallback,
    /// No confident match; the reply lists suggestions.
    Suggestions,
}

impl AnswerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerSource::Faq => "faq",
            AnswerSource::Llm => "llm",
            AnswerSource::LlmFallback => "llm_fallback",
            AnswerSource::Suggestions => "suggestions",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub query: String,
    pub text: String,
    pub decision: Decision,
    pub source: AnswerSource,
    pub score: f32,
    pub entry_id: Option<String>,
    /// Suggested questions, already in the user's language.
    pub suggestions: Vec<String>,
    /// Detected language of the query, when translation is enabled.
    pub language: Option<String>,
}
