use std::sync::Arc;

use crate::llm::{ChatModel, Message};
use crate::model::{AnswerSource, FaqRecord};

const SYSTEM_PROMPT: &str = "You answer customer questions using only the FAQ entry provided as \
context. Answer in the language of the question, briefly. If the context does not contain \
the answer, reply exactly: I don't know.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
}

/// Turns a confident match into reply text.
pub enum Responder {
    /// Return the stored answer as is.
    Verbatim,
    /// Ask a chat model, with the matched pair as context.
    Generative(Arc<dyn ChatModel>),
}

impl Responder {
    pub async fn respond(&self, query: &str, record: &FaqRecord) -> Answer {
        match self {
            Responder::Verbatim => Answer {
                text: record.answer.clone(),
                source: AnswerSource::Faq,
            },
            Responder::Generative(model) => match model.complete(&build_prompt(query, record)).await {
                Ok(text) => Answer {
                    text,
                    source: AnswerSource::Llm,
                },
                Err(err) => {
                    tracing::warn!(%err, entry_id = %record.id, "LLM answer failed; returning stored answer");
                    Answer {
                        text: record.answer.clone(),
                        source: AnswerSource::LlmFallback,
                    }
                }
            },
        }
    }
}

pub fn build_prompt(query: &str, record: &FaqRecord) -> Vec<Message> {
    vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(format!(
            "Context:\nQ: {}\nA: {}\n\nQuestion: {}",
            record.question, record.answer, query
        )),
    ]
}
