//! Query pipeline shared by every transport.
//!
//! detect language -> translate to pivot -> retrieve top_k -> rerank to top_n
//! -> gate -> respond or suggest -> translate back -> log.

use crate::config::{Messages, PipelineConfig};
use crate::error::Result;
use crate::gate::RelevanceGate;
use crate::interaction_log::InteractionLog;
use crate::model::{AnswerSource, Decision, Reply, RetrievalResult};
use crate::rerank::{rerank, Reranker};
use crate::responder::Responder;
use crate::retrieval::Retriever;
use crate::translate::{detect_or, translate_or_original, Translator};

pub struct Pipeline {
    retriever: Box<dyn Retriever>,
    reranker: Option<Box<dyn Reranker>>,
    translator: Option<Box<dyn Translator>>,
    responder: Responder,
    gate: RelevanceGate,
    log: Option<InteractionLog>,
    top_k: usize,
    top_n: usize,
    pivot_language: String,
    fallback_language: String,
    messages: Messages,
}

impl Pipeline {
    /// Verbatim responder, no reranker, no translation, no log. The `with_*`
    /// methods add the optional stages.
    pub fn new(retriever: Box<dyn Retriever>, config: &PipelineConfig) -> Self {
        Self {
            retriever,
            reranker: None,
            translator: None,
            responder: Responder::Verbatim,
            gate: RelevanceGate::new(config.threshold),
            log: None,
            top_k: config.top_k.max(1),
            top_n: config.top_n.clamp(1, config.top_k.max(1)),
            pivot_language: config.translation.pivot_language.clone(),
            fallback_language: config.translation.fallback_language.clone(),
            messages: config.messages.clone(),
        }
    }

    pub fn with_reranker(mut self, reranker: Box<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_translator(mut self, translator: Box<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_responder(mut self, responder: Responder) -> Self {
        self.responder = responder;
        self
    }

    pub fn with_log(mut self, log: InteractionLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn gate(&self) -> &RelevanceGate {
        &self.gate
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    /// Ranked candidates for a query already in the pivot language: the
    /// retriever's top_k, then reranked (or truncated) to top_n.
    pub async fn search(&self, query: &str) -> Result<Vec<RetrievalResult>> {
        let mut candidates = self.retriever.retrieve(query, self.top_k).await?;

        if let Some(reranker) = &self.reranker {
            match rerank(reranker.as_ref(), query, candidates.clone(), self.top_n).await {
                Ok(reranked) => return Ok(reranked),
                Err(err) => {
                    tracing::warn!(%err, "reranking failed; keeping retrieval order");
                }
            }
        }

        candidates.truncate(self.top_n);
        Ok(candidates)
    }

    /// Answer one user message. Translation and LLM failures degrade the
    /// reply; retrieval failures are returned to the caller.
    pub async fn answer(&self, query: &str) -> Result<Reply> {
        let query = query.trim();
        let (pivot_query, language) = self.to_pivot(query).await;

        let ranked = self.search(&pivot_query).await?;
        let outcome = self.gate.assess(&ranked);
        tracing::debug!(
            query = %pivot_query,
            decision = ?outcome.decision,
            score = outcome.score,
            candidates = ranked.len(),
            "query assessed"
        );

        let reply = match (outcome.decision, outcome.best) {
            (Decision::Confident, Some(best)) => {
                let answer = self.responder.respond(&pivot_query, &best.record).await;
                Reply {
                    query: query.to_string(),
                    text: self.to_user_language(&answer.text, language.as_deref()).await,
                    decision: Decision::Confident,
                    source: answer.source,
                    score: outcome.score,
                    entry_id: Some(best.record.id.clone()),
                    suggestions: Vec::new(),
                    language,
                }
            }
            _ => {
                let mut suggestions = Vec::with_capacity(ranked.len());
                for candidate in &ranked {
                    suggestions.push(
                        self.to_user_language(&candidate.record.question, language.as_deref())
                            .await,
                    );
                }
                let text = self.no_match_text(&suggestions, language.as_deref()).await;
                Reply {
                    query: query.to_string(),
                    text,
                    decision: Decision::NoConfidentMatch,
                    source: AnswerSource::Suggestions,
                    score: outcome.score,
                    entry_id: None,
                    suggestions,
                    language,
                }
            }
        };

        if let Some(log) = &self.log {
            if let Err(err) = log.record(&reply) {
                tracing::warn!(%err, path = %log.path().display(), "failed to append interaction log");
            }
        }

        Ok(reply)
    }

    /// The query in the pivot language, with its detected language when a
    /// translator is configured.
    pub async fn to_pivot(&self, query: &str) -> (String, Option<String>) {
        let Some(t) = &self.translator else {
            return (query.to_string(), None);
        };
        let lang = detect_or(t.as_ref(), query, &self.fallback_language).await;
        let pivot = translate_or_original(t.as_ref(), query, &lang, &self.pivot_language).await;
        (pivot, Some(lang))
    }

    async fn to_user_language(&self, text: &str, language: Option<&str>) -> String {
        match (&self.translator, language) {
            (Some(t), Some(lang)) => {
                translate_or_original(t.as_ref(), text, &self.pivot_language, lang).await
            }
            _ => text.to_string(),
        }
    }

    async fn no_match_text(&self, suggestions: &[String], language: Option<&str>) -> String {
        let mut text = self.to_user_language(&self.messages.no_match, language).await;
        if !suggestions.is_empty() {
            let header = self
                .to_user_language(&self.messages.suggestions_header, language)
                .await;
            text.push('\n');
            text.push_str(&header);
            for suggestion in suggestions {
                text.push_str("\n• ");
                text.push_str(suggestion);
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::config::RetrievalStrategy;
    use crate::embed::HashEmbeddingProvider;
    use crate::error::FaqError;
    use crate::llm::{ChatModel, Message};
    use crate::model::FaqRecord;
    use crate::retrieval::{DenseRetriever, LexicalRetriever};

    fn record(id: &str, question: &str, answer: &str) -> FaqRecord {
        FaqRecord {
            id: id.to_string(),
            question: question.to_string(),
            answer: answer.to_string(),
        }
    }

    fn poker_corpus() -> Vec<FaqRecord> {
        vec![record("faq-1", "What is poker?", "A card game.")]
    }

    fn card_corpus() -> Vec<FaqRecord> {
        vec![
            record("faq-1", "What is poker?", "A card game."),
            record("faq-2", "How many cards are in a deck?", "Fifty-two."),
            record("faq-3", "Who deals the cards first?", "The player left of the button."),
            record("faq-4", "What beats a flush?", "A full house."),
        ]
    }

    async fn retriever(strategy: RetrievalStrategy, corpus: Vec<FaqRecord>) -> Box<dyn Retriever> {
        match strategy {
            RetrievalStrategy::Dense => Box::new(
                DenseRetriever::build(Arc::new(HashEmbeddingProvider::new(256)), corpus)
                    .await
                    .unwrap(),
            ),
            RetrievalStrategy::Lexical => Box::new(LexicalRetriever::new(corpus)),
        }
    }

    async fn pipeline(strategy: RetrievalStrategy, corpus: Vec<FaqRecord>) -> Pipeline {
        let config = PipelineConfig {
            strategy,
            ..PipelineConfig::default()
        };
        Pipeline::new(retriever(strategy, corpus).await, &config)
    }

    #[tokio::test]
    async fn exact_question_returns_stored_answer() {
        for strategy in [RetrievalStrategy::Dense, RetrievalStrategy::Lexical] {
            let pipeline = pipeline(strategy, poker_corpus()).await;
            let reply = pipeline.answer("What is poker?").await.unwrap();
            assert_eq!(reply.decision, Decision::Confident, "{strategy}");
            assert_eq!(reply.text, "A card game.");
            assert_eq!(reply.source, AnswerSource::Faq);
            assert_eq!(reply.entry_id.as_deref(), Some("faq-1"));
            assert!((reply.score - 1.0).abs() < 1e-4);
        }
    }

    #[tokio::test]
    async fn nonsense_returns_suggestions() {
        for strategy in [RetrievalStrategy::Dense, RetrievalStrategy::Lexical] {
            let pipeline = pipeline(strategy, poker_corpus()).await;
            let reply = pipeline.answer("asdkjhasdf unrelated nonsense").await.unwrap();
            assert_eq!(reply.decision, Decision::NoConfidentMatch, "{strategy}");
            assert_eq!(reply.source, AnswerSource::Suggestions);
            assert_eq!(reply.suggestions, vec!["What is poker?".to_string()]);
            assert!(reply.text.starts_with(&Messages::default().no_match));
            assert!(reply.text.contains("• What is poker?"));
            assert!(reply.entry_id.is_none());
        }
    }

    #[tokio::test]
    async fn shared_filler_words_do_not_pass_the_gate() {
        for strategy in [RetrievalStrategy::Dense, RetrievalStrategy::Lexical] {
            let pipeline = pipeline(strategy, poker_corpus()).await;
            let reply = pipeline.answer("What is the capital of France?").await.unwrap();
            assert_eq!(reply.decision, Decision::NoConfidentMatch, "{strategy}");
            assert_eq!(reply.source, AnswerSource::Suggestions);
        }

        let lexical = pipeline(RetrievalStrategy::Lexical, poker_corpus()).await;
        let reply = lexical.answer("What is love?").await.unwrap();
        assert_eq!(reply.decision, Decision::NoConfidentMatch);
    }

    #[tokio::test]
    async fn suggestions_are_capped_at_top_n() {
        let pipeline = pipeline(RetrievalStrategy::Lexical, card_corpus()).await;
        let reply = pipeline.answer("tell me about the moon").await.unwrap();
        assert_eq!(reply.decision, Decision::NoConfidentMatch);
        assert_eq!(reply.suggestions.len(), crate::config::DEFAULT_TOP_N);
    }

    #[tokio::test]
    async fn empty_corpus_never_matches() {
        let pipeline = pipeline(RetrievalStrategy::Dense, Vec::new()).await;
        let reply = pipeline.answer("What is poker?").await.unwrap();
        assert_eq!(reply.decision, Decision::NoConfidentMatch);
        assert!(reply.suggestions.is_empty());
        assert_eq!(reply.text, Messages::default().no_match);
    }

    /// Puts the shortest question first.
    struct ShortestFirst;

    #[async_trait]
    impl Reranker for ShortestFirst {
        async fn score_batch(&self, _query: &str, documents: &[&str]) -> Result<Vec<f32>> {
            Ok(documents.iter().map(|d| 1.0 / d.len() as f32).collect())
        }
    }

    struct FailingReranker;

    #[async_trait]
    impl Reranker for FailingReranker {
        async fn score_batch(&self, _query: &str, _documents: &[&str]) -> Result<Vec<f32>> {
            Err(FaqError::Model("weights not loaded".to_string()))
        }
    }

    #[tokio::test]
    async fn reranker_reorders_and_truncates() {
        let config = PipelineConfig {
            top_k: 4,
            top_n: 2,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(Box::new(LexicalRetriever::new(card_corpus())), &config)
            .with_reranker(Box::new(ShortestFirst));

        let ranked = pipeline.search("cards").await.unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].record.question, "What is poker?");
    }

    #[tokio::test]
    async fn reranker_failure_keeps_retrieval_order() {
        let config = PipelineConfig {
            top_k: 4,
            top_n: 2,
            ..PipelineConfig::default()
        };
        let plain = Pipeline::new(Box::new(LexicalRetriever::new(card_corpus())), &config);
        let degraded = Pipeline::new(Box::new(LexicalRetriever::new(card_corpus())), &config)
            .with_reranker(Box::new(FailingReranker));

        let expected = plain.search("how many cards").await.unwrap();
        let actual = degraded.search("how many cards").await.unwrap();
        assert_eq!(actual, expected);
        assert_eq!(actual.len(), 2);
    }

    /// Tiny two-language dictionary standing in for a translation service.
    struct Dictionary;

    const PAIRS: &[(&str, &str)] = &[
        ("Что такое покер?", "What is poker?"),
        ("Карточная игра.", "A card game."),
    ];

    #[async_trait]
    impl crate::translate::Translator for Dictionary {
        async fn detect(&self, text: &str) -> Result<String> {
            let cyrillic = text.chars().any(|c| matches!(c, 'а'..='я' | 'А'..='Я'));
            Ok(if cyrillic { "ru" } else { "en" }.to_string())
        }

        async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
            let found = PAIRS.iter().find_map(|(ru, en)| match (source, target) {
                ("ru", "en") if *ru == text => Some(*en),
                ("en", "ru") if *en == text => Some(*ru),
                _ => None,
            });
            found
                .map(str::to_string)
                .ok_or_else(|| FaqError::upstream("translation", "unknown phrase"))
        }
    }

    #[tokio::test]
    async fn foreign_query_is_answered_in_its_language() {
        let pipeline = pipeline(RetrievalStrategy::Dense, poker_corpus())
            .await
            .with_translator(Box::new(Dictionary));

        let reply = pipeline.answer("Что такое покер?").await.unwrap();
        assert_eq!(reply.language.as_deref(), Some("ru"));
        assert_eq!(reply.decision, Decision::Confident);
        assert_eq!(reply.text, "Карточная игра.");
        assert_eq!(reply.query, "Что такое покер?");

        // Untranslatable messages fall back to the pivot text.
        let reply = pipeline.answer("Абракадабра").await.unwrap();
        assert_eq!(reply.decision, Decision::NoConfidentMatch);
        assert_eq!(reply.suggestions, vec!["Что такое покер?".to_string()]);
        assert!(reply.text.starts_with(&Messages::default().no_match));
    }

    struct Paraphraser;

    #[async_trait]
    impl ChatModel for Paraphraser {
        async fn complete(&self, _messages: &[Message]) -> Result<String> {
            Ok("Poker is a card game.".to_string())
        }
    }

    #[tokio::test]
    async fn generative_responder_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("interactions.csv");

        let pipeline = pipeline(RetrievalStrategy::Lexical, poker_corpus())
            .await
            .with_responder(Responder::Generative(Arc::new(Paraphraser)))
            .with_log(InteractionLog::open(&log_path).unwrap());

        let reply = pipeline.answer("  What is poker?  ").await.unwrap();
        assert_eq!(reply.text, "Poker is a card game.");
        assert_eq!(reply.source, AnswerSource::Llm);
        pipeline.answer("xqzv").await.unwrap();

        let mut reader = csv::Reader::from_path(&log_path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "What is poker?");
        assert_eq!(&rows[0][2], "Poker is a card game.");
        assert_eq!(&rows[0][3], "llm");
        assert_eq!(&rows[1][3], "suggestions");
    }
}
