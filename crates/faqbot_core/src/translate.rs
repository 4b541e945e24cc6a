//! Language detection and translation.
//!
//! Every call site goes through [`detect_or`] or [`translate_or_original`]:
//! a failing translation service never fails a request, it only leaves the
//! text untranslated.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{FaqError, Result};
use crate::http::{build_client, endpoint};

const SERVICE: &str = "translation";

#[async_trait]
pub trait Translator: Send + Sync {
    /// ISO 639-1 code of the most likely language of `text`.
    async fn detect(&self, text: &str) -> Result<String>;

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String>;
}

/// Detected language, or `fallback` when detection fails.
pub async fn detect_or(translator: &dyn Translator, text: &str, fallback: &str) -> String {
    match translator.detect(text).await {
        Ok(lang) if !lang.trim().is_empty() => lang,
        Ok(_) => fallback.to_string(),
        Err(err) => {
            tracing::warn!(%err, fallback, "language detection failed");
            fallback.to_string()
        }
    }
}

/// Translated text, or `text` unchanged when the languages match or the
/// service fails.
pub async fn translate_or_original(
    translator: &dyn Translator,
    text: &str,
    source: &str,
    target: &str,
) -> String {
    if text.trim().is_empty() || source.eq_ignore_ascii_case(target) {
        return text.to_string();
    }
    match translator.translate(text, source, target).await {
        Ok(translated) => translated,
        Err(err) => {
            tracing::warn!(%err, source, target, "translation failed; keeping original text");
            text.to_string()
        }
    }
}

#[derive(Debug, Deserialize)]
struct Detection {
    language: String,
    #[serde(default)]
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

/// Client for a LibreTranslate-compatible service.
pub struct LibreTranslateClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl LibreTranslateClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
            api_key,
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        route: &str,
        mut body: serde_json::Value,
    ) -> Result<T> {
        if let Some(key) = &self.api_key {
            body["api_key"] = serde_json::Value::String(key.clone());
        }
        self.client
            .post(endpoint(&self.base_url, route))
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FaqError::upstream(SERVICE, e))?
            .json::<T>()
            .await
            .map_err(|e| FaqError::upstream(SERVICE, e))
    }
}

#[async_trait]
impl Translator for LibreTranslateClient {
    async fn detect(&self, text: &str) -> Result<String> {
        let detections: Vec<Detection> = self
            .post("detect", serde_json::json!({ "q": text }))
            .await?;
        detections
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .map(|d| d.language)
            .ok_or_else(|| FaqError::upstream(SERVICE, "no language detected"))
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let translation: Translation = self
            .post(
                "translate",
                serde_json::json!({
                    "q": text,
                    "source": source,
                    "target": target,
                    "format": "text",
                }),
            )
            .await?;
        Ok(translation.translated_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::Value;

    struct BrokenTranslator;

    #[async_trait]
    impl Translator for BrokenTranslator {
        async fn detect(&self, _text: &str) -> Result<String> {
            Err(FaqError::upstream(SERVICE, "unreachable"))
        }

        async fn translate(&self, _text: &str, _source: &str, _target: &str) -> Result<String> {
            Err(FaqError::upstream(SERVICE, "unreachable"))
        }
    }

    async fn fake_detect(Json(body): Json<Value>) -> Json<Value> {
        let text = body["q"].as_str().unwrap_or("");
        let lang = if text.chars().any(|c| matches!(c, 'а'..='я' | 'А'..='Я')) {
            "ru"
        } else {
            "en"
        };
        Json(serde_json::json!([
            { "language": "de", "confidence": 10.0 },
            { "language": lang, "confidence": 90.0 }
        ]))
    }

    async fn fake_translate(Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(body["api_key"], "secret");
        let text = body["q"].as_str().unwrap_or("");
        let out = match (text, body["target"].as_str()) {
            ("Что такое покер?", Some("en")) => "What is poker?",
            ("A card game.", Some("ru")) => "Карточная игра.",
            _ => text,
        };
        Json(serde_json::json!({ "translatedText": out }))
    }

    async fn serve() -> String {
        let router = Router::new()
            .route("/detect", post(fake_detect))
            .route("/translate", post(fake_translate));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn failures_fall_back_to_the_input() {
        let t = BrokenTranslator;
        assert_eq!(
            translate_or_original(&t, "Что такое покер?", "ru", "en").await,
            "Что такое покер?"
        );
        assert_eq!(detect_or(&t, "Что такое покер?", "en").await, "en");
    }

    #[tokio::test]
    async fn same_language_skips_the_service() {
        let t = BrokenTranslator;
        assert_eq!(translate_or_original(&t, "hello", "EN", "en").await, "hello");
    }

    #[tokio::test]
    async fn libretranslate_round_trip() {
        let base = serve().await;
        let client =
            LibreTranslateClient::new(base, Some("secret".to_string()), Duration::from_secs(5))
                .unwrap();

        assert_eq!(detect_or(&client, "Что такое покер?", "en").await, "ru");
        assert_eq!(
            translate_or_original(&client, "Что такое покер?", "ru", "en").await,
            "What is poker?"
        );
        assert_eq!(
            translate_or_original(&client, "A card game.", "en", "ru").await,
            "Карточная игра."
        );
    }

    #[tokio::test]
    async fn unreachable_service_keeps_original_text() {
        // Nothing listens on a port freed right after binding.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            LibreTranslateClient::new(format!("http://{addr}"), None, Duration::from_secs(2))
                .unwrap();
        assert_eq!(
            translate_or_original(&client, "bonjour", "fr", "en").await,
            "bonjour"
        );
    }

    #[tokio::test]
    async fn hung_service_times_out_and_keeps_original_text() {
        async fn stall() -> Json<Value> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Json(serde_json::json!({ "translatedText": "hello" }))
        }
        let router = Router::new().route("/translate", post(stall));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client =
            LibreTranslateClient::new(format!("http://{addr}"), None, Duration::from_secs(1))
                .unwrap();
        let started = std::time::Instant::now();
        let out = translate_or_original(&client, "bonjour", "fr", "en").await;
        assert_eq!(out, "bonjour");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
