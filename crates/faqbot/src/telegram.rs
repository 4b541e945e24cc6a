//! Telegram Bot API long-poll transport.
//!
//! Updates are handled one at a time in arrival order. A failed poll is
//! logged and retried after a pause; a failed reply never stops the loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use faqbot_core::Pipeline;
use serde::de::DeserializeOwned;
use serde::Deserialize;

const RETRY_PAUSE: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    poll_timeout: Duration,
}

impl TelegramClient {
    /// The HTTP timeout is the long-poll timeout plus ten seconds, so an
    /// idle poll completes before the request is cut.
    pub fn new(api_base: &str, token: &str, poll_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()
            .context("create Telegram HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{token}", api_base.trim_end_matches('/')),
            poll_timeout,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: serde_json::Value) -> Result<T> {
        let response: ApiResponse<T> = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Telegram {method} request"))?
            .json()
            .await
            .with_context(|| format!("Telegram {method} response"))?;

        match (response.ok, response.result) {
            (true, Some(result)) => Ok(result),
            _ => bail!(
                "Telegram {method} failed: {}",
                response.description.as_deref().unwrap_or("no description")
            ),
        }
    }

    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            serde_json::json!({
                "offset": offset,
                "timeout": self.poll_timeout.as_secs(),
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                serde_json::json!({ "chat_id": chat_id, "text": text }),
            )
            .await?;
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Incoming<'a> {
    Start,
    Command,
    Question(&'a str),
}

fn classify(text: &str) -> Incoming<'_> {
    let text = text.trim();
    match text.split_whitespace().next() {
        // "/start" or "/start@SomeBot"
        Some(cmd) if cmd == "/start" || cmd.starts_with("/start@") => Incoming::Start,
        Some(cmd) if cmd.starts_with('/') => Incoming::Command,
        _ => Incoming::Question(text),
    }
}

pub struct Bot {
    client: TelegramClient,
    pipeline: Arc<Pipeline>,
}

impl Bot {
    pub fn new(client: TelegramClient, pipeline: Arc<Pipeline>) -> Self {
        Self { client, pipeline }
    }

    /// Reply to one update, if it carries text worth answering.
    pub async fn handle_update(&self, update: &Update) -> Result<()> {
        let Some(message) = &update.message else {
            return Ok(());
        };
        let Some(text) = message.text.as_deref() else {
            tracing::debug!(update_id = update.update_id, "skipping non-text message");
            return Ok(());
        };

        let reply = match classify(text) {
            Incoming::Start => self.pipeline.messages().greeting.clone(),
            Incoming::Command => return Ok(()),
            Incoming::Question(q) if q.is_empty() => return Ok(()),
            Incoming::Question(q) => match self.pipeline.answer(q).await {
                Ok(reply) => {
                    tracing::info!(
                        chat_id = message.chat.id,
                        decision = ?reply.decision,
                        score = reply.score,
                        "answered"
                    );
                    reply.text
                }
                Err(err) => {
                    tracing::error!(%err, chat_id = message.chat.id, "query failed");
                    self.pipeline.messages().error.clone()
                }
            },
        };

        self.client.send_message(message.chat.id, &reply).await
    }

    /// One long poll. Returns the offset for the next poll.
    pub async fn poll_once(&self, offset: Option<i64>) -> Result<Option<i64>> {
        let updates = self.client.get_updates(offset).await?;
        let mut next = offset;
        for update in &updates {
            next = Some(update.update_id + 1);
            if let Err(err) = self.handle_update(update).await {
                tracing::error!(err = %format!("{err:#}"), update_id = update.update_id, "failed to reply");
            }
        }
        Ok(next)
    }

    pub async fn run(&self) -> Result<()> {
        tracing::info!("Telegram bot polling for updates");
        let mut offset = None;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    return Ok(());
                }
                polled = self.poll_once(offset) => match polled {
                    Ok(next) => offset = next,
                    Err(err) => {
                        tracing::warn!(err = %format!("{err:#}"), "poll failed; retrying");
                        tokio::time::sleep(RETRY_PAUSE).await;
                    }
                },
            }
        }
    }
}
