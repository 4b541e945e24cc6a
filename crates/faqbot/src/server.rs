use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use faqbot_core::{AnswerSource, Decision, Pipeline};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub decision: Decision,
    pub source: AnswerSource,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

async fn query(
    State(pipeline): State<Arc<Pipeline>>,
    Json(request): Json<QueryRequest>,
) -> Response {
    if request.query.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "query must not be empty");
    }

    match pipeline.answer(&request.query).await {
        Ok(reply) => Json(QueryResponse {
            answer: reply.text,
            decision: reply.decision,
            source: reply.source,
            score: reply.score,
            entry_id: reply.entry_id,
            suggestions: reply.suggestions,
        })
        .into_response(),
        Err(err) => {
            tracing::error!(%err, "query failed");
            error(StatusCode::BAD_GATEWAY, err.to_string())
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/health", get(health))
        .with_state(pipeline)
}

pub async fn serve(pipeline: Arc<Pipeline>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .context("HTTP server error")
}
