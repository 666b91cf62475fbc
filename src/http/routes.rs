use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::header::{HeaderName, AUTHORIZATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::emergency::EvaluationMode;
use crate::session::StreamingSession;
use crate::stream::ConnectionState;
use crate::telemetry::{self, TelemetryCounters, TelemetrySnapshot};

use super::sse;

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct DebugHttpState {
    pub session: Arc<StreamingSession>,
    token: Arc<String>,
}

impl DebugHttpState {
    pub fn new(session: Arc<StreamingSession>, token: String) -> Self {
        Self {
            session,
            token: Arc::new(token),
        }
    }

    fn authorize(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> Result<(), HttpServerError> {
        match extract_token(headers, query_token) {
            Some(value) if value == *self.token => Ok(()),
            _ => Err(HttpServerError::Unauthorized),
        }
    }
}

/// Query payload for extracting token from URL.
#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    pub token: Option<String>,
}

/// HTTP error variants mapped to JSON responses.
#[derive(Debug)]
pub enum HttpServerError {
    Unauthorized,
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "missing or invalid token"),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Health endpoint response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connection: ConnectionState,
    pub live: bool,
    pub mode: EvaluationMode,
    pub endpoint: String,
    pub counters: TelemetryCounters,
}

/// Build the Axum router with all handlers.
pub fn build_router(state: DebugHttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/results", get(results_stream))
        .route("/emergencies", get(emergency_stream))
        .with_state(state)
}

/// Run the HTTP server loop.
pub async fn run_http_server(state: DebugHttpState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding debug HTTP listener")?;
    axum::serve(listener, build_router(state))
        .await
        .context("serving debug HTTP router")?;
    Ok(())
}

pub async fn health(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<HealthResponse>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;
    let session = &state.session;
    Ok(Json(HealthResponse {
        status: "ok",
        connection: session.state(),
        live: session.is_live(),
        mode: session.mode(),
        endpoint: session.config().stream.endpoint.clone(),
        counters: telemetry::hub().counters(),
    }))
}

pub async fn metrics(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<Json<TelemetrySnapshot>, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;
    Ok(Json(telemetry::hub().snapshot()))
}

pub async fn results_stream(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<sse::EventStream, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;
    Ok(sse::from_broadcast(state.session.subscribe_results(), "result"))
}

pub async fn emergency_stream(
    State(state): State<DebugHttpState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<sse::EventStream, HttpServerError> {
    state.authorize(&headers, query.token.as_deref())?;
    Ok(sse::from_broadcast(
        state.session.subscribe_emergencies(),
        "emergency",
    ))
}

fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    if let Some(token) = query_token {
        return Some(token.to_string());
    }

    static X_DEBUG_TOKEN: HeaderName = HeaderName::from_static("x-debug-token");

    headers
        .get(&X_DEBUG_TOKEN)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| raw.strip_prefix("Bearer ").map(|v| v.to_string()))
        })
}
