// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP surface of the relay.
//!
//! The messaging platform (or a bridge in front of it) posts updates to
//! `/updates`; each is handled on its own task so a slow download never
//! blocks the webhook. `/authorize` exposes the admission gate for external
//! callers.

use crate::config::Config;
use crate::dispatcher::{Dispatcher, Inbound};
use crate::gate::{AuthorizeRequest, AuthorizeResult};
use crate::metrics::Metrics;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Shared application state.
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<Metrics>,
    pub config: Config,
    pub started_at: DateTime<Utc>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub started_at: DateTime<Utc>,
}

/// Update acknowledgement.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
}

/// Admission check response.
#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "gated-relay",
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
    })
}

/// Accept one platform update and process it in the background.
pub async fn updates(
    State(state): State<Arc<AppState>>,
    Json(inbound): Json<Inbound>,
) -> (StatusCode, Json<AcceptedResponse>) {
    debug!(user_id = inbound.user_id(), chat_id = inbound.chat_id(), "Update received");

    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move { dispatcher.handle(inbound).await });

    (StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true }))
}

/// Run the admission gate for a user.
///
/// Always answers 200 so the caller can read the body. An allowed answer
/// charges the user's rate window.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AuthorizeRequest>,
) -> Json<AuthorizeResponse> {
    let result = state.dispatcher.gate().authorize(req).await;

    let response = match result {
        AuthorizeResult::Allowed { remaining } => {
            state.metrics.record_admission("allowed");
            debug!(user_id = req.user_id, remaining, "Authorized");
            AuthorizeResponse {
                allowed: true,
                reason: None,
                code: None,
                retry_after_secs: None,
                remaining: Some(remaining),
            }
        }
        AuthorizeResult::Denied(denial) => {
            state.metrics.record_admission(denial.code());
            info!(user_id = req.user_id, code = denial.code(), "Authorization denied");
            AuthorizeResponse {
                allowed: false,
                reason: Some(denial.to_string()),
                code: Some(denial.code()),
                retry_after_secs: denial.retry_after().map(|d| d.as_secs().max(1)),
                remaining: None,
            }
        }
    };
    Json(response)
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/updates", post(updates))
        .route("/authorize", post(authorize));

    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}
