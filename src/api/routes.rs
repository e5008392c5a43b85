//! Route handlers. Each one is a thin adapter over `AuthorizationFlow` or
//! `ProxyClient`; failures render through `BrokerError`'s `IntoResponse`.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::BrokerError;
use crate::proxy::{Endpoint, ProxyResponse, QueryParams};
use crate::store::TokenStatus;
use crate::SharedState;

pub fn router(state: SharedState) -> Router {
    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/status", get(status))
        // ── Auth ─────────────────────────────────────────────────────────
        .route("/auth", get(auth_start))
        .route("/oauth/callback", get(oauth_callback))
        .route("/auth/success", get(auth_success))
        .route("/logout", post(logout))
        .route("/token/status", get(token_status))
        // ── CRM ──────────────────────────────────────────────────────────
        .route("/contacts", get(contacts))
        .route("/companies", get(companies))
        .route("/segments", get(segments))
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "crm-broker",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// Auth Endpoints
// =============================================================================

#[derive(Deserialize)]
struct AuthStartQuery {
    #[serde(default)]
    force: bool,
}

/// GET /auth — Redirect to the consent screen. `?force=true` drops the held token first.
async fn auth_start(
    State(state): State<SharedState>,
    query: Result<Query<AuthStartQuery>, QueryRejection>,
) -> Result<Response, BrokerError> {
    let Query(q) = query?;
    let url = state.flow.build_authorization_url(q.force).await;
    Ok(Redirect::temporary(&url).into_response())
}

#[derive(Deserialize)]
struct OAuthCallbackQuery {
    code: Option<String>,
    /// Set by the provider when the user declines consent.
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /oauth/callback — Exchange the code and store the token pair.
async fn oauth_callback(
    State(state): State<SharedState>,
    query: Result<Query<OAuthCallbackQuery>, QueryRejection>,
) -> Result<Response, BrokerError> {
    let Query(q) = query?;
    if let Some(error) = &q.error {
        warn!(
            "Provider returned error on callback: {error} ({})",
            q.error_description.as_deref().unwrap_or("no description")
        );
    }

    state.flow.handle_callback(q.code.as_deref()).await?;
    Ok(Redirect::temporary(&state.config.success_url()).into_response())
}

/// GET /auth/success — Landing page after a completed flow.
async fn auth_success(State(state): State<SharedState>) -> impl IntoResponse {
    let token = state.flow.status().await;
    Json(json!({
        "message": "Authorization complete",
        "token": token,
    }))
}

/// POST /logout — Forget the held token. Idempotent.
async fn logout(State(state): State<SharedState>) -> impl IntoResponse {
    state.flow.logout().await;
    Json(json!({ "success": true }))
}

/// GET /token/status — Whether a token is held and what to do next.
async fn token_status(State(state): State<SharedState>) -> Json<TokenStatus> {
    Json(state.flow.status().await)
}

// =============================================================================
// CRM Endpoints
// =============================================================================

async fn fetch(
    state: &SharedState,
    endpoint: Endpoint,
    query: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<ProxyResponse>, BrokerError> {
    let Query(params) = query?;
    state.proxy.call(endpoint, &params).await.map(Json)
}

/// GET /contacts
async fn contacts(
    State(state): State<SharedState>,
    query: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<ProxyResponse>, BrokerError> {
    fetch(&state, Endpoint::Contacts, query).await
}

/// GET /companies
async fn companies(
    State(state): State<SharedState>,
    query: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<ProxyResponse>, BrokerError> {
    fetch(&state, Endpoint::Companies, query).await
}

/// GET /segments — Contact lists.
async fn segments(
    State(state): State<SharedState>,
    query: Result<Query<QueryParams>, QueryRejection>,
) -> Result<Json<ProxyResponse>, BrokerError> {
    fetch(&state, Endpoint::Segments, query).await
}
