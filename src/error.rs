use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Unified error type for the crm-broker service.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    // ── Flow Errors ─────────────────────────────────────────────────────
    #[error("Authorization callback received no code")]
    MissingCode,

    #[error("Not authenticated: {reason}")]
    Unauthenticated {
        reason: String,
        /// Where to send the user to re-authenticate.
        auth_url: Option<String>,
    },

    // ── Upstream Errors ─────────────────────────────────────────────────
    #[error("Upstream rejected request with status {status}")]
    UpstreamRejected { status: u16, body: String },

    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    #[error("Upstream request failed: {0}")]
    Transport(String),

    // ── Storage ─────────────────────────────────────────────────────────
    #[error("Token persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    // ── Caller Errors ───────────────────────────────────────────────────
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl BrokerError {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        BrokerError::Unauthenticated {
            reason: reason.into(),
            auth_url: None,
        }
    }

    /// Turn any failure into `Unauthenticated` pointing at `auth_url`.
    ///
    /// Used where the only recovery is running the authorization flow again.
    pub fn into_reauth(self, auth_url: &str) -> Self {
        let reason = match self {
            BrokerError::Unauthenticated { reason, .. } => reason,
            other => format!("token refresh failed: {other}"),
        };
        BrokerError::Unauthenticated {
            reason,
            auth_url: Some(auth_url.to_string()),
        }
    }

    /// True for upstream responses that mean the bearer token was not accepted.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, BrokerError::UpstreamRejected { status: 401, .. })
    }
}

impl From<reqwest::Error> for BrokerError {
    fn from(e: reqwest::Error) -> Self {
        BrokerError::Transport(e.to_string())
    }
}

impl From<QueryRejection> for BrokerError {
    fn from(e: QueryRejection) -> Self {
        BrokerError::BadRequest(e.body_text())
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            BrokerError::MissingCode => (StatusCode::BAD_REQUEST, "missing_code"),
            BrokerError::Unauthenticated { .. } => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            BrokerError::UpstreamRejected { .. } => (StatusCode::BAD_GATEWAY, "upstream_rejected"),
            BrokerError::MalformedUpstreamResponse(_) => {
                (StatusCode::BAD_GATEWAY, "malformed_upstream_response")
            }
            BrokerError::Transport(_) => (StatusCode::BAD_GATEWAY, "upstream_unreachable"),
            BrokerError::PersistenceUnavailable(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence_unavailable")
            }
            BrokerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        };

        let mut error = json!({
            "code": code,
            "message": self.to_string(),
        });

        match &self {
            BrokerError::Unauthenticated {
                auth_url: Some(url),
                ..
            } => {
                error["authUrl"] = json!(url);
            }
            BrokerError::UpstreamRejected { status, body } => {
                // Keep the provider's error detail structured when it is JSON.
                let detail = serde_json::from_str::<serde_json::Value>(body)
                    .unwrap_or_else(|_| json!(body));
                error["status"] = json!(status);
                error["detail"] = detail;
            }
            _ => {}
        }

        (status, axum::Json(json!({ "error": error }))).into_response()
    }
}
