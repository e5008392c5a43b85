//! Shared fixtures for unit tests that talk to a mocked HubSpot.

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::providers::{HubSpotProvider, OAuthProvider};

pub const AUTH_BASE: &str = "https://app.example.test";
pub const REDIRECT_URI: &str = "http://localhost:3000/oauth/callback";

pub fn hubspot(server: &MockServer) -> Arc<dyn OAuthProvider> {
    Arc::new(HubSpotProvider::new(
        "client-1".into(),
        "secret-1".into(),
        AUTH_BASE,
        server.uri(),
        reqwest::Client::new(),
    ))
}

pub fn scopes() -> Vec<String> {
    vec!["oauth".into(), "crm.objects.contacts.read".into()]
}

pub fn token_json(access: &str, refresh: Option<&str>, expires_in: Option<i64>) -> Value {
    let mut body = json!({ "access_token": access, "token_type": "bearer" });
    if let Some(rt) = refresh {
        body["refresh_token"] = json!(rt);
    }
    if let Some(secs) = expires_in {
        body["expires_in"] = json!(secs);
    }
    body
}

/// Answer every token request with `body`.
pub async fn mount_token_endpoint(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/oauth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}
