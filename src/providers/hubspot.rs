use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::traits::{OAuthProvider, TokenSet};
use crate::error::BrokerError;

/// HubSpot OAuth 2.0 provider.
///
/// Quirks:
/// - Consent screen lives on `app.hubspot.com`, the token endpoint on `api.hubapi.com`.
/// - Scopes are space separated.
/// - Access tokens live 30 minutes; refresh tokens do not expire but may be
///   rotated, so a returned refresh token always replaces the stored one.
pub struct HubSpotProvider {
    client_id: String,
    client_secret: String,
    auth_base: String,
    api_base: String,
    http: reqwest::Client,
}

// Raw token response. Everything is optional so a 2xx body missing
// `access_token` can be reported as malformed rather than a parse error.
#[derive(Debug, Deserialize)]
struct HubSpotTokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl HubSpotProvider {
    pub fn new(
        client_id: String,
        client_secret: String,
        auth_base: impl Into<String>,
        api_base: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            auth_base: trim_base(auth_base.into()),
            api_base: trim_base(api_base.into()),
            http,
        }
    }

    fn token_endpoint(&self) -> String {
        format!("{}/oauth/v1/token", self.api_base)
    }

    async fn request_tokens(&self, form: &[(&str, &str)]) -> Result<TokenSet, BrokerError> {
        let resp = self
            .http
            .post(self.token_endpoint())
            .form(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BrokerError::UpstreamRejected {
                status: status.as_u16(),
                body,
            });
        }

        let token_resp: HubSpotTokenResponse = resp.json().await.map_err(|e| {
            BrokerError::MalformedUpstreamResponse(format!("unreadable token response: {e}"))
        })?;

        let access_token = token_resp
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                BrokerError::MalformedUpstreamResponse("token response has no access_token".into())
            })?;

        if let Some(secs) = token_resp.expires_in.filter(|s| *s <= 0) {
            return Err(BrokerError::MalformedUpstreamResponse(format!(
                "token response has non-positive expires_in ({secs})"
            )));
        }

        Ok(TokenSet {
            access_token,
            refresh_token: token_resp.refresh_token.filter(|t| !t.is_empty()),
            expires_in: token_resp.expires_in,
        })
    }
}

#[async_trait]
impl OAuthProvider for HubSpotProvider {
    fn display_name(&self) -> &str {
        "HubSpot"
    }

    fn auth_url(&self, scopes: &[String], redirect_uri: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &scopes.join(" "))
            .finish();
        format!("{}/oauth/authorize?{query}", self.auth_base)
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, BrokerError> {
        self.request_tokens(&[
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("code", code),
        ])
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, BrokerError> {
        self.request_tokens(&[
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    fn token_ttl(&self) -> Duration {
        Duration::from_secs(1800) // HubSpot access tokens expire in 30 minutes
    }
}

fn trim_base(base: String) -> String {
    base.trim_end_matches('/').to_string()
}
