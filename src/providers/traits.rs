use async_trait::async_trait;
use std::time::Duration;

use crate::error::BrokerError;

/// Tokens returned from an OAuth provider after code exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    /// Absent when the provider keeps the existing refresh token.
    pub refresh_token: Option<String>,
    /// Lifetime of `access_token` in seconds, as reported by the provider.
    pub expires_in: Option<i64>,
}

/// The upstream OAuth endpoints the broker talks to.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Human-readable display name (e.g., "HubSpot").
    fn display_name(&self) -> &str;

    /// Build the consent-screen URL the user is sent to.
    fn auth_url(&self, scopes: &[String], redirect_uri: &str) -> String;

    /// Exchange an authorization code for the initial token set.
    async fn exchange_code(&self, code: &str, redirect_uri: &str)
        -> Result<TokenSet, BrokerError>;

    /// Mint a new access token from a refresh token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, BrokerError>;

    /// Lifetime assumed when a token response omits `expires_in`.
    fn token_ttl(&self) -> Duration {
        Duration::from_secs(3600)
    }
}
