use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::BrokerError;
use crate::providers::{OAuthProvider, TokenSet};
use crate::store::TokenPair;

/// Turns provider token responses into [`TokenPair`]s.
///
/// Stateless: it never touches the token store. Callers decide whether to keep
/// the result. No retries happen here.
pub struct TokenRefresher {
    provider: Arc<dyn OAuthProvider>,
}

impl TokenRefresher {
    pub fn new(provider: Arc<dyn OAuthProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &dyn OAuthProvider {
        self.provider.as_ref()
    }

    /// Exchange `current`'s refresh token for a new access token.
    ///
    /// The previous refresh token is kept when the provider does not rotate it.
    pub async fn refresh(&self, current: &TokenPair) -> Result<TokenPair, BrokerError> {
        if !current.has_refresh_token() {
            return Err(BrokerError::unauthenticated("no refresh token stored"));
        }

        let issued_at = Utc::now();
        let tokens = self.provider.refresh_token(&current.refresh_token).await?;
        let rotated = tokens.refresh_token.is_some();
        let pair = self.pair_from(tokens, &current.refresh_token, issued_at)?;

        info!(
            "Refreshed {} access token (expires {}, refresh token rotated: {rotated})",
            self.provider.display_name(),
            pair.expires_at
        );
        Ok(pair)
    }

    /// Exchange an authorization code for the initial token pair.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenPair, BrokerError> {
        let issued_at = Utc::now();
        let tokens = self.provider.exchange_code(code, redirect_uri).await?;
        if tokens.refresh_token.is_none() {
            debug!("Code exchange returned no refresh token");
        }
        self.pair_from(tokens, "", issued_at)
    }

    // Expiry counts from when the request was sent, so it never overshoots the
    // provider's own clock.
    fn pair_from(
        &self,
        tokens: TokenSet,
        previous_refresh: &str,
        issued_at: chrono::DateTime<Utc>,
    ) -> Result<TokenPair, BrokerError> {
        let lifetime = tokens
            .expires_in
            .unwrap_or_else(|| self.provider.token_ttl().as_secs() as i64);
        TokenPair::issued(
            tokens.access_token,
            tokens
                .refresh_token
                .unwrap_or_else(|| previous_refresh.to_string()),
            issued_at,
            lifetime,
        )
    }
}
