use std::sync::Arc;

use tracing::info;

use super::refresher::TokenRefresher;
use super::REFRESH_MARGIN;
use crate::error::BrokerError;
use crate::store::{TokenPair, TokenStatus, TokenStore};

/// The authorization-code flow for the one connected account.
pub struct AuthorizationFlow {
    store: Arc<TokenStore>,
    refresher: Arc<TokenRefresher>,
    redirect_uri: String,
    scopes: Vec<String>,
}

impl AuthorizationFlow {
    pub fn new(
        store: Arc<TokenStore>,
        refresher: Arc<TokenRefresher>,
        redirect_uri: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            store,
            refresher,
            redirect_uri: redirect_uri.into(),
            scopes,
        }
    }

    /// Consent-screen URL, with no side effects. Used as the remediation link.
    pub fn authorization_url(&self) -> String {
        self.refresher
            .provider()
            .auth_url(&self.scopes, &self.redirect_uri)
    }

    /// Consent-screen URL for starting the flow.
    ///
    /// With `force_reauth` the held token is dropped first, so a stale token
    /// cannot satisfy requests while the user is re-consenting.
    pub async fn build_authorization_url(&self, force_reauth: bool) -> String {
        if force_reauth {
            info!("Forced re-authentication; clearing stored token");
            self.store.clear().await;
        }
        self.authorization_url()
    }

    /// Complete the flow with the code from the provider's redirect.
    pub async fn handle_callback(&self, code: Option<&str>) -> Result<TokenPair, BrokerError> {
        let code = code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(BrokerError::MissingCode)?;

        let pair = self.refresher.exchange_code(code, &self.redirect_uri).await?;
        self.store.set(pair.clone()).await;

        info!(
            "Connected {} account (token expires {})",
            self.refresher.provider().display_name(),
            pair.expires_at
        );
        Ok(pair)
    }

    /// Forget the held token. Always succeeds.
    pub async fn logout(&self) {
        self.store.clear().await;
        info!("Logged out; token cleared");
    }

    pub async fn status(&self) -> TokenStatus {
        self.store.status(REFRESH_MARGIN).await
    }
}
