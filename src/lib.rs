pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod providers;
pub mod proxy;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::BrokerError;

use std::sync::Arc;

use anyhow::{Context, Result};

use auth::{AuthorizationFlow, TokenRefresher};
use proxy::ProxyClient;
use store::{FilePersistence, NoPersistence, TokenPersistence, TokenStore};

/// Shared application state passed to all API handlers.
pub struct AppState {
    pub config: Config,
    pub store: Arc<TokenStore>,
    pub flow: AuthorizationFlow,
    pub proxy: ProxyClient,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire every component from configuration. Does not touch the network.
    pub fn from_config(config: Config) -> Result<Self> {
        let persistence: Arc<dyn TokenPersistence> = match &config.token_file {
            Some(path) => Arc::new(FilePersistence::new(path)),
            None => Arc::new(NoPersistence),
        };
        Self::with_store(config, Arc::new(TokenStore::new(persistence)))
    }

    /// Like [`AppState::from_config`], around an existing token store.
    pub fn with_store(config: Config, store: Arc<TokenStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let provider = providers::from_config(&config, http.clone());
        let refresher = Arc::new(TokenRefresher::new(provider));
        let flow = AuthorizationFlow::new(
            store.clone(),
            refresher.clone(),
            config.redirect_uri.clone(),
            config.scopes.clone(),
        );
        let proxy = ProxyClient::new(
            store.clone(),
            refresher,
            http,
            config.api_base.clone(),
            flow.authorization_url(),
        );

        Ok(Self {
            config,
            store,
            flow,
            proxy,
        })
    }
}
