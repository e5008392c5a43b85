mod hubspot;
mod traits;

pub use hubspot::HubSpotProvider;
pub use traits::{OAuthProvider, TokenSet};

use std::sync::Arc;

use crate::config::Config;

/// Build the CRM's OAuth provider from configuration.
pub fn from_config(config: &Config, http: reqwest::Client) -> Arc<dyn OAuthProvider> {
    Arc::new(HubSpotProvider::new(
        config.client_id.clone(),
        config.client_secret.clone(),
        config.auth_base.clone(),
        config.api_base.clone(),
        http,
    ))
}
