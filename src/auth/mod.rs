//! Token acquisition and renewal: the authorization-code flow and the
//! refresh-token exchange.

pub mod flow;
pub mod refresher;

pub use flow::AuthorizationFlow;
pub use refresher::TokenRefresher;

/// Tokens expiring within this window are refreshed before use.
pub const REFRESH_MARGIN: chrono::Duration = chrono::Duration::minutes(5);
