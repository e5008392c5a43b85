use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Default scopes requested on the consent screen.
pub const DEFAULT_SCOPES: &str =
    "crm.objects.contacts.read crm.objects.companies.read crm.lists.read oauth";

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ──────────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,
    pub base_url: String,

    // ── HubSpot app credentials ─────────────────────────────────────────
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URI registered with the HubSpot app.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Consent screen host (`https://app.hubspot.com`).
    pub auth_base: String,
    /// API host serving both the token endpoint and CRM resources.
    pub api_base: String,

    // ── Token persistence ───────────────────────────────────────────────
    /// `None` keeps tokens in memory only (read-only or ephemeral filesystems).
    pub token_file: Option<PathBuf>,

    // ── Outbound HTTP ───────────────────────────────────────────────────
    pub upstream_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("Invalid PORT")?;
        let base_url =
            std::env::var("BASE_URL").unwrap_or_else(|_| format!("http://localhost:{port}"));

        let persist = std::env::var("PERSIST_TOKENS")
            .map(|v| parse_bool(&v))
            .unwrap_or(true);
        let token_file = persist.then(|| {
            std::env::var("TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".crm-broker/tokens.json"))
        });

        let timeout_secs: u64 = std::env::var("UPSTREAM_TIMEOUT_SECS")
            .unwrap_or_else(|_| "15".into())
            .parse()
            .context("Invalid UPSTREAM_TIMEOUT_SECS")?;

        Ok(Config {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            redirect_uri: std::env::var("HUBSPOT_REDIRECT_URI")
                .unwrap_or_else(|_| format!("{base_url}/oauth/callback")),
            base_url,

            client_id: std::env::var("HUBSPOT_CLIENT_ID")
                .context("HUBSPOT_CLIENT_ID is required")?,
            client_secret: std::env::var("HUBSPOT_CLIENT_SECRET")
                .context("HUBSPOT_CLIENT_SECRET is required")?,
            scopes: parse_scopes(
                &std::env::var("HUBSPOT_SCOPES").unwrap_or_else(|_| DEFAULT_SCOPES.into()),
            ),
            auth_base: std::env::var("HUBSPOT_AUTH_BASE")
                .unwrap_or_else(|_| "https://app.hubspot.com".into()),
            api_base: std::env::var("HUBSPOT_API_BASE")
                .unwrap_or_else(|_| "https://api.hubapi.com".into()),

            token_file,
            upstream_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Where the browser lands after a successful callback.
    pub fn success_url(&self) -> String {
        format!("{}/auth/success", self.base_url)
    }
}

/// Split a scope list on whitespace or commas.
fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_accept_spaces_and_commas() {
        assert_eq!(
            parse_scopes("oauth, crm.lists.read  crm.objects.contacts.read"),
            vec!["oauth", "crm.lists.read", "crm.objects.contacts.read"]
        );
        assert!(parse_scopes("  ").is_empty());
    }

    #[test]
    fn persistence_flag_parsing() {
        assert!(!parse_bool("false"));
        assert!(!parse_bool("OFF"));
        assert!(!parse_bool("0"));
        assert!(parse_bool("true"));
        assert!(parse_bool("yes"));
    }
}
