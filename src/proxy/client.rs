use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::endpoint::{Endpoint, ProxyResponse, QueryParams};
use crate::auth::{TokenRefresher, REFRESH_MARGIN};
use crate::error::BrokerError;
use crate::store::{TokenPair, TokenStore};

/// Outbound client for the CRM resource API.
///
/// Every call goes out with a token that is valid for at least
/// [`REFRESH_MARGIN`]. Refreshes are single-flight: concurrent callers queue on
/// one gate and reuse whatever the first of them obtained.
pub struct ProxyClient {
    store: Arc<TokenStore>,
    refresher: Arc<TokenRefresher>,
    http: reqwest::Client,
    api_base: String,
    /// Remediation link handed back with every `Unauthenticated` failure.
    auth_url: String,
    refresh_gate: Mutex<()>,
}

impl ProxyClient {
    pub fn new(
        store: Arc<TokenStore>,
        refresher: Arc<TokenRefresher>,
        http: reqwest::Client,
        api_base: impl Into<String>,
        auth_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            refresher,
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            auth_url: auth_url.into(),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Fetch one page of `endpoint`.
    ///
    /// An upstream 401 triggers one refresh and one retry; a second 401 is
    /// reported as `Unauthenticated`.
    pub async fn call(
        &self,
        endpoint: Endpoint,
        params: &QueryParams,
    ) -> Result<ProxyResponse, BrokerError> {
        let token = self.valid_token().await?;

        match self.fetch(endpoint, params, &token.access_token).await {
            Err(e) if e.is_auth_rejection() => {
                warn!("Upstream rejected access token for {}; refreshing once", endpoint.name());
                let renewed = self.refresh_rejected(&token).await?;
                self.fetch(endpoint, params, &renewed.access_token)
                    .await
                    .map_err(|e| {
                        if e.is_auth_rejection() {
                            BrokerError::unauthenticated("upstream rejected the refreshed token")
                                .into_reauth(&self.auth_url)
                        } else {
                            e
                        }
                    })
            }
            other => other,
        }
    }

    fn unauthenticated(&self, reason: &str) -> BrokerError {
        BrokerError::unauthenticated(reason).into_reauth(&self.auth_url)
    }

    /// The held token, refreshed first if it is inside the safety margin.
    async fn valid_token(&self) -> Result<TokenPair, BrokerError> {
        let current = self
            .store
            .get()
            .await
            .ok_or_else(|| self.unauthenticated("no token held; authorize first"))?;
        if !current.expires_within(REFRESH_MARGIN) {
            return Ok(current);
        }

        let _gate = self.refresh_gate.lock().await;
        // Whoever held the gate before us may already have refreshed.
        let current = self
            .store
            .get()
            .await
            .ok_or_else(|| self.unauthenticated("token cleared while waiting for refresh"))?;
        if !current.expires_within(REFRESH_MARGIN) {
            debug!("Using token refreshed by a concurrent request");
            return Ok(current);
        }

        info!("Access token expires at {}; refreshing", current.expires_at);
        self.refresh_held(&current).await
    }

    /// Refresh after the upstream refused `rejected`, unless someone already has.
    async fn refresh_rejected(&self, rejected: &TokenPair) -> Result<TokenPair, BrokerError> {
        let _gate = self.refresh_gate.lock().await;
        let current = self
            .store
            .get()
            .await
            .ok_or_else(|| self.unauthenticated("token cleared while waiting for refresh"))?;
        if current.access_token != rejected.access_token {
            debug!("Token already replaced by a concurrent request");
            return Ok(current);
        }
        self.refresh_held(&current).await
    }

    // Caller must hold `refresh_gate`.
    async fn refresh_held(&self, current: &TokenPair) -> Result<TokenPair, BrokerError> {
        let refreshed = self.refresher.refresh(current).await.map_err(|e| {
            warn!("Token refresh failed: {e}");
            e.into_reauth(&self.auth_url)
        })?;

        self.store
            .replace(current, refreshed)
            .await
            .ok_or_else(|| self.unauthenticated("logged out during refresh"))
    }

    async fn fetch(
        &self,
        endpoint: Endpoint,
        params: &QueryParams,
        access_token: &str,
    ) -> Result<ProxyResponse, BrokerError> {
        let url = format!("{}{}", self.api_base, endpoint.path());
        debug!("GET {url}");

        let resp = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&endpoint.query(params))
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

        let body: Value = resp.json().await.map_err(|e| {
            BrokerError::MalformedUpstreamResponse(format!(
                "unreadable {} response: {e}",
                endpoint.name()
            ))
        })?;
        ProxyResponse::from_body(endpoint, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{hubspot, mount_token_endpoint, token_json};
    use chrono::{Duration, Utc};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const AUTH_URL: &str = "https://app.example.test/oauth/authorize?client_id=client-1";

    fn client(server: &MockServer) -> (Arc<ProxyClient>, Arc<TokenStore>) {
        let store = Arc::new(TokenStore::in_memory());
        let refresher = Arc::new(TokenRefresher::new(hubspot(server)));
        let client = ProxyClient::new(
            store.clone(),
            refresher,
            reqwest::Client::new(),
            server.uri(),
            AUTH_URL,
        );
        (Arc::new(client), store)
    }

    fn expiring_in(minutes: i64, access: &str) -> TokenPair {
        TokenPair {
            access_token: access.into(),
            refresh_token: "rt".into(),
            expires_at: Utc::now() + Duration::minutes(minutes),
        }
    }

    async fn mount_contacts(server: &MockServer, token: &str, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/crm/v3/objects/contacts"))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{ "id": "101" }, { "id": "102" }],
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    async fn mount_refresh(server: &MockServer, access: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/v1/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(token_json(access, None, Some(1800))),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn assert_unauthenticated(err: BrokerError) {
        match err {
            BrokerError::Unauthenticated { auth_url, .. } => {
                assert_eq!(auth_url.as_deref(), Some(AUTH_URL));
            }
            other => panic!("expected Unauthenticated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_token_is_unauthenticated_with_auth_url() {
        let server = MockServer::start().await;
        let (client, _) = client(&server);

        let err = client
            .call(Endpoint::Contacts, &QueryParams::default())
            .await
            .unwrap_err();
        assert_unauthenticated(err);
    }

    #[tokio::test]
    async fn fresh_token_is_used_without_refresh() {
        let server = MockServer::start().await;
        mount_refresh(&server, "unused", 0).await;
        mount_contacts(&server, "at-fresh", 1).await;
        let (client, store) = client(&server);
        store.set(expiring_in(10, "at-fresh")).await;

        let resp = client
            .call(Endpoint::Contacts, &QueryParams::default())
            .await
            .unwrap();
        assert_eq!(resp.count, 2);
        assert_eq!(resp.items[0]["id"], "101");
    }

    #[tokio::test]
    async fn near_expiry_token_is_refreshed_once_before_call() {
        let server = MockServer::start().await;
        mount_refresh(&server, "at-new", 1).await;
        mount_contacts(&server, "at-new", 1).await;
        let (client, store) = client(&server);
        store.set(expiring_in(2, "at-old")).await;

        client
            .call(Endpoint::Contacts, &QueryParams::default())
            .await
            .unwrap();

        let held = store.get().await.unwrap();
        assert_eq!(held.access_token, "at-new");
        assert_eq!(held.refresh_token, "rt");
        assert!(!held.expires_within(REFRESH_MARGIN));
    }

    #[tokio::test]
    async fn failed_refresh_is_unauthenticated_and_keeps_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("BAD_REFRESH_TOKEN"))
            .expect(1)
            .mount(&server)
            .await;
        let (client, store) = client(&server);
        let stale = expiring_in(1, "at-old");
        store.set(stale.clone()).await;

        let err = client
            .call(Endpoint::Contacts, &QueryParams::default())
            .await
            .unwrap_err();
        assert_unauthenticated(err);
        assert_eq!(store.get().await, Some(stale));
    }

    #[tokio::test]
    async fn oversized_refresh_lifetime_is_unauthenticated() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, token_json("at-new", None, Some(i64::MAX / 10))).await;
        let (client, store) = client(&server);
        let stale = expiring_in(1, "at-old");
        store.set(stale.clone()).await;

        let err = client
            .call(Endpoint::Contacts, &QueryParams::default())
            .await
            .unwrap_err();
        assert_unauthenticated(err);
        assert_eq!(store.get().await, Some(stale));
    }

    #[tokio::test]
    async fn concurrent_calls_share_one_refresh() {
        let server = MockServer::start().await;
        mount_refresh(&server, "at-new", 1).await;
        mount_contacts(&server, "at-new", 8).await;
        let (client, store) = client(&server);
        store.set(expiring_in(2, "at-old")).await;

        let calls: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move {
                    client.call(Endpoint::Contacts, &QueryParams::default()).await
                })
            })
            .collect();

        for call in calls {
            call.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn upstream_401_triggers_one_refresh_and_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crm/v3/objects/contacts"))
            .and(header("authorization", "Bearer at-revoked"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .expect(1)
            .mount(&server)
            .await;
        mount_contacts(&server, "at-new", 1).await;
        mount_refresh(&server, "at-new", 1).await;
        let (client, store) = client(&server);
        store.set(expiring_in(20, "at-revoked")).await;

        let resp = client
            .call(Endpoint::Contacts, &QueryParams::default())
            .await
            .unwrap();
        assert_eq!(resp.count, 2);
        assert_eq!(store.get().await.unwrap().access_token, "at-new");
    }

    #[tokio::test]
    async fn repeated_401_is_not_retried_in_a_loop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crm/v3/objects/contacts"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        mount_refresh(&server, "at-new", 1).await;
        let (client, store) = client(&server);
        store.set(expiring_in(20, "at-revoked")).await;

        let err = client
            .call(Endpoint::Contacts, &QueryParams::default())
            .await
            .unwrap_err();
        assert_unauthenticated(err);
    }

    #[tokio::test]
    async fn other_upstream_errors_pass_through_without_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crm/v3/objects/companies"))
            .respond_with(
                ResponseTemplate::new(403).set_body_string(r#"{"category":"MISSING_SCOPES"}"#),
            )
            .mount(&server)
            .await;
        mount_refresh(&server, "unused", 0).await;
        let (client, store) = client(&server);
        store.set(expiring_in(20, "at")).await;

        let err = client
            .call(Endpoint::Companies, &QueryParams::default())
            .await
            .unwrap_err();
        match err {
            BrokerError::UpstreamRejected { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("MISSING_SCOPES"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn segments_forward_paging_and_normalize_lists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contacts/v1/lists"))
            .and(query_param("count", "5"))
            .and(query_param("offset", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "lists": [{ "listId": 11, "name": "Customers" }],
                "has-more": false,
                "offset": 11,
            })))
            .expect(1)
            .mount(&server)
            .await;
        let (client, store) = client(&server);
        store.set(expiring_in(20, "at")).await;

        let params = QueryParams {
            limit: Some(5),
            after: Some("10".into()),
            properties: None,
        };
        let resp = client.call(Endpoint::Segments, &params).await.unwrap();
        assert_eq!(resp.count, 1);
        assert_eq!(resp.items[0]["name"], "Customers");
        assert!(resp.next.is_none());
    }

    #[tokio::test]
    async fn logout_then_call_is_unauthenticated() {
        let server = MockServer::start().await;
        mount_token_endpoint(&server, token_json("unused", None, Some(1800))).await;
        let (client, store) = client(&server);
        store.set(expiring_in(20, "at")).await;

        store.clear().await;
        assert!(store.get().await.is_none());
        let err = client
            .call(Endpoint::Segments, &QueryParams::default())
            .await
            .unwrap_err();
        assert_unauthenticated(err);
    }
}
