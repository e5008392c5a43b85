use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// The one credential set this broker holds.
///
/// Serialized form is the on-disk layout:
/// `{"access_token": "...", "refresh_token": "...", "expiry_date": <epoch ms>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(rename = "expiry_date", with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl TokenPair {
    /// Build a pair whose expiry is `lifetime_secs` after `issued_at`.
    ///
    /// Expiry is kept at millisecond precision, the same as the persisted
    /// `expiry_date`. A lifetime that overflows the calendar is reported as a
    /// malformed upstream response.
    pub fn issued(
        access_token: String,
        refresh_token: String,
        issued_at: DateTime<Utc>,
        lifetime_secs: i64,
    ) -> Result<Self, BrokerError> {
        let expires_at = Duration::try_seconds(lifetime_secs)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .and_then(|at| DateTime::from_timestamp_millis(at.timestamp_millis()))
            .ok_or_else(|| {
                BrokerError::MalformedUpstreamResponse(format!(
                    "token lifetime out of range ({lifetime_secs}s)"
                ))
            })?;

        Ok(Self {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// True when the access token expires within `margin` from now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at <= Utc::now() + margin
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.trim().is_empty()
    }
}

/// What an operator should do next, as reported by the status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    /// No token held; run the authorization flow.
    Authenticate,
    /// Token expired or inside the safety margin; the next proxied call refreshes it.
    Refresh,
    None,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    pub has_token: bool,
    pub is_expired: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub recommended_action: RecommendedAction,
}

impl TokenStatus {
    pub fn of(pair: Option<&TokenPair>, margin: Duration) -> Self {
        match pair {
            None => Self {
                has_token: false,
                is_expired: false,
                expires_at: None,
                recommended_action: RecommendedAction::Authenticate,
            },
            Some(pair) => {
                let action = if pair.expires_within(margin) {
                    RecommendedAction::Refresh
                } else {
                    RecommendedAction::None
                };
                Self {
                    has_token: true,
                    is_expired: pair.is_expired(),
                    expires_at: Some(pair.expires_at),
                    recommended_action: action,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_expiring_in(minutes: i64) -> TokenPair {
        TokenPair::issued("at".into(), "rt".into(), Utc::now(), minutes * 60).unwrap()
    }

    #[test]
    fn serializes_to_persisted_layout() {
        let pair = TokenPair {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_at: DateTime::from_timestamp_millis(1_700_000_000_123).unwrap(),
        };
        let value = serde_json::to_value(&pair).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "access_token": "at",
                "refresh_token": "rt",
                "expiry_date": 1_700_000_000_123_i64,
            })
        );
    }

    #[test]
    fn issued_expiry_matches_persisted_precision() {
        let issued_at = DateTime::from_timestamp_nanos(1_700_000_000_123_456_789);
        let pair = TokenPair::issued("at".into(), "rt".into(), issued_at, 1800).unwrap();
        assert_eq!(pair.expires_at.timestamp_millis(), 1_700_001_800_123);
        assert_eq!(pair.expires_at.timestamp_subsec_nanos() % 1_000_000, 0);

        let json = serde_json::to_string(&pair).unwrap();
        let restored: TokenPair = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, pair);
    }

    #[test]
    fn out_of_range_lifetime_is_malformed() {
        for secs in [i64::MAX / 10, i64::MAX] {
            let err = TokenPair::issued("at".into(), "rt".into(), Utc::now(), secs).unwrap_err();
            assert!(matches!(err, BrokerError::MalformedUpstreamResponse(_)));
        }
    }

    #[test]
    fn missing_refresh_token_deserializes_empty() {
        let pair: TokenPair =
            serde_json::from_str(r#"{"access_token":"at","expiry_date":1700000000000}"#).unwrap();
        assert!(!pair.has_refresh_token());
    }

    #[test]
    fn expiry_checks_respect_margin() {
        let pair = pair_expiring_in(2);
        assert!(!pair.is_expired());
        assert!(pair.expires_within(Duration::minutes(5)));
        assert!(!pair_expiring_in(10).expires_within(Duration::minutes(5)));
        assert!(pair_expiring_in(-1).is_expired());
    }

    #[test]
    fn status_recommends_next_step() {
        let margin = Duration::minutes(5);

        let none = TokenStatus::of(None, margin);
        assert!(!none.has_token);
        assert_eq!(none.recommended_action, RecommendedAction::Authenticate);

        let stale = TokenStatus::of(Some(&pair_expiring_in(-1)), margin);
        assert!(stale.is_expired);
        assert_eq!(stale.recommended_action, RecommendedAction::Refresh);

        let fresh = TokenStatus::of(Some(&pair_expiring_in(30)), margin);
        assert!(!fresh.is_expired);
        assert_eq!(fresh.recommended_action, RecommendedAction::None);
    }

    #[test]
    fn status_serializes_camel_case() {
        let value = serde_json::to_value(TokenStatus::of(None, Duration::minutes(5))).unwrap();
        assert_eq!(value["hasToken"], false);
        assert_eq!(value["isExpired"], false);
        assert_eq!(value["recommendedAction"], "authenticate");
    }
}
