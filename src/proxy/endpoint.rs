use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BrokerError;

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Read-only CRM collections the broker forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Contacts,
    Companies,
    /// Contact lists ("segments"), served by the legacy v1 lists API.
    Segments,
}

/// Caller-supplied paging options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    pub limit: Option<u32>,
    /// Opaque cursor from a previous response's `next`.
    pub after: Option<String>,
    /// Comma-separated property names (contacts and companies only).
    pub properties: Option<String>,
}

impl Endpoint {
    pub fn name(self) -> &'static str {
        match self {
            Endpoint::Contacts => "contacts",
            Endpoint::Companies => "companies",
            Endpoint::Segments => "segments",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Contacts => "/crm/v3/objects/contacts",
            Endpoint::Companies => "/crm/v3/objects/companies",
            Endpoint::Segments => "/contacts/v1/lists",
        }
    }

    /// Key of the JSON array holding the items.
    pub fn collection_key(self) -> &'static str {
        match self {
            Endpoint::Segments => "lists",
            _ => "results",
        }
    }

    fn default_properties(self) -> Option<&'static str> {
        match self {
            Endpoint::Contacts => Some("firstname,lastname,email"),
            Endpoint::Companies => Some("name,domain"),
            Endpoint::Segments => None,
        }
    }

    /// Upstream query string for `params`.
    pub fn query(self, params: &QueryParams) -> Vec<(&'static str, String)> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let mut query = Vec::new();

        match self {
            Endpoint::Segments => {
                query.push(("count", limit.to_string()));
                if let Some(offset) = &params.after {
                    query.push(("offset", offset.clone()));
                }
            }
            Endpoint::Contacts | Endpoint::Companies => {
                query.push(("limit", limit.to_string()));
                if let Some(after) = &params.after {
                    query.push(("after", after.clone()));
                }
                let properties = params
                    .properties
                    .as_deref()
                    .or(self.default_properties())
                    .unwrap_or_default();
                if !properties.is_empty() {
                    query.push(("properties", properties.to_string()));
                }
            }
        }

        query
    }
}

/// Normalized success shape for every proxied collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyResponse {
    pub count: usize,
    pub items: Vec<Value>,
    /// Cursor for the next page, if the upstream reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl ProxyResponse {
    pub fn from_body(endpoint: Endpoint, mut body: Value) -> Result<Self, BrokerError> {
        let items = match body.get_mut(endpoint.collection_key()).map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(BrokerError::MalformedUpstreamResponse(format!(
                    "{} response has no `{}` array",
                    endpoint.name(),
                    endpoint.collection_key()
                )))
            }
        };

        Ok(Self {
            count: items.len(),
            items,
            next: next_cursor(endpoint, &body),
        })
    }
}

fn next_cursor(endpoint: Endpoint, body: &Value) -> Option<String> {
    match endpoint {
        Endpoint::Segments => {
            if body.get("has-more").and_then(Value::as_bool) != Some(true) {
                return None;
            }
            body.get("offset").map(|o| match o {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        }
        _ => body
            .pointer("/paging/next/after")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}
