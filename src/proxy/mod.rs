//! Read-only proxy to the CRM resource API.

pub mod client;
pub mod endpoint;

pub use client::ProxyClient;
pub use endpoint::{Endpoint, ProxyResponse, QueryParams};
