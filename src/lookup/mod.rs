//! Identity lookup client contract
//!
//! The scheduler only depends on [`LookupClient`]; the HTTP implementation in
//! [`http`] talks to a JSON identity endpoint and an ASN endpoint.
//!
//! ## Response handling
//! - JSON object with an `ipAddress` key → full [`Identity`]
//! - bare address text (`203.0.113.7\n`) → [`Identity`] with only the address
//! - empty or unrecognisable body → [`LookupError::NoData`]
//! - broken JSON → [`LookupError::Parse`]

pub mod http;

use async_trait::async_trait;
use std::net::IpAddr;

use crate::errors::LookupError;
use crate::identity::types::{AsnInfo, Identity};

pub use http::HttpLookupClient;

#[async_trait]
pub trait LookupClient: Send + Sync {
    /// One round trip to the identity endpoint
    async fn fetch_identity(&self) -> Result<Identity, LookupError>;

    /// Best-effort hostname/org/timezone lookup
    async fn fetch_asn_info(&self) -> Result<AsnInfo, LookupError>;
}

/// Interpret the identity endpoint's response body
pub fn parse_identity_body(body: &str) -> Result<Identity, LookupError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(LookupError::NoData);
    }

    if body.starts_with('{') {
        let identity: Identity =
            serde_json::from_str(body).map_err(|e| LookupError::Parse(e.to_string()))?;
        if !identity.is_valid() {
            return Err(LookupError::NoData);
        }
        return Ok(identity);
    }

    match body.parse::<IpAddr>() {
        Ok(addr) => Ok(Identity::from_ip(addr.to_string())),
        Err(_) => Err(LookupError::NoData),
    }
}

/// Interpret the ASN endpoint's response body
pub fn parse_asn_body(body: &str) -> Result<AsnInfo, LookupError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(LookupError::NoData);
    }
    serde_json::from_str(body).map_err(|e| LookupError::Parse(e.to_string()))
}
