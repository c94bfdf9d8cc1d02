//! HTTP lookup client
//!
//! Two plain GET endpoints:
//! 1. identity endpoint → address + geolocation (JSON or bare text)
//! 2. ASN endpoint → hostname / org / timezone (JSON)
//!
//! Every request is bounded by `request_timeout_secs`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::{parse_asn_body, parse_identity_body, LookupClient};
use crate::config::LookupConfig;
use crate::errors::LookupError;
use crate::identity::types::{AsnInfo, Identity};

pub struct HttpLookupClient {
    config: LookupConfig,
    http: Client,
    timeout: Duration,
}

impl HttpLookupClient {
    pub fn new(config: LookupConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(timeout)
            .build()
            .context("failed to build lookup HTTP client")?;

        info!(
            "Lookup client configured (identity: {}, asn: {})",
            config.identity_url, config.asn_url
        );

        Ok(Self {
            config,
            http,
            timeout,
        })
    }

    /// GET a URL and return the body text, mapping failures to lookup errors
    async fn get_text(&self, url: &str) -> Result<String, LookupError> {
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LookupError::Transport(format!(
                "{} responded with status {}",
                url, status
            )));
        }

        resp.text().await.map_err(|e| self.map_error(e))
    }

    fn map_error(&self, e: reqwest::Error) -> LookupError {
        if e.is_timeout() {
            LookupError::Timeout(self.timeout)
        } else {
            LookupError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl LookupClient for HttpLookupClient {
    async fn fetch_identity(&self) -> Result<Identity, LookupError> {
        let body = self.get_text(&self.config.identity_url).await?;
        parse_identity_body(&body)
    }

    async fn fetch_asn_info(&self) -> Result<AsnInfo, LookupError> {
        let body = self.get_text(&self.config.asn_url).await?;
        parse_asn_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = LookupConfig {
            identity_url: "http://localhost:8080/json".to_string(),
            asn_url: "http://localhost:8080/asn".to_string(),
            user_agent: "extip-watch/test".to_string(),
            request_timeout_secs: 3,
        };

        let client = HttpLookupClient::new(config).unwrap();
        assert_eq!(client.timeout, Duration::from_secs(3));
        assert_eq!(client.config.identity_url, "http://localhost:8080/json");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Port 9 on loopback: connection refused on any sane test host
        let config = LookupConfig {
            identity_url: "http://127.0.0.1:9/json".to_string(),
            request_timeout_secs: 2,
            ..LookupConfig::default()
        };

        let client = HttpLookupClient::new(config).unwrap();
        let err = client.fetch_identity().await.unwrap_err();
        assert!(matches!(
            err,
            LookupError::Transport(_) | LookupError::Timeout(_)
        ));
    }
}
