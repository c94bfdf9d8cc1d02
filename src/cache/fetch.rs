//! HTTP asset downloads
//!
//! URLs are built from templates in `[cache]`:
//! - `flag_url`: `{key}` → lowercase country code
//! - `map_url`: `{lat}` / `{lon}` → coordinates with 4 decimals

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{AssetFetcher, AssetKind, CacheKey};
use crate::config::CacheConfig;
use crate::errors::CacheError;

/// Largest asset we are willing to store
const MAX_ASSET_SIZE: usize = 2 * 1024 * 1024;

const KNOWN_EXTENSIONS: &[&str] = &["png", "svg", "jpg", "jpeg", "gif", "webp"];

pub struct HttpAssetFetcher {
    http: Client,
    flag_url: String,
    map_url: String,
    flag_ext: String,
    map_ext: String,
    max_size: usize,
}

impl HttpAssetFetcher {
    pub fn new(config: &CacheConfig, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .context("failed to build asset HTTP client")?;

        Ok(Self {
            http,
            flag_url: config.flag_url.clone(),
            map_url: config.map_url.clone(),
            flag_ext: extension_from_template(&config.flag_url),
            map_ext: extension_from_template(&config.map_url),
            max_size: MAX_ASSET_SIZE,
        })
    }

    pub fn url_for(&self, key: &CacheKey) -> String {
        match key {
            CacheKey::Flag(code) => self.flag_url.replace("{key}", code),
            CacheKey::Map { lat, lon } => self
                .map_url
                .replace("{lat}", lat)
                .replace("{lon}", lon)
                .replace("{key}", &key.normalized()),
        }
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError> {
        let url = self.url_for(key);
        let fetch_failed = |reason: String| CacheError::FetchFailed {
            key: key.to_string(),
            reason,
        };

        debug!("Downloading {} from {}", key, url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fetch_failed(format!("status {}", status)));
        }

        let bytes = read_capped(resp, self.max_size)
            .await
            .map_err(fetch_failed)?;

        if bytes.is_empty() {
            return Err(fetch_failed("empty body".to_string()));
        }
        Ok(bytes)
    }

    fn extension(&self, kind: AssetKind) -> &str {
        match kind {
            AssetKind::Flag => &self.flag_ext,
            AssetKind::Map => &self.map_ext,
        }
    }
}

/// Read the body chunk by chunk, giving up as soon as it passes `limit`
async fn read_capped(mut resp: reqwest::Response, limit: usize) -> Result<Vec<u8>, String> {
    let too_large = |size: u64| format!("asset too large: {} bytes (max: {} bytes)", size, limit);

    if let Some(declared) = resp.content_length() {
        if declared > limit as u64 {
            return Err(too_large(declared));
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await.map_err(|e| e.to_string())? {
        if body.len() + chunk.len() > limit {
            return Err(too_large((body.len() + chunk.len()) as u64));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Image extension of the template's path, `png` when it has none we know
fn extension_from_template(template: &str) -> String {
    let path = template.split(['?', '#']).next().unwrap_or_default();
    path.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| KNOWN_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| "png".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP server answering with `head` followed by `body_len` bytes
    async fn serve_once(head: &'static str, body_len: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&vec![b'x'; body_len]).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}", addr)
    }

    fn capped_fetcher(base: &str, max_size: usize) -> HttpAssetFetcher {
        let mut f = fetcher(&format!("{}/{{key}}.png", base), "https://maps.example/{lat}/{lon}");
        f.max_size = max_size;
        f
    }

    fn fetcher(flag_url: &str, map_url: &str) -> HttpAssetFetcher {
        let config = CacheConfig {
            flag_url: flag_url.to_string(),
            map_url: map_url.to_string(),
            ..CacheConfig::default()
        };
        HttpAssetFetcher::new(&config, "extip-watch/test").unwrap()
    }

    #[test]
    fn test_extension_from_template() {
        assert_eq!(extension_from_template("https://flagcdn.com/w80/{key}.png"), "png");
        assert_eq!(extension_from_template("https://cdn.example/flags/{key}.SVG"), "svg");
        assert_eq!(
            extension_from_template("https://maps.example/static.php?center={lat},{lon}"),
            "png"
        );
    }

    #[test]
    fn test_url_for_keys() {
        let f = fetcher(
            "https://flags.example/{key}.svg",
            "https://maps.example/{lat}/{lon}/tile.jpg",
        );

        assert_eq!(
            f.url_for(&CacheKey::flag("SE").unwrap()),
            "https://flags.example/se.svg"
        );
        assert_eq!(
            f.url_for(&CacheKey::map(59.33, 18.06)),
            "https://maps.example/59.3300/18.0600/tile.jpg"
        );
        assert_eq!(f.extension(AssetKind::Flag), "svg");
        assert_eq!(f.extension(AssetKind::Map), "jpg");
    }

    #[tokio::test]
    async fn test_fetch_within_limit() {
        let base = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 64\r\n\r\n", 64).await;
        let f = capped_fetcher(&base, 128);

        let bytes = f.fetch(&CacheKey::flag("nl").unwrap()).await.unwrap();
        assert_eq!(bytes.len(), 64);
    }

    #[tokio::test]
    async fn test_fetch_rejects_declared_oversize() {
        let base = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\n", 0).await;
        let f = capped_fetcher(&base, 128);

        let err = f.fetch(&CacheKey::flag("nl").unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("too large"), "{}", err);
    }

    #[tokio::test]
    async fn test_fetch_rejects_undeclared_oversize() {
        // No Content-Length: the body runs until the connection closes
        let base = serve_once("HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n", 4096).await;
        let f = capped_fetcher(&base, 128);

        let err = f.fetch(&CacheKey::flag("nl").unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("too large"), "{}", err);
    }
}
