//! Fetch-once asset cache for flags and maps
//!
//! Assets are addressed by what they depict (country code or coordinate
//! pair), so a key is downloaded at most once and then served from disk for
//! good. There is no expiry.
//!
//! Layout:
//!   <dir>/flags/<cc>.<ext>
//!   <dir>/maps/<lat>_<lon>.<ext>
//!
//! Downloads land in a temp file next to the destination and are renamed into
//! place, so a half-written file is never mistaken for a cached asset.

pub mod fetch;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::errors::CacheError;

pub use fetch::HttpAssetFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Flag,
    Map,
}

impl AssetKind {
    fn dir_name(self) -> &'static str {
        match self {
            AssetKind::Flag => "flags",
            AssetKind::Map => "maps",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Flag => write!(f, "flag"),
            AssetKind::Map => write!(f, "map"),
        }
    }
}

/// Normalized, content-addressed cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Lowercase country code
    Flag(String),
    /// Coordinates rendered with 4 decimals
    Map { lat: String, lon: String },
}

impl CacheKey {
    /// Flag key for a two-letter country code; `None` for anything else
    ///
    /// The code ends up in a file name and a URL, so only ASCII letters pass.
    pub fn flag(country_code: &str) -> Option<Self> {
        let code = country_code.trim().to_ascii_lowercase();
        if code.len() == 2 && code.bytes().all(|b| b.is_ascii_alphabetic()) {
            Some(CacheKey::Flag(code))
        } else {
            None
        }
    }

    pub fn map(lat: f64, lon: f64) -> Self {
        CacheKey::Map {
            lat: format!("{:.4}", lat),
            lon: format!("{:.4}", lon),
        }
    }

    pub fn kind(&self) -> AssetKind {
        match self {
            CacheKey::Flag(_) => AssetKind::Flag,
            CacheKey::Map { .. } => AssetKind::Map,
        }
    }

    /// File stem: `us` or `52.3700_4.8900`
    pub fn normalized(&self) -> String {
        match self {
            CacheKey::Flag(code) => code.clone(),
            CacheKey::Map { lat, lon } => format!("{}_{}", lat, lon),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind(), self.normalized())
    }
}

#[async_trait]
pub trait AssetCache: Send + Sync {
    /// Local path of the asset, downloading it on first use
    async fn get_or_fetch(&self, key: &CacheKey) -> Result<PathBuf, CacheError>;
}

/// Source of asset bytes for [`FileAssetCache`]
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError>;

    /// File extension used for stored assets of this kind
    fn extension(&self, _kind: AssetKind) -> &str {
        "png"
    }
}

pub struct FileAssetCache {
    dir: PathBuf,
    fetcher: Arc<dyn AssetFetcher>,
    resolved: Mutex<HashMap<CacheKey, PathBuf>>,
}

impl FileAssetCache {
    pub fn new(dir: impl Into<PathBuf>, fetcher: Arc<dyn AssetFetcher>) -> Self {
        let dir = dir.into();
        info!("Asset cache at {:?}", dir);
        Self {
            dir,
            fetcher,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        let kind = key.kind();
        self.dir.join(kind.dir_name()).join(format!(
            "{}.{}",
            key.normalized(),
            self.fetcher.extension(kind)
        ))
    }

    fn remember(&self, key: &CacheKey, path: &Path) {
        if let Ok(mut resolved) = self.resolved.lock() {
            resolved.insert(key.clone(), path.to_path_buf());
        }
    }

    fn lookup_resolved(&self, key: &CacheKey) -> Option<PathBuf> {
        self.resolved
            .lock()
            .ok()
            .and_then(|resolved| resolved.get(key).cloned())
    }
}

#[async_trait]
impl AssetCache for FileAssetCache {
    async fn get_or_fetch(&self, key: &CacheKey) -> Result<PathBuf, CacheError> {
        if let Some(path) = self.lookup_resolved(key) {
            return Ok(path);
        }

        let path = self.path_for(key);
        if is_file(&path).await {
            debug!("Asset {} already cached at {:?}", key, path);
            self.remember(key, &path);
            return Ok(path);
        }

        info!("Fetching asset {}", key);
        let bytes = self.fetcher.fetch(key).await?;
        write_atomic(&path, &bytes).await?;
        info!("Cached asset {} ({} bytes) at {:?}", key, bytes.len(), path);

        self.remember(key, &path);
        Ok(path)
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Write to `<dir>/.<name>.tmp` and rename over the destination
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let write_failed = |source: std::io::Error| CacheError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_failed(e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        warn!("Failed to move {:?} into place: {}", tmp, e);
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_failed(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Fetcher that counts calls and optionally fails
    struct CountingFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingFetcher {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AssetFetcher for CountingFetcher {
        async fn fetch(&self, key: &CacheKey) -> Result<Vec<u8>, CacheError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CacheError::FetchFailed {
                    key: key.to_string(),
                    reason: "503 Service Unavailable".to_string(),
                });
            }
            Ok(format!("image:{}", key.normalized()).into_bytes())
        }
    }

    #[test]
    fn test_flag_key_normalization() {
        assert_eq!(CacheKey::flag("US"), Some(CacheKey::Flag("us".to_string())));
        assert_eq!(CacheKey::flag(" nl "), Some(CacheKey::Flag("nl".to_string())));
        assert_eq!(CacheKey::flag(""), None);
    }

    #[test]
    fn test_flag_key_rejects_non_country_codes() {
        for code in ["../x", "u/s", "usa", "..", "u1", "../../escaped", "ü"] {
            assert_eq!(CacheKey::flag(code), None, "accepted {:?}", code);
        }
    }

    #[tokio::test]
    async fn test_bogus_country_code_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        let fetcher = CountingFetcher::new(false);
        let cache = FileAssetCache::new(&root, fetcher.clone());

        // A hostile lookup answer never becomes a key, so nothing is fetched
        if let Some(key) = CacheKey::flag("../../escaped") {
            cache.get_or_fetch(&key).await.unwrap();
        }

        assert_eq!(fetcher.calls(), 0);
        assert!(!dir.path().join("escaped.png").exists());
        assert!(!root.exists());
    }

    #[test]
    fn test_map_key_normalization() {
        let key = CacheKey::map(52.37, 4.8951234);
        assert_eq!(key.normalized(), "52.3700_4.8951");
        assert_eq!(key.kind(), AssetKind::Map);
        assert_eq!(key, CacheKey::map(52.370001, 4.89512));
    }

    #[tokio::test]
    async fn test_second_call_hits_cache() {
        let dir = TempDir::new().unwrap();
        let fetcher = CountingFetcher::new(false);
        let cache = FileAssetCache::new(dir.path(), fetcher.clone());
        let key = CacheKey::flag("US").unwrap();

        let first = cache.get_or_fetch(&key).await.unwrap();
        let second = cache.get_or_fetch(&key).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, dir.path().join("flags").join("us.png"));
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(std::fs::read(&first).unwrap(), b"image:us");
    }

    #[tokio::test]
    async fn test_existing_file_is_not_refetched() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("maps")).unwrap();
        std::fs::write(dir.path().join("maps").join("1.0000_2.0000.png"), b"old").unwrap();

        // Fresh cache instance, as after a restart
        let fetcher = CountingFetcher::new(false);
        let cache = FileAssetCache::new(dir.path(), fetcher.clone());

        let path = cache.get_or_fetch(&CacheKey::map(1.0, 2.0)).await.unwrap();
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(std::fs::read(path).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let fetcher = CountingFetcher::new(true);
        let cache = FileAssetCache::new(dir.path(), fetcher.clone());
        let key = CacheKey::flag("de").unwrap();

        let err = cache.get_or_fetch(&key).await.unwrap_err();
        assert!(matches!(err, CacheError::FetchFailed { .. }));
        assert!(!cache.path_for(&key).exists());

        // Not remembered: the next call tries again
        let _ = cache.get_or_fetch(&key).await;
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flags").join("fr.png");

        write_atomic(&path, b"bleu-blanc-rouge").await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("flags"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("fr.png")]);
    }
}
