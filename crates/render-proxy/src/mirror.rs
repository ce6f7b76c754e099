//! Asset mirroring into a basename-keyed local cache.
//!
//! The cache key is the last path segment of the resolved asset URL and
//! nothing else: `/x/app.js` and `/y/app.js` share one cached file, and
//! whichever is mirrored first wins for the lifetime of the cache
//! directory. Nothing is ever evicted.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ProxyConfig, DEFAULT_USER_AGENT};
use crate::types::{AssetReference, MirroredAsset};

/// Why a single asset could not be mirrored. Never escapes the mirror.
#[derive(thiserror::Error, Debug)]
pub enum MirrorError {
    #[error("unusable reference: {0}")]
    Unusable(String),

    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("download timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

/// Downloads referenced assets once and reuses them across requests.
#[derive(Clone)]
pub struct AssetMirror {
    client: reqwest::Client,
    cache_dir: PathBuf,
    timeout: Duration,
}

impl AssetMirror {
    /// Create a mirror writing into `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            cache_dir: cache_dir.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(&config.cache_dir, config.asset_timeout)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Create the cache directory if needed.
    pub async fn prepare(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await
    }

    /// Mirror one asset. Failures are logged and reported as an asset
    /// without a local path; they never propagate.
    pub async fn mirror(
        &self,
        reference: &AssetReference,
        base_url: &str,
        cancel: &CancellationToken,
    ) -> MirroredAsset {
        match self.try_mirror(reference, base_url, cancel).await {
            Ok((source_url, path)) => MirroredAsset {
                source_url,
                local_path: Some(path),
            },
            Err((source_url, e)) => {
                warn!("failed to mirror asset {}: {e}", reference.raw_url);
                MirroredAsset {
                    source_url,
                    local_path: None,
                }
            }
        }
    }

    async fn try_mirror(
        &self,
        reference: &AssetReference,
        base_url: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, PathBuf), (String, MirrorError)> {
        let url = resolve(reference, base_url)
            .map_err(|e| (reference.raw_url.clone(), e))?;
        let source_url = url.to_string();
        let fail = |e: MirrorError| (source_url.clone(), e);

        let name = basename(&url).ok_or_else(|| {
            fail(MirrorError::Unusable(format!("no file name in {url}")))
        })?;
        let path = self.cache_dir.join(&name);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("asset cache hit for {name} ({source_url})");
            return Ok((source_url, path));
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(fail(MirrorError::Cancelled)),
            body = self.download(&url) => body.map_err(fail)?,
        };

        self.write_atomic(&name, &body).await.map_err(fail)?;
        debug!("mirrored {source_url} -> {}", path.display());
        Ok((source_url, path))
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>, MirrorError> {
        let fetch = async {
            let resp = self.client.get(url.clone()).send().await?;
            let resp = resp.error_for_status()?;
            Ok::<_, reqwest::Error>(resp.bytes().await?.to_vec())
        };
        match tokio::time::timeout(self.timeout, fetch).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(MirrorError::Timeout(self.timeout)),
        }
    }

    /// Write to a unique temporary file beside the target, then rename it
    /// into place. Concurrent writers of one basename race; the last
    /// rename wins and readers never see a partial file.
    async fn write_atomic(&self, name: &str, body: &[u8]) -> Result<(), MirrorError> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .cache_dir
            .join(format!(".{name}.{}.{n}.part", std::process::id()));

        tokio::fs::create_dir_all(&self.cache_dir).await?;
        if let Err(e) = tokio::fs::write(&tmp, body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, self.cache_dir.join(name)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Cached artifact for the basename of `requested`, if one exists.
    pub async fn lookup(&self, requested: &str) -> Option<PathBuf> {
        let name = requested.rsplit('/').find(|s| !s.is_empty())?;
        if !is_safe_name(name) {
            return None;
        }
        let path = self.cache_dir.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }
}

/// Resolve a reference against the page's base URL.
pub fn resolve(reference: &AssetReference, base_url: &str) -> Result<Url, MirrorError> {
    let base = Url::parse(base_url)
        .map_err(|e| MirrorError::Unusable(format!("bad base {base_url}: {e}")))?;
    let url = base
        .join(reference.raw_url.trim())
        .map_err(|e| MirrorError::Unusable(format!("{}: {e}", reference.raw_url)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(MirrorError::Unusable(format!("unsupported scheme {other}"))),
    }
}

/// Cache key for `url`: its last non-empty path segment.
pub fn basename(url: &Url) -> Option<String> {
    let name = url.path_segments()?.rfind(|s| !s.is_empty())?;
    is_safe_name(name).then(|| name.to_string())
}

/// Dot-prefixed names are refused: they cover `.`/`..` and the
/// in-flight `.part` files.
fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_root_relative_against_origin() {
        let url = resolve(&"/static/app.js".into(), "https://example.com").unwrap();
        assert_eq!(url.as_str(), "https://example.com/static/app.js");
    }

    #[test]
    fn trims_whitespace_before_resolving() {
        let url = resolve(&"  /a.css \n".into(), "https://example.com/page").unwrap();
        assert_eq!(url.as_str(), "https://example.com/a.css");
    }

    #[test]
    fn protocol_relative_reference_keeps_its_host() {
        let url = resolve(&"//cdn.test/lib.js".into(), "https://example.com").unwrap();
        assert_eq!(url.as_str(), "https://cdn.test/lib.js");
    }

    #[test]
    fn unusable_base_is_rejected() {
        assert!(resolve(&"/a.png".into(), "not a url").is_err());
    }

    #[test]
    fn basename_is_last_segment() {
        let url = Url::parse("https://example.com/x/y/app.js?v=3").unwrap();
        assert_eq!(basename(&url).as_deref(), Some("app.js"));

        let url = Url::parse("https://example.com/x/dir/").unwrap();
        assert_eq!(basename(&url).as_deref(), Some("dir"));
    }

    #[test]
    fn basename_rejects_empty_and_hidden() {
        assert_eq!(basename(&Url::parse("https://example.com/").unwrap()), None);
        assert_eq!(
            basename(&Url::parse("https://example.com/.env").unwrap()),
            None
        );
    }

    #[test]
    fn colliding_basenames_share_a_key() {
        let a = resolve(&"/x/app.js".into(), "https://example.com").unwrap();
        let b = resolve(&"/y/app.js".into(), "https://example.com").unwrap();
        assert_ne!(a, b);
        assert_eq!(basename(&a), basename(&b));
    }
}
