//! Configuration loading and resolution.
//!
//! Precedence: built-in defaults, then environment variables, then
//! whatever the CLI sets explicitly on the returned value.

use std::path::PathBuf;
use std::time::Duration;

/// Default timeout for the page-load event.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the readiness selector to appear.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a single asset download.
pub const DEFAULT_ASSET_TIMEOUT: Duration = Duration::from_secs(15);

/// User agent sent when the caller did not supply one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Path prefix under which mirrored assets are served.
pub const DEFAULT_ASSET_PREFIX: &str = "/assets/";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3000;

/// Runtime configuration for the proxy server.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Directory holding mirrored assets, one file per basename.
    pub cache_dir: PathBuf,
    /// Explicit Chromium binary; discovered automatically when `None`.
    pub chromium_path: Option<PathBuf>,
    /// Timeout for navigation up to the page-load event.
    pub navigation_timeout: Duration,
    /// Timeout for the readiness selector.
    pub readiness_timeout: Duration,
    /// Timeout for each asset download.
    pub asset_timeout: Duration,
    /// Fallback user agent.
    pub default_user_agent: String,
    /// Prefix applied by the local rewrite pass.
    pub asset_prefix: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            cache_dir: default_cache_dir(),
            chromium_path: None,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            asset_timeout: DEFAULT_ASSET_TIMEOUT,
            default_user_agent: DEFAULT_USER_AGENT.to_string(),
            asset_prefix: DEFAULT_ASSET_PREFIX.to_string(),
        }
    }
}

impl ProxyConfig {
    /// Defaults overlaid with `PORT`, `RENDER_PROXY_HOST`,
    /// `RENDER_PROXY_CACHE_DIR`, `RENDER_PROXY_CHROMIUM_PATH` and
    /// `RENDER_PROXY_ASSET_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(port) = var("PORT").and_then(|p| p.trim().parse().ok()) {
            self.port = port;
        }
        if let Some(host) = var("RENDER_PROXY_HOST").filter(|h| !h.trim().is_empty()) {
            self.host = host.trim().to_string();
        }
        if let Some(dir) = var("RENDER_PROXY_CACHE_DIR").filter(|d| !d.trim().is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(path) = var("RENDER_PROXY_CHROMIUM_PATH").filter(|p| !p.trim().is_empty()) {
            self.chromium_path = Some(PathBuf::from(path));
        }
        if let Some(ms) = var("RENDER_PROXY_ASSET_TIMEOUT_MS").and_then(|v| v.trim().parse().ok())
        {
            self.asset_timeout = Duration::from_millis(ms);
        }
        self
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("render-proxy-assets")
}
