//! Renders a target URL into HTML through the shared engine.

use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{ProxyConfig, DEFAULT_USER_AGENT};
use crate::error::{ProxyError, ProxyResult};
use crate::renderer::{RenderContext, Renderer};
use crate::types::TargetRequest;

/// Element whose presence marks the page as rendered.
pub const READINESS_SELECTOR: &str = "body";

/// Knobs for a single render.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub navigation_timeout: Duration,
    pub readiness_timeout: Duration,
    pub default_user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

impl From<&ProxyConfig> for FetchOptions {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            navigation_timeout: config.navigation_timeout,
            readiness_timeout: config.readiness_timeout,
            default_user_agent: config.default_user_agent.clone(),
        }
    }
}

/// Headers sent with every request the page makes.
pub fn outbound_headers(
    request: &TargetRequest,
    origin: &str,
    default_user_agent: &str,
) -> Vec<(String, String)> {
    let user_agent = request
        .caller_user_agent
        .as_deref()
        .unwrap_or(if default_user_agent.is_empty() {
            DEFAULT_USER_AGENT
        } else {
            default_user_agent
        });

    vec![
        ("Accept-Encoding".to_string(), "gzip, deflate, br".to_string()),
        ("User-Agent".to_string(), user_agent.to_string()),
        ("Referer".to_string(), origin.to_string()),
        ("Accept".to_string(), "*/*".to_string()),
        ("Origin".to_string(), origin.to_string()),
    ]
}

/// Closes its page when dropped, so abandoned renders do not leak tabs.
struct PageGuard {
    page: Option<Box<dyn RenderContext>>,
    url: String,
}

impl PageGuard {
    fn new(page: Box<dyn RenderContext>, url: &str) -> Self {
        Self {
            page: Some(page),
            url: url.to_string(),
        }
    }

    async fn close(mut self) {
        if let Some(page) = self.page.take() {
            match page.close().await {
                Ok(()) => debug!("closed page for {}", self.url),
                Err(e) => warn!("failed to close page for {}: {e:#}", self.url),
            }
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        let url = std::mem::take(&mut self.url);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = page.close().await {
                        warn!("deferred close failed for {url}: {e:#}");
                    }
                });
            }
            Err(_) => warn!("no runtime to close page for {url}"),
        }
    }
}

/// Render `request` and return the serialized DOM.
///
/// The page is closed on every exit path: success, timeout, engine error
/// and cancellation.
pub async fn render(
    renderer: &dyn Renderer,
    request: &TargetRequest,
    origin: &str,
    options: &FetchOptions,
    cancel: &CancellationToken,
) -> ProxyResult<String> {
    let page = renderer
        .new_context()
        .await
        .map_err(|e| ProxyError::Render(format!("failed to open page: {e:#}")))?;
    let mut guard = PageGuard::new(page, &request.url);

    let result = match guard.page.as_deref_mut() {
        Some(page) => tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProxyError::Cancelled),
            result = drive(page, request, origin, options) => result,
        },
        None => Err(ProxyError::Render("page closed before rendering".into())),
    };

    guard.close().await;
    result
}

async fn drive(
    page: &mut dyn RenderContext,
    request: &TargetRequest,
    origin: &str,
    options: &FetchOptions,
) -> ProxyResult<String> {
    let headers = outbound_headers(request, origin, &options.default_user_agent);
    page.set_extra_headers(&headers)
        .await
        .map_err(|e| ProxyError::Render(format!("{e:#}")))?;

    let nav_ms = options.navigation_timeout.as_millis();
    let nav = timeout(options.navigation_timeout, page.navigate(&request.url))
        .await
        .map_err(|_| ProxyError::Render(format!("navigation timed out after {nav_ms}ms")))?
        .map_err(|e| ProxyError::Render(format!("{e:#}")))?;
    debug!(
        "loaded {} in {}ms (final url {})",
        request.url, nav.load_time_ms, nav.final_url
    );

    let ready_ms = options.readiness_timeout.as_millis();
    timeout(
        options.readiness_timeout,
        page.wait_for_selector(READINESS_SELECTOR),
    )
    .await
    .map_err(|_| {
        ProxyError::Render(format!(
            "waiting for selector `{READINESS_SELECTOR}` timed out after {ready_ms}ms"
        ))
    })?
    .map_err(|e| ProxyError::Render(format!("{e:#}")))?;

    page.get_html()
        .await
        .map_err(|e| ProxyError::Render(format!("{e:#}")))
}
