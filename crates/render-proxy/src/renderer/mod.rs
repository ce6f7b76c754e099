//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). Timeouts are
//! the caller's business; implementations simply await the engine.

pub mod chromium;
pub mod stealth;

use anyhow::Result;
use async_trait::async_trait;

/// Result of navigating to a URL.
#[derive(Debug, Clone)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken until the load event in milliseconds.
    pub load_time_ms: u64,
}

/// A running browser engine that hands out pages.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a new page (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of pages currently open.
    fn active_contexts(&self) -> usize;
}

/// A single page, owned by exactly one request.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Headers added to every request the page makes from now on.
    async fn set_extra_headers(&mut self, headers: &[(String, String)]) -> Result<()>;
    /// Navigate and resolve once the page-load event fired.
    async fn navigate(&mut self, url: &str) -> Result<NavigationResult>;
    /// Resolve once an element matching `selector` exists.
    async fn wait_for_selector(&self, selector: &str) -> Result<()>;
    /// Serialize the current DOM to HTML.
    async fn get_html(&self) -> Result<String>;
    /// Close this page.
    async fn close(self: Box<Self>) -> Result<()>;
}
