//! In-memory rendering engine shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use render_proxy::renderer::{NavigationResult, RenderContext, Renderer};
use render_proxy::session::Launcher;
use render_proxy::{AssetMirror, ProxyConfig, RenderProxy, SessionManager};

/// How every page opened by a [`FakeRenderer`] behaves.
#[derive(Debug, Clone, Default)]
pub struct PageScript {
    pub html: String,
    pub navigation_delay: Duration,
    pub readiness_delay: Duration,
    pub navigation_error: Option<String>,
}

impl PageScript {
    pub fn serving(html: &str) -> Self {
        Self {
            html: html.to_string(),
            ..Self::default()
        }
    }
}

/// A renderer that returns canned HTML and records what pages were asked.
#[derive(Default)]
pub struct FakeRenderer {
    script: PageScript,
    active: Arc<AtomicUsize>,
    opened: AtomicUsize,
    shutdowns: AtomicUsize,
    headers: Arc<Mutex<Vec<(String, String)>>>,
    visited: Arc<Mutex<Vec<String>>>,
}

impl FakeRenderer {
    pub fn new(script: PageScript) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Headers most recently installed on a page.
    pub fn last_headers(&self) -> Vec<(String, String)> {
        self.headers.lock().unwrap().clone()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.last_headers()
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            script: self.script.clone(),
            active: Arc::clone(&self.active),
            headers: Arc::clone(&self.headers),
            visited: Arc::clone(&self.visited),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

struct FakeContext {
    script: PageScript,
    active: Arc<AtomicUsize>,
    headers: Arc<Mutex<Vec<(String, String)>>>,
    visited: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn set_extra_headers(&mut self, headers: &[(String, String)]) -> Result<()> {
        *self.headers.lock().unwrap() = headers.to_vec();
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult> {
        self.visited.lock().unwrap().push(url.to_string());
        if !self.script.navigation_delay.is_zero() {
            tokio::time::sleep(self.script.navigation_delay).await;
        }
        if let Some(message) = &self.script.navigation_error {
            bail!("{message}");
        }
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: self.script.navigation_delay.as_millis() as u64,
        })
    }

    async fn wait_for_selector(&self, _selector: &str) -> Result<()> {
        if !self.script.readiness_delay.is_zero() {
            tokio::time::sleep(self.script.readiness_delay).await;
        }
        Ok(())
    }

    async fn get_html(&self) -> Result<String> {
        Ok(self.script.html.clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one shared [`FakeRenderer`], optionally failing first.
pub struct FakeLauncher {
    renderer: Arc<FakeRenderer>,
    launches: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Duration,
}

impl FakeLauncher {
    pub fn new(renderer: Arc<FakeRenderer>) -> Self {
        Self {
            renderer,
            launches: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Fail the first `n` launches.
    pub fn failing(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Take `delay` to launch, so concurrent callers overlap.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Renderer>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            bail!("no browser binary found");
        }
        Ok(Arc::clone(&self.renderer) as Arc<dyn Renderer>)
    }
}

/// Config with short timeouts and a private cache directory.
pub fn test_config(cache_dir: &std::path::Path) -> ProxyConfig {
    ProxyConfig {
        cache_dir: cache_dir.to_path_buf(),
        navigation_timeout: Duration::from_millis(200),
        readiness_timeout: Duration::from_millis(200),
        asset_timeout: Duration::from_millis(500),
        ..ProxyConfig::default()
    }
}

/// A proxy over `launcher`, mirroring into `cache_dir`.
pub fn test_proxy(launcher: Arc<FakeLauncher>, cache_dir: &std::path::Path) -> Arc<RenderProxy> {
    proxy_with_config(launcher, &test_config(cache_dir))
}

/// A proxy over `launcher` with explicit settings.
pub fn proxy_with_config(launcher: Arc<FakeLauncher>, config: &ProxyConfig) -> Arc<RenderProxy> {
    let sessions = Arc::new(SessionManager::new(launcher));
    Arc::new(RenderProxy::new(
        sessions,
        AssetMirror::from_config(config),
        config,
    ))
}
