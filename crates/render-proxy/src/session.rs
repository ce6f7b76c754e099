//! The process-wide browser session.
//!
//! One rendering engine serves every request. It is launched lazily by
//! the first request that needs it; concurrent first uses wait on the
//! same launch instead of starting engines of their own. A failed launch
//! leaves the session uninitialized so a later request can try again.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use crate::error::{ProxyError, ProxyResult};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;

/// Starts a rendering engine.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self) -> anyhow::Result<Arc<dyn Renderer>>;
}

/// Launches headless Chromium.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    chromium_path: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new(chromium_path: Option<PathBuf>) -> Self {
        Self { chromium_path }
    }
}

#[async_trait]
impl Launcher for ChromiumLauncher {
    async fn launch(&self) -> anyhow::Result<Arc<dyn Renderer>> {
        let renderer = ChromiumRenderer::launch(self.chromium_path.as_deref()).await?;
        Ok(Arc::new(renderer))
    }
}

/// Lifecycle of the shared session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Ready,
    ShutDown,
}

/// Owns the single rendering engine for the process.
pub struct SessionManager {
    launcher: Arc<dyn Launcher>,
    renderer: OnceCell<Arc<dyn Renderer>>,
    shut_down: AtomicBool,
    engine_closed: AtomicBool,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn Launcher>) -> Self {
        Self {
            launcher,
            renderer: OnceCell::new(),
            shut_down: AtomicBool::new(false),
            engine_closed: AtomicBool::new(false),
        }
    }

    /// The shared engine, launching it on first use.
    pub async fn acquire(&self) -> ProxyResult<Arc<dyn Renderer>> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(shut_down_error());
        }

        let renderer = self
            .renderer
            .get_or_try_init(|| async {
                info!("launching shared rendering engine");
                let renderer = self.launcher.launch().await.map_err(|e| {
                    error!("rendering engine failed to start: {e:#}");
                    ProxyError::SessionStartup(format!("{e:#}"))
                })?;
                // Released while launching: nobody else will stop it.
                if self.shut_down.load(Ordering::SeqCst) {
                    if let Err(e) = renderer.shutdown().await {
                        warn!("failed to stop engine launched during shutdown: {e:#}");
                    }
                    return Err(shut_down_error());
                }
                Ok::<_, ProxyError>(renderer)
            })
            .await?;

        if self.shut_down.load(Ordering::SeqCst) {
            if let Err(e) = self.close_engine().await {
                warn!("failed to shut down rendering engine: {e:#}");
            }
            return Err(shut_down_error());
        }

        Ok(Arc::clone(renderer))
    }

    /// Terminate the engine. Later `acquire` calls fail; a launch still in
    /// flight stops its engine as soon as it completes.
    pub async fn release(&self) -> anyhow::Result<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.close_engine().await
    }

    /// Shut the launched engine down, at most once.
    async fn close_engine(&self) -> anyhow::Result<()> {
        let Some(renderer) = self.renderer.get() else {
            return Ok(());
        };
        if self.engine_closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!(
            "shutting down rendering engine ({} open pages)",
            renderer.active_contexts()
        );
        renderer.shutdown().await
    }

    pub fn state(&self) -> SessionState {
        if self.shut_down.load(Ordering::SeqCst) {
            SessionState::ShutDown
        } else if self.renderer.initialized() {
            SessionState::Ready
        } else {
            SessionState::Uninitialized
        }
    }

    /// Open pages on the engine, zero when it has not been launched.
    pub fn active_contexts(&self) -> usize {
        self.renderer
            .get()
            .map(|r| r.active_contexts())
            .unwrap_or(0)
    }
}

fn shut_down_error() -> ProxyError {
    ProxyError::SessionStartup("session has been shut down".into())
}
