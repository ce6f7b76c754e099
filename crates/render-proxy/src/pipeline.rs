//! Per-request orchestration.
//!
//! `validate method → validate url → render → rewrite (absolute) →
//! discover assets → mirror all → rewrite (local) → inject
//! instrumentation`. The first failing step ends the request; asset
//! failures are not failures of the request.

use std::sync::Arc;
use std::time::Instant;

use axum::http::Method;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::fetcher::{self, FetchOptions};
use crate::mirror::AssetMirror;
use crate::rewrite;
use crate::session::SessionManager;
use crate::types::{MirroredAsset, RewrittenDocument, TargetRequest};
use crate::validate;

/// The rendering proxy: shared session, asset mirror and settings.
pub struct RenderProxy {
    sessions: Arc<SessionManager>,
    mirror: AssetMirror,
    fetch: FetchOptions,
    asset_prefix: String,
}

impl RenderProxy {
    pub fn new(sessions: Arc<SessionManager>, mirror: AssetMirror, config: &ProxyConfig) -> Self {
        Self {
            sessions,
            mirror,
            fetch: FetchOptions::from(config),
            asset_prefix: config.asset_prefix.clone(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn mirror(&self) -> &AssetMirror {
        &self.mirror
    }

    /// Handle one inbound request from method check to final document.
    pub async fn handle(
        &self,
        method: &Method,
        url: Option<&str>,
        caller_user_agent: Option<String>,
        cancel: &CancellationToken,
    ) -> ProxyResult<RewrittenDocument> {
        if method != Method::GET {
            return Err(ProxyError::MethodNotAllowed(method.to_string()));
        }

        let url = url.unwrap_or_default();
        if !validate::is_fetchable(url) {
            return Err(ProxyError::InvalidUrl(url.to_string()));
        }

        let request = TargetRequest::new(url, caller_user_agent);
        self.process(&request, cancel).await
    }

    /// Render, rewrite and mirror an already validated request.
    pub async fn process(
        &self,
        request: &TargetRequest,
        cancel: &CancellationToken,
    ) -> ProxyResult<RewrittenDocument> {
        let target = validate::parse_fetchable(&request.url)
            .ok_or_else(|| ProxyError::InvalidUrl(request.url.clone()))?;
        let origin = validate::origin_of(&target);
        let start = Instant::now();

        let renderer = self.sessions.acquire().await?;
        let html = fetcher::render(renderer.as_ref(), request, &origin, &self.fetch, cancel).await?;
        debug!("rendered {} ({} bytes)", request.url, html.len());

        let (html, references) = rewrite::rewrite_absolute(&html, &origin);
        debug!("discovered {} assets on {}", references.len(), request.url);

        let mut assets: Vec<MirroredAsset> = Vec::with_capacity(references.len());
        for reference in &references {
            if cancel.is_cancelled() {
                return Err(ProxyError::Cancelled);
            }
            assets.push(self.mirror.mirror(reference, &origin, cancel).await);
        }

        let html = rewrite::rewrite_local(&html, &self.asset_prefix);
        let html = rewrite::inject_instrumentation(html);

        let mirrored = assets.iter().filter(|a| a.is_available()).count();
        info!(
            "proxied {} in {:.2}s ({mirrored}/{} assets mirrored)",
            request.url,
            start.elapsed().as_secs_f32(),
            assets.len()
        );

        Ok(RewrittenDocument { html, assets })
    }
}
