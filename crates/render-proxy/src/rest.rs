// Copyright 2026 Render Proxy Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP surface for the proxy.
//!
//! `/` runs the rendering pipeline, `/assets/*path` serves mirrored
//! files by basename and `/health` reports the browser session state.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::error::ProxyError;
use crate::pipeline::RenderProxy;

/// Response headers that would stop the caller from embedding the page.
pub const EMBEDDING_RESTRICTION_HEADERS: &[&str] = &[
    "x-frame-options",
    "content-security-policy",
    "permissions-policy",
    "strict-transport-security",
    "x-content-type-options",
    "feature-policy",
    "referrer-policy",
];

const ALLOWED_METHODS: &str = "GET, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization, X-Requested-With";

/// Build the axum Router.
pub fn router(proxy: Arc<RenderProxy>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ]);

    Router::new()
        .route("/", any(handle_proxy))
        .route("/assets/*path", get(handle_asset))
        .route("/health", get(health))
        .layer(cors)
        .with_state(proxy)
}

/// Serve the router on `addr` until `shutdown` resolves.
pub async fn start(
    addr: &str,
    proxy: Arc<RenderProxy>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(proxy);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("render proxy listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        if self.is_outage() {
            error!("{self}");
        }
        (self.status(), Json(self.to_json())).into_response()
    }
}

/// Allow-all cross-origin policy plus blanked embedding restrictions.
pub fn apply_embedding_policy(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    for &name in EMBEDDING_RESTRICTION_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(""));
    }
}

#[derive(Deserialize, Default)]
struct ProxyParams {
    url: Option<String>,
}

async fn handle_proxy(
    State(proxy): State<Arc<RenderProxy>>,
    method: Method,
    headers: HeaderMap,
    query: Option<Query<ProxyParams>>,
) -> Response {
    let start = Instant::now();
    // A malformed query string counts as a missing `url`, never as a
    // rejection ahead of the method check.
    let url = query.and_then(|Query(params)| params.url);
    let target = url.clone().unwrap_or_default();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // Cancelled when this handler is dropped, i.e. when the client goes away.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let task = {
        let proxy = Arc::clone(&proxy);
        let method = method.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            proxy
                .handle(&method, url.as_deref(), user_agent, &cancel)
                .await
        })
    };

    let result = task
        .await
        .unwrap_or_else(|e| Err(ProxyError::Render(format!("proxy task failed: {e}"))));

    let response = match result {
        Ok(document) => {
            let mut response = Html(document.html).into_response();
            apply_embedding_policy(response.headers_mut());
            response
        }
        Err(e @ (ProxyError::MethodNotAllowed(_) | ProxyError::InvalidUrl(_))) => {
            e.into_response()
        }
        Err(e) => {
            let mut response = e.into_response();
            apply_embedding_policy(response.headers_mut());
            response
        }
    };

    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();
    if status.is_client_error() || status.is_server_error() {
        warn!("{method} {target} -> {} ({elapsed_ms}ms)", status.as_u16());
    } else {
        info!("{method} {target} -> {} ({elapsed_ms}ms)", status.as_u16());
    }
    response
}

async fn handle_asset(
    State(proxy): State<Arc<RenderProxy>>,
    Path(path): Path<String>,
) -> Response {
    let Some(file) = proxy.mirror().lookup(&path).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "status": "error", "message": "Asset not found." })),
        )
            .into_response();
    };

    match tokio::fs::read(&file).await {
        Ok(bytes) => {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            (
                [
                    (header::CONTENT_TYPE, content_type_for(name)),
                    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => ProxyError::Io(e).into_response(),
    }
}

async fn health(State(proxy): State<Arc<RenderProxy>>) -> Json<Value> {
    let sessions = proxy.sessions();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "browser": sessions.state(),
        "active_pages": sessions.active_contexts(),
    }))
}

/// Content type for a mirrored file, from its extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "html" | "htm" => "text/html; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
