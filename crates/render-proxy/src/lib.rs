// Copyright 2026 Render Proxy Contributors
// SPDX-License-Identifier: Apache-2.0

//! Render proxy library: renders a target page in headless Chromium,
//! rewrites its root-relative references, mirrors the referenced assets
//! to local storage and serves the result in an embeddable form.
//!
//! # Module Overview
//!
//! - [`validate`] - target URL validation
//! - [`renderer`] - rendering-engine abstraction and the Chromium backend
//! - [`session`] - the process-wide browser session
//! - [`fetcher`] - renders a target URL into HTML
//! - [`rewrite`] - text-level reference rewriting and asset discovery
//! - [`mirror`] - asset download and basename-keyed local cache
//! - [`pipeline`] - per-request orchestration
//! - [`rest`] - the axum HTTP surface

pub mod config;
pub mod error;
pub mod fetcher;
pub mod mirror;
pub mod pipeline;
pub mod renderer;
pub mod rest;
pub mod rewrite;
pub mod session;
pub mod types;
pub mod validate;

pub use config::ProxyConfig;
pub use error::{ProxyError, ProxyResult};
pub use mirror::AssetMirror;
pub use pipeline::RenderProxy;
pub use session::{Launcher, SessionManager, SessionState};
pub use types::{AssetReference, MirroredAsset, RewrittenDocument, TargetRequest};
pub use validate::is_fetchable;
