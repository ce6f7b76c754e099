//! Core data types flowing through a proxied request.

use std::path::PathBuf;

use serde::Serialize;

/// One inbound proxy request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRequest {
    /// Absolute URL of the page to render.
    pub url: String,
    /// The caller's own `User-Agent`, if it sent one.
    pub caller_user_agent: Option<String>,
}

impl TargetRequest {
    pub fn new(url: impl Into<String>, caller_user_agent: Option<String>) -> Self {
        Self {
            url: url.into(),
            caller_user_agent: caller_user_agent.filter(|ua| !ua.trim().is_empty()),
        }
    }
}

/// A root-relative reference exactly as it appeared in the markup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AssetReference {
    pub raw_url: String,
}

impl AssetReference {
    pub fn new(raw_url: impl Into<String>) -> Self {
        Self {
            raw_url: raw_url.into(),
        }
    }
}

impl From<&str> for AssetReference {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Outcome of mirroring one asset. `local_path` is `None` when the
/// reference was unusable or the download failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirroredAsset {
    pub source_url: String,
    pub local_path: Option<PathBuf>,
}

impl MirroredAsset {
    pub fn is_available(&self) -> bool {
        self.local_path.is_some()
    }
}

/// The document returned to the caller together with what was mirrored
/// while producing it.
#[derive(Debug, Clone)]
pub struct RewrittenDocument {
    pub html: String,
    pub assets: Vec<MirroredAsset>,
}
