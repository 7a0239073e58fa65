//! Static asset store backed by a directory.
//!
//! `GET /` maps to `index.html`; any other path maps to the file of the same
//! relative name below the root.  Paths containing `..`, backslashes or NUL
//! bytes never reach the file system.  With no root configured every lookup
//! misses and the HTTP session answers with its fixed 404 page.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::application::{Asset, AssetStore};

/// Serves files below an optional root directory.
#[derive(Debug, Clone, Default)]
pub struct DirAssets {
    root: Option<PathBuf>,
}

impl DirAssets {
    /// Creates a store rooted at `root`; `None` disables static assets.
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// Maps a request path onto a file below the root, rejecting traversal.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        let relative = path.trim_start_matches('/');
        let relative = if relative.is_empty() {
            "index.html"
        } else {
            relative
        };
        if relative.contains('\\') || relative.contains('\0') {
            return None;
        }

        let candidate = Path::new(relative);
        if !candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(root.join(candidate))
    }
}

#[async_trait]
impl AssetStore for DirAssets {
    async fn lookup(&self, path: &str) -> Option<Asset> {
        let file = self.resolve(path)?;
        match tokio::fs::read(&file).await {
            Ok(body) => Some(Asset {
                content_type: content_type_for(&file).to_string(),
                body,
            }),
            Err(e) => {
                debug!("asset {} not served: {e}", file.display());
                None
            }
        }
    }
}

/// Picks a content type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js" | "mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
