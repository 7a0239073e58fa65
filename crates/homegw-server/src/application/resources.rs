//! Collaborator traits for the REST resource surface and static assets.
//!
//! The HTTP session routes `/res/*` to a [`ResourceHandler`] and unmatched
//! `GET` requests to an [`AssetStore`].  Both are implemented outside the
//! connection layer: the session only moves bytes and enforces that the
//! caller is authenticated.

use async_trait::async_trait;
use homegw_core::Principal;
use serde_json::Value;
use thiserror::Error;

/// One `/res/*` request, with the `/res/` prefix already stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRequest {
    /// HTTP method, upper-case (`GET`, `PUT`, ...).
    pub method: String,
    /// Path below `/res/`, e.g. `devices/lamp`.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Request body (may be empty).
    pub body: Vec<u8>,
}

impl ResourceRequest {
    /// Path segments, ignoring empty ones.
    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }
}

/// A successful resource reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceReply {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl ResourceReply {
    /// `200` with a JSON body.
    pub fn json(value: &Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json".to_string(),
            body: value.to_string().into_bytes(),
        }
    }

    /// `200` with an arbitrary content type.
    pub fn raw(content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: content_type.into(),
            body,
        }
    }
}

/// A resource request that could not be served.  Reported as HTTP 400.
#[derive(Debug, Error, PartialEq)]
pub enum ResourceError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("access denied")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
}

/// The domain dispatcher behind `/res/*`.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn handle(
        &self,
        principal: &Principal,
        request: ResourceRequest,
    ) -> Result<ResourceReply, ResourceError>;
}

/// A resource handler that knows no resources.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResources;

#[async_trait]
impl ResourceHandler for NoResources {
    async fn handle(
        &self,
        _principal: &Principal,
        request: ResourceRequest,
    ) -> Result<ResourceReply, ResourceError> {
        Err(ResourceError::NotFound(request.path))
    }
}

/// A static file found by an [`AssetStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Lookup of static assets by request path.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Returns the asset for `path` (always starting with `/`), or `None`.
    async fn lookup(&self, path: &str) -> Option<Asset>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
