//! Rendered-fragment caching around a [`Renderer`].
//!
//! Keys are SHA-256 hex digests of the MJML source unless the caller
//! supplies its own. Only successful renders are stored.

use std::time::Duration;

use mj_cache::{CacheBucket, CacheBucketExt};
use sha2::{Digest, Sha256};

use crate::error::RenderError;
use crate::renderer::Renderer;

/// Content hash used as the default cache key.
///
/// SHA-256 of the source, hex encoded (64 characters).
#[must_use]
pub fn fragment_key(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}

/// A [`Renderer`] that consults a cache bucket before rendering.
pub struct CachedRenderer {
    renderer: Renderer,
    bucket: Box<dyn CacheBucket>,
    ttl: Option<Duration>,
}

impl CachedRenderer {
    /// Wrap `renderer`; entries never expire unless [`ttl`](Self::ttl) is set.
    #[must_use]
    pub fn new(renderer: Renderer, bucket: Box<dyn CacheBucket>) -> Self {
        Self {
            renderer,
            bucket,
            ttl: None,
        }
    }

    /// Expire stored fragments after `ttl`.
    #[must_use]
    pub fn ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Underlying renderer.
    #[must_use]
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Render `source`, keyed by its content hash.
    ///
    /// # Errors
    ///
    /// Returns the renderer's error on a cache miss that fails to render.
    pub fn render(&self, source: &str) -> Result<String, RenderError> {
        self.render_with_key(&fragment_key(source), source)
    }

    /// Render `source`, stored under a caller-chosen `key`.
    ///
    /// # Errors
    ///
    /// Returns the renderer's error on a cache miss that fails to render.
    pub fn render_with_key(&self, key: &str, source: &str) -> Result<String, RenderError> {
        if let Some(html) = self.bucket.get_string(key) {
            tracing::debug!(key, "MJML fragment cache hit");
            return Ok(html);
        }

        let html = self.renderer.render(source)?;
        self.bucket.set_string(key, &html, self.ttl);
        Ok(html)
    }
}
