//! The rendering contract shared by every backend.

use crate::error::RenderError;

/// A transport that turns MJML source into HTML via an external renderer.
///
/// Implementations are immutable after construction and safe to call from
/// many threads at once; every call is independent.
pub trait RenderStrategy: Send + Sync {
    /// Short backend name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Render MJML source to HTML.
    ///
    /// Blocks until the renderer answers or the transport gives up.
    fn render(&self, source: &str) -> Result<String, RenderError>;

    /// Whether the startup self-check should run for this backend.
    fn check_on_startup(&self) -> bool {
        true
    }
}
