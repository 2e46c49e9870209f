//! Renderer facade.
//!
//! [`Renderer`] owns exactly one strategy for its whole lifetime and is the
//! entry point callers use. It is `Send + Sync`; share it behind an `Arc` to
//! render from several threads.

use crate::config::BackendConfig;
use crate::consts::{CHECK_FIXTURE_V3, CHECK_FIXTURE_V4, HTML_MARKER};
use crate::error::{CheckFailure, RenderError};
use crate::factory::create_strategy;
use crate::strategy::RenderStrategy;

/// MJML renderer bound to one configured backend.
pub struct Renderer {
    strategy: Box<dyn RenderStrategy>,
}

impl Renderer {
    /// Wrap an already constructed strategy.
    #[must_use]
    pub fn new(strategy: Box<dyn RenderStrategy>) -> Self {
        Self { strategy }
    }

    /// Build the strategy for `config` without running the self-check.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Configuration`] for an invalid configuration.
    pub fn from_config(config: &BackendConfig) -> Result<Self, RenderError> {
        create_strategy(config).map(Self::new)
    }

    /// Build the strategy for `config` and run the self-check if the backend
    /// asks for one.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Configuration`] for an invalid configuration and
    /// [`RenderError::StartupCheckFailed`] when the self-check fails.
    pub fn initialize(config: &BackendConfig) -> Result<Self, RenderError> {
        let renderer = Self::from_config(config)?;
        if renderer.strategy.check_on_startup() {
            renderer.self_check()?;
        } else {
            tracing::debug!(backend = renderer.backend_name(), "Skipping MJML self-check");
        }
        Ok(renderer)
    }

    /// Name of the configured backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Render MJML source to HTML.
    ///
    /// # Errors
    ///
    /// Returns whatever the backend reports; see [`RenderError`].
    pub fn render(&self, source: &str) -> Result<String, RenderError> {
        self.strategy.render(source)
    }

    /// Render known-good fixtures and verify the output is an HTML document.
    ///
    /// The MJML 3 fixture is tried first and the MJML 4 fixture second, so
    /// either major version passes.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::StartupCheckFailed`] with
    /// [`CheckFailure::Render`] when neither fixture renders, or with
    /// [`CheckFailure::MissingMarker`] when the output lacks `<html `.
    pub fn self_check(&self) -> Result<(), RenderError> {
        let html = match self.strategy.render(CHECK_FIXTURE_V3) {
            Ok(html) => html,
            Err(first) => {
                tracing::debug!(error = %first, "MJML 3 fixture failed, trying MJML 4 fixture");
                self.strategy
                    .render(CHECK_FIXTURE_V4)
                    .map_err(|e| CheckFailure::Render(Box::new(e)))?
            }
        };

        if !html.contains(HTML_MARKER) {
            return Err(CheckFailure::MissingMarker.into());
        }

        tracing::info!(backend = self.backend_name(), "MJML self-check passed");
        Ok(())
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("backend", &self.backend_name())
            .finish()
    }
}
