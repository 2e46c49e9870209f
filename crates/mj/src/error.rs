//! CLI error types.

use mj_config::ConfigError;
use mj_renderer::RenderError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Render(#[from] RenderError),

    #[error("{path}: {source}")]
    Input {
        path: String,
        source: std::io::Error,
    },
}
