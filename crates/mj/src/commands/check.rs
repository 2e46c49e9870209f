//! `mj check` command implementation.

use std::path::PathBuf;

use clap::Args;
use mj_config::{CliSettings, Config};
use mj_renderer::{BackendKind, Renderer};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the check command.
#[derive(Args)]
pub(crate) struct CheckArgs {
    /// Path to configuration file (default: auto-discover mjml.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Renderer backend (overrides config).
    #[arg(short, long, env = "MJML_BACKEND")]
    backend: Option<BackendKind>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CheckArgs {
    /// Execute the check command.
    ///
    /// The self-check runs even when the process backend disables it for
    /// startup, since checking is the point of this command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid or the self-check fails.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            backend: self.backend,
            ..Default::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        if let Some(path) = &config.config_path {
            output.field("Config", path.display());
        }

        let renderer = Renderer::from_config(&config.backend_config()?)?;
        output.field("Backend", renderer.backend_name());

        renderer.self_check()?;
        output.success("MJML renderer is working");

        Ok(())
    }
}
