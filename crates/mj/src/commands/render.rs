//! `mj render` command implementation.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use mj_cache::{Cache, FileCache, NullCache};
use mj_config::{CliSettings, Config};
use mj_renderer::{BackendKind, CachedRenderer, Renderer};

use crate::error::CliError;
use crate::output::Output;

/// Cache bucket holding rendered fragments.
const FRAGMENT_BUCKET: &str = "fragments";

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// MJML file to render (default: read stdin).
    input: Option<PathBuf>,

    /// Write HTML to this file (default: stdout).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover mjml.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Renderer backend (overrides config).
    #[arg(short, long, env = "MJML_BACKEND")]
    backend: Option<BackendKind>,

    /// Timeout in seconds for networked backends (overrides config).
    #[arg(long)]
    timeout: Option<u64>,

    /// Enable fragment caching (default: disabled).
    #[arg(long)]
    cache: Option<bool>,

    /// Disable fragment caching.
    #[arg(long, conflicts_with = "cache")]
    no_cache: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

impl RenderArgs {
    /// Execute the render command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration, input, rendering or output fails.
    pub(crate) fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            backend: self.backend,
            timeout_secs: self.timeout,
            cache_enabled: self.resolve_cache_enabled(),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let renderer = prepare_renderer(&config)?;
        let source = read_input(self.input.as_deref())?;
        tracing::info!(backend = renderer.backend_name(), "Rendering MJML");

        let cache: Box<dyn Cache> = if config.cache_resolved.enabled {
            let cache = FileCache::new(config.cache_resolved.dir.clone(), version);
            ensure_gitignore(&config.cache_resolved.dir);
            Box::new(cache)
        } else {
            Box::new(NullCache)
        };
        let renderer = CachedRenderer::new(renderer, cache.bucket(FRAGMENT_BUCKET))
            .ttl(config.cache_resolved.ttl);

        let html = renderer.render(&source)?;

        match &self.output {
            Some(path) => {
                std::fs::write(path, &html)?;
                output.info(format_args!("Wrote {} bytes to {}", html.len(), path.display()));
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(html.as_bytes())?;
                stdout.flush()?;
            }
        }

        Ok(())
    }

    /// Resolve `cache_enabled` from --cache/--no-cache flags.
    fn resolve_cache_enabled(&self) -> Option<bool> {
        self.no_cache.then_some(false).or(self.cache)
    }
}

/// Build the configured renderer, running its startup self-check unless the
/// backend opts out.
fn prepare_renderer(config: &Config) -> Result<Renderer, CliError> {
    Ok(Renderer::initialize(&config.backend_config()?)?)
}

/// Read MJML from `path`, or from stdin when no path (or `-`) is given.
fn read_input(path: Option<&Path>) -> Result<String, CliError> {
    match path {
        Some(path) if path != Path::new("-") => {
            std::fs::read_to_string(path).map_err(|source| CliError::Input {
                path: path.display().to_string(),
                source,
            })
        }
        _ => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .map_err(|source| CliError::Input {
                    path: "<stdin>".to_owned(),
                    source,
                })?;
            Ok(source)
        }
    }
}

/// Keep the cache directory out of version control.
fn ensure_gitignore(cache_dir: &Path) {
    let gitignore_path = cache_dir.join(".gitignore");
    if !gitignore_path.exists() {
        let _ = std::fs::write(&gitignore_path, "# Automatically created by mj\n*\n");
    }
}
