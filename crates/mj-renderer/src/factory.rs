//! Strategy construction with eager validation.

use std::time::Duration;

use crate::config::{BackendConfig, HttpConfig, ProcessConfig, TcpConfig};
use crate::error::RenderError;
use crate::http::HttpStrategy;
use crate::process::ProcessStrategy;
use crate::strategy::RenderStrategy;
use crate::tcp::TcpStrategy;

/// Build the strategy for `config`.
///
/// # Errors
///
/// Returns [`RenderError::Configuration`] when the configuration cannot
/// produce a working backend (empty command or server list, blank host,
/// port 0, non-HTTP URL, zero timeout).
pub fn create_strategy(config: &BackendConfig) -> Result<Box<dyn RenderStrategy>, RenderError> {
    let strategy: Box<dyn RenderStrategy> = match config {
        BackendConfig::Process(process) => {
            validate_process(process)?;
            Box::new(ProcessStrategy::new(process))
        }
        BackendConfig::Tcp(tcp) => {
            validate_tcp(tcp)?;
            Box::new(TcpStrategy::new(tcp))
        }
        BackendConfig::Http(http) => {
            validate_http(http)?;
            Box::new(HttpStrategy::new(http))
        }
    };
    tracing::debug!(backend = strategy.name(), "Created MJML render strategy");
    Ok(strategy)
}

fn invalid(message: impl Into<String>) -> RenderError {
    RenderError::Configuration(message.into())
}

fn validate_process(config: &ProcessConfig) -> Result<(), RenderError> {
    let args = config.args.to_vec();
    if args.is_empty() {
        return Err(invalid("process command must not be empty"));
    }
    if args.iter().any(|arg| arg.trim().is_empty()) {
        return Err(invalid("process command must not contain empty arguments"));
    }
    Ok(())
}

fn validate_timeout(timeout: Duration, backend: &str) -> Result<(), RenderError> {
    if timeout.is_zero() {
        return Err(invalid(format!("{backend} timeout must be greater than zero")));
    }
    Ok(())
}

fn validate_tcp(config: &TcpConfig) -> Result<(), RenderError> {
    if config.servers.is_empty() {
        return Err(invalid("tcp backend requires at least one server"));
    }
    for server in &config.servers {
        if server.host.trim().is_empty() {
            return Err(invalid("tcp server host must not be empty"));
        }
        if server.port == 0 {
            return Err(invalid(format!("tcp server {server} has port 0")));
        }
    }
    validate_timeout(config.timeout, "tcp")
}

fn validate_http(config: &HttpConfig) -> Result<(), RenderError> {
    if config.servers.is_empty() {
        return Err(invalid("http backend requires at least one server"));
    }
    for server in &config.servers {
        let url = server.url.trim();
        let scheme_ok = ["http://", "https://"].iter().any(|scheme| {
            url.get(..scheme.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        });
        if !scheme_ok {
            return Err(invalid(format!(
                "http server URL must start with http:// or https://, got \"{}\"",
                server.url
            )));
        }
    }
    validate_timeout(config.timeout, "http")
}
