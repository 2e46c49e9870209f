//! Error types for MJML rendering.
//!
//! Every backend normalizes its failures into [`RenderError`], whatever the
//! transport reported (process exit and stderr, socket errors, HTTP status and
//! JSON error arrays).

use std::fmt;

/// Transport through which the external renderer was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Local `mjml` process.
    Command,
    /// MJML TCP server speaking the length-prefixed protocol.
    Tcp,
    /// MJML HTTP API.
    Http,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Command => "MJML command",
            Self::Tcp => "MJML TCP server",
            Self::Http => "MJML HTTP server",
        };
        f.write_str(label)
    }
}

/// Semantic error category, for branching without matching payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderErrorKind {
    /// Invalid or incomplete backend configuration.
    Configuration,
    /// Renderer process could not be started or talked to.
    Spawn,
    /// Renderer reported a markup error.
    Compile,
    /// Every configured server was exhausted.
    NoServerAvailable,
    /// Renderer broke the wire protocol after a connection was established.
    Protocol,
    /// Startup self-check failed.
    StartupCheckFailed,
}

/// Error from rendering MJML through a backend.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Backend configuration is invalid. Raised at construction, never per call.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The renderer process could not be created or communicated with.
    #[error(
        "Problem to run command \"{command}\"\n{source}\n\
         Check that mjml is installed and allow permissions to execute.\n\
         See https://github.com/mjmlio/mjml#installation"
    )]
    Spawn {
        /// Command line that was attempted.
        command: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The renderer answered but rejected the markup.
    #[error("MJML compile error (via {via}): {message}")]
    Compile {
        /// Transport that produced the diagnostic.
        via: Transport,
        /// Renderer-provided diagnostic text, verbatim.
        message: String,
    },

    /// No configured server completed an exchange.
    #[error(
        "MJML compile error (via {via}): no working server\n\
         Number of servers: {servers}\n\
         Timeouts: {timeouts}"
    )]
    NoServerAvailable {
        /// Transport whose servers were exhausted.
        via: Transport,
        /// Number of configured servers.
        servers: usize,
        /// Number of attempts that ended in a timeout.
        timeouts: usize,
    },

    /// The renderer violated the wire protocol on an established connection.
    #[error("MJML protocol error (via {via}): {message}")]
    Protocol {
        /// Transport on which the violation happened.
        via: Transport,
        /// Description of the violation.
        message: String,
    },

    /// Startup self-check failed.
    #[error("MJML renderer self-check failed: {0}")]
    StartupCheckFailed(#[from] CheckFailure),
}

impl RenderError {
    /// Create a compile error carrying a renderer diagnostic.
    #[must_use]
    pub fn compile(via: Transport, message: impl Into<String>) -> Self {
        Self::Compile {
            via,
            message: message.into(),
        }
    }

    /// Create a protocol violation error.
    #[must_use]
    pub fn protocol(via: Transport, message: impl Into<String>) -> Self {
        Self::Protocol {
            via,
            message: message.into(),
        }
    }

    /// Semantic category of this error.
    #[must_use]
    pub fn kind(&self) -> RenderErrorKind {
        match self {
            Self::Configuration(_) => RenderErrorKind::Configuration,
            Self::Spawn { .. } => RenderErrorKind::Spawn,
            Self::Compile { .. } => RenderErrorKind::Compile,
            Self::NoServerAvailable { .. } => RenderErrorKind::NoServerAvailable,
            Self::Protocol { .. } => RenderErrorKind::Protocol,
            Self::StartupCheckFailed(_) => RenderErrorKind::StartupCheckFailed,
        }
    }
}

/// Reason the startup self-check failed.
#[derive(Debug, thiserror::Error)]
pub enum CheckFailure {
    /// Neither fixture rendered; carries the last render error.
    #[error("{0}")]
    Render(Box<RenderError>),

    /// The renderer produced output, but not an HTML document.
    #[error(
        "mjml returns wrong result (no \"<html \" in output).\n\
         Check MJML is installed correctly. See https://github.com/mjmlio/mjml#installation"
    )]
    MissingMarker,
}
