//! Typed backend configuration.
//!
//! [`BackendConfig`] is a closed union over the three supported transports.
//! It is built once at startup (usually by `mj-config`) and handed to
//! [`create_strategy`](crate::create_strategy), which validates it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::consts::{
    DEFAULT_COMMAND, DEFAULT_HTTP_URL, DEFAULT_TCP_HOST, DEFAULT_TCP_PORT, DEFAULT_TIMEOUT,
};

/// Backend descriptor selecting one transport plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Invoke a local renderer process per call.
    Process(ProcessConfig),
    /// Talk to MJML TCP servers.
    Tcp(TcpConfig),
    /// Talk to MJML HTTP API servers.
    Http(HttpConfig),
}

impl BackendConfig {
    /// Transport kind of this configuration.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Process(_) => BackendKind::Process,
            Self::Tcp(_) => BackendKind::Tcp,
            Self::Http(_) => BackendKind::Http,
        }
    }

    /// Default configuration for the given kind.
    #[must_use]
    pub fn default_for(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Process => Self::Process(ProcessConfig::default()),
            BackendKind::Tcp => Self::Tcp(TcpConfig::default()),
            BackendKind::Http => Self::Http(HttpConfig::default()),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Process(ProcessConfig::default())
    }
}

/// Backend kind, as named in configuration files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Local process invocation.
    #[default]
    Process,
    /// Length-prefixed TCP protocol.
    Tcp,
    /// HTTP JSON API.
    Http,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Process => "process",
            Self::Tcp => "tcp",
            Self::Http => "http",
        };
        f.write_str(name)
    }
}

/// Unknown backend name.
#[derive(Debug, thiserror::Error)]
#[error("unknown backend \"{0}\" (expected \"process\", \"tcp\" or \"http\")")]
pub struct ParseBackendKindError(String);

impl FromStr for BackendKind {
    type Err = ParseBackendKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" | "cmd" => Ok(Self::Process),
            "tcp" | "tcpserver" => Ok(Self::Tcp),
            "http" | "httpserver" => Ok(Self::Http),
            _ => Err(ParseBackendKindError(s.to_owned())),
        }
    }
}

/// Renderer command: a single program name or a full argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandArgs {
    /// Program only, e.g. `"mjml"`.
    Single(String),
    /// Program followed by arguments, e.g. `["npx", "mjml"]`.
    List(Vec<String>),
}

impl CommandArgs {
    /// Arguments as an ordered vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::Single(program) => vec![program.clone()],
            Self::List(args) => args.clone(),
        }
    }
}

impl Default for CommandArgs {
    fn default() -> Self {
        Self::Single(DEFAULT_COMMAND.to_owned())
    }
}

/// Process backend configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    /// Renderer command; `-i` and `-s` are appended when missing.
    pub args: CommandArgs,
    /// Environment for the child. When set, it replaces the inherited
    /// environment entirely; when `None`, the child inherits ours.
    pub env: Option<BTreeMap<String, String>>,
    /// Whether [`Renderer::initialize`](crate::Renderer::initialize) runs the self-check.
    pub check_on_startup: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            args: CommandArgs::default(),
            env: None,
            check_on_startup: true,
        }
    }
}

/// A single MJML TCP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpServer {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl TcpServer {
    /// Create a server endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for TcpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// TCP backend configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Candidate servers, tried in random order per call.
    pub servers: Vec<TcpServer>,
    /// Timeout for connect and for each read or write.
    pub timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            servers: vec![TcpServer::new(DEFAULT_TCP_HOST, DEFAULT_TCP_PORT)],
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// HTTP Basic authentication credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    /// User name (application ID for the public MJML API).
    pub user: String,
    /// Password (secret key for the public MJML API).
    pub password: String,
}

impl BasicAuth {
    /// Create credentials.
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// A single MJML HTTP API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpServer {
    /// Render endpoint URL.
    pub url: String,
    /// Optional Basic authentication.
    pub auth: Option<BasicAuth>,
}

impl HttpServer {
    /// Create an unauthenticated server endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth: None,
        }
    }

    /// Attach Basic authentication.
    #[must_use]
    pub fn with_auth(mut self, auth: BasicAuth) -> Self {
        self.auth = Some(auth);
        self
    }
}

impl fmt::Display for HttpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// HTTP backend configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Candidate servers, tried in random order per call.
    pub servers: Vec<HttpServer>,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            servers: vec![HttpServer::new(DEFAULT_HTTP_URL)],
            timeout: DEFAULT_TIMEOUT,
        }
    }
}
