//! `mjml.toml` loading.
//!
//! The file is looked up in the working directory and its ancestors unless a
//! path is given. Without a file every section takes its defaults: the
//! process backend running `mjml`, with caching off.
//!
//! ```toml
//! [renderer]
//! backend = "http"
//! timeout_secs = 10
//!
//! [[renderer.http.servers]]
//! url = "${MJML_API_URL:-https://api.mjml.io/v1/render}"
//! auth = ["${MJML_APP_ID}", "${MJML_SECRET}"]
//!
//! [cache]
//! enabled = true
//! ttl_secs = 3600
//! ```
//!
//! `${VAR}` references fail when `VAR` is unset; `${VAR:-fallback}` does not.
//! They are expanded in:
//! - `renderer.process.command`
//! - `renderer.process.env` values
//! - `renderer.tcp.servers[].host`
//! - `renderer.http.servers[].url`
//! - `renderer.http.servers[].auth`

mod expand;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mj_renderer::{
    BackendConfig, BackendKind, BasicAuth, CommandArgs, DEFAULT_HTTP_URL, DEFAULT_TCP_HOST,
    DEFAULT_TCP_PORT, DEFAULT_TIMEOUT, HttpConfig, HttpServer, ProcessConfig, TcpConfig,
    TcpServer,
};
use serde::Deserialize;

/// Command-line values that take precedence over the file. `None` leaves the
/// file's value alone.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// `renderer.backend`
    pub backend: Option<BackendKind>,
    /// `renderer.timeout_secs`
    pub timeout_secs: Option<u64>,
    /// `cache.enabled`
    pub cache_enabled: Option<bool>,
}

/// Name looked up during discovery.
const CONFIG_FILENAME: &str = "mjml.toml";

/// Default cache directory, relative to the config file.
const DEFAULT_CACHE_DIR: &str = ".mjml-cache";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Renderer backend configuration.
    pub renderer: RendererConfig,
    cache: CacheConfigRaw,

    /// `[cache]` with the directory made absolute.
    #[serde(skip)]
    pub cache_resolved: CacheConfig,
    /// File the configuration came from, if any.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// `[renderer]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Backend name: `process`, `tcp` or `http`.
    pub backend: String,
    /// Timeout for networked backends, in seconds.
    pub timeout_secs: u64,
    /// `[renderer.process]` section.
    pub process: ProcessSection,
    /// `[renderer.tcp]` section.
    pub tcp: TcpSection,
    /// `[renderer.http]` section.
    pub http: HttpSection,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default().to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            process: ProcessSection::default(),
            tcp: TcpSection::default(),
            http: HttpSection::default(),
        }
    }
}

/// Renderer command as written in TOML: a string or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    /// `command = "mjml"`
    Single(String),
    /// `command = ["npx", "mjml"]`
    List(Vec<String>),
}

impl Default for CommandSpec {
    fn default() -> Self {
        Self::Single("mjml".to_owned())
    }
}

/// `[renderer.process]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProcessSection {
    /// Renderer command.
    pub command: CommandSpec,
    /// Child environment; replaces the inherited environment when set.
    pub env: Option<BTreeMap<String, String>>,
    /// Run the self-check at startup.
    pub check_on_startup: bool,
}

impl Default for ProcessSection {
    fn default() -> Self {
        Self {
            command: CommandSpec::default(),
            env: None,
            check_on_startup: true,
        }
    }
}

/// One `[[renderer.tcp.servers]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TcpServerEntry {
    /// Host name or IP address.
    #[serde(default = "default_tcp_host")]
    pub host: String,
    /// TCP port.
    #[serde(default = "default_tcp_port")]
    pub port: u16,
}

fn default_tcp_host() -> String {
    DEFAULT_TCP_HOST.to_owned()
}

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}

/// `[renderer.tcp]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TcpSection {
    /// Candidate servers.
    pub servers: Vec<TcpServerEntry>,
}

impl Default for TcpSection {
    fn default() -> Self {
        Self {
            servers: vec![TcpServerEntry {
                host: default_tcp_host(),
                port: default_tcp_port(),
            }],
        }
    }
}

/// HTTP Basic credentials as written in TOML.
#[derive(Clone, Deserialize)]
#[serde(untagged)]
pub enum AuthSpec {
    /// `auth = ["user", "password"]`
    Pair(String, String),
    /// `auth = { user = "...", password = "..." }`
    Table {
        /// User name.
        user: String,
        /// Password.
        password: String,
    },
}

impl std::fmt::Debug for AuthSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (Self::Pair(user, _) | Self::Table { user, .. }) = self;
        f.debug_struct("AuthSpec")
            .field("user", user)
            .field("password", &"***")
            .finish()
    }
}

impl AuthSpec {
    fn parts(&self) -> (&str, &str) {
        match self {
            Self::Pair(user, password) | Self::Table { user, password } => {
                (user.as_str(), password.as_str())
            }
        }
    }
}

/// One `[[renderer.http.servers]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerEntry {
    /// Render endpoint URL.
    #[serde(default = "default_http_url")]
    pub url: String,
    /// Optional Basic authentication.
    pub auth: Option<AuthSpec>,
}

fn default_http_url() -> String {
    DEFAULT_HTTP_URL.to_owned()
}

/// `[renderer.http]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Candidate servers.
    pub servers: Vec<HttpServerEntry>,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            servers: vec![HttpServerEntry {
                url: default_http_url(),
                auth: None,
            }],
        }
    }
}

/// `[cache]` as written; `dir` is relative to the config file.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CacheConfigRaw {
    enabled: Option<bool>,
    dir: Option<String>,
    ttl_secs: Option<u64>,
}

/// Fragment cache settings ready for use.
#[derive(Debug, Default)]
pub struct CacheConfig {
    /// Whether rendered fragments are cached.
    pub enabled: bool,
    /// Cache directory.
    pub dir: PathBuf,
    /// Entry lifetime; `None` keeps entries until the cache version changes.
    pub ttl: Option<Duration>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`renderer.http.servers[0].url`").
        field: String,
        /// Error message (e.g., "${`MJML_API_URL`} not set").
        message: String,
    },
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    let lower = url.to_ascii_lowercase();
    if ["http://", "https://"].iter().any(|scheme| lower.starts_with(scheme)) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{field} must be an http:// or https:// URL, got {url:?}"
        )))
    }
}

impl Config {
    /// Read `config_path`, or the discovered `mjml.toml`, or fall back to
    /// defaults, then layer `cli_settings` on top.
    ///
    /// The result is validated after the overrides, so a flag can both fix
    /// and break a file's settings.
    ///
    /// # Errors
    ///
    /// Fails when an explicit `config_path` is missing, the file cannot be
    /// read or parsed, a referenced variable is unset, or validation fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Some(path) => Self::load_from_file(path)?,
            None => match Self::discover_config() {
                Some(found) => Self::load_from_file(&found)?,
                None => Self::default_with_cwd(),
            },
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(backend) = settings.backend {
            self.renderer.backend = backend.to_string();
        }
        if let Some(timeout_secs) = settings.timeout_secs {
            self.renderer.timeout_secs = timeout_secs;
        }
        if let Some(cache_enabled) = settings.cache_enabled {
            self.cache_resolved.enabled = cache_enabled;
        }
    }

    /// Selected backend kind.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` for an unknown backend name.
    pub fn backend_kind(&self) -> Result<BackendKind, ConfigError> {
        self.renderer
            .backend
            .parse()
            .map_err(|e| ConfigError::Validation(format!("renderer.backend: {e}")))
    }

    /// Typed descriptor for the selected backend.
    ///
    /// Only the section of the selected backend is used; the others are
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` for an unknown backend name.
    pub fn backend_config(&self) -> Result<BackendConfig, ConfigError> {
        let timeout = Duration::from_secs(self.renderer.timeout_secs);

        let config = match self.backend_kind()? {
            BackendKind::Process => {
                let process = &self.renderer.process;
                BackendConfig::Process(ProcessConfig {
                    args: match &process.command {
                        CommandSpec::Single(program) => CommandArgs::Single(program.clone()),
                        CommandSpec::List(args) => CommandArgs::List(args.clone()),
                    },
                    env: process.env.clone(),
                    check_on_startup: process.check_on_startup,
                })
            }
            BackendKind::Tcp => BackendConfig::Tcp(TcpConfig {
                servers: self
                    .renderer
                    .tcp
                    .servers
                    .iter()
                    .map(|s| TcpServer::new(s.host.clone(), s.port))
                    .collect(),
                timeout,
            }),
            BackendKind::Http => BackendConfig::Http(HttpConfig {
                servers: self
                    .renderer
                    .http
                    .servers
                    .iter()
                    .map(|s| {
                        let server = HttpServer::new(s.url.clone());
                        match &s.auth {
                            Some(auth) => {
                                let (user, password) = auth.parts();
                                server.with_auth(BasicAuth::new(user, password))
                            }
                            None => server,
                        }
                    })
                    .collect(),
                timeout,
            }),
        };
        Ok(config)
    }

    /// Nearest `mjml.toml` walking up from the working directory.
    fn discover_config() -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        cwd.ancestors()
            .map(|dir| dir.join(CONFIG_FILENAME))
            .find(|candidate| candidate.is_file())
    }

    fn default_with_cwd() -> Self {
        Self::default_with_base(&std::env::current_dir().unwrap_or_default())
    }

    /// Defaults, with the cache directory placed under `base`.
    fn default_with_base(base: &Path) -> Self {
        Self {
            renderer: RendererConfig::default(),
            cache: CacheConfigRaw::default(),
            cache_resolved: CacheConfig {
                enabled: false,
                dir: base.join(DEFAULT_CACHE_DIR),
                ttl: None,
            },
            config_path: None,
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(&std::fs::read_to_string(path)?)?;
        config.expand_env_vars()?;
        config.resolve_paths(path.parent().unwrap_or(Path::new(".")));
        config.config_path = Some(path.to_path_buf());
        config.validate()?;
        Ok(config)
    }

    /// Check the selected backend's section and the cache section.
    ///
    /// Sections of inactive backends are not checked, so a file may keep
    /// them around.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend_kind()? {
            BackendKind::Process => self.validate_process()?,
            BackendKind::Tcp => self.validate_tcp()?,
            BackendKind::Http => self.validate_http()?,
        }
        self.validate_cache()
    }

    fn validate_timeout(&self) -> Result<(), ConfigError> {
        if self.renderer.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "renderer.timeout_secs must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_process(&self) -> Result<(), ConfigError> {
        match &self.renderer.process.command {
            CommandSpec::Single(program) => {
                require_non_empty(program, "renderer.process.command")?;
            }
            CommandSpec::List(args) => {
                if args.is_empty() {
                    return Err(ConfigError::Validation(
                        "renderer.process.command cannot be empty".to_owned(),
                    ));
                }
                for (i, arg) in args.iter().enumerate() {
                    require_non_empty(arg, &format!("renderer.process.command[{i}]"))?;
                }
            }
        }
        Ok(())
    }

    fn validate_tcp(&self) -> Result<(), ConfigError> {
        self.validate_timeout()?;
        if self.renderer.tcp.servers.is_empty() {
            return Err(ConfigError::Validation(
                "renderer.tcp.servers must list at least one server".to_owned(),
            ));
        }
        for (i, server) in self.renderer.tcp.servers.iter().enumerate() {
            require_non_empty(&server.host, &format!("renderer.tcp.servers[{i}].host"))?;
            if server.port == 0 {
                return Err(ConfigError::Validation(format!(
                    "renderer.tcp.servers[{i}].port cannot be 0"
                )));
            }
        }
        Ok(())
    }

    fn validate_http(&self) -> Result<(), ConfigError> {
        self.validate_timeout()?;
        if self.renderer.http.servers.is_empty() {
            return Err(ConfigError::Validation(
                "renderer.http.servers must list at least one server".to_owned(),
            ));
        }
        for (i, server) in self.renderer.http.servers.iter().enumerate() {
            let field = format!("renderer.http.servers[{i}].url");
            require_non_empty(&server.url, &field)?;
            require_http_url(&server.url, &field)?;
        }
        Ok(())
    }

    fn validate_cache(&self) -> Result<(), ConfigError> {
        if self.cache_resolved.ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ConfigError::Validation(
                "cache.ttl_secs must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        let process = &mut self.renderer.process;
        process.command = match &process.command {
            CommandSpec::Single(program) => {
                CommandSpec::Single(expand::expand_env(program, "renderer.process.command")?)
            }
            CommandSpec::List(args) => {
                CommandSpec::List(expand::expand_all(args, "renderer.process.command")?)
            }
        };
        if let Some(env) = &mut process.env {
            for (name, value) in env {
                *value = expand::expand_env(value, &format!("renderer.process.env.{name}"))?;
            }
        }

        for (i, server) in self.renderer.tcp.servers.iter_mut().enumerate() {
            server.host =
                expand::expand_env(&server.host, &format!("renderer.tcp.servers[{i}].host"))?;
        }

        for (i, server) in self.renderer.http.servers.iter_mut().enumerate() {
            server.url =
                expand::expand_env(&server.url, &format!("renderer.http.servers[{i}].url"))?;
            if let Some(auth) = &server.auth {
                let (user, password) = auth.parts();
                let field = format!("renderer.http.servers[{i}].auth");
                let user = expand::expand_env(user, &field)?;
                let password = expand::expand_env(password, &field)?;
                server.auth = Some(AuthSpec::Table { user, password });
            }
        }

        Ok(())
    }

    /// Resolve the cache section against the config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.cache_resolved = CacheConfig {
            enabled: self.cache.enabled.unwrap_or(false),
            dir: config_dir.join(self.cache.dir.as_deref().unwrap_or(DEFAULT_CACHE_DIR)),
            ttl: self.cache.ttl_secs.map(Duration::from_secs),
        };
    }
}
