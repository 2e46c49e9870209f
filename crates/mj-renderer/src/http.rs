//! MJML HTTP API backend.
//!
//! Each attempt POSTs `{"mjml": source}` to one server and interprets the
//! JSON reply:
//!
//! - `200` with a non-empty `errors` array is a compile error listing every
//!   entry as `Line: .. Tag: .. Message: ..`, one per line.
//! - `200` otherwise must carry `html`.
//! - Any other status is a compile error built from `request_id` and `message`.
//!
//! A body that is not JSON is treated as an empty object.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value, json};
use ureq::Agent;

use crate::config::{BasicAuth, HttpConfig, HttpServer};
use crate::error::{RenderError, Transport};
use crate::pool::{Attempt, ServerPool};
use crate::strategy::RenderStrategy;

/// Upper bound on a response body; rendered emails can be large.
const MAX_RESPONSE_BYTES: u64 = 256 * 1024 * 1024;

/// Create HTTP agent with the specified whole-request timeout.
///
/// Status codes are returned as responses, not errors, so error bodies can
/// be read.
#[must_use]
pub fn create_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// `Authorization` header value for Basic authentication.
fn basic_auth_header(auth: &BasicAuth) -> String {
    let credentials = format!("{}:{}", auth.user, auth.password);
    format!("Basic {}", STANDARD.encode(credentials))
}

/// Map a transport error to a pool attempt outcome.
fn classify_error(server: &HttpServer, err: ureq::Error) -> Attempt<String> {
    use std::io::ErrorKind;

    match err {
        ureq::Error::Timeout(_) => Attempt::TimedOut,
        ureq::Error::Io(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
            Attempt::TimedOut
        }
        ureq::Error::Io(e)
            if matches!(
                e.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::AddrNotAvailable
                    | ErrorKind::HostUnreachable
                    | ErrorKind::NetworkUnreachable
            ) =>
        {
            Attempt::Unreachable(e.to_string())
        }
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            Attempt::Unreachable(err.to_string())
        }
        other => Attempt::Done(Err(RenderError::protocol(
            Transport::Http,
            format!("{server}: {other}"),
        ))),
    }
}

/// Render a JSON scalar the way it reads in a diagnostic.
fn display_field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Turn a status code and raw body into HTML or a compile error.
fn interpret_response(status: u16, body: &[u8]) -> Result<String, RenderError> {
    let payload: Map<String, Value> = serde_json::from_slice(body).unwrap_or_default();

    if status != 200 {
        let request_id = display_field(payload.get("request_id"));
        let message = match payload.get("message") {
            None | Some(Value::Null) => "Unknown error.".to_owned(),
            message => display_field(message),
        };
        return Err(RenderError::compile(
            Transport::Http,
            format!("[code={status}, request_id={request_id}] {message}"),
        ));
    }

    if let Some(Value::Array(errors)) = payload.get("errors")
        && !errors.is_empty()
    {
        let lines: Vec<String> = errors
            .iter()
            .map(|e| {
                format!(
                    "Line: {} Tag: {} Message: {}",
                    display_field(e.get("line")),
                    display_field(e.get("tagName")),
                    display_field(e.get("message")),
                )
            })
            .collect();
        return Err(RenderError::compile(Transport::Http, lines.join("\n")));
    }

    match payload.get("html") {
        Some(Value::String(html)) => Ok(html.clone()),
        _ => Err(RenderError::compile(
            Transport::Http,
            "malformed success response: missing \"html\" field",
        )),
    }
}

/// Renders through a pool of MJML HTTP API servers.
pub struct HttpStrategy {
    pool: ServerPool<HttpServer>,
    agent: Agent,
}

impl HttpStrategy {
    /// Create an HTTP backend from configuration.
    #[must_use]
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            pool: ServerPool::new(config.servers.clone(), Transport::Http),
            agent: create_agent(config.timeout),
        }
    }

    /// Server pool, for diagnostics.
    #[must_use]
    pub fn pool(&self) -> &ServerPool<HttpServer> {
        &self.pool
    }

    fn attempt(&self, server: &HttpServer, body: &[u8]) -> Attempt<String> {
        let mut request = self
            .agent
            .post(&server.url)
            .header("Content-Type", "application/json");
        if let Some(auth) = &server.auth {
            request = request.header("Authorization", basic_auth_header(auth));
        }

        let response = match request.send(body) {
            Ok(response) => response,
            Err(e) => return classify_error(server, e),
        };

        let status = response.status().as_u16();
        let bytes = match response
            .into_body()
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_vec()
        {
            Ok(bytes) => bytes,
            Err(e) => return classify_error(server, e),
        };

        tracing::debug!(%server, status, bytes = bytes.len(), "MJML HTTP server responded");
        Attempt::Done(interpret_response(status, &bytes))
    }
}

impl RenderStrategy for HttpStrategy {
    fn name(&self) -> &'static str {
        "http"
    }

    fn render(&self, source: &str) -> Result<String, RenderError> {
        let body = json!({ "mjml": source }).to_string();
        self.pool
            .attempt_each(|server| self.attempt(server, body.as_bytes()))
    }
}
