//! Multi-backend MJML rendering.
//!
//! This crate turns MJML markup into HTML by delegating to an external
//! renderer reached through one of three transports:
//! - a local `mjml` process fed through stdin/stdout
//! - MJML TCP servers speaking a length-prefixed protocol
//! - MJML HTTP API servers speaking JSON
//!
//! # Architecture
//!
//! - [`BackendConfig`]: closed union describing one backend
//! - [`create_strategy`]: validates a config and builds its [`RenderStrategy`]
//! - [`ServerPool`]: random-order failover shared by the networked backends
//! - [`Renderer`]: facade owning one strategy, with a startup self-check
//! - [`CachedRenderer`]: optional fragment cache around a [`Renderer`]
//!
//! # Example
//!
//! ```ignore
//! use mj_renderer::{BackendConfig, Renderer, TcpConfig};
//!
//! let renderer = Renderer::initialize(&BackendConfig::Tcp(TcpConfig::default()))?;
//! let html = renderer.render("<mjml><mj-body></mj-body></mjml>")?;
//! ```

mod cached;
mod config;
mod consts;
mod error;
mod factory;
mod http;
mod pool;
mod process;
mod renderer;
mod strategy;
mod tcp;
#[cfg(test)]
mod testing;

pub use cached::{CachedRenderer, fragment_key};
pub use config::{
    BackendConfig, BackendKind, BasicAuth, CommandArgs, HttpConfig, HttpServer,
    ParseBackendKindError, ProcessConfig, TcpConfig, TcpServer,
};
pub use consts::{DEFAULT_HTTP_URL, DEFAULT_TCP_HOST, DEFAULT_TCP_PORT, DEFAULT_TIMEOUT};
pub use error::{CheckFailure, RenderError, RenderErrorKind, Transport};
pub use factory::create_strategy;
pub use http::{HttpStrategy, create_agent};
pub use pool::{Attempt, ServerPool};
pub use process::{ProcessStrategy, resolve_args};
pub use renderer::Renderer;
pub use strategy::RenderStrategy;
pub use tcp::{TcpStrategy, encode_request};
