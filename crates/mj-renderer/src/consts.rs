//! Internal constants for MJML rendering.

use std::time::Duration;

/// Default I/O timeout for networked renderers (25 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(25);

/// Default MJML TCP server host.
pub const DEFAULT_TCP_HOST: &str = "127.0.0.1";

/// Default MJML TCP server port.
pub const DEFAULT_TCP_PORT: u16 = 28101;

/// Default MJML HTTP API endpoint.
pub const DEFAULT_HTTP_URL: &str = "https://api.mjml.io/v1/render";

/// Default renderer executable.
pub const DEFAULT_COMMAND: &str = "mjml";

/// Flags every command invocation carries: read stdin, print HTML only.
pub const REQUIRED_COMMAND_FLAGS: [&str; 2] = ["-i", "-s"];

/// Renderer stdout is kept in memory up to this size, then spooled to disk.
pub const STDOUT_SPOOL_THRESHOLD: usize = 5 * 1024 * 1024;

/// Width of the ASCII length field in the TCP framing.
pub const LENGTH_FIELD_WIDTH: usize = 9;

/// Largest payload the 9-digit length field can describe.
pub const MAX_FRAME_PAYLOAD: usize = 999_999_999;

/// Self-check fixture for MJML 3.x.
pub const CHECK_FIXTURE_V3: &str =
    "<mjml><mj-body><mj-container><mj-text>MJMLv3</mj-text></mj-container></mj-body></mjml>";

/// Self-check fixture for MJML 4.x and later.
pub const CHECK_FIXTURE_V4: &str = "<mjml><mj-body><mj-section><mj-column><mj-text>MJMLv4</mj-text></mj-column></mj-section></mj-body></mjml>";

/// Marker a correctly rendered document must contain.
pub const HTML_MARKER: &str = "<html ";
