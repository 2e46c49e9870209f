//! MJML TCP server backend.
//!
//! Wire protocol, one exchange per connection:
//!
//! ```text
//! request:  [9 ASCII digits: payload length][UTF-8 MJML]
//! response: [1 byte: '0' ok, anything else error][9 ASCII digits: length][UTF-8 HTML or error text]
//! ```
//!
//! The 9-digit length field caps a payload at 999,999,999 bytes; larger
//! sources are rejected before any connection is made.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::{TcpConfig, TcpServer};
use crate::consts::{LENGTH_FIELD_WIDTH, MAX_FRAME_PAYLOAD};
use crate::error::{RenderError, Transport};
use crate::pool::{Attempt, ServerPool};
use crate::strategy::RenderStrategy;

/// Encode MJML source as a length-prefixed request frame.
pub fn encode_request(source: &str) -> Result<Vec<u8>, RenderError> {
    let payload = source.as_bytes();
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(RenderError::protocol(
            Transport::Tcp,
            format!(
                "payload of {} bytes exceeds the protocol limit of {MAX_FRAME_PAYLOAD} bytes",
                payload.len()
            ),
        ));
    }

    let mut frame = Vec::with_capacity(LENGTH_FIELD_WIDTH + payload.len());
    frame.extend_from_slice(format!("{:09}", payload.len()).as_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Read exactly `len` bytes, looping over partial reads.
///
/// A zero-byte read before `len` bytes arrive means the peer closed the
/// connection and is reported as [`io::ErrorKind::UnexpectedEof`].
fn read_exact_bytes(reader: &mut impl Read, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("connection closed after {filled} of {len} bytes"),
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(buf)
}

/// Parse the 9-digit ASCII length field.
fn decode_length(field: &[u8]) -> Result<usize, String> {
    if field.len() != LENGTH_FIELD_WIDTH || !field.iter().all(u8::is_ascii_digit) {
        return Err(format!(
            "invalid length field {:?}",
            String::from_utf8_lossy(field)
        ));
    }
    field
        .iter()
        .try_fold(0usize, |acc, digit| {
            acc.checked_mul(10)?.checked_add(usize::from(digit - b'0'))
        })
        .ok_or_else(|| "length field overflows".to_owned())
}

/// Socket timeouts surface as `WouldBlock` on Unix and `TimedOut` on Windows.
fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Decoded server reply.
#[derive(Debug, PartialEq, Eq)]
struct Reply {
    ok: bool,
    payload: String,
}

/// Failure during an exchange on an established connection.
#[derive(Debug)]
enum ExchangeError {
    Timeout,
    Io(io::Error),
    Malformed(String),
}

impl From<io::Error> for ExchangeError {
    fn from(err: io::Error) -> Self {
        if is_timeout(&err) {
            Self::Timeout
        } else {
            Self::Io(err)
        }
    }
}

/// Send one request frame and read one reply.
fn exchange<S: Read + Write>(stream: &mut S, frame: &[u8]) -> Result<Reply, ExchangeError> {
    stream.write_all(frame)?;
    stream.flush()?;

    let status = read_exact_bytes(stream, 1)?;
    let length_field = read_exact_bytes(stream, LENGTH_FIELD_WIDTH)?;
    let length = decode_length(&length_field).map_err(ExchangeError::Malformed)?;
    let payload = read_exact_bytes(stream, length)?;
    let payload = String::from_utf8(payload)
        .map_err(|e| ExchangeError::Malformed(format!("reply is not valid UTF-8: {e}")))?;

    Ok(Reply {
        ok: status[0] == b'0',
        payload,
    })
}

/// Open a configured connection to `server`, trying each resolved address.
fn connect(server: &TcpServer, timeout: Duration) -> Result<TcpStream, Attempt<String>> {
    let addrs = (server.host.as_str(), server.port)
        .to_socket_addrs()
        .map_err(|e| Attempt::Unreachable(format!("cannot resolve host: {e}")))?;

    let mut timed_out = false;
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                return configure(&stream, timeout)
                    .map(|()| stream)
                    .map_err(|e| Attempt::Unreachable(format!("cannot configure socket: {e}")));
            }
            Err(e) if is_timeout(&e) => timed_out = true,
            Err(e) => last_error = Some(e),
        }
    }

    if timed_out {
        return Err(Attempt::TimedOut);
    }
    Err(Attempt::Unreachable(last_error.map_or_else(
        || "host resolved to no addresses".to_owned(),
        |e| e.to_string(),
    )))
}

fn configure(stream: &TcpStream, timeout: Duration) -> io::Result<()> {
    stream.set_nodelay(true)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))
}

/// Renders through a pool of MJML TCP servers.
pub struct TcpStrategy {
    pool: ServerPool<TcpServer>,
    timeout: Duration,
}

impl TcpStrategy {
    /// Create a TCP backend from configuration.
    #[must_use]
    pub fn new(config: &TcpConfig) -> Self {
        Self {
            pool: ServerPool::new(config.servers.clone(), Transport::Tcp),
            timeout: config.timeout,
        }
    }

    /// Server pool, for diagnostics.
    #[must_use]
    pub fn pool(&self) -> &ServerPool<TcpServer> {
        &self.pool
    }

    fn attempt(&self, server: &TcpServer, frame: &[u8]) -> Attempt<String> {
        let mut stream = match connect(server, self.timeout) {
            Ok(stream) => stream,
            Err(attempt) => return attempt,
        };

        let result = exchange(&mut stream, frame);
        // Closed on every path; a peer that already hung up makes this fail harmlessly.
        let _ = stream.shutdown(Shutdown::Both);
        drop(stream);

        match result {
            Ok(Reply { ok: true, payload }) => Attempt::Done(Ok(payload)),
            Ok(Reply { ok: false, payload }) => {
                Attempt::Done(Err(RenderError::compile(Transport::Tcp, payload)))
            }
            Err(ExchangeError::Timeout) => Attempt::TimedOut,
            Err(ExchangeError::Io(e)) => Attempt::Done(Err(RenderError::protocol(
                Transport::Tcp,
                format!("{server}: {e}"),
            ))),
            Err(ExchangeError::Malformed(message)) => Attempt::Done(Err(RenderError::protocol(
                Transport::Tcp,
                format!("{server}: {message}"),
            ))),
        }
    }
}

impl RenderStrategy for TcpStrategy {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn render(&self, source: &str) -> Result<String, RenderError> {
        let frame = encode_request(source)?;
        self.pool.attempt_each(|server| self.attempt(server, &frame))
    }
}
