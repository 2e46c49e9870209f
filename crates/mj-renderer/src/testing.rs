//! In-process fake renderer servers for tests.
//!
//! Every server binds `127.0.0.1:0` and serves from a detached thread for the
//! rest of the test process.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

/// Wrap rendered text the way `mjml` does, so the self-check marker is present.
pub(crate) fn fake_html(source: &str) -> String {
    format!("<!doctype html><html xmlns=\"http://www.w3.org/1999/xhtml\"><body>{source}</body></html>")
}

fn bind() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").unwrap()
}

/// A port that refuses connections (bound, then released).
pub(crate) fn closed_port() -> u16 {
    let listener = bind();
    listener.local_addr().unwrap().port()
}

/// Accept connections and never answer, so clients hit their read timeout.
pub(crate) fn spawn_silent_server() -> SocketAddr {
    let listener = bind();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
        }
    });
    addr
}

fn read_n(stream: &mut TcpStream, n: usize) -> Option<Vec<u8>> {
    let mut buf = vec![0; n];
    stream.read_exact(&mut buf).ok()?;
    Some(buf)
}

/// Serve the MJML TCP protocol; `handler` maps the request to `(status byte, payload)`.
pub(crate) fn spawn_tcp_renderer(handler: fn(&str) -> (u8, String)) -> SocketAddr {
    let listener = bind();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for mut stream in listener.incoming().flatten() {
            let Some(len) = read_n(&mut stream, 9) else {
                continue;
            };
            let len: usize = String::from_utf8_lossy(&len).parse().unwrap_or(0);
            let Some(payload) = read_n(&mut stream, len) else {
                continue;
            };
            let (status, reply) = handler(&String::from_utf8_lossy(&payload));
            let mut response = vec![status];
            response.extend_from_slice(format!("{:09}", reply.len()).as_bytes());
            response.extend_from_slice(reply.as_bytes());
            let _ = stream.write_all(&response);
        }
    });
    addr
}

/// Serve raw bytes to every connection after reading (and discarding) the request frame.
pub(crate) fn spawn_raw_tcp_server(response: &'static [u8]) -> SocketAddr {
    let listener = bind();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for mut stream in listener.incoming().flatten() {
            if let Some(len) = read_n(&mut stream, 9) {
                let len: usize = String::from_utf8_lossy(&len).parse().unwrap_or(0);
                let _ = read_n(&mut stream, len);
            }
            let _ = stream.write_all(response);
        }
    });
    addr
}

/// A request received by the fake HTTP server.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub(crate) method: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: String,
}

impl RecordedRequest {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn read_http_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let method = lines.next()?.split(' ').next()?.to_owned();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .collect();
    let content_length: usize = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        method,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

/// Minimal HTTP/1.1 responder; `handler` maps each request to `(status, body)`.
///
/// Returns the server URL and the log of received requests.
pub(crate) fn spawn_http_renderer(
    handler: fn(&RecordedRequest) -> (u16, String),
) -> (String, Arc<Mutex<Vec<RecordedRequest>>>) {
    let listener = bind();
    let addr = listener.local_addr().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let server_log = Arc::clone(&log);
    thread::spawn(move || {
        for mut stream in listener.incoming().flatten() {
            let Some(request) = read_http_request(&mut stream) else {
                continue;
            };
            let (status, body) = handler(&request);
            server_log.lock().unwrap().push(request);
            let reason = if status == 200 { "OK" } else { "Error" };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    (format!("http://{addr}/v1/render"), log)
}
