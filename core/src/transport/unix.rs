//! HTTP/1.1 over the daemon's local Unix socket.
//!
//! One connection per request, `Connection: close`. Response bodies framed
//! by `Content-Length`, chunked encoding, or end-of-stream are supported.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use crate::error::{TransportError, TransportErrorKind};
use crate::http::{HttpRequest, HttpResponse};
use crate::target::UNIX_SCHEME;

use super::Transport;

const USER_AGENT: &str = concat!("incus-core/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct UnixSocketTransport {
    path: PathBuf,
}

impl UnixSocketTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for UnixSocketTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let target = request_target(&request.url)?;

        let mut stream = UnixStream::connect(&self.path).map_err(|e| {
            TransportError::new(
                TransportErrorKind::Connection,
                format!("unable to connect to socket at {}: {e}", self.path.display()),
            )
        })?;
        // A zero duration is rejected by set_read_timeout; treat it as "no timeout".
        let timeout = request.timeout.filter(|t| !t.is_zero());
        stream.set_read_timeout(timeout).map_err(io_error)?;
        stream.set_write_timeout(timeout).map_err(io_error)?;

        stream
            .write_all(&encode_request(request, target))
            .map_err(io_error)?;
        stream.flush().map_err(io_error)?;

        let mut reader = BufReader::new(stream);
        read_response(&mut reader)
    }
}

/// Path and query of a `http+unix://<encoded socket>/...` URL.
fn request_target(url: &str) -> Result<&str, TransportError> {
    let rest = url.strip_prefix(UNIX_SCHEME).ok_or_else(|| {
        TransportError::new(
            TransportErrorKind::Protocol,
            format!("not a unix socket URL: {url}"),
        )
    })?;
    match rest.find('/') {
        Some(idx) => Ok(&rest[idx..]),
        None => Ok("/"),
    }
}

fn encode_request(request: &HttpRequest, target: &str) -> Vec<u8> {
    let mut head = format!(
        "{} {target} HTTP/1.1\r\nHost: localhost\r\nUser-Agent: {USER_AGENT}\r\nConnection: close\r\n",
        request.method
    );
    for (name, value) in &request.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    let body = request.body.as_deref().unwrap_or_default();
    if request.body.is_some() || request.method.expects_body() {
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    head.push_str("\r\n");

    let mut bytes = head.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

pub(crate) fn read_response<R: BufRead>(reader: &mut R) -> Result<HttpResponse, TransportError> {
    let status_line = read_line(reader)?;
    if status_line.is_empty() {
        return Err(protocol("connection closed before a response was received"));
    }
    let status = parse_status_line(&status_line)?;

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader)?;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| protocol(format!("malformed header line: {line}")))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let header = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };

    let chunked = header("transfer-encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked"));
    let body = if chunked {
        read_chunked(reader)?
    } else if let Some(raw) = header("content-length") {
        let len: u64 = raw
            .parse()
            .map_err(|_| protocol(format!("invalid content-length: {raw}")))?;
        let mut body = Vec::new();
        read_exactly(reader, len, &mut body)?;
        body
    } else {
        let mut body = Vec::new();
        reader.read_to_end(&mut body).map_err(io_error)?;
        body
    };

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn parse_status_line(line: &str) -> Result<u16, TransportError> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse()
            .map_err(|_| protocol(format!("invalid status code in: {line}"))),
        _ => Err(protocol(format!("invalid status line: {line}"))),
    }
}

fn read_chunked<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::new();
    loop {
        let line = read_line(reader)?;
        let size_field = line.split(';').next().unwrap_or_default().trim();
        let size = u64::from_str_radix(size_field, 16)
            .map_err(|_| protocol(format!("invalid chunk size: {line}")))?;
        if size == 0 {
            // Trailers end with an empty line.
            while !read_line(reader)?.is_empty() {}
            return Ok(body);
        }
        read_exactly(reader, size, &mut body)?;
        if !read_line(reader)?.is_empty() {
            return Err(protocol("chunk not terminated by CRLF"));
        }
    }
}

/// Append exactly `len` bytes to `body`. The buffer grows with the bytes
/// actually received, so a bogus length from the peer cannot force a huge
/// allocation.
fn read_exactly<R: Read>(
    reader: &mut R,
    len: u64,
    body: &mut Vec<u8>,
) -> Result<(), TransportError> {
    let read = reader
        .by_ref()
        .take(len)
        .read_to_end(body)
        .map_err(io_error)?;
    if (read as u64) < len {
        return Err(protocol(format!(
            "body ended after {read} of {len} announced bytes"
        )));
    }
    Ok(())
}

/// One CRLF-terminated line without its terminator. Returns an empty string
/// at end of stream.
fn read_line<R: BufRead>(reader: &mut R) -> Result<String, TransportError> {
    let mut line = String::new();
    reader.read_line(&mut line).map_err(io_error)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn protocol(message: impl Into<String>) -> TransportError {
    TransportError::new(TransportErrorKind::Protocol, message)
}

fn io_error(err: io::Error) -> TransportError {
    let kind = match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportErrorKind::TimedOut,
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => TransportErrorKind::Protocol,
        _ => TransportErrorKind::Connection,
    };
    TransportError::new(kind, err.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::http::HttpMethod;

    fn request(method: HttpMethod, body: Option<&str>) -> HttpRequest {
        HttpRequest {
            method,
            url: "http+unix://%2Ftmp%2Fx.sock/1.0/instances?recursion=2".to_string(),
            headers: Vec::new(),
            body: body.map(|b| b.as_bytes().to_vec()),
            timeout: None,
        }
    }

    #[test]
    fn request_target_strips_socket_host() {
        let req = request(HttpMethod::Get, None);
        assert_eq!(request_target(&req.url).unwrap(), "/1.0/instances?recursion=2");
        assert_eq!(request_target("http+unix://%2Ftmp%2Fx.sock").unwrap(), "/");
    }

    #[test]
    fn request_target_rejects_other_schemes() {
        let err = request_target("https://localhost/1.0").unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Protocol);
    }

    #[test]
    fn encodes_get_without_body() {
        let raw = String::from_utf8(encode_request(&request(HttpMethod::Get, None), "/1.0")).unwrap();
        assert!(raw.starts_with("GET /1.0 HTTP/1.1\r\n"));
        assert!(raw.contains("Connection: close\r\n"));
        assert!(!raw.contains("Content-Length"));
        assert!(raw.ends_with("\r\n\r\n"));
    }

    #[test]
    fn encodes_post_body_with_length() {
        let raw = String::from_utf8(encode_request(
            &request(HttpMethod::Post, Some(r#"{"name":"c1"}"#)),
            "/1.0/instances",
        ))
        .unwrap();
        assert!(raw.starts_with("POST /1.0/instances HTTP/1.1\r\n"));
        assert!(raw.contains("Content-Length: 13\r\n"));
        assert!(raw.ends_with("\r\n\r\n{\"name\":\"c1\"}"));
    }

    #[test]
    fn post_without_body_sends_zero_length() {
        let raw = String::from_utf8(encode_request(&request(HttpMethod::Put, None), "/1.0")).unwrap();
        assert!(raw.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn reads_content_length_response() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n{}trailing";
        let response = read_response(&mut Cursor::new(raw)).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"{}");
        assert_eq!(response.header("content-type"), Some("application/json"));
    }

    #[test]
    fn reads_chunked_response() {
        let raw = "HTTP/1.1 202 Accepted\r\nTransfer-Encoding: chunked\r\n\r\n4\r\n{\"a\"\r\n3;ext=1\r\n:1}\r\n0\r\n\r\n";
        let response = read_response(&mut Cursor::new(raw)).unwrap();
        assert_eq!(response.status, 202);
        assert_eq!(response.body, br#"{"a":1}"#);
    }

    #[test]
    fn reads_body_until_eof_without_framing() {
        let raw = "HTTP/1.1 200 OK\r\n\r\nplain log output\n";
        let response = read_response(&mut Cursor::new(raw)).unwrap();
        assert_eq!(response.body, b"plain log output\n");
    }

    #[test]
    fn empty_stream_is_a_protocol_error() {
        let err = read_response(&mut Cursor::new("")).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Protocol);
    }

    #[test]
    fn garbage_status_line_is_a_protocol_error() {
        let err = read_response(&mut Cursor::new("SSH-2.0-OpenSSH\r\n\r\n")).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Protocol);
    }

    #[test]
    fn truncated_body_is_a_protocol_error() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n{}";
        let err = read_response(&mut Cursor::new(raw)).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Protocol);
    }

    #[test]
    fn oversized_content_length_is_a_protocol_error() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Length: 18446744073709551615\r\n\r\n{}";
        let err = read_response(&mut Cursor::new(raw)).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Protocol);
    }

    #[test]
    fn unparseable_content_length_is_a_protocol_error() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Length: 99999999999999999999999\r\n\r\n{}";
        let err = read_response(&mut Cursor::new(raw)).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Protocol);
    }

    #[test]
    fn oversized_chunk_is_a_protocol_error() {
        let raw = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n2\r\n{}\r\nffffffffffffffff\r\nxy";
        let err = read_response(&mut Cursor::new(raw)).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Protocol);
    }

    #[test]
    fn missing_socket_is_a_connection_error() {
        let transport = UnixSocketTransport::new("/nonexistent/incus/unix.socket");
        let err = transport.send(&request(HttpMethod::Get, None)).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Connection);
    }
}
