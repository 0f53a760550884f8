//! HTTPS transport backed by a ureq `Agent`.

use std::fmt;
use std::io;

use ureq::http::Response;
use ureq::typestate::WithBody;
use ureq::{Agent, Body, RequestBuilder};

use crate::auth::TlsSettings;
use crate::error::{ClientError, TransportError, TransportErrorKind};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

use super::Transport;

/// Holds one agent for the lifetime of the session so connections and TLS
/// state are reused across requests.
pub struct HttpsTransport {
    agent: Agent,
}

impl HttpsTransport {
    pub fn new(settings: &TlsSettings) -> Result<Self, ClientError> {
        // Error statuses are data here; the client interprets them.
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .tls_config(settings.tls_config()?)
            .build()
            .new_agent();
        Ok(Self { agent })
    }
}

impl fmt::Debug for HttpsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpsTransport").finish_non_exhaustive()
    }
}

impl Transport for HttpsTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.as_str();

        let result = match request.method {
            HttpMethod::Get => prepare(self.agent.get(url), request).call(),
            HttpMethod::Delete => prepare(self.agent.delete(url), request).call(),
            HttpMethod::Post => send_with_body(prepare(self.agent.post(url), request), request),
            HttpMethod::Put => send_with_body(prepare(self.agent.put(url), request), request),
            HttpMethod::Patch => send_with_body(prepare(self.agent.patch(url), request), request),
        };

        let mut response = result.map_err(classify)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        // Log and exec-output streams can exceed ureq's default body cap.
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(classify)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Apply the request's headers and timeout to a ureq builder.
fn prepare<B>(mut builder: RequestBuilder<B>, request: &HttpRequest) -> RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name, value);
    }
    match request.timeout {
        Some(timeout) => builder.config().timeout_global(Some(timeout)).build(),
        None => builder,
    }
}

fn send_with_body(
    builder: RequestBuilder<WithBody>,
    request: &HttpRequest,
) -> Result<Response<Body>, ureq::Error> {
    match request.body.as_deref() {
        Some(bytes) => builder.send(bytes),
        None => builder.send_empty(),
    }
}

/// Sort a ureq failure into one of the reportable transport categories.
fn classify(err: ureq::Error) -> TransportError {
    let kind = match &err {
        ureq::Error::HostNotFound => TransportErrorKind::NameResolution,
        ureq::Error::ConnectionFailed => TransportErrorKind::Connection,
        ureq::Error::Timeout(_) => TransportErrorKind::TimedOut,
        ureq::Error::TooManyRedirects => TransportErrorKind::Unreachable,
        ureq::Error::Tls(_) => TransportErrorKind::Certificate,
        ureq::Error::Protocol(_) => TransportErrorKind::Protocol,
        ureq::Error::Io(io_err) => match io_err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportErrorKind::TimedOut,
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                TransportErrorKind::Protocol
            }
            _ if mentions_certificate(&io_err.to_string()) => TransportErrorKind::Certificate,
            _ => TransportErrorKind::Connection,
        },
        other if mentions_certificate(&other.to_string()) => TransportErrorKind::Certificate,
        _ => TransportErrorKind::Connection,
    };
    TransportError::new(kind, err.to_string())
}

fn mentions_certificate(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("certificate") || message.contains("tls") || message.contains("handshake")
}
