//! Transports that carry an [`HttpRequest`] to the daemon.
//!
//! # Design
//! `Transport` is the I/O seam: the client builds requests and validates
//! responses, a transport only moves bytes. `Session` is the concrete
//! transport chosen from the connection target when the client is built.
//! Tests swap in scripted transports through `Client::with_transport`.

mod https;
mod unix;

pub use https::HttpsTransport;
pub use unix::UnixSocketTransport;

use crate::auth::TlsSettings;
use crate::config::ClientConfig;
use crate::error::{ClientError, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::target::Endpoint;

/// Carries one HTTP exchange. Implementations block until the response
/// arrives, the connection fails, or `request.timeout` elapses.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

/// The live connection state of a client, opened once from its config.
#[derive(Debug)]
pub enum Session {
    Unix(UnixSocketTransport),
    Https(HttpsTransport),
}

impl Session {
    /// Pick the transport for `config.connection_target` and prepare it.
    ///
    /// For HTTPS targets the TLS settings are applied here. A missing client
    /// certificate is not fatal: the daemon still answers untrusted clients
    /// with a restricted view of the API.
    pub fn open(config: &ClientConfig) -> Result<Self, ClientError> {
        match Endpoint::classify(&config.connection_target)? {
            Endpoint::UnixSocket(path) => {
                tracing::debug!(socket = %path.display(), "opening unix socket session");
                Ok(Session::Unix(UnixSocketTransport::new(path)))
            }
            Endpoint::Https(base) => {
                tracing::debug!(connection_target = %base, "opening https session");
                let mut settings = TlsSettings::new();
                match settings.authenticate(
                    config.client_certificate.clone(),
                    config.server_verification.clone(),
                ) {
                    Ok(()) => {}
                    Err(ClientError::MissingCertificate) => {
                        tracing::warn!(connection_target = %base, "continuing without a client certificate");
                    }
                    Err(err) => return Err(err),
                }
                Ok(Session::Https(HttpsTransport::new(&settings)?))
            }
        }
    }
}

impl Transport for Session {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        match self {
            Session::Unix(t) => t.send(request),
            Session::Https(t) => t.send(request),
        }
    }
}
