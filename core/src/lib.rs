//! Synchronous client core for the Incus container-management API.
//!
//! # Overview
//! Talks to the daemon over its local Unix socket or over HTTPS, chosen from
//! the connection-target string. Responses are validated against both the
//! HTTP status line and the status code embedded in the JSON envelope, and
//! background operations are followed with a single blocking wait.
//!
//! # Design
//! - `ClientConfig` is an immutable value; `Client::new` opens the session
//!   (socket path or TLS agent) once and reuses it for every request.
//! - Each request is split into `build_request` (pure), a `Transport` send,
//!   and `parse_response` (validation), so the I/O boundary is explicit and
//!   transports can be swapped in tests.
//! - Transport failures and server rejections are distinct `ClientError`
//!   variants; see `ClientError::is_transport` and `is_rejection`.
//!
//! ```no_run
//! use incus_core::{Client, ClientConfig, RequestSpec};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), incus_core::ClientError> {
//! let client = Client::new(ClientConfig::default())?;
//! let instances = client.request(&RequestSpec::get("instances?recursion=2"))?;
//! println!("{}", instances.text());
//!
//! let started = client.request_and_wait(&RequestSpec::put(
//!     "instances/c1/state",
//!     json!({"action": "start"}),
//! ))?;
//! println!("{}", started.status());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod operation;
pub mod response;
pub mod status;
pub mod target;
pub mod transport;
pub mod types;

pub use auth::TlsSettings;
pub use client::{Client, RequestSpec, DEFAULT_API_VERSION};
pub use config::{CertificateMaterial, ClientConfig, ServerVerification, DEFAULT_CONNECTION_TARGET};
pub use error::{ClientError, TransportError, TransportErrorKind};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use response::{check_response, validate, ApiResponse};
pub use status::ApiStatus;
pub use target::Endpoint;
pub use transport::{HttpsTransport, Session, Transport, UnixSocketTransport};
pub use types::{Operation, ResponseEnvelope, ResponseType};
