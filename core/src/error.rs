//! Error types for the Incus API client.
//!
//! # Design
//! Two families of failure are kept apart. Transport and configuration
//! errors mean no usable response ever arrived; `is_transport` reports
//! them. `Rejected` and `OperationFailed` mean the server answered and said
//! no; `is_rejection` reports those. Everything else is a protocol problem
//! with a response that did arrive (bad JSON, missing operation id).

use std::fmt;

use thiserror::Error;

/// Category of a transport-level failure. Each category is logged
/// separately by the dispatcher even though callers usually only care that
/// no response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The peer spoke something that is not valid HTTP/1.1.
    Protocol,
    /// The server certificate could not be verified, or the TLS handshake
    /// was rejected.
    Certificate,
    /// The host stayed unreachable after the transport gave up (redirect
    /// loops, exhausted attempts).
    Unreachable,
    /// The connection was refused, reset, or the socket does not exist.
    Connection,
    /// The host name did not resolve.
    NameResolution,
    /// The client-side timeout elapsed before the server answered.
    TimedOut,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Protocol => "protocol error",
            TransportErrorKind::Certificate => "certificate verification failed",
            TransportErrorKind::Unreachable => "host unreachable",
            TransportErrorKind::Connection => "connection failed",
            TransportErrorKind::NameResolution => "name resolution failed",
            TransportErrorKind::TimedOut => "timed out",
        };
        f.write_str(name)
    }
}

/// A failure raised by a [`Transport`](crate::transport::Transport) while
/// carrying one request.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Errors returned by [`Client`](crate::Client) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection target is neither a socket path nor an `https://` URL.
    #[error("unsupported connection target: {0}")]
    UnsupportedTarget(String),

    /// The configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Certificate material could not be loaded into the TLS configuration.
    #[error("certificate error for {path}: {reason}")]
    Certificate { path: String, reason: String },

    /// No client certificate was configured or supplied.
    #[error("no client certificate available; provide a PEM file or a (cert, key) pair")]
    MissingCertificate,

    /// The request never produced a response.
    #[error("transport failure talking to {target}: {source}")]
    Transport {
        target: String,
        #[source]
        source: TransportError,
    },

    /// The request body could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body is not valid JSON.
    #[error("response did not contain valid JSON: {0}")]
    InvalidJson(String),

    /// The server answered with a status in the error set.
    #[error("request rejected with HTTP {status}: {message}")]
    Rejected {
        status: u16,
        status_code: Option<u64>,
        message: String,
    },

    /// A background response carried no operation id.
    #[error("background response has no operation id")]
    MissingOperationId,

    /// The background operation finished in a failure state.
    #[error("operation {id} finished with status {status}: {err}")]
    OperationFailed {
        id: String,
        status: String,
        err: String,
    },

    /// The wait returned before the operation reached a final state,
    /// typically because the server-side wait timeout elapsed.
    #[error("operation {id} still {status} when the wait returned")]
    OperationTimedOut { id: String, status: String },

    /// `poll` was called without a response.
    #[error("no response to poll")]
    NothingToPoll,
}

impl ClientError {
    /// True when no usable response was produced at all.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::UnsupportedTarget(_)
                | ClientError::Config(_)
                | ClientError::Certificate { .. }
                | ClientError::Transport { .. }
        )
    }

    /// True when the server responded but reported failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ClientError::Rejected { .. } | ClientError::OperationFailed { .. }
        )
    }

    /// The transport failure category, if this is a transport error.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            ClientError::Transport { source, .. } => Some(source.kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_not_rejections() {
        let err = ClientError::Transport {
            target: "/tmp/x.sock".to_string(),
            source: TransportError::new(TransportErrorKind::Connection, "refused"),
        };
        assert!(err.is_transport());
        assert!(!err.is_rejection());
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Connection));
    }

    #[test]
    fn rejected_is_a_rejection() {
        let err = ClientError::Rejected {
            status: 404,
            status_code: None,
            message: "not found".to_string(),
        };
        assert!(err.is_rejection());
        assert!(!err.is_transport());
        assert_eq!(err.transport_kind(), None);
    }

    #[test]
    fn unfinished_operation_is_neither_transport_nor_rejection() {
        let err = ClientError::OperationTimedOut {
            id: "abc".to_string(),
            status: "Running".to_string(),
        };
        assert!(!err.is_transport());
        assert!(!err.is_rejection());
        assert_eq!(err.to_string(), "operation abc still Running when the wait returned");
    }

    #[test]
    fn transport_error_display_includes_kind() {
        let err = TransportError::new(TransportErrorKind::NameResolution, "no such host");
        assert_eq!(err.to_string(), "name resolution failed: no such host");
    }
}
