//! Connection-target classification.
//!
//! The target string alone decides the transport: a leading `/` is a Unix
//! socket path, a leading `https://` is a remote daemon. Anything else is
//! rejected before a transport is touched.

use std::path::PathBuf;

use url::form_urlencoded;

use crate::error::ClientError;

/// Scheme used for URLs carried over the Unix socket transport.
pub const UNIX_SCHEME: &str = "http+unix://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    UnixSocket(PathBuf),
    /// Base URL without a trailing slash.
    Https(String),
}

impl Endpoint {
    pub fn classify(target: &str) -> Result<Self, ClientError> {
        if target.starts_with('/') {
            Ok(Endpoint::UnixSocket(PathBuf::from(target)))
        } else if target.starts_with("https://") {
            Ok(Endpoint::Https(target.trim_end_matches('/').to_string()))
        } else {
            Err(ClientError::UnsupportedTarget(target.to_string()))
        }
    }

    /// Absolute URL for `{api_version}/{api_path}` on this endpoint.
    ///
    /// Socket URLs carry the socket path form-encoded in the host position:
    /// `http+unix://%2Fvar%2Flib%2Fincus%2Funix.socket/1.0/instances`.
    /// An empty `api_path` addresses the version root itself (`/1.0`).
    pub fn url(&self, api_version: &str, api_path: &str) -> String {
        let path = if api_path.is_empty() {
            format!("/{api_version}")
        } else {
            format!("/{api_version}/{api_path}")
        };
        match self {
            Endpoint::UnixSocket(socket) => {
                let encoded: String =
                    form_urlencoded::byte_serialize(socket.to_string_lossy().as_bytes()).collect();
                format!("{UNIX_SCHEME}{encoded}{path}")
            }
            Endpoint::Https(base) => format!("{base}{path}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_prefix_is_a_socket() {
        assert_eq!(
            Endpoint::classify("/var/lib/incus/unix.socket").unwrap(),
            Endpoint::UnixSocket("/var/lib/incus/unix.socket".into())
        );
    }

    #[test]
    fn https_prefix_is_remote() {
        assert_eq!(
            Endpoint::classify("https://localhost:8443/").unwrap(),
            Endpoint::Https("https://localhost:8443".to_string())
        );
    }

    #[test]
    fn other_schemes_are_rejected() {
        for target in ["ftp://nope", "http://localhost:8443", "abc@123", "", "relative/path"] {
            let err = Endpoint::classify(target).unwrap_err();
            assert!(matches!(err, ClientError::UnsupportedTarget(t) if t == target));
        }
    }

    #[test]
    fn socket_url_encodes_the_path() {
        let endpoint = Endpoint::classify("/tmp/x.sock").unwrap();
        assert_eq!(
            endpoint.url("1.0", "instances"),
            "http+unix://%2Ftmp%2Fx.sock/1.0/instances"
        );
    }

    #[test]
    fn https_url_joins_version_and_path() {
        let endpoint = Endpoint::classify("https://localhost:8443").unwrap();
        assert_eq!(
            endpoint.url("1.0", "instances?recursion=2"),
            "https://localhost:8443/1.0/instances?recursion=2"
        );
    }

    #[test]
    fn empty_path_addresses_the_version_root() {
        let endpoint = Endpoint::classify("https://localhost:8443").unwrap();
        assert_eq!(endpoint.url("1.0", ""), "https://localhost:8443/1.0");
    }
}
