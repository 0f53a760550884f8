//! Client configuration.
//!
//! `ClientConfig` is an immutable value: it is loaded from TOML (or built in
//! code), optionally adjusted from `INCUS_*` environment variables, and then
//! handed to [`Client::new`](crate::Client::new). Nothing mutates it after
//! the client is constructed.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Local socket the Incus daemon listens on by default.
pub const DEFAULT_CONNECTION_TARGET: &str = "/var/lib/incus/unix.socket";

/// Client certificate used to authenticate against an HTTPS endpoint.
///
/// In TOML this is either a string (one PEM file holding both certificate
/// and key) or a two-element array `[cert, key]`. Other shapes are rejected
/// when the configuration is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CertificateMaterial {
    File(PathBuf),
    Pair(PathBuf, PathBuf),
}

/// How the server certificate of an HTTPS endpoint is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerVerification {
    /// `false` turns verification off; `true` verifies against the default
    /// root store.
    Enabled(bool),
    /// Verify against this PEM trust anchor.
    TrustAnchor(PathBuf),
}

impl ServerVerification {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, ServerVerification::Enabled(false))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Socket path (`/...`) or HTTPS base URL (`https://...`).
    pub connection_target: String,
    pub client_certificate: Option<CertificateMaterial>,
    pub server_verification: Option<ServerVerification>,
    /// Upper bound on a single operation wait. Unset waits indefinitely.
    pub operation_timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection_target: DEFAULT_CONNECTION_TARGET.to_string(),
            client_certificate: None,
            server_verification: None,
            operation_timeout_secs: None,
        }
    }
}

impl ClientConfig {
    pub fn new(connection_target: impl Into<String>) -> Self {
        Self {
            connection_target: connection_target.into(),
            ..Self::default()
        }
    }

    pub fn with_client_certificate(mut self, material: CertificateMaterial) -> Self {
        self.client_certificate = Some(material);
        self
    }

    pub fn with_server_verification(mut self, verification: ServerVerification) -> Self {
        self.server_verification = Some(verification);
        self
    }

    /// The server takes whole seconds, so partial seconds round up and the
    /// shortest wait is one second.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self.operation_timeout_secs = Some(secs.max(1));
        self
    }

    /// A stored `0` is read as one second; `?timeout=0` would return at once.
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs
            .map(|secs| Duration::from_secs(secs.max(1)))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ClientError> {
        toml::from_str(contents).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, ClientError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config = toml::from_str(&contents)
            .map_err(|e| ClientError::Config(format!("failed to parse {}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "loaded client config");
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply `INCUS_*` overrides using `lookup` to read variables. Invalid
    /// values are logged and ignored.
    pub fn apply_env_overrides_from<F>(&mut self, mut lookup: F)
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = non_empty(lookup("INCUS_CONNECTION_TARGET")) {
            self.connection_target = raw;
        }

        if let Some(cert) = non_empty(lookup("INCUS_CLIENT_CERT")) {
            let material = match non_empty(lookup("INCUS_CLIENT_KEY")) {
                Some(key) => CertificateMaterial::Pair(cert.into(), key.into()),
                None => CertificateMaterial::File(cert.into()),
            };
            self.client_certificate = Some(material);
        }

        if let Some(anchor) = non_empty(lookup("INCUS_SERVER_CERT")) {
            self.server_verification = Some(ServerVerification::TrustAnchor(anchor.into()));
        } else if let Some(raw) = non_empty(lookup("INCUS_VERIFY")) {
            match parse_boolish(&raw) {
                Some(value) => self.server_verification = Some(ServerVerification::Enabled(value)),
                None => tracing::warn!("invalid INCUS_VERIFY, ignoring: {raw}"),
            }
        }

        if let Some(raw) = non_empty(lookup("INCUS_OPERATION_TIMEOUT")) {
            match raw.parse::<u64>() {
                Ok(0) => tracing::warn!("INCUS_OPERATION_TIMEOUT must be at least 1, ignoring"),
                Ok(secs) => self.operation_timeout_secs = Some(secs),
                Err(err) => tracing::warn!("invalid INCUS_OPERATION_TIMEOUT, ignoring: {err}"),
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_boolish(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
