//! TLS authentication settings for HTTPS endpoints.
//!
//! Both settings are write-once. The first value stored wins; later calls to
//! [`TlsSettings::authenticate`] log and keep what is already there.

use std::fs;
use std::path::Path;

use ureq::tls::{Certificate, ClientCert, PrivateKey, RootCerts, TlsConfig};

use crate::config::{CertificateMaterial, ServerVerification};
use crate::error::ClientError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    client_certificate: Option<CertificateMaterial>,
    server_verification: Option<ServerVerification>,
}

impl TlsSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_certificate(&self) -> Option<&CertificateMaterial> {
        self.client_certificate.as_ref()
    }

    pub fn server_verification(&self) -> Option<&ServerVerification> {
        self.server_verification.as_ref()
    }

    /// Verification is off unless explicitly turned on.
    pub fn verification_enabled(&self) -> bool {
        self.server_verification
            .as_ref()
            .is_some_and(ServerVerification::is_enabled)
    }

    /// Store certificate material and verification policy if not already
    /// set.
    ///
    /// Returns `MissingCertificate` when no certificate is stored and none
    /// is supplied. The verification policy is still recorded in that case.
    pub fn authenticate(
        &mut self,
        client_certificate: Option<CertificateMaterial>,
        server_verification: Option<ServerVerification>,
    ) -> Result<(), ClientError> {
        match (&self.server_verification, server_verification) {
            (Some(existing), _) => {
                tracing::debug!(?existing, "server verification already set, keeping it");
            }
            (None, None) | (None, Some(ServerVerification::Enabled(false))) => {
                tracing::warn!("HTTPS server verification is turned off");
            }
            (None, Some(policy)) => {
                tracing::info!(?policy, "HTTPS server verification turned on");
                self.server_verification = Some(policy);
            }
        }

        match (&self.client_certificate, client_certificate) {
            (Some(existing), _) => {
                tracing::debug!(?existing, "client certificate already set, keeping it");
                Ok(())
            }
            (None, Some(material)) => {
                tracing::info!(?material, "client certificate set");
                self.client_certificate = Some(material);
                Ok(())
            }
            (None, None) => {
                tracing::warn!("a PEM certificate or a (cert, key) pair must be provided");
                Err(ClientError::MissingCertificate)
            }
        }
    }

    /// Build the ureq TLS configuration, reading PEM files from disk.
    pub fn tls_config(&self) -> Result<TlsConfig, ClientError> {
        let mut builder = TlsConfig::builder();

        if let Some(material) = &self.client_certificate {
            builder = builder.client_cert(Some(load_client_cert(material)?));
        }

        builder = match &self.server_verification {
            None | Some(ServerVerification::Enabled(false)) => builder.disable_verification(true),
            Some(ServerVerification::Enabled(true)) => builder,
            Some(ServerVerification::TrustAnchor(path)) => {
                let pem = read_pem(path)?;
                let anchor = Certificate::from_pem(&pem).map_err(|e| certificate_error(path, e))?;
                builder.root_certs(RootCerts::new_with_certs(&[anchor]))
            }
        };

        Ok(builder.build())
    }
}

fn load_client_cert(material: &CertificateMaterial) -> Result<ClientCert, ClientError> {
    let (cert_path, key_path) = match material {
        CertificateMaterial::File(path) => (path, path),
        CertificateMaterial::Pair(cert, key) => (cert, key),
    };
    let cert_pem = read_pem(cert_path)?;
    let cert = Certificate::from_pem(&cert_pem).map_err(|e| certificate_error(cert_path, e))?;
    let key_pem = read_pem(key_path)?;
    let key = PrivateKey::from_pem(&key_pem).map_err(|e| certificate_error(key_path, e))?;
    Ok(ClientCert::new_with_certs(&[cert], key))
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ClientError> {
    fs::read(path).map_err(|e| certificate_error(path, e))
}

fn certificate_error(path: &Path, reason: impl std::fmt::Display) -> ClientError {
    ClientError::Certificate {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}
