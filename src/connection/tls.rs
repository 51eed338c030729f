//! TLS configuration for backend connections.
//!
//! A [`TlsConfig`] is compiled once from [`SslSettings`] and shared by every
//! connection. Without a CA bundle the server certificate is not verified;
//! the connection is still encrypted.

use super::config::SslSettings;
use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use std::fs::File;
use std::io::BufReader;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// Compiled TLS client configuration
#[derive(Clone)]
pub struct TlsConfig {
    verify_server: bool,
    client_auth: bool,
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Build from settings. Returns `None` when no TLS material is configured.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a configured file cannot be read or holds
    /// no usable certificate or key.
    pub fn from_settings(ssl: &SslSettings) -> Result<Option<TlsConfig>> {
        if !ssl.is_enabled() {
            return Ok(None);
        }

        let builder = match ssl.ca() {
            Some(ca) => ClientConfig::builder().with_root_certificates(load_roots(ca)?),
            None => {
                tracing::debug!("no CA configured, server certificate will not be verified");
                ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoVerifier))
            }
        };

        let (client_config, client_auth) = match (ssl.cert(), ssl.key()) {
            (Some(cert), Some(key)) => {
                let config = builder
                    .with_client_auth_cert(load_certs(cert)?, load_key(key)?)
                    .map_err(|e| Error::Config(format!("invalid client certificate: {}", e)))?;
                (config, true)
            }
            (None, None) => (builder.with_no_client_auth(), false),
            _ => {
                tracing::warn!(
                    "only one of TLS key and certificate configured, \
                     not sending a client certificate"
                );
                (builder.with_no_client_auth(), false)
            }
        };

        Ok(Some(TlsConfig {
            verify_server: ssl.ca().is_some(),
            client_auth,
            client_config: Arc::new(client_config),
        }))
    }

    /// Get the rustls ClientConfig for this TLS configuration.
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Whether the server certificate is verified against a CA
    pub fn verifies_server(&self) -> bool {
        self.verify_server
    }

    /// Whether a client certificate is presented
    pub fn has_client_auth(&self) -> bool {
        self.client_auth
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("verify_server", &self.verify_server)
            .field("client_auth", &self.client_auth)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

/// TLS server name for an address: IP literals are used as-is, anything else
/// must be a valid DNS name.
pub fn server_name(address: &str) -> Result<ServerName<'static>> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ServerName::IpAddress(ip.into()));
    }

    ServerName::try_from(address.trim_end_matches('.').to_string())
        .map_err(|_| Error::Config(format!("invalid hostname for TLS: '{}'", address)))
}

fn open(path: &Path, what: &str) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| Error::Config(format!("failed to read {} '{}': {}", what, path.display(), e)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = open(path, "certificate")?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Config(format!("failed to parse '{}': {}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(Error::Config(format!(
            "no valid certificates found in '{}'",
            path.display()
        )));
    }

    Ok(certs)
}

fn load_roots(path: &Path) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    let (added, _ignored) = roots.add_parsable_certificates(load_certs(path)?);
    if added == 0 {
        return Err(Error::Config(format!(
            "no usable CA certificates in '{}'",
            path.display()
        )));
    }
    Ok(roots)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = open(path, "private key")?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::Config(format!("failed to parse '{}': {}", path.display(), e)))?
        .ok_or_else(|| Error::Config(format!("no private key found in '{}'", path.display())))
}

/// Accepts any server certificate. Used only when no CA is configured.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
