//! TLS Configuration
//!
//! Loads PEM material and builds the rustls configs used by the binaries.
//! Supports server-authenticated TLS and mutual TLS.
//!
//! ## Usage
//! ```ignore
//! let acceptor = TlsConfig::new("server.crt", "server.key")?
//!     .with_client_auth("ca.crt")?   // optional: require client certificates
//!     .acceptor()?;
//!
//! let connector = client_connector("ca.crt", None)?;
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::error::{Result, SeglogError};

/// Server-side TLS material
pub struct TlsConfig {
    /// Server certificate chain (PEM)
    pub cert_chain: Vec<CertificateDer<'static>>,

    /// Server private key
    pub private_key: PrivateKeyDer<'static>,

    /// CA used to verify client certificates (mTLS)
    pub client_ca_certs: Option<RootCertStore>,
}

impl TlsConfig {
    /// Load a certificate chain and private key from PEM files
    pub fn new(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            cert_chain: load_certs(cert_path.as_ref())?,
            private_key: load_private_key(key_path.as_ref())?,
            client_ca_certs: None,
        })
    }

    /// Require client certificates signed by the given CA
    pub fn with_client_auth(mut self, ca_cert_path: impl AsRef<Path>) -> Result<Self> {
        self.client_ca_certs = Some(load_root_store(ca_cert_path.as_ref())?);
        Ok(self)
    }

    /// True when client certificates are required
    pub fn is_mutual(&self) -> bool {
        self.client_ca_certs.is_some()
    }

    /// Build the rustls ServerConfig
    pub fn build_server_config(&self) -> Result<ServerConfig> {
        let provider = provider();
        let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(tls_error("Failed to select protocol versions"))?;

        let builder = match self.client_ca_certs {
            Some(ref client_ca) => {
                let verifier =
                    WebPkiClientVerifier::builder_with_provider(Arc::new(client_ca.clone()), provider)
                        .build()
                        .map_err(tls_error("Failed to build client verifier"))?;
                builder.with_client_cert_verifier(verifier)
            }
            None => builder.with_no_client_auth(),
        };

        builder
            .with_single_cert(self.cert_chain.clone(), self.private_key.clone_key())
            .map_err(tls_error("Failed to set server cert"))
    }

    /// Build the acceptor handed to the server
    pub fn acceptor(&self) -> Result<TlsAcceptor> {
        Ok(TlsAcceptor::from(Arc::new(self.build_server_config()?)))
    }
}

/// Build a connector that trusts `ca_cert_path`
///
/// `identity` is an optional `(cert_path, key_path)` pair presented to
/// servers that require client certificates.
pub fn client_connector(
    ca_cert_path: impl AsRef<Path>,
    identity: Option<(&Path, &Path)>,
) -> Result<TlsConnector> {
    let roots = load_root_store(ca_cert_path.as_ref())?;

    let builder = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(tls_error("Failed to select protocol versions"))?
        .with_root_certificates(roots);

    let config = match identity {
        Some((cert_path, key_path)) => builder
            .with_client_auth_cert(load_certs(cert_path)?, load_private_key(key_path)?)
            .map_err(tls_error("Failed to set client cert"))?,
        None => builder.with_no_client_auth(),
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Load certificates from a PEM file
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(File::open(path)?);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(tls_error("Failed to parse certificate"))?;

    if certs.is_empty() {
        return Err(SeglogError::Tls(format!(
            "No certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}

/// Load the first private key (PKCS#1, PKCS#8 or SEC1) from a PEM file
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(File::open(path)?);

    rustls_pemfile::private_key(&mut reader)
        .map_err(tls_error("Failed to parse private key"))?
        .ok_or_else(|| SeglogError::Tls(format!("No private key found in {}", path.display())))
}

fn load_root_store(path: &Path) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .map_err(tls_error("Failed to add CA cert"))?;
    }
    Ok(roots)
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn tls_error<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> SeglogError {
    move |e| SeglogError::Tls(format!("{}: {}", context, e))
}
