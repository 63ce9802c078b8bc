//! TLS support for the https SBI scheme

use crate::{Result, SbiError};
use rustls::crypto::ring;
use rustls::pki_types::PrivateKeyDer;
use rustls::ServerConfig;
use rustls_pemfile::{certs, read_all, Item};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

/// TLS configuration for the SBI listener
#[derive(Clone)]
pub struct TlsServerConfig {
    pub config: Arc<ServerConfig>,
}

impl TlsServerConfig {
    /// Create a TLS configuration from PEM-encoded certificate chain and private key
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        debug!("Creating TLS configuration from PEM data");

        let mut cert_reader = BufReader::new(cert_pem);
        let cert_chain = certs(&mut cert_reader)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SbiError::Tls(format!("Failed to parse certificates: {}", e)))?;

        if cert_chain.is_empty() {
            return Err(SbiError::Tls("No certificates found in PEM data".to_string()));
        }

        debug!("Loaded {} certificate(s)", cert_chain.len());

        let mut key_reader = BufReader::new(key_pem);
        let items: Vec<_> = read_all(&mut key_reader)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| SbiError::Tls(format!("Failed to parse private key: {}", e)))?;

        let private_key = items
            .into_iter()
            .find_map(|item| match item {
                Item::Pkcs8Key(k) => Some(PrivateKeyDer::Pkcs8(k)),
                Item::Pkcs1Key(k) => Some(PrivateKeyDer::Pkcs1(k)),
                Item::Sec1Key(k) => Some(PrivateKeyDer::Sec1(k)),
                _ => None,
            })
            .ok_or_else(|| SbiError::Tls("No private key found in PEM data".to_string()))?;

        let mut config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| SbiError::Tls(format!("Unsupported protocol versions: {}", e)))?
            .with_no_client_auth()
            .with_single_cert(cert_chain, private_key)
            .map_err(|e| SbiError::Tls(format!("Failed to create TLS config: {}", e)))?;

        // The auto connection builder negotiates either protocol
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        info!("TLS configuration created");

        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Load certificate and key from the configured file paths
    pub fn from_files(cert_path: &Path, key_path: &Path) -> Result<Self> {
        debug!(
            "Loading TLS material from {} and {}",
            cert_path.display(),
            key_path.display()
        );
        let cert_pem = std::fs::read(cert_path)?;
        let key_pem = std::fs::read(key_path)?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CERT_PEM: &[u8] = include_bytes!("../testdata/server.pem");
    const KEY_PEM: &[u8] = include_bytes!("../testdata/server.key");

    #[test]
    fn test_config_from_pem() {
        let tls = TlsServerConfig::from_pem(CERT_PEM, KEY_PEM).unwrap();
        assert_eq!(
            tls.config.alpn_protocols,
            vec![b"h2".to_vec(), b"http/1.1".to_vec()]
        );
    }

    #[test]
    fn test_config_from_files() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata");
        assert!(TlsServerConfig::from_files(&dir.join("server.pem"), &dir.join("server.key")).is_ok());
    }

    #[test]
    fn test_key_without_certificate_rejected() {
        let result = TlsServerConfig::from_pem(KEY_PEM, KEY_PEM);
        assert!(matches!(result, Err(SbiError::Tls(_))));
    }

    #[test]
    fn test_empty_certificate_rejected() {
        let result = TlsServerConfig::from_pem(b"", b"");
        assert!(matches!(result, Err(SbiError::Tls(_))));
    }

    #[test]
    fn test_garbage_pem_rejected() {
        let result = TlsServerConfig::from_pem(b"not a certificate", b"not a key");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_files_reported_as_io() {
        let result = TlsServerConfig::from_files(
            Path::new("/nonexistent/smf.pem"),
            Path::new("/nonexistent/smf.key"),
        );
        assert!(matches!(result, Err(SbiError::Io(_))));
    }
}
