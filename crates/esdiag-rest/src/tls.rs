//! TLS trust policy and client identity.
//!
//! Every certificate chain is accepted so that self-signed and internally
//! issued cluster certificates can be reached. Unless verification is
//! bypassed, the presented certificate must still name the target host.
//! Handshake signatures are always checked against the presented key.

use crate::error::{describe, RestError, RestResult};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::verify_server_name;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Certificate chain and private key presented for mutual TLS
pub struct ClientIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl ClientIdentity {
    /// Load the first key entry of a PKCS#12 store.
    pub fn from_pkcs12_file(path: &Path, passphrase: &str) -> RestResult<Self> {
        let der = std::fs::read(path).map_err(|e| {
            RestError::Configuration(format!(
                "cannot read PKI store {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_pkcs12_der(&der, passphrase)
            .map_err(|e| RestError::Configuration(format!("PKI store {}: {}", path.display(), e)))
    }

    fn from_pkcs12_der(der: &[u8], passphrase: &str) -> Result<Self, String> {
        use openssl::pkcs12::Pkcs12;

        let store = Pkcs12::from_der(der).map_err(|e| format!("not a PKCS#12 store: {}", describe(&e)))?;
        let parsed = store
            .parse2(passphrase)
            .map_err(|e| format!("cannot decrypt store (wrong passphrase?): {}", describe(&e)))?;

        let key = parsed.pkey.ok_or("store holds no private key")?;
        let cert = parsed.cert.ok_or("store holds no certificate")?;

        let key = key
            .private_key_to_pkcs8()
            .map_err(|e| format!("cannot encode private key: {}", describe(&e)))?;
        let mut chain = vec![CertificateDer::from(
            cert.to_der()
                .map_err(|e| format!("cannot encode certificate: {}", describe(&e)))?,
        )];
        if let Some(ca) = parsed.ca {
            for issuer in ca.iter() {
                let der = issuer
                    .to_der()
                    .map_err(|e| format!("cannot encode chain certificate: {}", describe(&e)))?;
                chain.push(CertificateDer::from(der));
            }
        }

        Ok(Self {
            chain,
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key)),
        })
    }

    /// Number of certificates in the presented chain
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// Trust-all certificate verifier with optional hostname verification
#[derive(Debug)]
pub(crate) struct TrustAllVerifier {
    provider: Arc<CryptoProvider>,
    verify_hostname: bool,
}

impl ServerCertVerifier for TrustAllVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if self.verify_hostname {
            let cert = ParsedCertificate::try_from(end_entity)?;
            verify_server_name(&cert, server_name)?;
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Build the rustls client configuration for a bound client.
pub(crate) fn client_config(
    bypass_verify: bool,
    identity: Option<ClientIdentity>,
) -> RestResult<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = Arc::new(TrustAllVerifier {
        provider: provider.clone(),
        verify_hostname: !bypass_verify,
    });

    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| RestError::Configuration(format!("TLS setup failed: {}", e)))?
        .dangerous()
        .with_custom_certificate_verifier(verifier);

    match identity {
        Some(identity) => builder
            .with_client_auth_cert(identity.chain, identity.key)
            .map_err(|e| RestError::Configuration(format!("unusable client identity: {}", e))),
        None => Ok(builder.with_no_client_auth()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    fn pem_cert(name: &str) -> CertificateDer<'static> {
        use rustls::pki_types::pem::PemObject;
        CertificateDer::from_pem_file(fixture(name)).unwrap()
    }

    fn verifier(verify_hostname: bool) -> TrustAllVerifier {
        TrustAllVerifier {
            provider: Arc::new(rustls::crypto::ring::default_provider()),
            verify_hostname,
        }
    }

    #[test]
    fn test_load_pkcs12_identity() {
        let identity = ClientIdentity::from_pkcs12_file(&fixture("client.p12"), "changeit").unwrap();
        assert_eq!(identity.chain_len(), 1);
    }

    #[test]
    fn test_wrong_passphrase_is_configuration_error() {
        let err = ClientIdentity::from_pkcs12_file(&fixture("client.p12"), "wrong").unwrap_err();
        assert!(matches!(err, RestError::Configuration(_)));
    }

    #[test]
    fn test_missing_store_is_configuration_error() {
        let err = ClientIdentity::from_pkcs12_file(&fixture("absent.p12"), "changeit").unwrap_err();
        assert!(matches!(err, RestError::Configuration(_)));
        assert!(err.to_string().contains("absent.p12"));
    }

    #[test]
    fn test_non_pkcs12_is_configuration_error() {
        let err = ClientIdentity::from_pkcs12_file(&fixture("localhost.crt"), "changeit").unwrap_err();
        assert!(matches!(err, RestError::Configuration(_)));
    }

    #[test]
    fn test_hostname_checked_when_not_bypassed() {
        let cert = pem_cert("elsewhere.crt");
        let name = ServerName::try_from("localhost").unwrap();

        assert!(verifier(true)
            .verify_server_cert(&cert, &[], &name, &[], UnixTime::now())
            .is_err());
        assert!(verifier(false)
            .verify_server_cert(&cert, &[], &name, &[], UnixTime::now())
            .is_ok());
    }

    #[test]
    fn test_self_signed_accepted_for_matching_name() {
        let cert = pem_cert("localhost.crt");
        let name = ServerName::try_from("localhost").unwrap();
        assert!(verifier(true)
            .verify_server_cert(&cert, &[], &name, &[], UnixTime::now())
            .is_ok());
    }

    #[test]
    fn test_client_config_with_identity() {
        let identity = ClientIdentity::from_pkcs12_file(&fixture("client.p12"), "changeit").unwrap();
        let config = client_config(false, Some(identity)).unwrap();
        assert!(config.client_auth_cert_resolver.has_certs());
    }
}
