//! Certificate public-key pinning.
//!
//! # Design
//! Pins are resolved once, when the client is built: every configured
//! certificate is loaded (DER or PEM) and reduced to its SubjectPublicKeyInfo.
//! The resulting `PinPolicy` is immutable and shared by all connections.
//!
//! `PinnedVerifier` never replaces standard validation. It runs the webpki
//! chain and hostname checks first and only then, for pinned hosts, requires
//! a pinned key somewhere in the presented chain. Any mismatch rejects the
//! handshake.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use url::Host;

use crate::error::ConfigError;

/// Where a pinned certificate is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateSource {
    File(PathBuf),
    /// DER or PEM bytes.
    Bytes(Bytes),
}

/// Restrict `hostname` to the public key of `certificate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePin {
    /// Bare host name or a URL whose host is used.
    pub hostname: String,
    pub certificate: CertificateSource,
}

impl CertificatePin {
    pub fn file(hostname: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            hostname: hostname.into(),
            certificate: CertificateSource::File(path.into()),
        }
    }

    pub fn bytes(hostname: impl Into<String>, certificate: impl Into<Bytes>) -> Self {
        Self {
            hostname: hostname.into(),
            certificate: CertificateSource::Bytes(certificate.into()),
        }
    }
}

/// Host → pinned SubjectPublicKeyInfo set.
#[derive(Debug, Default)]
pub struct PinPolicy {
    keys: HashMap<String, Vec<Vec<u8>>>,
}

impl PinPolicy {
    /// Load every pin. Returns `None` when no pins are configured.
    pub fn from_pins(pins: &[CertificatePin]) -> Result<Option<Self>, ConfigError> {
        if pins.is_empty() {
            return Ok(None);
        }
        let mut keys: HashMap<String, Vec<Vec<u8>>> = HashMap::new();
        for pin in pins {
            let host = normalize_host(&pin.hostname)?;
            let der = load_certificate(pin)?;
            let spki = public_key(&der).ok_or_else(|| ConfigError::CertificateInvalid {
                hostname: pin.hostname.clone(),
            })?;
            tracing::debug!(host = %host, "loaded certificate pin");
            keys.entry(host).or_default().push(spki);
        }
        Ok(Some(Self { keys }))
    }

    pub fn is_pinned(&self, host: &str) -> bool {
        self.keys.contains_key(&host.to_ascii_lowercase())
    }

    /// Accept unpinned hosts; for pinned ones require a pinned key in the chain.
    pub fn check(
        &self,
        host: &str,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
    ) -> Result<(), rustls::Error> {
        let Some(pinned) = self.keys.get(&host.to_ascii_lowercase()) else {
            return Ok(());
        };
        let matched = std::iter::once(end_entity)
            .chain(intermediates)
            .filter_map(public_key)
            .any(|key| pinned.contains(&key));
        if matched {
            Ok(())
        } else {
            tracing::warn!(host = %host, "server certificate does not match pinned public key");
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    /// rustls configuration enforcing this policy on top of webpki trust.
    pub fn client_config(self) -> Result<ClientConfig, ConfigError> {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        self.client_config_with_roots(roots)
    }

    pub(crate) fn client_config_with_roots(
        self,
        roots: RootCertStore,
    ) -> Result<ClientConfig, ConfigError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = self.verifier(roots, provider.clone())?;
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();
        Ok(config)
    }

    pub(crate) fn verifier(
        self,
        roots: RootCertStore,
        provider: Arc<CryptoProvider>,
    ) -> Result<PinnedVerifier, ConfigError> {
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider).build()?;
        Ok(PinnedVerifier {
            inner,
            policy: Arc::new(self),
        })
    }
}

/// Reduce a pin hostname to the form `ServerName::to_str` produces: lower
/// case, IP literals in canonical form without brackets.
fn normalize_host(hostname: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::InvalidHostname(hostname.to_string());
    let trimmed = hostname.trim();
    if trimmed.contains("://") {
        let url = url::Url::parse(trimmed).map_err(|_| invalid())?;
        return match url.host().ok_or_else(invalid)? {
            Host::Domain(domain) if !domain.is_empty() => Ok(domain.to_ascii_lowercase()),
            Host::Domain(_) => Err(invalid()),
            Host::Ipv4(ip) => Ok(ip.to_string()),
            Host::Ipv6(ip) => Ok(ip.to_string()),
        };
    }
    let bare = trimmed
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(trimmed);
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(ip.to_string());
    }
    if bare.is_empty() || bare.contains(['/', '[', ']']) {
        return Err(invalid());
    }
    Ok(bare.to_ascii_lowercase())
}

fn load_certificate(pin: &CertificatePin) -> Result<CertificateDer<'static>, ConfigError> {
    let raw: Bytes = match &pin.certificate {
        CertificateSource::File(path) => std::fs::read(path)
            .map(Bytes::from)
            .map_err(|source| ConfigError::CertificateRead {
                hostname: pin.hostname.clone(),
                source,
            })?,
        CertificateSource::Bytes(bytes) => bytes.clone(),
    };
    let text = raw.strip_prefix(UTF8_BOM).unwrap_or(&raw[..]).trim_ascii_start();
    match CertificateDer::from_pem_slice(text) {
        Ok(der) => Ok(der),
        Err(_) => Ok(CertificateDer::from(raw.to_vec())),
    }
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

fn public_key(cert: &CertificateDer<'_>) -> Option<Vec<u8>> {
    ParsedCertificate::try_from(cert)
        .ok()
        .map(|parsed| parsed.subject_public_key_info().as_ref().to_vec())
}

/// Webpki validation plus public-key pinning.
#[derive(Debug)]
pub struct PinnedVerifier {
    inner: Arc<WebPkiServerVerifier>,
    policy: Arc<PinPolicy>,
}

impl ServerCertVerifier for PinnedVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verified =
            self.inner
                .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)?;
        self.policy.check(&server_name.to_str(), end_entity, intermediates)?;
        Ok(verified)
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
