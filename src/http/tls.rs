//! TLS certificate loading and SNI certificate selection.
//!
//! Certificates are configured as `cert:key` path pairs. Every pair is loaded
//! once at startup into a rustls `CertifiedKey`, and the host names of its leaf
//! certificate (subject common name and DNS subject alternative names) are
//! indexed. During each handshake the resolver looks up the requested server
//! name exactly, then as a wildcard (`www.example.com` → `*.example.com`), and
//! otherwise falls back to the first configured certificate. When several
//! certificates claim the same name, the one configured last wins.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::CryptoProvider;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use x509_parser::extensions::GeneralName;

/// ALPN protocols offered to clients, most preferred first.
const ALPN_PROTOCOLS: &[&[u8]] = &[b"h2", b"http/1.1"];

/// A certificate chain file and its private key file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPair {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl TlsPair {
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
        }
    }

    /// Parse a single `cert:key` pair. The split happens at the first `:`.
    pub fn parse(pair: &str) -> Result<Self, TlsError> {
        match pair.split_once(':') {
            Some((cert, key)) if !cert.is_empty() && !key.is_empty() => Ok(Self::new(cert, key)),
            _ => Err(TlsError::InvalidCertificateInput(pair.to_string())),
        }
    }
}

impl fmt::Display for TlsPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cert.display(), self.key.display())
    }
}

/// Parse a comma separated list of `cert:key` pairs.
///
/// Every pair is validated before the caller touches the filesystem, so a
/// single malformed entry means no certificate gets loaded.
pub fn parse_tls_pairs(list: &str) -> Result<Vec<TlsPair>, TlsError> {
    list.split(',').map(TlsPair::parse).collect()
}

/// Why a certificate/key pair could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum CertificateLoadCause {
    #[error("failed to read certificate {}: {source}", path.display())]
    Certificate {
        path: PathBuf,
        #[source]
        source: rustls_pki_types::pem::Error,
    },

    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),

    #[error("failed to read private key {}: {source}", path.display())]
    Key {
        path: PathBuf,
        #[source]
        source: rustls_pki_types::pem::Error,
    },

    #[error("private key does not match certificate")]
    KeyMismatch,

    #[error("failed to parse certificate {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("{0}")]
    Rustls(#[from] rustls::Error),
}

/// TLS configuration error
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("invalid tls cert:key pair: {0:?}")]
    InvalidCertificateInput(String),

    #[error("invalid tls cert:key pair {pair}: {source}")]
    CertificateLoad {
        pair: String,
        #[source]
        source: CertificateLoadCause,
    },

    #[error("no tls certificates configured")]
    NoCertificates,

    #[error("failed to build tls configuration: {0}")]
    Config(#[from] rustls::Error),
}

/// A certificate that was loaded from a configured pair.
#[derive(Debug, Clone)]
pub struct LoadedCertificate {
    pub pair: TlsPair,
    /// Lowercased host names from the leaf certificate, wildcards included.
    pub names: Vec<String>,
    pub key: Arc<CertifiedKey>,
}

/// Loaded certificates plus the rustls server configuration built from them.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    certificates: Vec<LoadedCertificate>,
    server_config: Arc<ServerConfig>,
}

impl TlsConfig {
    /// Load every pair, in order, and build a server configuration that
    /// selects among them by SNI.
    pub fn load(pairs: &[TlsPair]) -> Result<Self, TlsError> {
        if pairs.is_empty() {
            return Err(TlsError::NoCertificates);
        }

        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

        let certificates = pairs
            .iter()
            .map(|pair| {
                let to_load_error = |source: CertificateLoadCause| TlsError::CertificateLoad {
                    pair: pair.to_string(),
                    source,
                };
                let key = load_certified_key(pair, &provider).map_err(to_load_error)?;
                let names = certificate_names(&pair.cert, &key.cert[0]).map_err(to_load_error)?;
                tracing::info!(
                    cert = %pair.cert.display(),
                    key = %pair.key.display(),
                    chain_len = key.cert.len(),
                    names = ?names,
                    "Loaded TLS certificate"
                );
                Ok(LoadedCertificate {
                    pair: pair.clone(),
                    names,
                    key: Arc::new(key),
                })
            })
            .collect::<Result<Vec<_>, TlsError>>()?;

        let resolver = SniResolver::new(&certificates);

        let mut server_config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(resolver));
        server_config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

        Ok(Self {
            certificates,
            server_config: Arc::new(server_config),
        })
    }

    /// Loaded certificates in configuration order.
    pub fn certificates(&self) -> &[LoadedCertificate] {
        &self.certificates
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        self.server_config.clone()
    }

    /// Configuration in the form the HTTPS acceptor expects.
    pub fn rustls_config(&self) -> RustlsConfig {
        RustlsConfig::from_config(self.server_config())
    }
}

fn load_certified_key(
    pair: &TlsPair,
    provider: &CryptoProvider,
) -> Result<CertifiedKey, CertificateLoadCause> {
    let chain = read_certificates(&pair.cert)?;
    let key = read_private_key(&pair.key)?;

    let signing_key = provider.key_provider.load_private_key(key)?;
    let certified = CertifiedKey::new(chain, signing_key);

    match certified.keys_match() {
        Ok(()) => Ok(certified),
        // Some key types cannot report their public key; nothing to compare.
        Err(rustls::Error::InconsistentKeys(rustls::InconsistentKeys::Unknown)) => Ok(certified),
        Err(rustls::Error::InconsistentKeys(rustls::InconsistentKeys::KeyMismatch)) => {
            Err(CertificateLoadCause::KeyMismatch)
        }
        Err(e) => Err(e.into()),
    }
}

fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, CertificateLoadCause> {
    let to_cause = |source: rustls_pki_types::pem::Error| CertificateLoadCause::Certificate {
        path: path.to_path_buf(),
        source,
    };

    let chain = CertificateDer::pem_file_iter(path)
        .map_err(to_cause)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_cause)?;

    if chain.is_empty() {
        return Err(CertificateLoadCause::NoCertificates(path.to_path_buf()));
    }
    Ok(chain)
}

fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, CertificateLoadCause> {
    PrivateKeyDer::from_pem_file(path).map_err(|source| CertificateLoadCause::Key {
        path: path.to_path_buf(),
        source,
    })
}

/// Host names a leaf certificate is issued for: the subject common name
/// followed by the DNS subject alternative names, lowercased.
fn certificate_names(
    path: &Path,
    leaf: &CertificateDer<'_>,
) -> Result<Vec<String>, CertificateLoadCause> {
    let (_, cert) = x509_parser::parse_x509_certificate(leaf.as_ref()).map_err(|e| {
        CertificateLoadCause::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;

    let mut names: Vec<String> = cert
        .subject()
        .iter_common_name()
        .filter_map(|cn| cn.as_str().ok())
        .filter(|cn| !cn.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();

    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                names.push(dns.to_ascii_lowercase());
            }
        }
    }

    Ok(names)
}

/// Index of the certificate serving `server_name`: an exact name match first,
/// then a wildcard for the first label.
fn select_certificate(names: &HashMap<String, usize>, server_name: &str) -> Option<usize> {
    let name = server_name.trim_end_matches('.').to_ascii_lowercase();
    if let Some(&index) = names.get(&name) {
        return Some(index);
    }
    let (_, parent) = name.split_once('.')?;
    names.get(&format!("*.{parent}")).copied()
}

/// Selects a certificate by the SNI name in the client hello.
#[derive(Debug)]
struct SniResolver {
    keys: Vec<Arc<CertifiedKey>>,
    names: HashMap<String, usize>,
}

impl SniResolver {
    fn new(certificates: &[LoadedCertificate]) -> Self {
        let mut names = HashMap::new();
        for (index, certificate) in certificates.iter().enumerate() {
            for name in &certificate.names {
                names.insert(name.clone(), index);
            }
        }

        Self {
            keys: certificates.iter().map(|c| c.key.clone()).collect(),
            names,
        }
    }
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let index = client_hello
            .server_name()
            .and_then(|name| select_certificate(&self.names, name))
            .unwrap_or(0);
        self.keys.get(index).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pair() {
        let pair = TlsPair::parse("/etc/ssl/site.pem:/etc/ssl/site.key").unwrap();
        assert_eq!(pair.cert, PathBuf::from("/etc/ssl/site.pem"));
        assert_eq!(pair.key, PathBuf::from("/etc/ssl/site.key"));
    }

    #[test]
    fn test_parse_pair_splits_at_first_colon() {
        let pair = TlsPair::parse("cert.pem:keys/a:b.key").unwrap();
        assert_eq!(pair.cert, PathBuf::from("cert.pem"));
        assert_eq!(pair.key, PathBuf::from("keys/a:b.key"));
    }

    #[test]
    fn test_parse_pair_rejects_malformed_input() {
        for input in ["", "cert.pem", ":key.pem", "cert.pem:", ":"] {
            assert!(
                matches!(
                    TlsPair::parse(input),
                    Err(TlsError::InvalidCertificateInput(ref s)) if s == input
                ),
                "expected {input:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_parse_list_keeps_order() {
        let pairs = parse_tls_pairs("a.pem:a.key,b.pem:b.key,c.pem:c.key").unwrap();
        let certs: Vec<_> = pairs.iter().map(|p| p.cert.to_str().unwrap()).collect();
        assert_eq!(certs, vec!["a.pem", "b.pem", "c.pem"]);
    }

    #[test]
    fn test_parse_list_fails_on_any_bad_pair() {
        let err = parse_tls_pairs("a.pem:a.key,broken,c.pem:c.key").unwrap_err();
        assert!(matches!(err, TlsError::InvalidCertificateInput(ref s) if s == "broken"));
    }

    #[test]
    fn test_parse_empty_list_is_invalid() {
        assert!(matches!(
            parse_tls_pairs(""),
            Err(TlsError::InvalidCertificateInput(_))
        ));
    }

    #[test]
    fn test_pair_display() {
        let pair = TlsPair::new("a.pem", "a.key");
        assert_eq!(pair.to_string(), "a.pem:a.key");
    }

    fn name_index(entries: &[(&str, usize)]) -> HashMap<String, usize> {
        entries.iter().map(|(name, i)| (name.to_string(), *i)).collect()
    }

    #[test]
    fn test_select_prefers_exact_name_over_wildcard() {
        let names = name_index(&[("*.example.test", 0), ("www.example.test", 1)]);
        assert_eq!(select_certificate(&names, "www.example.test"), Some(1));
        assert_eq!(select_certificate(&names, "api.example.test"), Some(0));
    }

    #[test]
    fn test_select_wildcard_covers_one_label() {
        let names = name_index(&[("*.example.test", 0)]);
        assert_eq!(select_certificate(&names, "a.b.example.test"), None);
        assert_eq!(select_certificate(&names, "example.test"), None);
    }

    #[test]
    fn test_select_ignores_case_and_trailing_dot() {
        let names = name_index(&[("www.example.test", 2)]);
        assert_eq!(select_certificate(&names, "WWW.Example.Test."), Some(2));
        assert_eq!(select_certificate(&names, "other.test"), None);
    }

    #[test]
    fn test_load_requires_pairs() {
        assert!(matches!(TlsConfig::load(&[]), Err(TlsError::NoCertificates)));
    }

    #[test]
    fn test_load_missing_files() {
        let err = TlsConfig::load(&[TlsPair::new("/nonexistent/cert.pem", "/nonexistent/key.pem")])
            .unwrap_err();
        match err {
            TlsError::CertificateLoad { pair, source } => {
                assert_eq!(pair, "/nonexistent/cert.pem:/nonexistent/key.pem");
                assert!(matches!(source, CertificateLoadCause::Certificate { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
