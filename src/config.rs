//! Configuration loading and constants.
//!
//! Settings come from three places, in increasing priority: built-in defaults,
//! an optional TOML file, and command line flags (each of which can also be set
//! through an `H2S_*` environment variable, see `main.rs`). `AppConfig` is the
//! merged result handed to the server.

use const_format::formatcp;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::http::tls::{parse_tls_pairs, TlsError, TlsPair};

// =============================================================================
// Compression
// =============================================================================

/// Content types eligible for gzip. Anything else (images, archives, fonts)
/// is passed through untouched.
pub const COMPRESSIBLE_CONTENT_TYPES: &[&str] = &[
    "application/javascript",
    "text/javascript",
    "image/svg+xml",
    "text/css",
    "text/html",
    "text/plain",
];

/// Responses smaller than this many bytes are not worth compressing.
pub const GZIP_MIN_SIZE: u16 = 1400;

// =============================================================================
// Defaults
// =============================================================================

/// Default log filter when neither `--log-level` nor RUST_LOG is set
pub const DEFAULT_LOG_FILTER: &str =
    formatcp!("{}=info,tower_http=info", env!("CARGO_CRATE_NAME"));

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Root configuration for the server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `host:port` to listen on
    pub addr: String,
    /// Directory served as the document root
    pub dir: PathBuf,
    /// Comma separated `cert:key` pairs
    pub tls: Option<String>,
    /// Single certificate file, used together with `tls_key_file`
    pub tls_cert_file: Option<PathBuf>,
    pub tls_key_file: Option<PathBuf>,
    /// Log method and URI of every request (default: true)
    pub request_log: Option<bool>,
    /// Upper bound on connection draining during shutdown. Unset waits forever.
    pub shutdown_timeout_seconds: Option<u64>,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    /// Whether structured JSON output was requested.
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Check the invariants the server relies on before anything is loaded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addr.is_empty() {
            return Err(ConfigError::Validation(
                "No listen address configured. Set --addr or H2S_ADDR".to_string(),
            ));
        }
        https_port(&self.addr)?;

        if self.dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "No public directory configured. Set --dir or H2S_DIR".to_string(),
            ));
        }

        if self.tls.is_none() && self.tls_cert_file.is_none() && self.tls_key_file.is_none() {
            return Err(ConfigError::Validation(
                "No TLS certificates configured. Set --tls or --tls-cert-file/--tls-key-file"
                    .to_string(),
            ));
        }

        if self.tls_cert_file.is_some() != self.tls_key_file.is_some() {
            return Err(ConfigError::Validation(
                "--tls-cert-file and --tls-key-file must be given together".to_string(),
            ));
        }

        if self.shutdown_timeout_seconds == Some(0) {
            return Err(ConfigError::Validation(
                "--shutdown-timeout must be at least 1 second; omit it to wait without limit"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// All configured certificate/key pairs: the `tls` list first, then the
    /// single cert/key file pair if present.
    pub fn tls_pairs(&self) -> Result<Vec<TlsPair>, TlsError> {
        let mut pairs = match &self.tls {
            Some(list) => parse_tls_pairs(list)?,
            None => Vec::new(),
        };

        if let (Some(cert), Some(key)) = (&self.tls_cert_file, &self.tls_key_file) {
            pairs.push(TlsPair::new(cert, key));
        }

        Ok(pairs)
    }

    /// Whether the request logger wraps the handler chain.
    pub fn request_log_enabled(&self) -> bool {
        self.request_log.unwrap_or(true)
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_seconds.map(Duration::from_secs)
    }
}

/// Extract the numeric port from a `host:port` address.
///
/// Accepts bracketed IPv6 hosts (`[::1]:8443`) and an empty host (`:8443`).
pub fn https_port(addr: &str) -> Result<u16, ConfigError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::Validation(format!("address {addr:?} is missing a port")))?;

    if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
        return Err(ConfigError::Validation(format!(
            "address {addr:?} has an unbracketed IPv6 host"
        )));
    }

    port.parse::<u16>()
        .map_err(|_| ConfigError::Validation(format!("address {addr:?} has an invalid port")))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid_config() -> AppConfig {
        AppConfig {
            addr: "127.0.0.1:8443".to_string(),
            dir: PathBuf::from("public"),
            tls: Some("cert.pem:key.pem".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_https_port() {
        assert_eq!(https_port("localhost:8443").unwrap(), 8443);
        assert_eq!(https_port(":443").unwrap(), 443);
        assert_eq!(https_port("[::1]:10443").unwrap(), 10443);
    }

    #[test]
    fn test_https_port_rejects_bad_addresses() {
        assert!(https_port("localhost").is_err());
        assert!(https_port("localhost:https").is_err());
        assert!(https_port("localhost:70000").is_err());
        assert!(https_port("::1:443").is_err());
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_tls_material() {
        let config = AppConfig {
            tls: None,
            ..valid_config()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_requires_both_single_pair_files() {
        let config = AppConfig {
            tls: None,
            tls_cert_file: Some(PathBuf::from("cert.pem")),
            ..valid_config()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_requires_dir() {
        let config = AppConfig {
            dir: PathBuf::new(),
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_shutdown_timeout() {
        let config = AppConfig {
            shutdown_timeout_seconds: Some(0),
            ..valid_config()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let config = AppConfig {
            shutdown_timeout_seconds: Some(1),
            ..valid_config()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tls_pairs_appends_single_pair_last() {
        let config = AppConfig {
            tls: Some("a.pem:a.key,b.pem:b.key".to_string()),
            tls_cert_file: Some(PathBuf::from("c.pem")),
            tls_key_file: Some(PathBuf::from("c.key")),
            ..valid_config()
        };
        let pairs = config.tls_pairs().unwrap();
        let certs: Vec<_> = pairs.iter().map(|p| p.cert.to_str().unwrap()).collect();
        assert_eq!(certs, vec!["a.pem", "b.pem", "c.pem"]);
    }

    #[test]
    fn test_request_log_defaults_on() {
        assert!(valid_config().request_log_enabled());
        let config = AppConfig {
            request_log: Some(false),
            ..valid_config()
        };
        assert!(!config.request_log_enabled());
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
addr = "0.0.0.0:443"
dir = "/srv/www"
tls = "/etc/h2s/a.pem:/etc/h2s/a.key"
request_log = false
shutdown_timeout_seconds = 10

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.addr, "0.0.0.0:443");
        assert_eq!(config.dir, PathBuf::from("/srv/www"));
        assert!(!config.request_log_enabled());
        assert_eq!(config.shutdown_timeout(), Some(Duration::from_secs(10)));
        assert!(config.logging.is_json());
    }

    #[test]
    fn test_load_defaults_logging_format() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"addr = "127.0.0.1:8443""#).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.logging.format, DEFAULT_LOG_FORMAT);
        assert_eq!(config.shutdown_timeout(), None);
    }
}
