//! h2s: serve a directory over HTTPS.
//!
//! This is the application entry point. It parses flags (each also settable
//! through an `H2S_*` environment variable), merges them over an optional TOML
//! config file, initializes tracing, and runs the server until a termination
//! signal has been handled. Exits 0 after a graceful shutdown and 1 on any
//! fatal error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use h2s::config::{AppConfig, ConfigError, LoggingConfig, DEFAULT_LOG_FILTER};
use h2s::start_server;

/// h2s: HTTPS static file server
#[derive(Parser, Debug)]
#[command(name = "h2s", version, about)]
struct Args {
    /// Optional TOML configuration file; flags override its values
    #[arg(long, env = "H2S_CONFIG")]
    config: Option<PathBuf>,

    /// https server address (host:port)
    #[arg(long, env = "H2S_ADDR")]
    addr: Option<String>,

    /// public files directory
    #[arg(long, env = "H2S_DIR")]
    dir: Option<PathBuf>,

    /// tls cert1:key1,cert2:key2 pairs
    #[arg(long, env = "H2S_TLS")]
    tls: Option<String>,

    /// single tls certificate file (use with --tls-key-file)
    #[arg(long, env = "H2S_TLS_CERT_FILE")]
    tls_cert_file: Option<PathBuf>,

    /// single tls key file (use with --tls-cert-file)
    #[arg(long, env = "H2S_TLS_KEY_FILE")]
    tls_key_file: Option<PathBuf>,

    /// log every request (true/false, default true)
    #[arg(long, env = "H2S_REQUEST_LOG")]
    request_log: Option<bool>,

    /// seconds to wait for in-flight requests on shutdown (default: no limit)
    #[arg(long, env = "H2S_SHUTDOWN_TIMEOUT")]
    shutdown_timeout: Option<u64>,

    /// Log level filter (e.g., "h2s=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log format: text or json
    #[arg(long, env = "H2S_LOG_FORMAT")]
    log_format: Option<String>,
}

impl Args {
    /// Merge flags over the config file (if any) and built-in defaults.
    fn into_config(self) -> Result<AppConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };

        if let Some(addr) = self.addr {
            config.addr = addr;
        }
        if let Some(dir) = self.dir {
            config.dir = dir;
        }
        if self.tls.is_some() {
            config.tls = self.tls;
        }
        if self.tls_cert_file.is_some() {
            config.tls_cert_file = self.tls_cert_file;
        }
        if self.tls_key_file.is_some() {
            config.tls_key_file = self.tls_key_file;
        }
        if self.request_log.is_some() {
            config.request_log = self.request_log;
        }
        if self.shutdown_timeout.is_some() {
            config.shutdown_timeout_seconds = self.shutdown_timeout;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }

        Ok(config)
    }
}

fn init_tracing(filter: &str, logging: &LoggingConfig) {
    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(filter));

    if logging.is_json() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(config: &AppConfig) -> Result<(), h2s::Error> {
    config.validate()?;
    start_server(config).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Log filter priority: CLI > env > default
    let log_filter = args
        .log_level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("h2s: {}", h2s::Error::from(e).report());
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&log_filter, &config.logging);

    match run(&config).await {
        Ok(()) => {
            tracing::info!("Graceful shutdown complete.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e.report());
            ExitCode::FAILURE
        }
    }
}
