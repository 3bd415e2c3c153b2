//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use h2s::http::tls::{TlsConfig, TlsPair};
use h2s::{AppConfig, HttpsServer, LifecycleState, ServerError, ShutdownReason};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// A self-signed certificate written to disk.
pub struct TestCert {
    pub pair: TlsPair,
    pub der: Vec<u8>,
    pub cert_pem: String,
}

/// Generate a self-signed certificate for `hosts` and write it into `dir`.
pub fn write_cert(dir: &Path, name: &str, hosts: &[&str]) -> TestCert {
    let rcgen::CertifiedKey { cert, signing_key } =
        rcgen::generate_simple_self_signed(hosts.iter().map(|h| h.to_string()).collect::<Vec<_>>())
            .expect("generate certificate");

    let cert_path = dir.join(format!("{name}.pem"));
    let key_path = dir.join(format!("{name}.key"));
    std::fs::write(&cert_path, cert.pem()).unwrap();
    std::fs::write(&key_path, signing_key.serialize_pem()).unwrap();

    TestCert {
        pair: TlsPair::new(cert_path, key_path),
        der: cert.der().to_vec(),
        cert_pem: cert.pem(),
    }
}

/// HTTPS client that accepts the self-signed test certificates and exposes
/// the peer certificate of each response.
pub fn client() -> reqwest::Client {
    client_resolving(&[])
}

/// Like `client`, resolving each of `hosts` to `addr` so requests carry SNI.
pub fn client_resolving(hosts: &[(&str, SocketAddr)]) -> reqwest::Client {
    let mut builder = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .tls_info(true)
        .no_proxy();
    for (host, addr) in hosts {
        builder = builder.resolve(host, *addr);
    }
    builder.build().unwrap()
}

/// Config serving `dir` on an ephemeral localhost port.
pub fn config_for(dir: &Path, cert: &TestCert) -> AppConfig {
    AppConfig {
        addr: "127.0.0.1:0".to_string(),
        dir: dir.to_path_buf(),
        tls: Some(cert.pair.to_string()),
        ..Default::default()
    }
}

/// A server running on a background task until `stop` is called.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub state: watch::Receiver<LifecycleState>,
    stop_tx: Option<oneshot::Sender<()>>,
    pub task: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("https://127.0.0.1:{}{}", self.addr.port(), path)
    }

    /// Trigger the graceful shutdown.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Bind and start `router` with the given certificates.
pub fn spawn_server(pairs: &[TlsPair], router: axum::Router) -> RunningServer {
    let tls = TlsConfig::load(pairs).expect("load tls");
    let server = HttpsServer::bind("127.0.0.1:0", tls, router).expect("bind");
    let addr = server.local_addr();
    let state = server.state();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run_until(async move {
        let _ = stop_rx.await;
        ShutdownReason::Requested
    }));

    RunningServer {
        addr,
        state,
        stop_tx: Some(stop_tx),
        task,
    }
}

pub fn public_dir(root: &Path) -> PathBuf {
    let public = root.join("public");
    std::fs::create_dir_all(&public).unwrap();
    public
}
