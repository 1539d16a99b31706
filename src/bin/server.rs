//! seglog Server Binary
//!
//! Opens the log and serves it over TCP, or TLS when a certificate is given.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use seglog::network::tls::TlsConfig;
use seglog::{Config, Log, Server};
use tracing_subscriber::{fmt, EnvFilter};

/// seglog Server
#[derive(Parser, Debug)]
#[command(name = "seglog-server")]
#[command(about = "Segmented append-only commit log server")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./seglog_data")]
    data_dir: PathBuf,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:8400")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Store size in bytes at which a segment is rotated
    #[arg(long, default_value = "1024")]
    max_store_bytes: u64,

    /// Index size in bytes at which a segment is rotated
    #[arg(long, default_value = "1024")]
    max_index_bytes: u64,

    /// Offset of the first record of a fresh log
    #[arg(long, default_value = "0")]
    initial_offset: u64,

    /// Server certificate chain (PEM); enables TLS
    #[arg(long, requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// Server private key (PEM)
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    /// CA certificate (PEM) that client certificates must chain to
    #[arg(long, requires = "tls_cert")]
    tls_ca: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,seglog=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("seglog Server v{}", seglog::VERSION);
    tracing::info!("Data directory: {}", args.data_dir.display());
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .max_store_bytes(args.max_store_bytes)
        .max_index_bytes(args.max_index_bytes)
        .initial_offset(args.initial_offset)
        .build();

    // Open log
    let log = match Log::open(&config.data_dir, config.segment) {
        Ok(log) => Arc::new(log),
        Err(e) => {
            tracing::error!("Failed to open log: {}", e);
            std::process::exit(1);
        }
    };

    let mut server = Server::new(config, Arc::clone(&log));

    if let (Some(cert), Some(key)) = (&args.tls_cert, &args.tls_key) {
        match build_acceptor(cert, key, args.tls_ca.as_deref()) {
            Ok(acceptor) => server = server.with_tls(acceptor),
            Err(e) => {
                tracing::error!("Failed to load TLS material: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        tracing::warn!("No certificate given, serving plain TCP");
    }

    // Set up Ctrl+C handler
    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
            handle.shutdown();
        }
    });

    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = log.close() {
        tracing::error!("Failed to close log: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

fn build_acceptor(
    cert: &Path,
    key: &Path,
    client_ca: Option<&Path>,
) -> seglog::Result<tokio_rustls::TlsAcceptor> {
    let mut tls = TlsConfig::new(cert, key)?;
    if let Some(ca) = client_ca {
        tls = tls.with_client_auth(ca)?;
        tracing::info!("mTLS enabled: client certificates required");
    }
    tls.acceptor()
}
