//! TCP Server
//!
//! Accepts connections (optionally wrapping them in TLS) and spawns a
//! handler task for each.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

use crate::config::Config;
use crate::error::Result;
use crate::service::LogService;
use crate::storage::Log;

use super::connection::wait_for_shutdown;
use super::Connection;

/// TCP server for seglog
pub struct Server {
    /// Server configuration
    config: Config,

    /// Shared request handler
    service: Arc<LogService>,

    /// Present when connections must be secured
    tls: Option<TlsAcceptor>,

    /// Shutdown signal shared with every connection
    shutdown: Arc<watch::Sender<bool>>,
}

/// Cloneable handle that stops a running server
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl ServerHandle {
    /// Stop accepting connections and close every open connection
    ///
    /// Open consume streams are cancelled; the server's `serve` future
    /// resolves once all connection tasks have finished.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// True once shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }
}

impl Server {
    /// Create a new server over an opened log
    pub fn new(config: Config, log: Arc<Log>) -> Self {
        let service = Arc::new(LogService::new(log, config.stream));
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            service,
            tls: None,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Require TLS on every accepted connection
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Handle for stopping the server from another task
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// The shared service (produce/consume without the network)
    pub fn service(&self) -> &Arc<LogService> {
        &self.service
    }

    /// Bind `config.listen_addr` and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        let mode = if self.tls.is_some() { "TLS" } else { "plain TCP" };
        tracing::info!("Server listening on {} ({})", local_addr, mode);

        let limit = Arc::new(Semaphore::new(self.config.max_connections.max(1)));
        let mut connections = JoinSet::new();
        let mut shutdown = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,

                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    let permit = match Arc::clone(&limit).try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!("Connection limit reached, rejecting {}", peer_addr);
                            continue;
                        }
                    };

                    let service = Arc::clone(&self.service);
                    let tls = self.tls.clone();
                    let shutdown = self.shutdown.subscribe();

                    connections.spawn(async move {
                        let _permit = permit;
                        serve_connection(stream, peer_addr, tls, service, shutdown).await;
                    });
                }

                // Reap finished connections so the set does not grow unbounded
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        tracing::info!(
            "Server on {} shutting down, waiting for {} connections",
            local_addr,
            connections.len()
        );
        while connections.join_next().await.is_some() {}
        tracing::info!("Server on {} stopped", local_addr);

        Ok(())
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.handle().shutdown();
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    tls: Option<TlsAcceptor>,
    service: Arc<LogService>,
    shutdown: watch::Receiver<bool>,
) {
    // Disable Nagle's algorithm for low latency
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
    }

    let peer = peer_addr.to_string();
    let result = match tls {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(stream) => Connection::new(stream, peer, service, shutdown).handle().await,
            Err(e) => {
                tracing::warn!("TLS handshake with {} failed: {}", peer_addr, e);
                return;
            }
        },
        None => Connection::new(stream, peer, service, shutdown).handle().await,
    };

    if let Err(e) = result {
        tracing::warn!("Connection {} closed with error: {}", peer_addr, e);
    }
}
