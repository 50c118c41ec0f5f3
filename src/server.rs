use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api;
use crate::config::ServerConfig;
use crate::store::Store;

/// Request heads larger than this are answered with 431
const MAX_HEAD_LEN: usize = 8 * 1024;

/// HTTP server answering promotion lookups
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Router,
    http: http1::Builder,
}

impl Server {
    /// Create and bind the server to the configured address
    pub async fn bind(config: &ServerConfig, store: Arc<Store>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.addr).await?;
        let local_addr = listener.local_addr()?;
        info!("HTTP server bound to {}", local_addr);

        // The read timeout is a deadline for the whole request head, not an
        // idle timer between reads.
        let mut http = http1::Builder::new();
        http.timer(TokioTimer::new())
            .header_read_timeout(config.read_timeout())
            .max_buf_size(MAX_HEAD_LEN);

        Ok(Self {
            listener,
            local_addr,
            router: api::router(store, config.write_timeout()),
            http,
        })
    }

    /// Get local listening address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve one client connection on its own task
    fn serve_connection(&self, stream: TcpStream, peer_addr: SocketAddr, graceful: &GracefulShutdown) {
        let service = TowerToHyperService::new(self.router.clone());
        let conn = graceful.watch(self.http.serve_connection(TokioIo::new(stream), service));

        tokio::spawn(async move {
            match conn.await {
                Ok(()) => debug!("Connection handler ended for {}", peer_addr),
                Err(e) if e.is_timeout() => debug!("Request from {} timed out: {}", peer_addr, e),
                Err(e) => warn!("Error serving connection from {}: {}", peer_addr, e),
            }
        });
    }

    /// Accept and serve connections until `shutdown` is cancelled, then wait
    /// for open connections to finish their current request
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Server started, listening on {}", self.local_addr);
        let graceful = GracefulShutdown::new();

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    debug!("New connection accepted from {}", peer_addr);
                    self.serve_connection(stream, peer_addr, &graceful);
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }

        info!("Server stopped accepting connections");
        graceful.shutdown().await;
        info!("All connections closed");
    }
}
