//! HTTP listener serving instrumented connections.

use crate::config::ServerConfig;
use crate::interceptor::InstrumentService;
use crate::metrics::HttpMetrics;
use crate::server::Router;
use crate::util::ConnectionId;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// Application server: every request goes through [`InstrumentService`].
pub struct AppServer {
    /// Bound listen address.
    address: SocketAddr,
    listener: TcpListener,
    router: Arc<Router>,
    metrics: HttpMetrics,
    /// Grace period for open connections after shutdown is signalled.
    shutdown_timeout: Duration,
}

impl AppServer {
    /// Bind the listener described by `config`.
    pub async fn bind(
        config: &ServerConfig,
        router: Router,
        metrics: HttpMetrics,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        let address = listener.local_addr()?;

        info!(
            address = %address,
            metrics_path = %router.metrics_path(),
            "server listener bound"
        );

        Ok(Self {
            address,
            listener,
            router: Arc::new(router),
            metrics,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Accept connections until shutdown, then drain open connections for at
    /// most the configured grace period.
    #[instrument(skip_all, fields(address = %self.address))]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("server starting");
        let graceful = GracefulShutdown::new();

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            self.handle_connection(stream, addr, &graceful);
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("server shutting down");
                    break;
                }
            }
        }

        drop(self.listener);

        tokio::select! {
            _ = graceful.shutdown() => {
                info!("all connections closed");
            }
            _ = tokio::time::sleep(self.shutdown_timeout) => {
                warn!(
                    timeout_ms = self.shutdown_timeout.as_millis(),
                    "timed out waiting for connections to close"
                );
            }
        }
    }

    /// Serve one connection on its own task.
    fn handle_connection(
        &self,
        stream: TcpStream,
        client_addr: SocketAddr,
        graceful: &GracefulShutdown,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on client connection");
        }

        let connection_id = ConnectionId::next();
        let router = Arc::clone(&self.router);
        let service = InstrumentService::new(
            service_fn(move |req: Request<Incoming>| {
                let router = Arc::clone(&router);
                async move { router.route(req).await }
            }),
            self.metrics.clone(),
        );

        let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
        let connection = graceful.watch(connection);

        debug!(connection_id = %connection_id, client = %client_addr, "connection accepted");

        tokio::spawn(async move {
            match connection.await {
                Ok(()) => {
                    debug!(connection_id = %connection_id, client = %client_addr, "connection closed");
                }
                Err(e) => {
                    debug!(
                        connection_id = %connection_id,
                        client = %client_addr,
                        error = %e,
                        "connection error"
                    );
                }
            }
        });
    }
}
