//! HTTP/1.1 listener.
//!
//! [`Server`] binds a Tokio TCP listener and serves every connection with
//! hyper. Each request body is collected (bounded by the configured body
//! timeout) and the request is handed to an [`Endpoint`], usually a
//! [`Router`](crate::Router).
//!
//! # Example
//!
//! ```rust,ignore
//! use ivy::{Router, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ivy::ServerError> {
//!     let router = Router::new();
//!     let config = ServerConfig::builder().http_addr("127.0.0.1:3000").build();
//!
//!     Server::new(config, router)
//!         .run_with_shutdown(async { let _ = tokio::signal::ctrl_c().await; })
//!         .await
//! }
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use http::{Request as HttpRequest, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::adapter::Endpoint;
use crate::config::{ConfigError, ServerConfig};
use crate::response::{BufferedResponse, ResponseWriter};
use crate::types::{Request, Response};

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: SocketAddr,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
}

/// Serves an endpoint over HTTP/1.1.
pub struct Server {
    config: ServerConfig,
    endpoint: Arc<dyn Endpoint>,
}

impl Server {
    /// Creates a server for `endpoint`.
    pub fn new<E: Endpoint>(config: ServerConfig, endpoint: E) -> Self {
        Self {
            config,
            endpoint: Arc::new(endpoint),
        }
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    ///
    /// After shutdown no new connections are accepted. Open connections
    /// get up to the configured shutdown timeout to finish, then they are
    /// dropped.
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Serves connections accepted from an already bound listener.
    pub async fn serve<S>(self, listener: TcpListener, shutdown: S)
    where
        S: Future<Output = ()> + Send,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "server listening");
        }

        let server = Arc::new(self);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let server = Arc::clone(&server);
                        connections.spawn(async move {
                            server.handle_connection(stream, remote_addr).await;
                        });
                    }
                    Err(err) => tracing::error!(error = %err, "failed to accept connection"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                () = &mut shutdown => {
                    tracing::info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        let timeout = server.config.shutdown_timeout();
        tracing::info!(
            active = connections.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for connections to close"
        );
        let drained = tokio::time::timeout(timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                active = connections.len(),
                "shutdown timeout reached, dropping connections"
            );
            connections.abort_all();
        }
        tracing::info!("server stopped");
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, remote_addr: SocketAddr) {
        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);
        let service = service_fn(move |req: HttpRequest<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_request(req).await) }
        });

        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
            tracing::debug!(%remote_addr, error = %err, "connection closed with error");
        }
    }

    async fn handle_request(&self, req: HttpRequest<Incoming>) -> Response {
        let (parts, body) = req.into_parts();
        let collected = tokio::time::timeout(self.config.body_timeout(), body.collect()).await;
        let bytes = match collected {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "failed to read request body");
                return status_only(StatusCode::BAD_REQUEST);
            }
            Err(_) => {
                tracing::warn!("request body timed out");
                return status_only(StatusCode::REQUEST_TIMEOUT);
            }
        };

        let request: Request = HttpRequest::from_parts(parts, Full::new(bytes));
        self.endpoint
            .serve(request, BufferedResponse::boxed())
            .await
            .into_response()
    }
}

fn status_only(status: StatusCode) -> Response {
    let mut writer = BufferedResponse::new();
    writer.write_status(status);
    Box::new(writer).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::endpoint_fn;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_serves_and_shuts_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::new(
            ServerConfig::builder()
                .shutdown_timeout(std::time::Duration::from_secs(1))
                .build(),
            endpoint_fn(|req, w| {
                w.write_status(StatusCode::OK);
                w.write(req.uri().path().as_bytes());
            }),
        );

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(listener, async {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.ends_with("/ping"));

        stop_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_error_reports_addr() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let server = Server::new(
            ServerConfig::builder().http_addr(addr.to_string()).build(),
            endpoint_fn(|_req, _w| {}),
        );
        let err = server.run_with_shutdown(async {}).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
