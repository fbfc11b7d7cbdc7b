//! TCP accept loop for the RPC surface.
//!
//! Each connection gets its own task that reads a request frame, hands it to
//! the handler, and writes the response frame back. Handlers are synchronous:
//! the service does its work under an in-memory mutex and never performs I/O,
//! so there is nothing to await inside a request.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use surge_common::error::ProtocolError;
use surge_common::prelude::*;

use crate::codec::{read_frame, write_frame};
use crate::message::{Request, Response};

/// Server-side request dispatch.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, request: Request) -> Response;
}

/// Connection limiter to enforce max_connections.
#[derive(Debug, Clone)]
pub struct ConnectionLimiter {
    semaphore: Arc<Semaphore>,
    max_connections: usize,
}

impl ConnectionLimiter {
    pub fn new(max_connections: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        }
    }

    /// Try to acquire a connection permit.
    /// Returns None if the connection limit has been reached.
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn active_connections(&self) -> usize {
        self.max_connections - self.semaphore.available_permits()
    }
}

/// Serve connections until the listener fails.
pub async fn serve<H: RequestHandler>(listener: TcpListener, handler: Arc<H>, max_connections: usize) {
    serve_with_cancel(listener, handler, max_connections, CancellationToken::new()).await
}

/// Serve connections until cancelled.
pub async fn serve_with_cancel<H: RequestHandler>(
    listener: TcpListener,
    handler: Arc<H>,
    max_connections: usize,
    cancel_token: CancellationToken,
) {
    let limiter = ConnectionLimiter::new(max_connections);

    info!(max_connections, "RPC server started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        if let Err(e) = crate::set_tcp_keepalive(&stream) {
                            warn!("Failed to set TCP keepalive for {}: {}", peer_addr, e);
                        }

                        let permit = match limiter.try_acquire() {
                            Some(permit) => permit,
                            None => {
                                warn!(
                                    "Rejecting connection from {}: max connections ({}) reached",
                                    peer_addr, max_connections
                                );
                                drop(stream);
                                continue;
                            }
                        };

                        debug!(
                            "connection from {} (active: {}/{})",
                            peer_addr,
                            limiter.active_connections(),
                            limiter.max_connections()
                        );

                        let handler = handler.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            if let Err(e) = handle_connection(stream, handler).await {
                                error!("connection error from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!("RPC server shutting down");
                break;
            }
        }
    }
}

async fn handle_connection<H: RequestHandler>(mut stream: TcpStream, handler: Arc<H>) -> Result<()> {
    loop {
        let request: Request = match read_frame(&mut stream).await {
            Ok(request) => request,
            // Orderly disconnect between frames.
            Err(Error::Protocol(ProtocolError::ConnectionClosed)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let response = handler.handle(request);
        write_frame(&mut stream, &response).await?;
    }
}
