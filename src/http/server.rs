//! HTTP Server
//!
//! Binds the listener and runs the router until shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use super::{router, AppState};
use crate::error::{Result, SeisError};

/// HTTP front end for seisgate
pub struct HttpServer {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Bind to `addr`
    pub async fn bind(addr: &str, state: Arc<AppState>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SeisError::Config(format!("cannot listen on {}: {}", addr, e)))?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` resolves, then finish in-flight responses
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        tracing::info!(%addr, "HTTP server listening");

        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
