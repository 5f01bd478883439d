//! HTTP server fronted by the rate limiter.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::client::ClientKey;
use super::middleware::enforce_rate_limit;
use crate::error::Result;
use crate::ratelimit::{RateLimitInfo, RateLimiter};

/// HTTP server whose every route sits behind the rate limiter.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<RateLimiter>,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, rate_limiter: Arc<RateLimiter>) -> Self {
        Self { addr, rate_limiter }
    }

    /// Build the router with the rate limiting layer applied.
    pub fn router(&self) -> Router {
        router(self.rate_limiter.clone())
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            e.into()
        })
    }
}

/// Routes served behind the rate limiter.
pub fn router(rate_limiter: Arc<RateLimiter>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rate-limit", get(rate_limit_status))
        .layer(from_fn_with_state(rate_limiter.clone(), enforce_rate_limit))
        .with_state(rate_limiter)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// The caller's own quota, after this request has been counted.
async fn rate_limit_status(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
) -> Json<RateLimitInfo> {
    let key = ClientKey::from_request_parts(request.headers(), request.extensions());
    Json(limiter.get_rate_limit_info(&key.to_string_key()))
}
