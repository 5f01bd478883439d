//! HTTP edge: client identification, rate limit enforcement and the server.

mod client;
mod middleware;
mod server;

pub use client::{AuthenticatedUser, ClientKey, ANONYMOUS_CLIENT};
pub use middleware::{
    enforce_rate_limit, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use server::{router, HttpServer};
