//! FilaZero Limiter - Sliding-Window Request Rate Limiting
//!
//! This crate implements the per-client request rate limiter that sits in
//! front of the FilaZero ordering backend. Each client gets a trailing window
//! of admitted request timestamps; a background task evicts clients that have
//! gone quiet. State is process-local and is lost on restart.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
