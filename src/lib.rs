//! # Token Relay Library
//!
//! Attaches per-event bearer tokens to requests for protected static files.
//! Tokens come from an external issuer, are cached until they approach
//! expiry, and concurrent requests for different events are batched into a
//! single issuer call.
//!
//! Modules:
//! - `matcher` — request path to resource id
//! - `cache` — freshness-aware token cache with background purge
//! - `coalescer` — batching of concurrent issuer requests
//! - `pipeline` — per-request interception and transport seam
//! - `issuer` — issuer seam and HTTP issuer
//! - `server` — reverse proxy host and metrics endpoint

pub mod cache;
pub mod coalescer;
pub mod config;
pub mod error;
pub mod helpers;
pub mod issuer;
pub mod matcher;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod server;
pub mod tests;
pub mod utils;

pub use crate::config::relay::ServiceConfig;
pub use crate::error::{ConfigError, TokenDecodeError};
pub use crate::pipeline::interception::InterceptionPipeline;
