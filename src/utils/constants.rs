//! Shared constants and invariants

pub const DEFAULT_MIN_VALIDITY_SECS: i64 = 60;
pub const DEFAULT_BATCH_WINDOW_MS: f64 = 20.0;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;

/// Slack added to the purge deadline so the earliest entry is already stale when the sweep runs.
pub const PURGE_BUFFER_SECS: i64 = 1;
/// Upper bound on one purge sleep; far-future expiries are re-checked at this pace.
pub const MAX_PURGE_SLEEP_SECS: i64 = 3600;

pub const PATH_SEPARATOR: char = '/';
pub const BEARER_PREFIX: &str = "Bearer ";
