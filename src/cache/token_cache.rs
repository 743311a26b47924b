use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::token::Token;
use crate::error::TokenDecodeError;
use crate::helpers::time::now_i64;
use crate::observability::metrics::get_metrics;
use crate::utils::constants::{MAX_PURGE_SLEEP_SECS, PURGE_BUFFER_SECS};

static HIT_MSG: &str = "hit";
static MISS_MSG: &str = "miss";
static STALE_MSG: &str = "stale";

/// Resource id -> token, with a single self-rescheduling purge task.
#[derive(Debug, Clone)]
pub struct TokenCache {
    inner: Arc<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    state: Mutex<CacheState>,
    min_validity_seconds: i64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, Token>,
    purge_armed: bool,
    purge_spawns: u64,
}

impl CacheState {
    fn earliest_expiry(&self) -> Option<i64> {
        self.entries.values().map(|t| t.exp_unix_ts).min()
    }
}

impl TokenCache {
    pub fn new(min_validity_seconds: i64) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState::default()),
                min_validity_seconds,
            }),
        }
    }

    pub fn min_validity_seconds(&self) -> i64 {
        self.inner.min_validity_seconds
    }

    /// Get token if it exists and is fresh. A stale entry is evicted.
    pub async fn lookup(&self, id: &str) -> Option<Token> {
        let metrics = get_metrics().await;
        let now = now_i64();
        let mut state = self.inner.state.lock().await;

        let fresh = match state.entries.get(id) {
            None => {
                metrics.cache_lookups.with_label_values(&[MISS_MSG]).inc();
                return None;
            }
            Some(token) => token.is_fresh_at(now, self.inner.min_validity_seconds),
        };

        if fresh {
            metrics.cache_lookups.with_label_values(&[HIT_MSG]).inc();
            return state.entries.get(id).cloned();
        }

        state.entries.remove(id);
        metrics.cache_lookups.with_label_values(&[STALE_MSG]).inc();
        metrics.cached_tokens.set(state.entries.len() as i64);
        debug!(id = %id, "stale token evicted on lookup");
        None
    }

    /// Decode and store a token. An existing entry is only replaced by a token
    /// expiring strictly later. Returns whether the cache changed.
    pub async fn insert(&self, id: &str, raw_token: &str) -> Result<bool, TokenDecodeError> {
        let token = Token::decode(raw_token)?;
        let metrics = get_metrics().await;
        let mut state = self.inner.state.lock().await;

        let replaced = match state.entries.get(id) {
            Some(current) if current.exp_unix_ts >= token.exp_unix_ts => {
                debug!(
                    id = %id,
                    current_exp = current.exp_unix_ts,
                    new_exp = token.exp_unix_ts,
                    "keeping later-expiring cached token"
                );
                false
            }
            _ => {
                state.entries.insert(id.to_owned(), token);
                true
            }
        };
        metrics.cached_tokens.set(state.entries.len() as i64);

        if !state.purge_armed {
            state.purge_armed = true;
            state.purge_spawns += 1;
            debug!(spawns = state.purge_spawns, "purge task armed");
            tokio::spawn(purge_loop(self.inner.clone()));
        }
        Ok(replaced)
    }

    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn purge_armed(&self) -> bool {
        self.inner.state.lock().await.purge_armed
    }

    /// How many purge tasks this cache has started over its lifetime.
    pub async fn purge_spawns(&self) -> u64 {
        self.inner.state.lock().await.purge_spawns
    }
}

/// Sleep until the earliest entry turns stale, sweep, repeat. Exits and
/// disarms once the cache is empty; the next insert re-arms.
async fn purge_loop(inner: Arc<CacheInner>) {
    loop {
        let deadline = {
            let mut state = inner.state.lock().await;
            match state.earliest_expiry() {
                Some(exp) => exp
                    .saturating_sub(inner.min_validity_seconds)
                    .saturating_add(PURGE_BUFFER_SECS),
                None => {
                    state.purge_armed = false;
                    return;
                }
            }
        };

        let sleep_interval = deadline
            .saturating_sub(now_i64())
            .clamp(1, MAX_PURGE_SLEEP_SECS);
        debug!("purge sleep interval {} seconds", sleep_interval);
        tokio::time::sleep(Duration::from_secs(sleep_interval as u64)).await;

        let metrics = get_metrics().await;
        let now = now_i64();
        let mut state = inner.state.lock().await;
        let before = state.entries.len();
        state
            .entries
            .retain(|_, token| token.is_fresh_at(now, inner.min_validity_seconds));
        let evicted = before - state.entries.len();

        metrics.purge_evictions.inc_by(evicted as u64);
        metrics.cached_tokens.set(state.entries.len() as i64);
        info!("purge evicted {} stale tokens, {} remain", evicted, state.entries.len());

        if state.entries.is_empty() {
            state.purge_armed = false;
            return;
        }
    }
}
