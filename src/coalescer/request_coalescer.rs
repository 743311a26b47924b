//! Batches concurrent token requests into single issuer calls.
//!
//! At most one batch is open at a time. The first `acquire` opens it and
//! spawns the batch task; later callers join until the window elapses. The
//! batch task then detaches the id set from the slot, calls the issuer once
//! and publishes the response through a shared future every joiner awaits.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::helpers::time::get_instant;
use crate::issuer::{IssuedTokens, ResourceId, TokenIssuer};
use crate::observability::metrics::get_metrics;

static BATCH_MSG: &str = "batch";
static SINGLE_MSG: &str = "single";

type BatchResult = Arc<IssuedTokens>;
type SharedIssuance = Shared<BoxFuture<'static, BatchResult>>;

struct PendingBatch {
    id: u64,
    resource_ids: HashSet<ResourceId>,
    issuance: SharedIssuance,
}

pub struct RequestCoalescer<I: TokenIssuer> {
    issuer: Arc<I>,
    window: Duration,
    slot: Arc<Mutex<Option<PendingBatch>>>,
    batch_seq: AtomicU64,
}

impl<I: TokenIssuer> RequestCoalescer<I> {
    /// A zero `window` disables batching.
    pub fn new(issuer: Arc<I>, window: Duration) -> Self {
        Self {
            issuer,
            window,
            slot: Arc::new(Mutex::new(None)),
            batch_seq: AtomicU64::new(0),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Token for `id`, or `None` if the issuer denied it or failed.
    pub async fn acquire(&self, id: &str) -> Option<String> {
        if self.window.is_zero() {
            return self.acquire_single(id).await;
        }

        let issuance = self.join_or_open(id).await;
        issuance.await.get(id).cloned()
    }

    async fn acquire_single(&self, id: &str) -> Option<String> {
        let ids = HashSet::from([id.to_owned()]);
        let mut tokens = issue(self.issuer.as_ref(), ids, SINGLE_MSG).await;
        tokens.remove(id)
    }

    async fn join_or_open(&self, id: &str) -> SharedIssuance {
        let mut slot = self.slot.lock().await;

        if let Some(batch) = slot.as_mut() {
            batch.resource_ids.insert(id.to_owned());
            debug!(batch = batch.id, id = %id, "joined open batch ({} ids)", batch.resource_ids.len());
            return batch.issuance.clone();
        }

        let batch_id = self.batch_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel::<BatchResult>();
        let issuance = rx.map(|res| res.unwrap_or_default()).boxed().shared();

        *slot = Some(PendingBatch {
            id: batch_id,
            resource_ids: HashSet::from([id.to_owned()]),
            issuance: issuance.clone(),
        });
        debug!(batch = batch_id, id = %id, "opened batch, window {:?}", self.window);

        tokio::spawn(run_batch(
            self.issuer.clone(),
            self.slot.clone(),
            self.window,
            batch_id,
            tx,
        ));
        issuance
    }
}

/// Timer protocol, exactly once per batch.
async fn run_batch<I: TokenIssuer>(
    issuer: Arc<I>,
    slot: Arc<Mutex<Option<PendingBatch>>>,
    window: Duration,
    batch_id: u64,
    tx: oneshot::Sender<BatchResult>,
) {
    tokio::time::sleep(window).await;

    // detach before calling out, so late arrivals open a new batch
    let detached = slot.lock().await.take();
    let resource_ids = detached
        .map(|batch| batch.resource_ids)
        .unwrap_or_default();

    let tokens = if resource_ids.is_empty() {
        IssuedTokens::new()
    } else {
        info!(batch = batch_id, "issuing tokens for {} ids", resource_ids.len());
        issue(issuer.as_ref(), resource_ids, BATCH_MSG).await
    };

    // every joiner may have gone away already
    let _ = tx.send(Arc::new(tokens));
}

/// One issuer call. Failures are logged and yield no tokens.
async fn issue<I: TokenIssuer>(issuer: &I, ids: HashSet<ResourceId>, mode: &str) -> IssuedTokens {
    let metrics = get_metrics().await;
    let start = get_instant();
    metrics.issuer_requests.with_label_values(&[mode]).inc();
    metrics.issuer_batch_size.with_label_values(&[mode]).observe(ids.len() as f64);

    let requested = ids.len();
    let res = issuer.get_tokens(ids).await;
    metrics.issuer_duration.with_label_values(&[mode]).observe(start.elapsed().as_secs_f64());

    match res {
        Ok(tokens) => {
            debug!("issuer returned {} of {} tokens", tokens.len(), requested);
            tokens
        }
        Err(e) => {
            metrics.issuer_failures.inc();
            warn!("issuer call for {} ids failed: {:#}", requested, e);
            IssuedTokens::new()
        }
    }
}
