use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use geolease_ledger::{AssetConfig, EventBatch, EventCursor, LedgerReader, LedgerWriter, RentalSnapshot};

use crate::error::{ClientError, ClientResult};
use crate::tx::{execute, Submission, TxReceipt};

/// Transport interface between the field client and a ledger.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Submit a call and wait for its verdict.
    async fn submit(&self, submission: &Submission) -> ClientResult<TxReceipt>;
    async fn fetch_snapshot(&self) -> ClientResult<RentalSnapshot>;
    async fn fetch_events(&self, cursor: EventCursor, limit: usize) -> ClientResult<EventBatch>;
    async fn fetch_asset(&self) -> ClientResult<AssetConfig>;
}

/// Transport to a ledger in the same process, with optional confirmation
/// latency and injected submission failures.
pub struct LocalTransport<L> {
    ledger: Arc<L>,
    latency: Duration,
    fail_next: AtomicU32,
}

impl<L> LocalTransport<L>
where
    L: LedgerReader + LedgerWriter + 'static,
{
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            ledger,
            latency: Duration::ZERO,
            fail_next: AtomicU32::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next `count` submissions fail without reaching the ledger.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    fn take_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<L> LedgerTransport for LocalTransport<L>
where
    L: LedgerReader + LedgerWriter + 'static,
{
    async fn submit(&self, submission: &Submission) -> ClientResult<TxReceipt> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.take_failure() {
            debug!(tx = %submission.id.short_id(), kind = %submission.kind(), "dropping submission");
            return Err(ClientError::Transport(format!(
                "submission {} dropped",
                submission.id.short_id()
            )));
        }
        Ok(execute(self.ledger.as_ref(), submission)?)
    }

    async fn fetch_snapshot(&self) -> ClientResult<RentalSnapshot> {
        Ok(self.ledger.snapshot()?)
    }

    async fn fetch_events(&self, cursor: EventCursor, limit: usize) -> ClientResult<EventBatch> {
        Ok(self.ledger.events_since(cursor, limit)?)
    }

    async fn fetch_asset(&self) -> ClientResult<AssetConfig> {
        Ok(self.ledger.asset().clone())
    }
}
