use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use geolease_ledger::{EventBatch, EventCursor, RentalSnapshot};
use geolease_types::{AccountId, Amount, Position};

use crate::config::LoopConfig;
use crate::error::{ClientError, ClientResult};
use crate::position::PositionSource;
use crate::reconciler::{Reconciler, TickInput};
use crate::transport::LedgerTransport;
use crate::tx::{Submission, TxFailure, TxId, TxOutcome};

enum Completion {
    Tx(TxId, TxOutcome),
    Poll(ClientResult<(RentalSnapshot, EventBatch)>),
}

/// Result of a finished run.
#[derive(Debug)]
pub struct RunSummary {
    pub ticks: u64,
    pub submissions: Vec<Submission>,
    pub reconciler: Reconciler,
}

/// Drives a [`Reconciler`] against a live transport.
///
/// Position ticks, status polls and call completions are multiplexed on one
/// task; outcomes that arrive between ticks are fed to the next tick.
pub struct Runner<T, P> {
    transport: Arc<T>,
    reconciler: Reconciler,
    positions: P,
    queued: Vec<Submission>,
    max_ticks: Option<u64>,
}

impl<T, P> Runner<T, P>
where
    T: LedgerTransport + 'static,
    P: PositionSource,
{
    pub fn new(transport: Arc<T>, reconciler: Reconciler, positions: P) -> Self {
        Self {
            transport,
            reconciler,
            positions,
            queued: Vec::new(),
            max_ticks: None,
        }
    }

    /// Fetch the asset, connect as `account`, and apply an initial poll.
    pub async fn connect(
        transport: Arc<T>,
        config: LoopConfig,
        account: AccountId,
        positions: P,
    ) -> ClientResult<Self> {
        config.validate()?;
        let asset = transport.fetch_asset().await?;
        let limit = config.event_batch_limit;

        let mut reconciler = Reconciler::new(config);
        reconciler.connect(account, asset.zone);
        let (snapshot, batch) = poll_once(transport.as_ref(), reconciler.cursor(), limit).await?;
        reconciler.on_poll(&snapshot, &batch);

        Ok(Self::new(transport, reconciler, positions))
    }

    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Submit a rent as soon as the loop starts.
    pub fn start_rental(
        &mut self,
        duration_secs: u64,
        deposit: Amount,
        position: Position,
    ) -> ClientResult<TxId> {
        let submission = self
            .reconciler
            .start_rental(duration_secs, deposit, position)?;
        let id = submission.id;
        self.queued.push(submission);
        Ok(id)
    }

    /// Run until `shutdown` flips to `true`, its sender is dropped, or the
    /// tick limit is reached. Calls still in flight are left to finish on
    /// their own.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ClientResult<RunSummary> {
        let config = self.reconciler.config().clone();
        config.validate()?;

        let mut tasks: JoinSet<Completion> = JoinSet::new();
        let mut submissions = Vec::new();
        for submission in std::mem::take(&mut self.queued) {
            spawn_submission(&mut tasks, &self.transport, submission.clone());
            submissions.push(submission);
        }

        let mut position_timer = interval(config.tick_interval());
        position_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll_timer = interval(config.poll_interval());
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut settled = Vec::new();
        let mut poll_in_flight = false;
        let mut ticks = 0u64;

        info!(
            tick_ms = config.tick_interval_ms,
            poll_every = config.poll_every_ticks,
            "reconciliation loop started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("shutdown requested");
                        break;
                    }
                }
                _ = position_timer.tick() => {
                    let position = self.positions.next_position();
                    let report = self.reconciler.tick(TickInput {
                        position: Some(position),
                        settled: std::mem::take(&mut settled),
                    });
                    for submission in report.submissions {
                        spawn_submission(&mut tasks, &self.transport, submission.clone());
                        submissions.push(submission);
                    }
                    ticks += 1;
                    if self.max_ticks.is_some_and(|max| ticks >= max) {
                        break;
                    }
                }
                _ = poll_timer.tick(), if !poll_in_flight => {
                    poll_in_flight = true;
                    spawn_poll(
                        &mut tasks,
                        &self.transport,
                        self.reconciler.cursor(),
                        config.event_batch_limit,
                    );
                }
                Some(joined) = tasks.join_next() => match joined {
                    Ok(Completion::Tx(id, outcome)) => settled.push((id, outcome)),
                    Ok(Completion::Poll(Ok((snapshot, batch)))) => {
                        poll_in_flight = false;
                        self.reconciler.on_poll(&snapshot, &batch);
                    }
                    Ok(Completion::Poll(Err(error))) => {
                        poll_in_flight = false;
                        warn!(%error, "status poll failed");
                    }
                    Err(error) => warn!(%error, "loop task did not complete"),
                },
            }
        }

        for (id, outcome) in settled {
            self.reconciler.on_tx_settled(id, outcome);
        }
        tasks.detach_all();
        info!(ticks, submitted = submissions.len(), "reconciliation loop stopped");

        Ok(RunSummary {
            ticks,
            submissions,
            reconciler: self.reconciler,
        })
    }
}

fn spawn_submission<T>(tasks: &mut JoinSet<Completion>, transport: &Arc<T>, submission: Submission)
where
    T: LedgerTransport + 'static,
{
    let transport = Arc::clone(transport);
    let id = submission.id;
    tasks.spawn(async move {
        // inner task, so a panicking transport still settles the call
        let submitted = tokio::spawn(async move { transport.submit(&submission).await }).await;
        let outcome = match submitted {
            Ok(Ok(receipt)) => TxOutcome::Confirmed(receipt),
            Ok(Err(e)) => TxOutcome::Failed(e.into()),
            Err(e) => TxOutcome::Failed(TxFailure::Transport(format!("submission task failed: {e}"))),
        };
        Completion::Tx(id, outcome)
    });
}

fn spawn_poll<T>(tasks: &mut JoinSet<Completion>, transport: &Arc<T>, cursor: EventCursor, limit: usize)
where
    T: LedgerTransport + 'static,
{
    let transport = Arc::clone(transport);
    tasks.spawn(async move {
        let polled = tokio::spawn(async move { poll_once(transport.as_ref(), cursor, limit).await })
            .await
            .unwrap_or_else(|e| Err(ClientError::Transport(format!("poll task failed: {e}"))));
        Completion::Poll(polled)
    });
}

async fn poll_once<T>(
    transport: &T,
    cursor: EventCursor,
    limit: usize,
) -> ClientResult<(RentalSnapshot, EventBatch)>
where
    T: LedgerTransport + ?Sized,
{
    let batch = transport.fetch_events(cursor, limit).await?;
    let snapshot = transport.fetch_snapshot().await?;
    Ok((snapshot, batch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::position::Waypoints;
    use crate::reconciler::ConnectionState;
    use crate::transport::LocalTransport;
    use crate::tx::LedgerCall;
    use crate::tx::TxReceipt;
    use geolease_ledger::{AssetConfig, InMemoryLedger, LedgerReader, LedgerWriter, RentalStatus};

    /// Snapshots are read on request but delivered `delay` later, so they
    /// can land after receipts of calls that were submitted meanwhile.
    struct SlowSnapshots {
        inner: LocalTransport<InMemoryLedger>,
        delay: Duration,
    }

    #[async_trait]
    impl LedgerTransport for SlowSnapshots {
        async fn submit(&self, submission: &Submission) -> ClientResult<TxReceipt> {
            self.inner.submit(submission).await
        }

        async fn fetch_snapshot(&self) -> ClientResult<RentalSnapshot> {
            let snapshot = self.inner.fetch_snapshot().await?;
            tokio::time::sleep(self.delay).await;
            Ok(snapshot)
        }

        async fn fetch_events(&self, cursor: EventCursor, limit: usize) -> ClientResult<EventBatch> {
            self.inner.fetch_events(cursor, limit).await
        }

        async fn fetch_asset(&self) -> ClientResult<AssetConfig> {
            self.inner.fetch_asset().await
        }
    }

    /// Panics on the first submission, then behaves.
    struct PanicOnce {
        inner: LocalTransport<InMemoryLedger>,
        panicked: AtomicBool,
    }

    #[async_trait]
    impl LedgerTransport for PanicOnce {
        async fn submit(&self, submission: &Submission) -> ClientResult<TxReceipt> {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("transport crashed");
            }
            self.inner.submit(submission).await
        }

        async fn fetch_snapshot(&self) -> ClientResult<RentalSnapshot> {
            self.inner.fetch_snapshot().await
        }

        async fn fetch_events(&self, cursor: EventCursor, limit: usize) -> ClientResult<EventBatch> {
            self.inner.fetch_events(cursor, limit).await
        }

        async fn fetch_asset(&self) -> ClientResult<AssetConfig> {
            self.inner.fetch_asset().await
        }
    }

    fn count(summary: &RunSummary, call: LedgerCall) -> usize {
        summary.submissions.iter().filter(|s| s.call == call).count()
    }

    fn fast_config() -> LoopConfig {
        LoopConfig {
            tick_interval_ms: 10,
            poll_every_ticks: 3,
            ..LoopConfig::default()
        }
    }

    fn renter() -> AccountId {
        AccountId::from_label("renter")
    }

    #[tokio::test]
    async fn runner_pauses_when_leaving_zone() {
        let ledger = Arc::new(InMemoryLedger::new(AssetConfig::default()));
        let zone = ledger.asset().zone;
        let transport = Arc::new(LocalTransport::new(Arc::clone(&ledger)));
        let route = Waypoints::excursion(&zone, 5, 1_000, 100);

        let mut runner = Runner::connect(transport, fast_config(), renter(), route)
            .await
            .unwrap()
            .with_max_ticks(30);
        runner
            .start_rental(3_600, Amount::parse("0.05").unwrap(), zone.center)
            .unwrap();

        let (_tx, rx) = watch::channel(false);
        let summary = runner.run(rx).await.unwrap();

        assert_eq!(summary.ticks, 30);
        assert_eq!(ledger.status().unwrap(), RentalStatus::Paused);
        assert!(summary
            .submissions
            .iter()
            .any(|s| s.call == LedgerCall::Pause));
        assert_eq!(summary.reconciler.connection(), ConnectionState::Active);
    }

    #[tokio::test]
    async fn runner_stops_on_shutdown() {
        let ledger = Arc::new(InMemoryLedger::new(AssetConfig::default()));
        let center = ledger.asset().zone.center;
        let transport = Arc::new(LocalTransport::new(ledger));
        let runner = Runner::connect(
            transport,
            fast_config(),
            renter(),
            Waypoints::new(vec![center]),
        )
        .await
        .unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(runner.run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(summary.ticks >= 1);
        assert_eq!(summary.reconciler.connection(), ConnectionState::Idle);
        assert!(summary.submissions.is_empty());
    }

    #[tokio::test]
    async fn connect_discovers_existing_rental() {
        let ledger = Arc::new(InMemoryLedger::new(AssetConfig::default()));
        let center = ledger.asset().zone.center;
        ledger
            .rent(&renter(), Amount::parse("0.05").unwrap(), 600, center)
            .unwrap();
        let transport = Arc::new(LocalTransport::new(ledger));

        let runner = Runner::connect(
            transport,
            fast_config(),
            renter(),
            Waypoints::new(vec![center]),
        )
        .await
        .unwrap();
        assert_eq!(runner.reconciler().connection(), ConnectionState::Active);
        assert_eq!(runner.reconciler().cursor(), EventCursor(1));
    }

    #[tokio::test]
    async fn transport_failure_is_rolled_back() {
        let ledger = Arc::new(InMemoryLedger::new(AssetConfig::default()));
        let zone = ledger.asset().zone;
        ledger
            .rent(&renter(), Amount::parse("0.05").unwrap(), 3_600, zone.center)
            .unwrap();
        let transport = Arc::new(LocalTransport::new(Arc::clone(&ledger)));
        transport.fail_next(1);

        let runner = Runner::connect(
            Arc::clone(&transport),
            fast_config(),
            renter(),
            Waypoints::excursion(&zone, 0, 1_000, 100),
        )
        .await
        .unwrap()
        .with_max_ticks(20);

        let (_tx, rx) = watch::channel(false);
        let summary = runner.run(rx).await.unwrap();

        let pauses = summary
            .submissions
            .iter()
            .filter(|s| s.call == LedgerCall::Pause)
            .count();
        assert!(pauses >= 2, "first pause dropped, second retried");
        assert_eq!(ledger.status().unwrap(), RentalStatus::Paused);
    }

    #[tokio::test]
    async fn late_snapshots_do_not_repeat_zone_pause() {
        let ledger = Arc::new(InMemoryLedger::new(AssetConfig::default()));
        let zone = ledger.asset().zone;
        ledger
            .rent(&renter(), Amount::parse("0.05").unwrap(), 3_600, zone.center)
            .unwrap();
        let transport = Arc::new(SlowSnapshots {
            inner: LocalTransport::new(Arc::clone(&ledger)),
            delay: Duration::from_millis(25),
        });
        let config = LoopConfig {
            tick_interval_ms: 10,
            poll_every_ticks: 1,
            ..LoopConfig::default()
        };

        let runner = Runner::connect(
            transport,
            config,
            renter(),
            Waypoints::excursion(&zone, 0, 12, 100),
        )
        .await
        .unwrap()
        .with_max_ticks(40);

        let (_tx, rx) = watch::channel(false);
        let summary = runner.run(rx).await.unwrap();

        assert_eq!(count(&summary, LedgerCall::Pause), 1);
        assert_eq!(count(&summary, LedgerCall::Resume), 1);
        assert_eq!(ledger.status().unwrap(), RentalStatus::Active);
        assert_eq!(summary.reconciler.local().forced_pause, None);
    }

    #[tokio::test]
    async fn panicked_submission_is_retried() {
        let ledger = Arc::new(InMemoryLedger::new(AssetConfig::default()));
        let zone = ledger.asset().zone;
        ledger
            .rent(&renter(), Amount::parse("0.05").unwrap(), 3_600, zone.center)
            .unwrap();
        let transport = Arc::new(PanicOnce {
            inner: LocalTransport::new(Arc::clone(&ledger)),
            panicked: AtomicBool::new(false),
        });

        let runner = Runner::connect(
            transport,
            fast_config(),
            renter(),
            Waypoints::excursion(&zone, 0, 1_000, 100),
        )
        .await
        .unwrap()
        .with_max_ticks(20);

        let (_tx, rx) = watch::channel(false);
        let summary = runner.run(rx).await.unwrap();

        assert_eq!(count(&summary, LedgerCall::Pause), 2);
        assert_eq!(ledger.status().unwrap(), RentalStatus::Paused);
        assert!(!summary.reconciler.local().pending_pause);
    }
}
