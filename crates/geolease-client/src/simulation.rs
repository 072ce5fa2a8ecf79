use std::sync::Arc;

use tracing::debug;

use geolease_ledger::{AssetConfig, InMemoryLedger, LedgerReader};
use geolease_types::{AccountId, Amount, ManualClock, Position, Timestamp};

use crate::config::LoopConfig;
use crate::error::ClientResult;
use crate::position::PositionSource;
use crate::reconciler::{Reconciler, TickInput, TickReport};
use crate::tx::{execute, Submission, TxFailure, TxId, TxOutcome};

/// Ledger time at which every simulation starts.
pub const SIMULATION_EPOCH: Timestamp = Timestamp::from_secs(1_700_000_000);

struct Scheduled {
    submission: Submission,
    resolves_at: u64,
    fail: bool,
}

/// Deterministic single-threaded run of the reconciliation loop against an
/// in-memory ledger.
///
/// Each step advances the ledger clock by `tick_secs`, resolves calls whose
/// confirmation is due, feeds one position reading to the reconciler, and
/// polls every `poll_every_ticks` steps.
pub struct Simulation<P> {
    ledger: Arc<InMemoryLedger<ManualClock>>,
    clock: ManualClock,
    reconciler: Reconciler,
    positions: P,
    latency_ticks: u64,
    fail_next: u32,
    queue: Vec<Scheduled>,
    history: Vec<Submission>,
    tick: u64,
    last_position: Position,
}

impl<P: PositionSource> Simulation<P> {
    pub fn new(
        asset: AssetConfig,
        config: LoopConfig,
        account: AccountId,
        positions: P,
    ) -> ClientResult<Self> {
        config.validate()?;
        let clock = ManualClock::starting_at(SIMULATION_EPOCH);
        let zone = asset.zone;
        let ledger = Arc::new(InMemoryLedger::with_clock(asset, clock.clone()));

        let mut reconciler = Reconciler::new(config);
        reconciler.connect(account, zone);

        Ok(Self {
            ledger,
            clock,
            reconciler,
            positions,
            latency_ticks: 1,
            fail_next: 0,
            queue: Vec::new(),
            history: Vec::new(),
            tick: 0,
            last_position: zone.center,
        })
    }

    /// Calls resolve this many steps after submission (at least one).
    pub fn with_latency(mut self, ticks: u64) -> Self {
        self.latency_ticks = ticks.max(1);
        self
    }

    pub fn ledger(&self) -> &Arc<InMemoryLedger<ManualClock>> {
        &self.ledger
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Every call submitted so far, in submission order.
    pub fn submissions(&self) -> &[Submission] {
        &self.history
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Fail the next `count` submissions without applying them.
    pub fn fail_next(&mut self, count: u32) {
        self.fail_next = count;
    }

    /// Rent at the most recent position reading.
    pub fn start_rental(&mut self, duration_secs: u64, deposit: Amount) -> ClientResult<TxId> {
        let submission = self
            .reconciler
            .start_rental(duration_secs, deposit, self.last_position)?;
        Ok(self.enqueue(submission))
    }

    pub fn return_equipment(&mut self) -> ClientResult<TxId> {
        let submission = self.reconciler.return_equipment()?;
        Ok(self.enqueue(submission))
    }

    pub fn request_pause(&mut self) -> ClientResult<Option<TxId>> {
        Ok(self.reconciler.request_pause()?.map(|s| self.enqueue(s)))
    }

    pub fn request_resume(&mut self) -> ClientResult<Option<TxId>> {
        Ok(self.reconciler.request_resume()?.map(|s| self.enqueue(s)))
    }

    /// Sweep the held balance as the asset owner, through a reconciler of
    /// the owner's own. Resolves immediately; returns the owner's status line.
    pub fn emergency_withdraw(&self) -> ClientResult<String> {
        let asset = self.ledger.asset();
        let mut owner = Reconciler::new(self.reconciler.config().clone());
        owner.connect(asset.owner.clone(), asset.zone);

        let submission = owner.emergency_withdraw()?;
        let outcome = match execute(self.ledger.as_ref(), &submission) {
            Ok(receipt) => TxOutcome::Confirmed(receipt),
            Err(e) => TxOutcome::Failed(TxFailure::Rejected(e)),
        };
        owner.on_tx_settled(submission.id, outcome);
        Ok(owner.status_line().to_string())
    }

    fn enqueue(&mut self, submission: Submission) -> TxId {
        let id = submission.id;
        let fail = self.fail_next > 0;
        if fail {
            self.fail_next -= 1;
        }
        let resolves_at = self.tick + self.latency_ticks;
        debug!(tx = %id.short_id(), kind = %submission.kind(), resolves_at, fail, "queued");
        self.history.push(submission.clone());
        self.queue.push(Scheduled {
            submission,
            resolves_at,
            fail,
        });
        id
    }

    fn resolve(&self, scheduled: &Scheduled) -> TxOutcome {
        if scheduled.fail {
            return TxOutcome::Failed(TxFailure::Transport("injected failure".into()));
        }
        match execute(self.ledger.as_ref(), &scheduled.submission) {
            Ok(receipt) => TxOutcome::Confirmed(receipt),
            Err(e) => TxOutcome::Failed(TxFailure::Rejected(e)),
        }
    }

    pub fn step(&mut self) -> ClientResult<TickReport> {
        self.tick += 1;
        self.clock.advance(self.reconciler.config().tick_secs);

        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.queue)
            .into_iter()
            .partition(|s| s.resolves_at <= self.tick);
        self.queue = waiting;
        let settled = due
            .iter()
            .map(|s| (s.submission.id, self.resolve(s)))
            .collect();

        let position = self.positions.next_position();
        self.last_position = position;
        let mut report = self.reconciler.tick(TickInput {
            position: Some(position),
            settled,
        });
        for submission in report.submissions.clone() {
            self.enqueue(submission);
        }

        if self.tick % self.reconciler.config().poll_every_ticks == 0 {
            self.poll()?;
            report.connection = self.reconciler.connection();
            report.local = self.reconciler.local().clone();
        }
        Ok(report)
    }

    /// Poll the ledger now: events since the cursor, then a snapshot.
    pub fn poll(&mut self) -> ClientResult<()> {
        let limit = self.reconciler.config().event_batch_limit;
        let batch = self.ledger.events_since(self.reconciler.cursor(), limit)?;
        let snapshot = self.ledger.snapshot()?;
        self.reconciler.on_poll(&snapshot, &batch);
        Ok(())
    }

    pub fn run(&mut self, ticks: u64) -> ClientResult<Vec<TickReport>> {
        (0..ticks).map(|_| self.step()).collect()
    }

    /// Step until no call is left unresolved, at most `max_ticks` times.
    pub fn settle(&mut self, max_ticks: u64) -> ClientResult<Vec<TickReport>> {
        let mut reports = Vec::new();
        while self.pending() > 0 && (reports.len() as u64) < max_ticks {
            reports.push(self.step()?);
        }
        Ok(reports)
    }
}
