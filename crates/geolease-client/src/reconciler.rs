use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use geolease_ledger::{EventBatch, EventCursor, LedgerEvent, RentalSnapshot, RentalStatus, Settlement};
use geolease_types::{AccountId, Amount, GeoZone, Position};

use crate::config::LoopConfig;
use crate::error::{ClientError, ClientResult};
use crate::reconcile::{reconcile, LocalState, PauseReason};
use crate::tx::{CallKind, LedgerCall, Submission, TxEffect, TxFailure, TxId, TxOutcome, TxReceipt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    /// Connected, no rental of ours on the ledger.
    Idle,
    /// Connected with a rental of ours on the ledger.
    Active,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Idle => "idle",
            Self::Active => "active",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    Zone,
    User,
}

/// Bookkeeping for a submitted call awaiting its outcome.
#[derive(Clone, Debug)]
struct InFlight {
    kind: CallKind,
    origin: Origin,
    prior_paused: bool,
    prior_forced: Option<PauseReason>,
}

/// Everything one tick consumes: the position reading, if any, and the
/// outcomes of calls that settled since the previous tick.
#[derive(Clone, Debug, Default)]
pub struct TickInput {
    pub position: Option<Position>,
    pub settled: Vec<(TxId, TxOutcome)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub position: Option<Position>,
    pub inside_zone: Option<bool>,
    /// Membership of the informational restricted zone.
    pub inside_restricted: Option<bool>,
    /// Calls issued during this tick; the caller must hand them to a transport.
    pub submissions: Vec<Submission>,
    pub connection: ConnectionState,
    pub local: LocalState,
}

/// Client-side reconciliation state machine.
///
/// Never talks to a ledger itself: it turns position readings, polls and
/// call outcomes into state changes and new [`Submission`]s.
#[derive(Debug)]
pub struct Reconciler {
    config: LoopConfig,
    account: Option<AccountId>,
    zone: Option<GeoZone>,
    connection: ConnectionState,
    local: LocalState,
    booked_secs: Option<u64>,
    in_flight: BTreeMap<TxId, InFlight>,
    cursor: EventCursor,
    /// Highest log head among applied receipts. Polls and events below it
    /// predate state we already hold.
    confirmed_head: EventCursor,
    ticks: u64,
    status_line: String,
    last_settlement: Option<Settlement>,
}

impl Reconciler {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            account: None,
            zone: None,
            connection: ConnectionState::Disconnected,
            local: LocalState::default(),
            booked_secs: None,
            in_flight: BTreeMap::new(),
            cursor: EventCursor::default(),
            confirmed_head: EventCursor::default(),
            ticks: 0,
            status_line: "disconnected".into(),
            last_settlement: None,
        }
    }

    pub fn connect(&mut self, account: AccountId, zone: GeoZone) {
        if self.account.as_ref().is_some_and(|a| *a != account) {
            self.disconnect();
        }
        info!(account = %account.short_id(), radius_m = zone.radius_m, "connected");
        self.status_line = format!("connected as {}", account.short_id());
        self.account = Some(account);
        self.zone = Some(zone);
        if self.connection == ConnectionState::Disconnected {
            self.connection = ConnectionState::Idle;
        }
    }

    pub fn disconnect(&mut self) {
        self.account = None;
        self.zone = None;
        self.connection = ConnectionState::Disconnected;
        self.local = LocalState::default();
        self.booked_secs = None;
        self.in_flight.clear();
        self.cursor = EventCursor::default();
        self.confirmed_head = EventCursor::default();
        self.status_line = "disconnected".into();
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn account(&self) -> Option<&AccountId> {
        self.account.as_ref()
    }

    pub fn zone(&self) -> Option<&GeoZone> {
        self.zone.as_ref()
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn local(&self) -> &LocalState {
        &self.local
    }

    pub fn cursor(&self) -> EventCursor {
        self.cursor
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    pub fn last_settlement(&self) -> Option<&Settlement> {
        self.last_settlement.as_ref()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// One-line view of the current state for display.
    pub fn summary(&self) -> String {
        let status = self
            .local
            .last_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".into());
        let mut line = format!(
            "[{}] {} | used {}s",
            self.connection, status, self.local.timer_seconds
        );
        if self.local.forced_pause.is_some() {
            line.push_str(" | paused: outside zone");
        }
        if self.local.pending_pause {
            line.push_str(" | pause pending");
        }
        if self.local.pending_resume {
            line.push_str(" | resume pending");
        }
        line
    }

    fn require_account(&self) -> ClientResult<AccountId> {
        self.account
            .clone()
            .ok_or_else(|| ClientError::InvalidState("not connected".into()))
    }

    fn require_active(&self) -> ClientResult<AccountId> {
        let account = self.require_account()?;
        if self.connection != ConnectionState::Active {
            return Err(ClientError::InvalidState("no active rental".into()));
        }
        Ok(account)
    }

    fn has_in_flight(&self, kind: CallKind) -> bool {
        self.in_flight.values().any(|f| f.kind == kind)
    }

    fn submit(&mut self, from: AccountId, call: LedgerCall, origin: Origin) -> Submission {
        let submission = Submission::new(from, call);
        info!(
            tx = %submission.id.short_id(),
            kind = %submission.kind(),
            "submitting ledger call"
        );
        self.in_flight.insert(
            submission.id,
            InFlight {
                kind: submission.kind(),
                origin,
                prior_paused: self.local.is_paused,
                prior_forced: self.local.forced_pause,
            },
        );
        submission
    }

    pub fn start_rental(
        &mut self,
        duration_secs: u64,
        deposit: Amount,
        position: Position,
    ) -> ClientResult<Submission> {
        let account = self.require_account()?;
        if self.connection == ConnectionState::Active {
            return Err(ClientError::InvalidState("a rental is already active".into()));
        }
        if self.has_in_flight(CallKind::Rent) {
            return Err(ClientError::InvalidState("rent already submitted".into()));
        }
        let call = LedgerCall::Rent {
            duration_secs,
            deposit,
            position,
        };
        self.status_line = "rent submitted".into();
        Ok(self.submit(account, call, Origin::User))
    }

    pub fn return_equipment(&mut self) -> ClientResult<Submission> {
        let account = self.require_active()?;
        if self.has_in_flight(CallKind::Return) {
            return Err(ClientError::InvalidState("return already submitted".into()));
        }
        self.status_line = "return submitted".into();
        Ok(self.submit(account, LedgerCall::Return, Origin::User))
    }

    /// Sweep the held balance to the asset owner. Only the owner's account
    /// gets past the ledger's guard.
    pub fn emergency_withdraw(&mut self) -> ClientResult<Submission> {
        let account = self.require_account()?;
        if self.has_in_flight(CallKind::EmergencyWithdraw) {
            return Err(ClientError::InvalidState("withdraw already submitted".into()));
        }
        self.status_line = "withdraw submitted".into();
        Ok(self.submit(account, LedgerCall::EmergencyWithdraw, Origin::User))
    }

    /// Manual pause. `None` if a pause is already in flight.
    pub fn request_pause(&mut self) -> ClientResult<Option<Submission>> {
        let account = self.require_active()?;
        if self.local.pending_pause {
            return Ok(None);
        }
        if self.local.is_paused {
            return Err(ClientError::InvalidState("already paused".into()));
        }
        let submission = self.submit(account, LedgerCall::Pause, Origin::User);
        self.local.is_paused = true;
        self.local.pending_pause = true;
        Ok(Some(submission))
    }

    /// Manual resume. `None` if a resume is already in flight.
    pub fn request_resume(&mut self) -> ClientResult<Option<Submission>> {
        let account = self.require_active()?;
        if self.local.pending_resume {
            return Ok(None);
        }
        if !self.local.is_paused {
            return Err(ClientError::InvalidState("not paused".into()));
        }
        let submission = self.submit(account, LedgerCall::Resume, Origin::User);
        self.local.is_paused = false;
        self.local.pending_resume = true;
        Ok(Some(submission))
    }

    /// Run one loop iteration.
    pub fn tick(&mut self, input: TickInput) -> TickReport {
        for (id, outcome) in input.settled {
            self.on_tx_settled(id, outcome);
        }
        self.ticks += 1;

        let (inside_zone, inside_restricted) = match (input.position, self.zone) {
            (Some(p), Some(zone)) => (Some(zone.contains(&p)), Some(zone.restricted().contains(&p))),
            _ => (None, None),
        };
        if inside_restricted == Some(true) {
            debug!(tick = self.ticks, "inside restricted zone");
        }

        let submissions = match input.position {
            Some(position) => self.on_position(position),
            None => Vec::new(),
        };

        TickReport {
            tick: self.ticks,
            position: input.position,
            inside_zone,
            inside_restricted,
            submissions,
            connection: self.connection,
            local: self.local.clone(),
        }
    }

    /// Zone check and local timer for one position reading.
    pub fn on_position(&mut self, position: Position) -> Vec<Submission> {
        let mut submissions = Vec::new();
        if self.connection != ConnectionState::Active {
            return submissions;
        }
        let (Some(zone), Some(account)) = (self.zone, self.account.clone()) else {
            return submissions;
        };

        let inside = zone.contains(&position);
        if !inside
            && self.local.is_running()
            && self.local.forced_pause.is_none()
            && !self.local.pending_pause
        {
            warn!(
                %position,
                distance_m = zone.distance_m(&position),
                "equipment left the allowed zone, pausing rental"
            );
            submissions.push(self.submit(account, LedgerCall::Pause, Origin::Zone));
            self.local.forced_pause = Some(PauseReason::Zone);
            self.local.is_paused = true;
            self.local.pending_pause = true;
            self.status_line = "outside allowed zone: pausing rental".into();
        } else if inside
            && self.local.forced_pause == Some(PauseReason::Zone)
            && self.local.last_status == Some(RentalStatus::Paused)
            && !self.local.pending_resume
        {
            info!(%position, "equipment back inside the allowed zone, resuming rental");
            submissions.push(self.submit(account, LedgerCall::Resume, Origin::Zone));
            self.local.pending_resume = true;
            self.status_line = "back inside allowed zone: resuming rental".into();
        }

        let booked = self.booked_secs.unwrap_or(self.config.rental_duration_secs);
        if self.local.last_status == Some(RentalStatus::Active) && !self.local.is_paused {
            self.local.timer_seconds = self
                .local
                .timer_seconds
                .saturating_add(self.config.tick_secs)
                .min(booked);
        }
        if self.local.is_active && self.local.timer_seconds >= booked {
            self.local.is_active = false;
            info!(booked_secs = booked, "booked rental time used up");
            self.status_line = "rental time used up: return the equipment".into();
        }

        submissions
    }

    /// Apply the outcome of a call. Outcomes of unknown calls are ignored.
    pub fn on_tx_settled(&mut self, id: TxId, outcome: TxOutcome) {
        if !outcome.is_settled() {
            return;
        }
        let Some(flight) = self.in_flight.remove(&id) else {
            debug!(tx = %id.short_id(), "ignoring outcome of unknown call");
            return;
        };
        match outcome {
            TxOutcome::Pending => {}
            TxOutcome::Confirmed(receipt) => self.apply_confirmed(flight, receipt),
            TxOutcome::Failed(failure) => self.apply_failed(id, flight, failure),
        }
    }

    fn apply_confirmed(&mut self, flight: InFlight, receipt: TxReceipt) {
        info!(
            tx = %receipt.id.short_id(),
            kind = %receipt.kind,
            status = %receipt.status_after,
            "ledger call confirmed"
        );
        let status = receipt.status_after;
        self.confirmed_head = self.confirmed_head.max(receipt.head);
        match (flight.kind, receipt.effect) {
            (CallKind::Rent, TxEffect::Rental(rental)) => {
                let booked = rental.max_duration();
                self.booked_secs = Some(booked);
                self.connection = ConnectionState::Active;
                self.local = LocalState {
                    is_active: true,
                    last_status: Some(status),
                    ..LocalState::default()
                };
                self.last_settlement = None;
                self.status_line = format!("rental started, {booked}s booked");
            }
            (CallKind::Pause, _) => {
                self.local.pending_pause = false;
                self.local.is_paused = true;
                self.local.last_status = Some(status);
                if flight.origin == Origin::Zone {
                    self.local.forced_pause = Some(PauseReason::Zone);
                    self.status_line = "rental paused: outside allowed zone".into();
                } else {
                    self.status_line = "rental paused".into();
                }
            }
            (CallKind::Resume, _) => {
                self.local.pending_resume = false;
                self.local.is_paused = false;
                self.local.forced_pause = None;
                self.local.last_status = Some(status);
                self.status_line = "rental resumed".into();
            }
            (CallKind::Return, TxEffect::Settlement(settlement)) => {
                self.status_line = format!(
                    "returned after {}s: paid {}, refunded {}",
                    settlement.used_seconds, settlement.amount_due, settlement.refund
                );
                self.last_settlement = Some(settlement);
                self.end_rental(status);
            }
            (CallKind::EmergencyWithdraw, TxEffect::Withdrawn(amount)) => {
                self.status_line = format!("withdrew {amount}");
            }
            (kind, effect) => {
                warn!(%kind, ?effect, "receipt effect does not match call");
            }
        }
    }

    fn apply_failed(&mut self, id: TxId, flight: InFlight, failure: TxFailure) {
        warn!(tx = %id.short_id(), kind = %flight.kind, %failure, "ledger call failed");
        match flight.kind {
            CallKind::Pause => {
                self.local.pending_pause = false;
                self.local.is_paused = flight.prior_paused;
                self.local.forced_pause = flight.prior_forced;
            }
            CallKind::Resume => {
                self.local.pending_resume = false;
                if flight.origin == Origin::User {
                    self.local.is_paused = flight.prior_paused;
                }
            }
            CallKind::Rent | CallKind::Return | CallKind::EmergencyWithdraw => {}
        }
        self.status_line = format!("{} failed: {failure}", flight.kind);
    }

    fn end_rental(&mut self, status: RentalStatus) {
        self.connection = ConnectionState::Idle;
        self.booked_secs = None;
        self.local = LocalState {
            last_status: Some(status),
            ..LocalState::default()
        };
    }

    /// Apply a status poll. The snapshot wins over anything cached locally,
    /// unless it was taken before a receipt we already applied.
    pub fn on_status(&mut self, snapshot: &RentalSnapshot) {
        if self.connection == ConnectionState::Disconnected {
            return;
        }
        if snapshot.head < self.confirmed_head {
            debug!(
                head = snapshot.head.0,
                confirmed = self.confirmed_head.0,
                "ignoring stale snapshot"
            );
            return;
        }
        let status = snapshot.status;
        let ours = self.account.is_some() && snapshot.renter == self.account;

        if status.has_rental() && !ours {
            if self.connection == ConnectionState::Active {
                warn!("rental is held by another account");
            }
            let holder = snapshot
                .renter
                .as_ref()
                .map(|r| r.short_id())
                .unwrap_or_else(|| "unknown".into());
            self.status_line = format!("asset rented by {holder}");
            self.end_rental(status);
            return;
        }

        self.local = reconcile(&self.local, snapshot);
        if status.has_rental() {
            if self.connection != ConnectionState::Active {
                info!(%status, "rental found on ledger");
            }
            self.connection = ConnectionState::Active;
            if let (Some(start), Some(end)) = (snapshot.start_time, snapshot.end_time) {
                self.booked_secs = Some(end.saturating_secs_since(start));
            }
        } else {
            if self.connection == ConnectionState::Active {
                info!("ledger reports no active rental");
            }
            self.connection = ConnectionState::Idle;
            self.booked_secs = None;
        }
    }

    /// Consume an event batch and advance the cursor.
    pub fn on_events(&mut self, batch: &EventBatch) {
        for record in &batch.records {
            let mine = self.account.is_some() && record.event.renter() == self.account.as_ref();
            if !mine || record.seq <= self.confirmed_head.0 {
                continue;
            }
            debug!(seq = record.seq, event = %record.event, "ledger event");
            match &record.event {
                LedgerEvent::RentalStarted { duration_secs, .. } => {
                    if self.connection == ConnectionState::Idle {
                        self.connection = ConnectionState::Active;
                        self.booked_secs = Some(*duration_secs);
                        self.local.is_active = true;
                        self.local.last_status = Some(RentalStatus::Active);
                    }
                }
                LedgerEvent::RentalPaused { .. } => {
                    if !self.local.pending_resume {
                        self.local.is_paused = true;
                        self.local.last_status = Some(RentalStatus::Paused);
                    }
                }
                LedgerEvent::RentalResumed { .. } => {
                    if !self.local.pending_pause {
                        self.local.is_paused = false;
                        self.local.forced_pause = None;
                        self.local.last_status = Some(RentalStatus::Active);
                    }
                }
                LedgerEvent::RentalEnded {
                    renter,
                    used_seconds,
                    amount_paid,
                    refund,
                } => {
                    self.last_settlement = Some(Settlement {
                        renter: renter.clone(),
                        used_seconds: *used_seconds,
                        amount_due: *amount_paid,
                        refund: *refund,
                        deposit: amount_paid.checked_add(*refund).unwrap_or(*amount_paid),
                    });
                    self.end_rental(RentalStatus::Available);
                }
                LedgerEvent::EmergencyWithdraw { .. } => {}
            }
        }
        self.cursor = self.cursor.max(batch.next);
    }

    /// Apply one poll round: events first, then the snapshot, so the
    /// snapshot has the final word.
    pub fn on_poll(&mut self, snapshot: &RentalSnapshot, batch: &EventBatch) {
        self.on_events(batch);
        self.on_status(snapshot);
    }
}
