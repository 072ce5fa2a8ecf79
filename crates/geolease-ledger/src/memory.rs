use std::sync::{RwLock, RwLockReadGuard};

use tracing::{debug, info};

use geolease_types::{AccountId, Amount, Clock, Position, SystemClock, Timestamp};

use crate::accounting::used_seconds;
use crate::config::AssetConfig;
use crate::error::LedgerError;
use crate::events::{EventBatch, EventCursor, EventLog, LedgerEvent};
use crate::projection::{derive_status, snapshot};
use crate::records::{Rental, RentalSnapshot, RentalStatus, Settlement};
use crate::state::{CallContext, LedgerState};
use crate::traits::{LedgerReader, LedgerWriter};

/// In-memory ledger for tests, simulations, and embedding.
///
/// All transitions run under one write lock against a staged copy of the
/// aggregate; the copy replaces the live state only if the whole transition
/// succeeds, so no partial update is ever observable.
pub struct InMemoryLedger<C: Clock = SystemClock> {
    asset: AssetConfig,
    clock: C,
    inner: RwLock<Inner>,
}

struct Inner {
    state: LedgerState,
    events: EventLog,
}

impl InMemoryLedger<SystemClock> {
    pub fn new(asset: AssetConfig) -> Self {
        Self::with_clock(asset, SystemClock)
    }
}

impl<C: Clock> InMemoryLedger<C> {
    pub fn with_clock(asset: AssetConfig, clock: C) -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: LedgerState::new(asset.clone()),
                events: EventLog::new(),
            }),
            asset,
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, LedgerError> {
        self.inner.read().map_err(|_| LedgerError::LockPoisoned)
    }

    /// Apply one transition. The clock is read after the write lock is
    /// taken, so committed transitions carry non-decreasing timestamps.
    fn transact<T>(
        &self,
        operation: &'static str,
        caller: &AccountId,
        value: Amount,
        apply: impl FnOnce(&mut LedgerState, &CallContext) -> Result<(T, LedgerEvent), LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut inner = self.inner.write().map_err(|_| LedgerError::LockPoisoned)?;
        let call = CallContext::new(caller.clone(), self.now()).with_value(value);

        let mut staged = inner.state.clone();
        match apply(&mut staged, &call) {
            Ok((output, event)) => {
                inner.state = staged;
                let record = inner.events.append(call.now, event);
                info!(
                    operation,
                    caller = %call.sender,
                    seq = record.seq,
                    event = %record.event,
                    at = %call.now,
                    "ledger transition applied"
                );
                Ok(output)
            }
            Err(error) => {
                debug!(operation, caller = %call.sender, %error, "ledger transition rejected");
                Err(error)
            }
        }
    }
}

impl<C: Clock> LedgerWriter for InMemoryLedger<C> {
    fn rent(
        &self,
        caller: &AccountId,
        deposit: Amount,
        duration_secs: u64,
        position: Position,
    ) -> Result<Rental, LedgerError> {
        self.transact("rent", caller, deposit, |state, call| {
            state.rent(call, duration_secs, position)
        })
    }

    fn pause_rental(&self, caller: &AccountId) -> Result<Rental, LedgerError> {
        self.transact("pause_rental", caller, Amount::ZERO, LedgerState::pause_rental)
    }

    fn resume_rental(&self, caller: &AccountId) -> Result<Rental, LedgerError> {
        self.transact("resume_rental", caller, Amount::ZERO, LedgerState::resume_rental)
    }

    fn return_equipment(&self, caller: &AccountId) -> Result<Settlement, LedgerError> {
        self.transact("return_equipment", caller, Amount::ZERO, LedgerState::return_equipment)
    }

    fn emergency_withdraw(&self, caller: &AccountId) -> Result<Amount, LedgerError> {
        self.transact("emergency_withdraw", caller, Amount::ZERO, LedgerState::emergency_withdraw)
    }
}

impl<C: Clock> LedgerReader for InMemoryLedger<C> {
    fn asset(&self) -> &AssetConfig {
        &self.asset
    }

    fn calculate_used_time(&self) -> Result<u64, LedgerError> {
        let inner = self.read()?;
        Ok(inner
            .state
            .active_rental()
            .map(|r| used_seconds(r, self.now()))
            .unwrap_or(0))
    }

    fn status(&self) -> Result<RentalStatus, LedgerError> {
        let inner = self.read()?;
        Ok(derive_status(inner.state.rental(), self.now()))
    }

    fn snapshot(&self) -> Result<RentalSnapshot, LedgerError> {
        let inner = self.read()?;
        let mut snap = snapshot(&inner.state, self.now());
        snap.head = inner.events.head();
        Ok(snap)
    }

    fn rental(&self) -> Result<Option<Rental>, LedgerError> {
        Ok(self.read()?.state.rental().cloned())
    }

    fn held_balance(&self) -> Result<Amount, LedgerError> {
        Ok(self.read()?.state.treasury().held())
    }

    fn balance_of(&self, account: &AccountId) -> Result<Amount, LedgerError> {
        Ok(self.read()?.state.treasury().balance_of(account))
    }

    fn events_since(&self, cursor: EventCursor, limit: usize) -> Result<EventBatch, LedgerError> {
        Ok(self.read()?.events.since(cursor, limit))
    }

    fn head(&self) -> Result<EventCursor, LedgerError> {
        Ok(self.read()?.events.head())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geolease_types::ManualClock;

    fn amount(s: &str) -> Amount {
        Amount::parse(s).unwrap()
    }

    fn ledger() -> (InMemoryLedger<ManualClock>, ManualClock) {
        let clock = ManualClock::starting_at(Timestamp::from_secs(1_700_000_000));
        let ledger = InMemoryLedger::with_clock(AssetConfig::default(), clock.clone());
        (ledger, clock)
    }

    fn renter() -> AccountId {
        AccountId::from_label("renter")
    }

    #[test]
    fn scenario_full_hour_without_pause() {
        let (ledger, clock) = ledger();
        let center = ledger.asset().zone.center;

        ledger.rent(&renter(), amount("0.05"), 3_600, center).unwrap();
        assert_eq!(ledger.status().unwrap(), RentalStatus::Active);

        clock.advance(3_600);
        assert_eq!(ledger.calculate_used_time().unwrap(), 3_600);

        let settlement = ledger.return_equipment(&renter()).unwrap();
        assert_eq!(settlement.used_seconds, 3_600);
        assert_eq!(settlement.amount_due, amount("0.036"));
        assert_eq!(settlement.refund, amount("0.014"));
        assert_eq!(ledger.balance_of(&ledger.asset().lessor).unwrap(), amount("0.036"));
        assert_eq!(ledger.balance_of(&renter()).unwrap(), amount("0.014"));
        assert_eq!(ledger.status().unwrap(), RentalStatus::Available);
    }

    #[test]
    fn rent_outside_zone_leaves_no_trace() {
        let (ledger, _clock) = ledger();
        let outside = ledger.asset().zone.center.offset_meters(0, 5_000);

        let err = ledger.rent(&renter(), amount("0.05"), 3_600, outside).unwrap_err();
        assert_eq!(err, LedgerError::NotWithinAllowedZone);
        assert!(ledger.rental().unwrap().is_none());
        assert_eq!(ledger.held_balance().unwrap(), Amount::ZERO);
        assert!(ledger.events_since(EventCursor::default(), 10).unwrap().records.is_empty());
    }

    #[test]
    fn overrun_charges_whole_deposit() {
        let (ledger, clock) = ledger();
        let center = ledger.asset().zone.center;

        ledger.rent(&renter(), amount("0.01"), 3_600, center).unwrap();
        clock.advance(10_000);
        assert_eq!(ledger.status().unwrap(), RentalStatus::Overdue);

        let settlement = ledger.return_equipment(&renter()).unwrap();
        assert_eq!(settlement.amount_due, amount("0.01"));
        assert_eq!(settlement.refund, Amount::ZERO);
    }

    #[test]
    fn pause_interval_is_excluded() {
        let (ledger, clock) = ledger();
        let center = ledger.asset().zone.center;

        ledger.rent(&renter(), amount("0.05"), 3_600, center).unwrap();
        clock.advance(100);
        ledger.pause_rental(&renter()).unwrap();
        clock.advance(250);
        assert_eq!(ledger.calculate_used_time().unwrap(), 100);

        let rental = ledger.resume_rental(&renter()).unwrap();
        assert_eq!(rental.paused_duration, 250);
        clock.advance(50);
        assert_eq!(ledger.calculate_used_time().unwrap(), 150);
    }

    #[test]
    fn events_record_each_transition() {
        let (ledger, clock) = ledger();
        let center = ledger.asset().zone.center;

        ledger.rent(&renter(), amount("0.05"), 60, center).unwrap();
        clock.advance(10);
        ledger.pause_rental(&renter()).unwrap();
        assert!(ledger.pause_rental(&renter()).is_err());
        clock.advance(10);
        ledger.resume_rental(&renter()).unwrap();
        ledger.return_equipment(&renter()).unwrap();

        let batch = ledger.events_since(EventCursor::default(), 100).unwrap();
        let names: Vec<String> = batch.records.iter().map(|r| r.event.to_string()).collect();
        assert_eq!(
            names,
            vec!["RentalStarted", "RentalPaused", "RentalResumed", "RentalEnded"]
        );
        assert_eq!(batch.next, EventCursor(4));
        assert_eq!(batch.records[1].at.as_secs(), 1_700_000_010);
    }

    #[test]
    fn concurrent_renters_get_exactly_one_rental() {
        use std::sync::Arc;
        use std::thread;

        let (ledger, _clock) = ledger();
        let ledger = Arc::new(ledger);
        let center = ledger.asset().zone.center;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    let renter = AccountId::from_label(format!("renter-{i}"));
                    ledger.rent(&renter, amount("0.02"), 600, center)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let accepted = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| *e == LedgerError::AlreadyRented));
        assert_eq!(ledger.held_balance().unwrap(), amount("0.02"));
    }

    #[test]
    fn emergency_withdraw_after_return() {
        let (ledger, _clock) = ledger();
        let owner = ledger.asset().owner.clone();
        let center = ledger.asset().zone.center;

        ledger.rent(&renter(), amount("0.05"), 60, center).unwrap();
        assert_eq!(
            ledger.emergency_withdraw(&owner).unwrap_err(),
            LedgerError::ActiveRentalExists
        );
        ledger.return_equipment(&renter()).unwrap();
        assert_eq!(ledger.emergency_withdraw(&owner).unwrap(), Amount::ZERO);
    }

    /// Every reading moves time forward by one second.
    #[derive(Default)]
    struct TickingClock(std::sync::atomic::AtomicU64);

    impl Clock for TickingClock {
        fn now(&self) -> Timestamp {
            let secs = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Timestamp::from_secs(1_700_000_000 + secs)
        }
    }

    #[test]
    fn contended_transitions_commit_in_time_order() {
        use std::sync::Arc;
        use std::thread;

        let ledger = Arc::new(InMemoryLedger::with_clock(
            AssetConfig::default(),
            TickingClock::default(),
        ));
        let center = ledger.asset().zone.center;
        ledger.rent(&renter(), amount("0.05"), 100_000, center).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let _ = ledger.pause_rental(&renter());
                        let _ = ledger.resume_rental(&renter());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let batch = ledger.events_since(EventCursor::default(), usize::MAX).unwrap();
        assert!(batch.records.len() > 1);
        assert!(batch.records.windows(2).all(|w| w[0].at <= w[1].at));
        assert_eq!(ledger.head().unwrap(), batch.next);
    }

    #[test]
    fn snapshot_carries_log_head() {
        let (ledger, clock) = ledger();
        let center = ledger.asset().zone.center;
        assert_eq!(ledger.snapshot().unwrap().head, EventCursor(0));

        ledger.rent(&renter(), amount("0.05"), 60, center).unwrap();
        clock.advance(5);
        ledger.pause_rental(&renter()).unwrap();

        let snap = ledger.snapshot().unwrap();
        assert_eq!(snap.head, EventCursor(2));
        assert_eq!(snap.head, ledger.head().unwrap());
        assert_eq!(snap.status, RentalStatus::Paused);
    }
}
