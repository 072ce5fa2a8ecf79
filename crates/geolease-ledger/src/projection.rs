use geolease_types::Timestamp;

use crate::accounting::{remaining_seconds, used_seconds};
use crate::events::EventCursor;
use crate::records::{Rental, RentalSnapshot, RentalStatus};
use crate::state::LedgerState;

/// Status of the ledger at `now`.
///
/// Paused wins over Overdue: a paused rental past its end time reports
/// `Paused`, since no time is accruing.
pub fn derive_status(rental: Option<&Rental>, now: Timestamp) -> RentalStatus {
    match rental {
        Some(r) if r.is_active && r.is_paused => RentalStatus::Paused,
        Some(r) if r.is_active && now > r.end_time => RentalStatus::Overdue,
        Some(r) if r.is_active => RentalStatus::Active,
        _ => RentalStatus::Available,
    }
}

/// Build the poll response for `state` at `now`.
///
/// `head` is left at the start of the log; the owner of the log fills it in.
pub fn snapshot(state: &LedgerState, now: Timestamp) -> RentalSnapshot {
    let Some(rental) = state.active_rental() else {
        return RentalSnapshot::available(now);
    };

    RentalSnapshot {
        status: derive_status(Some(rental), now),
        renter: Some(rental.renter.clone()),
        used_seconds: used_seconds(rental, now),
        remaining_seconds: remaining_seconds(rental, now),
        paused_duration: rental.paused_duration,
        is_paused: rental.is_paused,
        start_time: Some(rental.start_time),
        end_time: Some(rental.end_time),
        deposit: rental.deposit,
        observed_at: now,
        head: EventCursor::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geolease_types::{AccountId, Amount};

    use crate::config::AssetConfig;
    use crate::state::CallContext;

    fn at(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    fn rented_state() -> (LedgerState, AccountId) {
        let mut state = LedgerState::new(AssetConfig::default());
        let renter = AccountId::from_label("renter");
        let center = state.asset().zone.center;
        state
            .rent(
                &CallContext::new(renter.clone(), at(1_000)).with_value(Amount::parse("0.05").unwrap()),
                600,
                center,
            )
            .unwrap();
        (state, renter)
    }

    #[test]
    fn empty_ledger_is_available() {
        let state = LedgerState::new(AssetConfig::default());
        let snap = snapshot(&state, at(5));
        assert_eq!(snap.status, RentalStatus::Available);
        assert!(snap.renter.is_none());
        assert_eq!(snap.observed_at, at(5));
    }

    #[test]
    fn status_follows_lifecycle() {
        let (mut state, renter) = rented_state();
        assert_eq!(snapshot(&state, at(1_100)).status, RentalStatus::Active);
        assert_eq!(snapshot(&state, at(1_600)).status, RentalStatus::Active);
        assert_eq!(snapshot(&state, at(1_601)).status, RentalStatus::Overdue);

        state.pause_rental(&CallContext::new(renter.clone(), at(1_700))).unwrap();
        assert_eq!(snapshot(&state, at(1_800)).status, RentalStatus::Paused);

        state.return_equipment(&CallContext::new(renter, at(1_900))).unwrap();
        assert_eq!(snapshot(&state, at(1_900)).status, RentalStatus::Available);
    }

    #[test]
    fn snapshot_carries_timer_fields() {
        let (state, renter) = rented_state();
        let snap = snapshot(&state, at(1_250));
        assert_eq!(snap.renter, Some(renter));
        assert_eq!(snap.used_seconds, 250);
        assert_eq!(snap.remaining_seconds, 350);
        assert_eq!(snap.end_time, Some(at(1_600)));
        assert!(!snap.is_paused);
    }
}
