use serde::{Deserialize, Serialize};

use geolease_ledger::{RentalSnapshot, RentalStatus};

/// Why the client paused the rental on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PauseReason {
    /// The equipment left the allowed zone.
    Zone,
}

/// The client's view of the rental.
///
/// Every field except the pending flags is a cache of ledger state and is
/// overwritten by the next status poll.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    /// Display timer in seconds.
    pub timer_seconds: u64,
    pub is_paused: bool,
    pub forced_pause: Option<PauseReason>,
    /// Last authoritative status seen, from a poll, event or receipt.
    pub last_status: Option<RentalStatus>,
    /// Advisory; cleared locally once the booked duration has run out.
    pub is_active: bool,
    pub pending_pause: bool,
    pub pending_resume: bool,
}

impl LocalState {
    pub fn is_running(&self) -> bool {
        self.last_status.is_some_and(|s| s.is_running())
    }
}

/// Merge an authoritative snapshot into the local view.
///
/// Fields the snapshot covers are taken from it. A zone-forced pause
/// survives only while the ledger reports `Paused`, or while our pause
/// request is still in flight. Pending flags are left alone. Applying the
/// same snapshot twice yields the same state.
pub fn reconcile(local: &LocalState, authoritative: &RentalSnapshot) -> LocalState {
    let status = authoritative.status;
    let forced_pause = match local.forced_pause {
        Some(reason) if status == RentalStatus::Paused => Some(reason),
        Some(reason) if status.is_running() && local.pending_pause => Some(reason),
        _ => None,
    };

    LocalState {
        timer_seconds: authoritative.used_seconds,
        is_paused: authoritative.is_paused,
        forced_pause,
        last_status: Some(status),
        is_active: status.has_rental(),
        pending_pause: local.pending_pause,
        pending_resume: local.pending_resume,
    }
}
