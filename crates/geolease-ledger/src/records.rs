use std::fmt;

use serde::{Deserialize, Serialize};

use geolease_types::{AccountId, Amount, Timestamp};

use crate::events::EventCursor;

/// The ledger's single rental record.
///
/// Invariants: `is_paused ⇒ is_active`; `paused_duration` never decreases
/// while the rental is active.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rental {
    pub renter: AccountId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub deposit: Amount,
    /// Accumulated seconds spent paused (closed pause intervals only).
    pub paused_duration: u64,
    pub last_paused_at: Option<Timestamp>,
    pub is_active: bool,
    pub is_paused: bool,
}

impl Rental {
    /// Booked length of the rental in seconds.
    pub fn max_duration(&self) -> u64 {
        self.end_time.saturating_secs_since(self.start_time)
    }
}

/// Authoritative status derived from the rental record at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RentalStatus {
    Available,
    Active,
    Paused,
    /// Active and not paused, past `end_time`. Derived, never stored.
    Overdue,
}

impl RentalStatus {
    /// `true` while time is accruing against the deposit.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Active | Self::Overdue)
    }

    /// `true` whenever a rental record is active (paused or not).
    pub fn has_rental(&self) -> bool {
        !matches!(self, Self::Available)
    }
}

impl fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Available => "Available",
            Self::Active => "Active",
            Self::Paused => "Paused",
            Self::Overdue => "Overdue",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time view of the ledger returned to status polls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalSnapshot {
    pub status: RentalStatus,
    pub renter: Option<AccountId>,
    pub used_seconds: u64,
    pub remaining_seconds: u64,
    pub paused_duration: u64,
    pub is_paused: bool,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub deposit: Amount,
    pub observed_at: Timestamp,
    /// Event log length when the snapshot was taken. Orders snapshots
    /// against receipts independently of clock resolution.
    #[serde(default)]
    pub head: EventCursor,
}

impl RentalSnapshot {
    pub fn available(observed_at: Timestamp) -> Self {
        Self {
            status: RentalStatus::Available,
            renter: None,
            used_seconds: 0,
            remaining_seconds: 0,
            paused_duration: 0,
            is_paused: false,
            start_time: None,
            end_time: None,
            deposit: Amount::ZERO,
            observed_at,
            head: EventCursor::default(),
        }
    }
}

/// Settlement figures produced by `return_equipment`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub renter: AccountId,
    pub used_seconds: u64,
    pub amount_due: Amount,
    pub refund: Amount,
    pub deposit: Amount,
}
