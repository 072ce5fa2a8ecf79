use serde::{Deserialize, Serialize};

use geolease_types::{AccountId, Amount, Timestamp};

/// Events emitted by ledger transitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    RentalStarted {
        renter: AccountId,
        duration_secs: u64,
        deposit: Amount,
    },
    RentalPaused {
        renter: AccountId,
        at: Timestamp,
    },
    RentalResumed {
        renter: AccountId,
        at: Timestamp,
    },
    RentalEnded {
        renter: AccountId,
        used_seconds: u64,
        amount_paid: Amount,
        refund: Amount,
    },
    EmergencyWithdraw {
        to: AccountId,
        amount: Amount,
    },
}

impl LedgerEvent {
    /// The renter a rental event pertains to, if any.
    pub fn renter(&self) -> Option<&AccountId> {
        match self {
            Self::RentalStarted { renter, .. }
            | Self::RentalPaused { renter, .. }
            | Self::RentalResumed { renter, .. }
            | Self::RentalEnded { renter, .. } => Some(renter),
            Self::EmergencyWithdraw { .. } => None,
        }
    }
}

impl std::fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RentalStarted { .. } => "RentalStarted",
            Self::RentalPaused { .. } => "RentalPaused",
            Self::RentalResumed { .. } => "RentalResumed",
            Self::RentalEnded { .. } => "RentalEnded",
            Self::EmergencyWithdraw { .. } => "EmergencyWithdraw",
        };
        write!(f, "{s}")
    }
}

/// An event as stored in the log: 1-based sequence number plus ledger time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub at: Timestamp,
    pub event: LedgerEvent,
}

/// Read position in the event log: the number of records already consumed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventCursor(pub u64);

/// Records read from a cursor, and the cursor to continue from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBatch {
    pub records: Vec<EventRecord>,
    pub next: EventCursor,
}

/// Append-only event log. This is the ledger's only history.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, at: Timestamp, event: LedgerEvent) -> &EventRecord {
        let seq = self.records.len() as u64 + 1;
        self.records.push(EventRecord { seq, at, event });
        &self.records[self.records.len() - 1]
    }

    /// Up to `limit` records after `cursor`.
    pub fn since(&self, cursor: EventCursor, limit: usize) -> EventBatch {
        let start = (cursor.0 as usize).min(self.records.len());
        let records: Vec<EventRecord> =
            self.records[start..].iter().take(limit).cloned().collect();
        let next = EventCursor(start as u64 + records.len() as u64);
        EventBatch { records, next }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Cursor just past the newest record.
    pub fn head(&self) -> EventCursor {
        EventCursor(self.records.len() as u64)
    }
}
