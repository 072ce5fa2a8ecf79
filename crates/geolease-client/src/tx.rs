use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use geolease_ledger::{
    EventCursor, LedgerError, LedgerReader, LedgerWriter, Rental, RentalStatus, Settlement,
};
use geolease_types::{AccountId, Amount, Position};

use crate::error::ClientError;

/// Client-side identifier of a submitted ledger call.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxId(Uuid);

impl TxId {
    /// Fresh UUIDv7 identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn short_id(&self) -> String {
        let s = self.0.simple().to_string();
        format!("tx:{}", &s[s.len() - 8..])
    }
}

impl Default for TxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.short_id())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A ledger transition the client can request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCall {
    Rent {
        duration_secs: u64,
        deposit: Amount,
        position: Position,
    },
    Pause,
    Resume,
    Return,
    EmergencyWithdraw,
}

impl LedgerCall {
    pub fn kind(&self) -> CallKind {
        match self {
            Self::Rent { .. } => CallKind::Rent,
            Self::Pause => CallKind::Pause,
            Self::Resume => CallKind::Resume,
            Self::Return => CallKind::Return,
            Self::EmergencyWithdraw => CallKind::EmergencyWithdraw,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallKind {
    Rent,
    Pause,
    Resume,
    Return,
    EmergencyWithdraw,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Rent => "rent",
            Self::Pause => "pause_rental",
            Self::Resume => "resume_rental",
            Self::Return => "return_equipment",
            Self::EmergencyWithdraw => "emergency_withdraw",
        };
        write!(f, "{s}")
    }
}

/// A call bound to its sender and identifier, ready to hand to a transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: TxId,
    pub from: AccountId,
    pub call: LedgerCall,
}

impl Submission {
    pub fn new(from: AccountId, call: LedgerCall) -> Self {
        Self {
            id: TxId::new(),
            from,
            call,
        }
    }

    pub fn kind(&self) -> CallKind {
        self.call.kind()
    }
}

/// What a confirmed call returned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxEffect {
    Rental(Rental),
    Settlement(Settlement),
    Withdrawn(Amount),
}

/// Confirmation of an applied call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub id: TxId,
    pub kind: CallKind,
    pub effect: TxEffect,
    /// Ledger status read right after the call was applied.
    pub status_after: RentalStatus,
    /// Event log head read before `status_after`; every event below it is
    /// reflected in that status.
    pub head: EventCursor,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxFailure {
    /// The ledger evaluated the call and refused it.
    Rejected(LedgerError),
    /// The call never reached a verdict.
    Transport(String),
}

impl fmt::Display for TxFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(e) => write!(f, "{e}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
        }
    }
}

impl From<ClientError> for TxFailure {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Ledger(inner) => Self::Rejected(inner),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Resolution state of a submitted call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxOutcome {
    Pending,
    Confirmed(TxReceipt),
    Failed(TxFailure),
}

impl TxOutcome {
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Apply `submission` directly against a ledger.
pub fn execute<L>(ledger: &L, submission: &Submission) -> Result<TxReceipt, LedgerError>
where
    L: LedgerReader + LedgerWriter + ?Sized,
{
    let from = &submission.from;
    let effect = match &submission.call {
        LedgerCall::Rent {
            duration_secs,
            deposit,
            position,
        } => TxEffect::Rental(ledger.rent(from, *deposit, *duration_secs, *position)?),
        LedgerCall::Pause => TxEffect::Rental(ledger.pause_rental(from)?),
        LedgerCall::Resume => TxEffect::Rental(ledger.resume_rental(from)?),
        LedgerCall::Return => TxEffect::Settlement(ledger.return_equipment(from)?),
        LedgerCall::EmergencyWithdraw => TxEffect::Withdrawn(ledger.emergency_withdraw(from)?),
    };

    let head = ledger.head()?;
    Ok(TxReceipt {
        id: submission.id,
        kind: submission.kind(),
        effect,
        status_after: ledger.status()?,
        head,
    })
}
