use geolease_types::{AccountId, Amount, Position};

use crate::config::AssetConfig;
use crate::error::LedgerError;
use crate::events::{EventBatch, EventCursor};
use crate::records::{Rental, RentalSnapshot, RentalStatus, Settlement};

/// Write boundary: the guarded rental transitions.
///
/// Every call is evaluated and applied as one indivisible step relative to
/// all other calls on the same ledger.
pub trait LedgerWriter: Send + Sync {
    /// Start a rental; `deposit` is the value attached to the call.
    fn rent(
        &self,
        caller: &AccountId,
        deposit: Amount,
        duration_secs: u64,
        position: Position,
    ) -> Result<Rental, LedgerError>;

    fn pause_rental(&self, caller: &AccountId) -> Result<Rental, LedgerError>;

    fn resume_rental(&self, caller: &AccountId) -> Result<Rental, LedgerError>;

    fn return_equipment(&self, caller: &AccountId) -> Result<Settlement, LedgerError>;

    fn emergency_withdraw(&self, caller: &AccountId) -> Result<Amount, LedgerError>;
}

/// Read boundary: status queries, asset metadata, balances, and events.
pub trait LedgerReader: Send + Sync {
    fn asset(&self) -> &AssetConfig;

    fn calculate_used_time(&self) -> Result<u64, LedgerError>;

    fn status(&self) -> Result<RentalStatus, LedgerError>;

    fn snapshot(&self) -> Result<RentalSnapshot, LedgerError>;

    /// The latest rental record, active or not.
    fn rental(&self) -> Result<Option<Rental>, LedgerError>;

    fn held_balance(&self) -> Result<Amount, LedgerError>;

    /// Total the ledger has paid out to `account`.
    fn balance_of(&self, account: &AccountId) -> Result<Amount, LedgerError>;

    fn events_since(&self, cursor: EventCursor, limit: usize) -> Result<EventBatch, LedgerError>;

    /// Cursor just past the last committed event.
    fn head(&self) -> Result<EventCursor, LedgerError>;
}
