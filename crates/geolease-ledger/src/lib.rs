//! Authoritative rental ledger for GeoLease.
//!
//! The ledger owns exactly one rental record for one asset and is the single
//! source of truth for money and time. It provides:
//! - Guarded transitions (`rent`, `pause_rental`, `resume_rental`,
//!   `return_equipment`, `emergency_withdraw`) applied atomically
//! - The time accountant (used seconds with pause accounting)
//! - The settlement engine (amount due vs refund, clamped to the deposit)
//! - An append-only event log read through a cursor
//! - `LedgerWriter` / `LedgerReader` trait boundaries and `InMemoryLedger`

pub mod accounting;
pub mod config;
pub mod error;
pub mod events;
pub mod memory;
pub mod projection;
pub mod records;
pub mod settlement;
pub mod state;
pub mod traits;

pub use accounting::{remaining_seconds, used_seconds};
pub use config::AssetConfig;
pub use error::LedgerError;
pub use events::{EventBatch, EventCursor, EventLog, EventRecord, LedgerEvent};
pub use memory::InMemoryLedger;
pub use projection::{derive_status, snapshot};
pub use records::{Rental, RentalSnapshot, RentalStatus, Settlement};
pub use settlement::settle;
pub use state::{CallContext, LedgerState, Treasury};
pub use traits::{LedgerReader, LedgerWriter};
