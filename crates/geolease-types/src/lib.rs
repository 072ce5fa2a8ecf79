//! Foundation types for GeoLease.
//!
//! Every other GeoLease crate depends on `geolease-types`. Nothing in here
//! performs I/O; all arithmetic is integer or fixed-point so that any party
//! (ledger, field client, test harness) reproduces the same result.
//!
//! # Key Types
//!
//! - [`AccountId`]: Deterministic account identity (BLAKE3 over a label)
//! - [`Amount`]: Unsigned base-unit amount with decimal parsing/display
//! - [`Timestamp`]: Ledger time in whole seconds
//! - [`Clock`]: Source of ledger time ([`SystemClock`], [`ManualClock`])
//! - [`Position`]: Fixed-point coordinate (degrees × 10⁶)
//! - [`GeoZone`]: Circular working zone with the planar membership test

pub mod account;
pub mod amount;
pub mod error;
pub mod geo;
pub mod temporal;

pub use account::AccountId;
pub use amount::Amount;
pub use error::TypeError;
pub use geo::{within_zone, GeoZone, Position, METERS_PER_DEGREE, MICRODEGREES};
pub use temporal::{Clock, ManualClock, SystemClock, Timestamp};
