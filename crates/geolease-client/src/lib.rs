//! Field client for GeoLease.
//!
//! Keeps a local view of the rental in step with the ledger while the
//! equipment moves. Leaving the allowed zone pauses the rental; coming back
//! resumes it. The ledger stays authoritative: every status poll overwrites
//! what the client cached, and optimistic updates are rolled back when the
//! call behind them fails.
//!
//! - [`Reconciler`]: the state machine, free of I/O
//! - [`LedgerTransport`]: async boundary to a ledger, with [`LocalTransport`]
//! - [`Simulation`]: deterministic stepping against an in-memory ledger
//! - [`Runner`]: tokio loop over a live transport

pub mod config;
pub mod error;
pub mod position;
pub mod reconcile;
pub mod reconciler;
pub mod runner;
pub mod simulation;
pub mod transport;
pub mod tx;

pub use config::{GeoleaseConfig, LoopConfig};
pub use error::{ClientError, ClientResult};
pub use position::{PositionSource, RandomWalk, Waypoints};
pub use reconcile::{reconcile, LocalState, PauseReason};
pub use reconciler::{ConnectionState, Reconciler, TickInput, TickReport};
pub use runner::{RunSummary, Runner};
pub use simulation::{Simulation, SIMULATION_EPOCH};
pub use transport::{LedgerTransport, LocalTransport};
pub use tx::{execute, CallKind, LedgerCall, Submission, TxEffect, TxFailure, TxId, TxOutcome, TxReceipt};
