use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "geolease",
    about = "GeoLease: geofenced equipment rental ledger and field client",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with `[asset]` and `[client]` sections
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check a position against the allowed and restricted zones
    Zone(ZoneArgs),
    /// Quote the settlement for a usage time
    Quote(QuoteArgs),
    /// Step a deterministic rental with a zone excursion
    Simulate(SimulateArgs),
    /// Run the live reconciliation loop against an in-process ledger
    Run(RunArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args)]
pub struct ZoneArgs {
    /// Latitude in degrees
    #[arg(allow_hyphen_values = true)]
    pub lat: f64,
    /// Longitude in degrees
    #[arg(allow_hyphen_values = true)]
    pub lon: f64,
}

#[derive(Args)]
pub struct QuoteArgs {
    /// Seconds of active use
    pub seconds: u64,
    /// Deposit; defaults to the asset's minimum deposit
    #[arg(long)]
    pub deposit: Option<String>,
}

#[derive(Args)]
pub struct SimulateArgs {
    #[arg(long, default_value = "3600")]
    pub duration: u64,
    #[arg(long, default_value = "0.05")]
    pub deposit: String,
    /// Ticks spent at the zone center before leaving
    #[arg(long, default_value = "10")]
    pub inside: usize,
    /// Ticks spent outside the zone
    #[arg(long, default_value = "20")]
    pub outside: usize,
    /// Metres beyond the zone edge while outside
    #[arg(long, default_value = "100")]
    pub margin: u64,
    #[arg(long, default_value = "60")]
    pub ticks: u64,
    /// Ticks between submission and confirmation
    #[arg(long, default_value = "1")]
    pub latency: u64,
    /// Drop this many submissions before they reach the ledger
    #[arg(long, default_value = "0")]
    pub fail_next: u32,
    /// Return the equipment after the last tick
    #[arg(long = "return")]
    pub return_at_end: bool,
    /// Sweep the held balance as the asset owner once the run ends
    #[arg(long)]
    pub withdraw: bool,
    /// Print every Nth tick (ticks with submissions are always printed)
    #[arg(long, default_value = "1")]
    pub every: u64,
}

#[derive(Args)]
pub struct RunArgs {
    #[arg(long, default_value = "30")]
    pub ticks: u64,
    /// Override the configured tick interval
    #[arg(long)]
    pub tick_ms: Option<u64>,
    /// Seed of the random walk
    #[arg(long, default_value = "7")]
    pub seed: u64,
    /// Largest move per tick along each axis, in metres
    #[arg(long, default_value = "60")]
    pub step_m: u64,
    /// Confirmation latency of the in-process transport
    #[arg(long, default_value = "0")]
    pub latency_ms: u64,
    #[arg(long, default_value = "600")]
    pub duration: u64,
    #[arg(long, default_value = "0.05")]
    pub deposit: String,
    /// Return the equipment when the loop stops
    #[arg(long = "return")]
    pub return_at_end: bool,
}
