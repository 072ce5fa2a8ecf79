use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use tokio::sync::watch;

use geolease_client::{
    CallKind, GeoleaseConfig, LedgerTransport, LocalTransport, RandomWalk, Runner, Simulation,
    TickReport, TxOutcome, Waypoints,
};
use geolease_ledger::{settle, InMemoryLedger, LedgerReader, Settlement};
use geolease_types::{AccountId, Amount, Position};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Zone(args) => cmd_zone(&config, args, format),
        Command::Quote(args) => cmd_quote(&config, args, format),
        Command::Simulate(args) => cmd_simulate(&config, args, format),
        Command::Run(args) => cmd_run(&config, args, format),
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<GeoleaseConfig> {
    match &cli.config {
        Some(path) => GeoleaseConfig::load(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(GeoleaseConfig::default()),
    }
}

fn parse_amount(input: &str) -> anyhow::Result<Amount> {
    Amount::parse(input).with_context(|| format!("invalid amount {input:?}"))
}

fn renter() -> AccountId {
    AccountId::from_label("renter")
}

fn cmd_zone(config: &GeoleaseConfig, args: ZoneArgs, format: OutputFormat) -> anyhow::Result<()> {
    let position = Position::from_degrees(args.lat, args.lon)?;
    let zone = config.asset.zone;
    let restricted = zone.restricted();
    let inside = zone.contains(&position);
    let in_restricted = restricted.contains(&position);
    let distance = zone.distance_m(&position);

    if format == OutputFormat::Json {
        let out = json!({
            "position": position,
            "zone": zone,
            "inside": inside,
            "distance_m": distance,
            "inside_restricted": in_restricted,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Position {}", position.to_string().bold());
    println!(
        "  Allowed zone: center {}, radius {} m",
        zone.center.to_string().cyan(),
        zone.radius_m
    );
    if inside {
        println!("  {} inside ({} m from center)", "✓".green().bold(), distance);
    } else {
        println!("  {} outside ({} m from center)", "✗".red().bold(), distance);
    }
    if in_restricted {
        println!("  {} inside the restricted zone", "!".yellow().bold());
    }
    Ok(())
}

fn cmd_quote(config: &GeoleaseConfig, args: QuoteArgs, format: OutputFormat) -> anyhow::Result<()> {
    let deposit = match &args.deposit {
        Some(d) => parse_amount(d)?,
        None => config.asset.min_deposit,
    };
    let settlement = settle(renter(), args.seconds, config.asset.price_per_second, deposit);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&settlement)?);
        return Ok(());
    }
    println!(
        "{} at {} per second",
        config.asset.equipment_name.bold(),
        config.asset.price_per_second
    );
    print_settlement(&settlement);
    Ok(())
}

fn print_settlement(settlement: &Settlement) {
    println!("  Used:     {} s", settlement.used_seconds);
    println!("  Deposit:  {}", settlement.deposit);
    println!("  Due:      {}", settlement.amount_due.to_string().yellow());
    println!("  Refund:   {}", settlement.refund.to_string().green());
}

fn print_tick(report: &TickReport) {
    let place = match report.inside_zone {
        Some(true) => "in ".green(),
        Some(false) => "out".red(),
        None => "-  ".dimmed(),
    };
    let status = report
        .local
        .last_status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".into());
    let mut line = format!(
        "t={:>4} {} {:<9} used {:>5}s",
        report.tick, place, status, report.local.timer_seconds
    );
    if report.local.forced_pause.is_some() {
        line.push_str(&format!(" {}", "zone-paused".yellow()));
    }
    if report.inside_restricted == Some(true) {
        line.push_str(&format!(" {}", "restricted".magenta()));
    }
    for submission in &report.submissions {
        line.push_str(&format!(
            " → {} {}",
            submission.kind().to_string().yellow(),
            submission.id.short_id().dimmed()
        ));
    }
    println!("{line}");
}

fn cmd_simulate(
    config: &GeoleaseConfig,
    args: SimulateArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let zone = config.asset.zone;
    let route = Waypoints::excursion(&zone, args.inside, args.outside, args.margin);
    let mut sim = Simulation::new(config.asset.clone(), config.client.clone(), renter(), route)?
        .with_latency(args.latency);
    sim.fail_next(args.fail_next);
    sim.start_rental(args.duration, parse_amount(&args.deposit)?)?;

    let every = args.every.max(1);
    for _ in 0..args.ticks {
        let report = sim.step()?;
        if format == OutputFormat::Text && (report.tick % every == 0 || !report.submissions.is_empty()) {
            print_tick(&report);
        }
    }
    if args.return_at_end {
        sim.return_equipment()?;
        sim.settle(args.latency.max(1) + 1)?;
    }
    let withdrawal = if args.withdraw {
        Some(sim.emergency_withdraw()?)
    } else {
        None
    };

    let ledger = sim.ledger();
    let status = ledger.status()?;
    let used = ledger.calculate_used_time()?;
    let count = |kind: CallKind| sim.submissions().iter().filter(|s| s.kind() == kind).count();

    if format == OutputFormat::Json {
        let out = json!({
            "ticks": sim.tick(),
            "status": status,
            "used_seconds": used,
            "pauses": count(CallKind::Pause),
            "resumes": count(CallKind::Resume),
            "local": sim.reconciler().local(),
            "settlement": sim.reconciler().last_settlement(),
            "withdraw": withdrawal,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("Ledger status: {}", status.to_string().bold());
    println!("Ledger used time: {used} s");
    println!(
        "Pauses: {}  Resumes: {}",
        count(CallKind::Pause),
        count(CallKind::Resume)
    );
    println!("{}", sim.reconciler().status_line().cyan());
    if let Some(settlement) = sim.reconciler().last_settlement() {
        print_settlement(settlement);
    }
    if let Some(line) = withdrawal {
        println!("Owner: {}", line.yellow());
    }
    Ok(())
}

fn cmd_run(config: &GeoleaseConfig, args: RunArgs, format: OutputFormat) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_live(config, args, format))
}

async fn run_live(config: &GeoleaseConfig, args: RunArgs, format: OutputFormat) -> anyhow::Result<()> {
    let zone = config.asset.zone;
    let ledger = Arc::new(InMemoryLedger::new(config.asset.clone()));
    let transport = Arc::new(
        LocalTransport::new(Arc::clone(&ledger)).with_latency(Duration::from_millis(args.latency_ms)),
    );

    let mut loop_config = config.client.clone();
    if let Some(ms) = args.tick_ms {
        loop_config.tick_interval_ms = ms;
    }
    let walk = RandomWalk::new(zone.center, args.step_m, args.seed);

    let mut runner = Runner::connect(Arc::clone(&transport), loop_config, renter(), walk)
        .await?
        .with_max_ticks(args.ticks);
    runner.start_rental(args.duration, parse_amount(&args.deposit)?, zone.center)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let mut summary = runner.run(shutdown_rx).await?;

    if args.return_at_end {
        let submission = summary.reconciler.return_equipment()?;
        let outcome = match transport.submit(&submission).await {
            Ok(receipt) => TxOutcome::Confirmed(receipt),
            Err(e) => TxOutcome::Failed(e.into()),
        };
        summary.reconciler.on_tx_settled(submission.id, outcome);
    }

    let status = ledger.status()?;
    let pauses = summary
        .submissions
        .iter()
        .filter(|s| s.kind() == CallKind::Pause)
        .count();

    if format == OutputFormat::Json {
        let out = json!({
            "ticks": summary.ticks,
            "submissions": summary.submissions.len(),
            "pauses": pauses,
            "status": status,
            "used_seconds": ledger.calculate_used_time()?,
            "settlement": summary.reconciler.last_settlement(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "{} Loop stopped after {} ticks ({} calls, {} pauses)",
        "✓".green().bold(),
        summary.ticks,
        summary.submissions.len(),
        pauses
    );
    println!("  {}", summary.reconciler.summary());
    println!("  Ledger status: {}", status.to_string().bold());
    println!("  {}", summary.reconciler.status_line().cyan());
    if let Some(settlement) = summary.reconciler.last_settlement() {
        print_settlement(settlement);
    }
    Ok(())
}
