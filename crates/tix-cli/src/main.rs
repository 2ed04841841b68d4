//! `tixfeed` command line

mod snapshot;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use snapshot::Snapshot;
use std::path::PathBuf;
use std::sync::Arc;
use tix_audit::AuditLog;
use tix_feed::{build_explorer_url, explorer_url, FeedConfig, ReconciliationEngine};
use tix_types::{Address, Report};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("tixfeed")
        .version(tix_feed::VERSION)
        .about("Ticketing contract event feed")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file (TIXFEED_* variables override it)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines on stderr"),
        )
        .subcommand(
            Command::new("replay")
                .about("Run one reconciliation pass over a contract snapshot")
                .arg(snapshot_arg())
                .arg(
                    Arg::new("audit-log")
                        .long("audit-log")
                        .value_parser(value_parser!(PathBuf))
                        .help("Audit log file (defaults to the configured path)"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print reports as JSON"),
                ),
        )
        .subcommand(
            Command::new("tickets")
                .about("List tickets held by an account in a contract snapshot")
                .arg(snapshot_arg())
                .arg(
                    Arg::new("account")
                        .long("account")
                        .required(true)
                        .help("Purchaser address"),
                ),
        )
        .subcommand(
            Command::new("audit")
                .about("List audited report transactions")
                .arg(
                    Arg::new("log")
                        .long("log")
                        .value_parser(value_parser!(PathBuf))
                        .help("Audit log file (defaults to the configured path)"),
                ),
        )
        .subcommand(
            Command::new("explorer-url")
                .about("Print the block explorer link for a transaction hash")
                .arg(Arg::new("hash").required(true).help("0x-prefixed 32-byte hex hash")),
        )
}

fn snapshot_arg() -> Arg {
    Arg::new("snapshot")
        .long("snapshot")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("JSON snapshot with logs, events, documents and tickets")
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<FeedConfig> {
    match path {
        Some(path) => FeedConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => FeedConfig::default()
            .with_env_overrides()
            .context("applying TIXFEED_* overrides"),
    }
}

fn required_path<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a PathBuf> {
    args.get_one::<PathBuf>(name)
        .with_context(|| format!("--{name} is required"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));
    let config = load_config(matches.get_one::<PathBuf>("config"))?;

    match matches.subcommand() {
        Some(("replay", args)) => replay(args, config).await,
        Some(("tickets", args)) => tickets(args, config).await,
        Some(("audit", args)) => audit(args, &config),
        Some(("explorer-url", args)) => {
            let hash = args
                .get_one::<String>("hash")
                .context("transaction hash is required")?;
            println!("{}", build_explorer_url(&config.explorer_base_url, hash)?);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn engine_for(
    snapshot: Snapshot,
    audit: AuditLog,
    config: FeedConfig,
) -> Arc<ReconciliationEngine> {
    let (chain, store) = snapshot.split();
    Arc::new(ReconciliationEngine::new(
        Arc::new(chain),
        Arc::new(store),
        Arc::new(audit),
        config,
    ))
}

async fn replay(args: &ArgMatches, config: FeedConfig) -> Result<()> {
    let snapshot = Snapshot::load(required_path(args, "snapshot")?)?;
    let audit_path = args
        .get_one::<PathBuf>("audit-log")
        .unwrap_or(&config.audit_log_path)
        .clone();
    let audit = AuditLog::open(&audit_path)
        .with_context(|| format!("opening audit log {}", audit_path.display()))?;

    let engine = engine_for(snapshot, audit, config);
    let outcome = engine.initialize().await.context("reconciliation pass failed")?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&outcome.snapshot.reports)?);
    } else {
        let query = engine.query();
        for report in &outcome.snapshot.reports {
            print_report(report, &query.explorer_url_for(report.index)?);
        }
        println!(
            "{} reports ({} unresolved, {} skipped), {} events, {} new audit entries",
            outcome.snapshot.reports.len(),
            outcome.unresolved,
            outcome.rejected.len(),
            outcome.snapshot.events.len(),
            outcome.appended,
        );
    }
    info!(audit_log = %audit_path.display(), "replay finished");
    Ok(())
}

fn print_report(report: &Report, link: &str) {
    let event = report
        .event_id()
        .map(|id| format!(" event {id}"))
        .unwrap_or_default();
    let details = if report.is_unresolved() { " (details unresolved)" } else { "" };
    println!(
        "#{:<4} {:<22} {}{}{}\n      {}",
        report.index,
        report.name(),
        report.creation_time.format("%Y-%m-%d %H:%M:%S"),
        event,
        details,
        link,
    );
}

async fn tickets(args: &ArgMatches, config: FeedConfig) -> Result<()> {
    let snapshot = Snapshot::load(required_path(args, "snapshot")?)?;
    let account = args
        .get_one::<String>("account")
        .map(|account| Address::new(account.as_str()))
        .context("--account is required")?;

    let engine = engine_for(snapshot, AuditLog::in_memory(), config);
    let tickets = engine.query().tickets_for(&account).await?;

    for ticket in &tickets {
        println!(
            "event {:<4} x{:<3} {}",
            ticket.event_id,
            ticket.tickets_bought,
            ticket.event_name().unwrap_or("(details unresolved)")
        );
    }
    println!("{} tickets held by {account}", tickets.len());
    Ok(())
}

fn audit(args: &ArgMatches, config: &FeedConfig) -> Result<()> {
    let path = args.get_one::<PathBuf>("log").unwrap_or(&config.audit_log_path);
    let log = AuditLog::open(path)
        .with_context(|| format!("opening audit log {}", path.display()))?;

    for entry in log.entries() {
        println!(
            "{:<6} {}",
            entry.report_index,
            explorer_url(&config.explorer_base_url, &entry.transaction_hash)
        );
    }
    println!("{} entries in {}", log.len(), path.display());
    Ok(())
}
