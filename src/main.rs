//! modemscout - cable modem status client
//!
//! Detects the modem model, logs in, and prints DOCSIS channel data as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use modemscout::config::{Config, ModemConfig};
use modemscout::{Credentials, DetectionResult, DiscoveryEngine, ModemError, ParseResult, ParserRegistry};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "modemscout")]
#[command(about = "Cable modem detection and DOCSIS status client", long_about = None)]
struct Args {
    /// Modem address (IP, host:port or URL); overrides configured modems
    #[arg(short = 'H', long)]
    host: Option<String>,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(short, long)]
    password: Option<String>,

    /// Parser to try first, e.g. from an earlier run
    #[arg(long)]
    parser: Option<String>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the built-in parsers and exit
    #[arg(long)]
    list_parsers: bool,

    /// Keep polling every `check_interval` seconds
    #[arg(short, long)]
    watch: bool,
}

/// One modem's poll result as printed
#[derive(Serialize)]
struct Report<'a> {
    modem: &'a str,
    parser: &'a str,
    url: &'a str,
    tier: &'a str,
    #[serde(flatten)]
    status: &'a ParseResult,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = Config::load(args.config.as_deref())?;
    init_logging(&cfg)?;

    let registry = ParserRegistry::builtin();
    if args.list_parsers {
        list_parsers(&registry);
        return Ok(());
    }

    let targets = targets(&args, &cfg)?;
    let engine = Arc::new(DiscoveryEngine::from_config(registry, &cfg));

    tracing::info!("modemscout v{}", env!("CARGO_PKG_VERSION"));
    if args.watch {
        run_watch(cfg, engine, targets).await
    } else {
        run_once(&engine, &targets).await
    }
}

fn init_logging(cfg: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level));

    if cfg.logging.log_file.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.logging.log_file)
            .with_context(|| format!("Failed to open log file {}", cfg.logging.log_file))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
    Ok(())
}

fn list_parsers(registry: &ParserRegistry) {
    for d in registry.list() {
        let caps: Vec<&str> = d.capabilities.iter().map(|c| c.as_str()).collect();
        println!(
            "{:<18} {:<12} {:<24} auth={:<22} {}",
            d.name,
            d.manufacturer,
            d.models.join(", "),
            d.auth.kind().as_str(),
            caps.join(",")
        );
    }
}

/// Modems to process: the command-line host, else the configured list
fn targets(args: &Args, cfg: &Config) -> Result<Vec<ModemConfig>> {
    if let Some(host) = &args.host {
        return Ok(vec![ModemConfig {
            name: host.clone(),
            host: host.clone(),
            username: args.username.clone().unwrap_or_default(),
            password: args.password.clone().unwrap_or_default(),
            parser: args.parser.clone(),
        }]);
    }
    if cfg.modems.is_empty() {
        anyhow::bail!("No modem given. Use --host or add [[modems]] to the config file");
    }
    Ok(cfg.modems.clone())
}

fn credentials(modem: &ModemConfig) -> Option<Credentials> {
    Some(Credentials::new(&modem.username, &modem.password)).filter(Credentials::is_complete)
}

fn report_error(modem: &ModemConfig, err: &ModemError) {
    tracing::error!("{}: {}", modem.name, err);
    for (i, step) in err.troubleshooting_steps().iter().enumerate() {
        tracing::info!("  {}. {}", i + 1, step);
    }
}

fn print_report(modem: &ModemConfig, detection: &DetectionResult, status: &ParseResult) -> Result<()> {
    let report = Report {
        modem: &modem.name,
        parser: detection.parser_name(),
        url: detection.base_url().as_str(),
        tier: detection.tier().as_str(),
        status,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Detect and read every target once
async fn run_once(engine: &DiscoveryEngine, targets: &[ModemConfig]) -> Result<()> {
    let mut failures = 0;

    for modem in targets {
        match engine
            .discover(&modem.host, credentials(modem), modem.parser.as_deref())
            .await
        {
            Ok(detection) => {
                tracing::info!(
                    "{}: {} ({} tier, {} attempts)",
                    modem.name,
                    detection.parser_name(),
                    detection.tier(),
                    detection.attempts()
                );
                print_report(modem, &detection, &detection.parse())?;
            }
            Err(e) => {
                report_error(modem, &e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} of {} modems failed", failures, targets.len());
    }
    Ok(())
}

/// Poll every target on an interval, one task per modem
async fn run_watch(cfg: Config, engine: Arc<DiscoveryEngine>, targets: Vec<ModemConfig>) -> Result<()> {
    let interval = Duration::from_secs(cfg.global.check_interval);
    tracing::info!("Watching {} modems every {}s", targets.len(), interval.as_secs());

    let tasks: Vec<_> = targets
        .into_iter()
        .map(|modem| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { watch_modem(engine, modem, interval).await })
        })
        .collect();

    for task in tasks {
        task.await.context("Watch task panicked")?;
    }
    Ok(())
}

async fn watch_modem(engine: Arc<DiscoveryEngine>, modem: ModemConfig, interval: Duration) {
    const MAX_CONSECUTIVE_FAILURES: u32 = 3;

    let mut hint = modem.parser.clone();
    let mut detection: Option<DetectionResult> = None;
    let mut consecutive_failures = 0;
    let mut last_check: Option<Instant> = None;

    loop {
        if let Some(last) = last_check {
            let elapsed = last.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
        last_check = Some(Instant::now());

        let outcome = match detection.as_mut() {
            Some(found) => engine.poll(found).await,
            None => match engine
                .discover(&modem.host, credentials(&modem), hint.as_deref())
                .await
            {
                Ok(found) => {
                    tracing::info!("{}: detected {}", modem.name, found.parser_name());
                    hint = Some(found.parser_name().to_string());
                    let status = found.parse();
                    detection = Some(found);
                    Ok(status)
                }
                Err(e) => Err(e),
            },
        };

        match outcome {
            Ok(status) => {
                consecutive_failures = 0;
                if let Some(found) = &detection {
                    if let Err(e) = print_report(&modem, found, &status) {
                        tracing::warn!("{}: cannot print report: {:#}", modem.name, e);
                    }
                }
            }
            Err(e) => {
                // The modem changed under us; search again next round.
                if matches!(e, ModemError::ParserNotFound { .. }) {
                    detection = None;
                }
                consecutive_failures += 1;
                report_error(&modem, &e);

                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    tracing::error!("{}: too many failures, backing off...", modem.name);
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    consecutive_failures = 0;
                }
            }
        }
    }
}
