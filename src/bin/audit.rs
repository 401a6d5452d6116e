//! AmiCachy Hardware Auditor
//!
//! Detects CPU capabilities, runs a short interpreter benchmark and rates each
//! boot profile. The JSON report feeds `amicachy-install --audit-report`.
//!
//! Usage:
//!   amicachy-audit [--output report.json]   Write the report (stdout by default)
//!   amicachy-audit --help                   Show help

use amicachy::constants;
use amicachy::system::audit::{run_audit, AuditReport, BENCHMARK_DURATION};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// AmiCachy Hardware Auditor
#[derive(Parser)]
#[command(name = "amicachy-audit")]
#[command(version = "1.0.0")]
#[command(about = "Rate this machine for the AmiCachy boot profiles")]
struct Cli {
    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Benchmark duration in seconds
    #[arg(long)]
    seconds: Option<u64>,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose)?;

    tracing::info!("amicachy-audit starting");

    let duration = cli
        .seconds
        .map(Duration::from_secs)
        .unwrap_or(BENCHMARK_DURATION);
    let report = run_audit(duration).await?;

    for verdict in &report.profiles {
        tracing::info!("{}: {} {}", verdict.name, verdict.status, verdict.note);
    }

    write_report(&report, cli.output)?;

    tracing::info!("amicachy-audit complete");
    Ok(())
}

fn write_report(report: &AuditReport, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            report.save(&path)?;
            eprintln!("Audit report written to {}", path.display());
        }
        None => {
            let json = serde_json::to_string_pretty(report).context("Failed to encode report")?;
            println!("{}", json);
        }
    }
    Ok(())
}

/// Set up logging to file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = constants::data_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "audit.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    Ok(())
}
