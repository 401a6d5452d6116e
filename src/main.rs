//! AmiCachy Installer
//!
//! Headless control surface for the installation workflow: lists target
//! disks, shows profile compatibility and runs the installer while printing
//! its progress and live log.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use amicachy::commands::errors::diagnose_network_failure;
use amicachy::commands::executor::SystemSpawner;
use amicachy::commands::install::{start_install, InstallHandle};
use amicachy::commands::{InstallEvent, InstallOutcome};
use amicachy::config::InstallerConfig;
use amicachy::constants;
use amicachy::install_log;
use amicachy::profile::{Profile, ProfileSelection};
use amicachy::state::InstallState;
use amicachy::system::audit::AuditReport;
use amicachy::system::disk::{get_available_disks, DiskInfo};

/// AmiCachy appliance installer
#[derive(Parser)]
#[command(name = "amicachy-install")]
#[command(version = "1.0.0")]
#[command(about = "Install AmiCachy to a dedicated disk")]
struct Cli {
    /// Show verbose output in the diagnostic log
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List disks eligible as installation targets
    Disks,
    /// Show boot profiles and their compatibility with this machine
    Profiles {
        /// Hardware audit report written by amicachy-audit
        #[arg(long)]
        audit_report: Option<PathBuf>,
    },
    /// Print the default installer configuration
    Config,
    /// Erase a disk and install AmiCachy on it
    Install {
        /// Target disk device (e.g., /dev/sdb)
        #[arg(short, long)]
        device: String,
        /// Boot profile to install (repeatable; defaults to every compatible profile)
        #[arg(short, long = "profile")]
        profiles: Vec<Profile>,
        /// Profile booted by default (defaults to the first selected)
        #[arg(long = "default")]
        default_profile: Option<Profile>,
        /// Hardware audit report written by amicachy-audit
        #[arg(long)]
        audit_report: Option<PathBuf>,
        /// Installer configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Do not ask before erasing the disk
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.verbose)?;

    tracing::info!("amicachy-install starting");

    match cli.command {
        Commands::Disks => list_disks(),
        Commands::Profiles { audit_report } => list_profiles(audit_report.as_deref()),
        Commands::Config => {
            print!("{}", InstallerConfig::example_toml());
            Ok(())
        }
        Commands::Install {
            device,
            profiles,
            default_profile,
            audit_report,
            config,
            yes,
        } => {
            let audit = load_audit(audit_report.as_deref())?;
            let disk = find_disk(&device)?;
            let selection = build_selection(&profiles, default_profile, audit.as_ref())?;

            if !yes && !confirm_erase(&disk)? {
                println!("Aborted, nothing was written.");
                return Ok(());
            }

            let config = InstallerConfig::load(config.as_deref());
            let mut state = InstallState::for_disk(&disk, selection);
            if let Some(report) = audit {
                state = state.with_audit(report);
            }
            run_install(state, config).await
        }
    }
}

fn list_disks() -> Result<()> {
    let disks = get_available_disks()?;
    if disks.is_empty() {
        println!("No eligible disks found.");
        return Ok(());
    }
    for disk in disks {
        println!(
            "{:<16} {:>10}  {:<6} {}",
            disk.device, disk.size_display, disk.transport, disk.model
        );
    }
    Ok(())
}

fn list_profiles(audit_report: Option<&Path>) -> Result<()> {
    let audit = load_audit(audit_report)?;
    for profile in Profile::ALL {
        let status = match &audit {
            Some(report) => {
                let verdict = report.verdict_for(profile);
                if verdict.note.is_empty() {
                    verdict.status.to_string()
                } else {
                    format!("{} ({})", verdict.status, verdict.note)
                }
            }
            None => "not audited".to_string(),
        };
        println!("{:<12} {:<14} {}", profile.id(), profile.display_name(), status);
        println!("             {}", profile.description());
    }
    Ok(())
}

fn load_audit(path: Option<&Path>) -> Result<Option<AuditReport>> {
    path.map(AuditReport::load).transpose()
}

/// The target must be one of the scanned candidate disks
fn find_disk(device: &str) -> Result<DiskInfo> {
    let disks = get_available_disks().context("Failed to scan disks")?;
    match disks.into_iter().find(|d| d.device == device) {
        Some(disk) => Ok(disk),
        None => bail!(
            "{} is not an eligible installation target (run `amicachy-install disks`)",
            device
        ),
    }
}

fn build_selection(
    profiles: &[Profile],
    default_profile: Option<Profile>,
    audit: Option<&AuditReport>,
) -> Result<ProfileSelection> {
    let selected = if profiles.is_empty() {
        audit
            .map(AuditReport::allowed_profiles)
            .unwrap_or_else(|| Profile::ALL.to_vec())
    } else {
        profiles.to_vec()
    };
    let Some(first) = selected.first().copied() else {
        bail!("No boot profile is compatible with this hardware");
    };
    ProfileSelection::new(&selected, default_profile.unwrap_or(first), audit)
        .context("Invalid profile selection")
}

fn confirm_erase(disk: &DiskInfo) -> Result<bool> {
    print!(
        "All data on {} ({}, {}) will be erased. Continue? [y/N] ",
        disk.device, disk.model, disk.size_display
    );
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

async fn run_install(state: InstallState, config: InstallerConfig) -> Result<()> {
    let log_path = config.paths.install_log.clone();
    let InstallHandle { mut events, task } =
        start_install(state, Arc::new(SystemSpawner), config);

    let mut outcome = None;
    while let Some(event) = events.recv().await {
        match event {
            InstallEvent::Log(line) => println!("{}", line),
            InstallEvent::Progress {
                phase,
                description,
                percent,
            } => {
                tracing::debug!("Phase {}", phase);
                if phase.is_terminal() {
                    println!();
                }
                println!("[{:>3}%] {}", percent, description);
            }
            InstallEvent::Partitioned(map) => {
                println!("EFI: {}  System: {}  Data: {}", map.efi, map.root, map.data);
            }
            InstallEvent::Done(done) => outcome = Some(done),
        }
    }

    let state = task.await.context("Installation task failed")?;

    match outcome {
        Some(InstallOutcome::Success) => {
            println!();
            println!("AmiCachy is installed on {}.", state.target_device);
            println!("Remove the installation medium and reboot.");
            Ok(())
        }
        Some(InstallOutcome::Failed {
            message,
            step,
            recoverable,
        }) => {
            report_failure(&log_path, &message, recoverable);
            bail!("Installation failed during {}", step)
        }
        None => bail!("Installation ended without a result"),
    }
}

fn report_failure(log_path: &Path, message: &str, recoverable: bool) {
    eprintln!();
    eprintln!("Installation failed: {}", message);

    let tail = install_log::tail(log_path, constants::LOG_TAIL_LINES).unwrap_or_else(|e| {
        tracing::warn!("Cannot read install log {}: {}", log_path.display(), e);
        Vec::new()
    });

    if recoverable {
        if let Some(diagnosis) = diagnose_network_failure(&tail.join("\n")) {
            eprintln!("{}. {}", diagnosis.summary, diagnosis.suggestion);
        }
    }

    if !tail.is_empty() {
        eprintln!();
        eprintln!("Last lines of {}:", log_path.display());
        for line in &tail {
            eprintln!("  {}", line);
        }
    }

    eprintln!();
    if recoverable {
        eprintln!("Check the network connection and run the installation again.");
    } else {
        eprintln!("Full log: {}", log_path.display());
    }
}

/// Set up logging to a daily file in the data directory
fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = constants::data_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, constants::DIAGNOSTIC_LOG_FILE);
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

    Ok(guard)
}
