//! Installation orchestrator
//!
//! Runs the whole installation as one background task:
//! 1. Partition and format the target disk
//! 2. Mount the new filesystems
//! 3. Trust the package repository key
//! 4. Bootstrap packages with pacstrap
//! 5. Generate fstab
//! 6. Configure the system
//! 7. Install systemd-boot with the selected profiles
//! 8. Unmount
//!
//! Progress and log lines are streamed over an unbounded channel so the
//! control surface never holds the installer back. The first failure aborts
//! the run, triggers emergency cleanup and ends with a failed outcome; a
//! retry is a fresh run started by the user.

pub mod bootloader;
pub mod cleanup;
pub mod configure;
pub mod mount;
pub mod packages;
pub mod partition;

use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::errors::InstallError;
use super::executor::ProcessSpawner;
use super::runner::CommandRunner;
use super::{steps, InstallEvent, InstallOutcome, Phase};
use crate::config::InstallerConfig;
use crate::install_log::InstallLog;
use crate::state::InstallState;

/// A running installation
pub struct InstallHandle {
    /// Log, progress and terminal events in emission order
    pub events: mpsc::UnboundedReceiver<InstallEvent>,
    /// Resolves to the final state once the terminal event has been sent
    pub task: JoinHandle<InstallState>,
}

/// Spawn the installation task
pub fn start_install<S>(state: InstallState, spawner: Arc<S>, config: InstallerConfig) -> InstallHandle
where
    S: ProcessSpawner + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let log = InstallLog::open(&config.paths.install_log);
        let runner = Arc::new(CommandRunner::new(
            spawner,
            log,
            tx.clone(),
            config.paths.mount_point.clone(),
        ));
        let config = Arc::new(config);

        tracing::info!(
            "Installing to {} ({}) with profiles {:?}, default {}",
            state.target_device,
            state.target_model,
            state.selection.selected(),
            state.selection.default_profile()
        );

        // Steps run in their own task so a panic still ends in emergency cleanup
        let fallback = state.clone();
        let steps_task = tokio::spawn({
            let runner = Arc::clone(&runner);
            let config = Arc::clone(&config);
            let mut state = state;
            async move {
                let result = run_install(&runner, &mut state, &config).await;
                (state, result)
            }
        });

        let (state, result) = match steps_task.await {
            Ok(finished) => finished,
            Err(e) => {
                let step = runner
                    .current_phase()
                    .map_or(steps::VALIDATE, |phase| phase.step());
                (
                    fallback,
                    Err(InstallError::unexpected(
                        step,
                        format!("installation task aborted: {}", e),
                    )),
                )
            }
        };

        let outcome = match result {
            Ok(()) => {
                tracing::info!("Installation complete");
                InstallOutcome::Success
            }
            Err(err) => fail(&runner, &config.system.username, err).await,
        };

        let _ = tx.send(InstallEvent::Done(outcome));
        state
    });

    InstallHandle { events: rx, task }
}

/// Report a failure, unwind the mounts and build the failed outcome
async fn fail<S: ProcessSpawner>(
    runner: &CommandRunner<S>,
    username: &str,
    err: InstallError,
) -> InstallOutcome {
    tracing::error!("Installation failed at {}: {}", err.step(), err);
    runner.out(&format!("{}: {}", err.log_tag(), err));

    cleanup::emergency_cleanup(runner, username).await;

    runner.progress(Phase::Failed, "Installation failed.", runner.last_percent());
    InstallOutcome::Failed {
        message: err.to_string(),
        step: err.step().to_string(),
        recoverable: err.is_recoverable(),
    }
}

/// Reject targets that cannot be a whole disk before anything is destroyed
fn validate_target<S: ProcessSpawner>(
    runner: &CommandRunner<S>,
    state: &InstallState,
) -> Result<(), InstallError> {
    let device = state.target_device.as_str();
    if !device.starts_with("/dev/") {
        return Err(InstallError::fatal(
            steps::VALIDATE,
            format!("'{}' is not a device path", device),
        ));
    }
    if !runner.spawner().is_block_device(Path::new(device)) {
        return Err(InstallError::fatal(
            steps::VALIDATE,
            format!("{} is not a block device", device),
        ));
    }
    Ok(())
}

/// The installation sequence
async fn run_install<S: ProcessSpawner>(
    runner: &CommandRunner<S>,
    state: &mut InstallState,
    config: &InstallerConfig,
) -> Result<(), InstallError> {
    validate_target(runner, state)?;
    let device = state.target_device.clone();

    runner.progress(Phase::Partitioning, "Preparing disk...", 2);
    let partitions = partition::partition_disk(
        runner,
        &device,
        state.target_size,
        config.timing.partition_settle(),
    )
    .await?;
    state.partitions = Some(partitions.clone());
    runner.partitioned(&partitions);
    runner.progress(Phase::Partitioning, "Disk partitioned.", 10);

    runner.progress(Phase::Mounting, "Mounting filesystems...", 12);
    mount::mount_filesystems(runner, &partitions, &config.system.username).await?;
    runner.progress(Phase::Mounting, "Filesystems mounted.", 15);

    runner.progress(Phase::SigningSetup, "Configuring package manager...", 17);
    packages::setup_signing(runner, &config.repository.signing_key).await;
    runner.progress(Phase::SigningSetup, "Package manager ready.", 20);

    runner.progress(
        Phase::InstallingPackages,
        "Installing packages (this may take a while)...",
        22,
    );
    let manifest = packages::read_manifest(&config.manifest_path())?;
    packages::install_packages(runner, &manifest, &config.paths).await?;
    runner.progress(Phase::InstallingPackages, "Packages installed.", 70);

    runner.progress(Phase::GeneratingFstab, "Generating filesystem table...", 71);
    mount::generate_fstab(runner).await?;
    runner.progress(Phase::GeneratingFstab, "Filesystem table generated.", 72);

    runner.progress(Phase::Configuring, "Configuring system...", 74);
    configure::configure_system(runner, config).await?;
    runner.progress(Phase::Configuring, "System configured.", 85);

    runner.progress(Phase::InstallingBootloader, "Installing boot manager...", 87);
    bootloader::install_bootloader(
        runner,
        state.selection.selected(),
        state.selection.default_profile(),
    )
    .await?;
    runner.progress(Phase::InstallingBootloader, "Boot manager installed.", 92);

    runner.progress(Phase::Cleanup, "Finalizing...", 95);
    cleanup::final_cleanup(runner, config.timing.unmount_retry_delay()).await?;
    runner.progress(Phase::Done, "Installation complete!", 100);

    Ok(())
}
