//! systemd-boot installation with one entry per selected profile

use crate::commands::errors::{InstallError, StepResultExt};
use crate::commands::executor::ProcessSpawner;
use crate::commands::runner::CommandRunner;
use crate::commands::steps;
use crate::profile::Profile;
use crate::templates;

/// Install systemd-boot, write loader.conf and the boot entries.
/// `default` must be one of `selected`.
pub async fn install_bootloader<S: ProcessSpawner>(
    runner: &CommandRunner<S>,
    selected: &[Profile],
    default: Profile,
) -> Result<(), InstallError> {
    if !selected.contains(&default) {
        return Err(InstallError::fatal(
            steps::BOOTLOADER,
            format!("default profile {} is not among the selected profiles", default),
        ));
    }

    runner
        .chroot(["bootctl", "install"])
        .await
        .in_step(steps::BOOTLOADER)?;

    let loader = runner.target("boot/loader");
    let entries = loader.join("entries");
    std::fs::create_dir_all(&entries).in_step(steps::BOOTLOADER)?;

    std::fs::write(
        loader.join("loader.conf"),
        templates::generate_loader_conf(default),
    )
    .in_step(steps::BOOTLOADER)?;

    for profile in selected {
        tracing::info!("Writing boot entry {}", profile.entry_filename());
        std::fs::write(
            entries.join(profile.entry_filename()),
            templates::generate_boot_entry(*profile),
        )
        .in_step(steps::BOOTLOADER)?;
    }

    Ok(())
}
