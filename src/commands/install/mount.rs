//! Mounting the new filesystems and writing fstab

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::commands::errors::{InstallError, StepResultExt};
use crate::commands::executor::{CommandLine, ProcessSpawner};
use crate::commands::runner::CommandRunner;
use crate::commands::steps;
use crate::state::PartitionMap;

/// Where the data partition is mounted, relative to the target root
pub fn data_mount_dir(mount_point: &Path, username: &str) -> PathBuf {
    mount_point.join("home").join(username).join("Amiga")
}

/// EFI partition mount, relative to the target root
pub fn boot_mount_dir(mount_point: &Path) -> PathBuf {
    mount_point.join("boot")
}

fn mount(device: &str, target: &Path) -> CommandLine {
    CommandLine::new("mount")
        .arg(device)
        .arg(target.to_string_lossy())
}

/// Mount root, then EFI on /boot, then data under the user's home.
/// Child directories are only created once the root filesystem is mounted,
/// so they land on the new system and not in the bare mount point.
pub async fn mount_filesystems<S: ProcessSpawner>(
    runner: &CommandRunner<S>,
    partitions: &PartitionMap,
    username: &str,
) -> Result<(), InstallError> {
    for device in [&partitions.root, &partitions.efi, &partitions.data] {
        if !runner.spawner().is_block_device(Path::new(device)) {
            return Err(InstallError::fatal(
                steps::MOUNT,
                format!("{} is not a block device", device),
            ));
        }
    }

    let root = runner.mount_point().to_path_buf();
    std::fs::create_dir_all(&root).in_step(steps::MOUNT)?;
    runner
        .run(&mount(&partitions.root, &root))
        .await
        .in_step(steps::MOUNT)?;

    let boot = boot_mount_dir(&root);
    std::fs::create_dir_all(&boot).in_step(steps::MOUNT)?;
    runner
        .run(&mount(&partitions.efi, &boot))
        .await
        .in_step(steps::MOUNT)?;

    let data = data_mount_dir(&root, username);
    std::fs::create_dir_all(&data).in_step(steps::MOUNT)?;
    runner
        .run(&mount(&partitions.data, &data))
        .await
        .in_step(steps::MOUNT)?;

    tracing::info!("Mounted target at {}", root.display());
    Ok(())
}

/// Append label-based fstab entries for everything mounted under the target.
/// Only genfstab's stdout is written; its warnings go to the log alone.
pub async fn generate_fstab<S: ProcessSpawner>(runner: &CommandRunner<S>) -> Result<(), InstallError> {
    let result = runner
        .run(
            &CommandLine::new("genfstab")
                .arg("-L")
                .arg(runner.mount_point().to_string_lossy())
                .separate_stderr(),
        )
        .await
        .in_step(steps::FSTAB)?;

    let etc = runner.target("etc");
    std::fs::create_dir_all(&etc).in_step(steps::FSTAB)?;
    let mut fstab = OpenOptions::new()
        .create(true)
        .append(true)
        .open(etc.join("fstab"))
        .in_step(steps::FSTAB)?;
    for line in &result.stdout {
        writeln!(fstab, "{}", line).in_step(steps::FSTAB)?;
    }
    Ok(())
}
