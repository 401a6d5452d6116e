//! GPT partitioning and formatting of the target disk
//!
//! Layout is fixed policy: a 512 MiB EFI system partition at 1 MiB, the
//! system partition up to 60% of the disk, and the Amiga data partition on
//! the remaining 40%. The split is expressed in percentages so it scales
//! with the disk.

use std::time::Duration;

use crate::commands::errors::{InstallError, StepResultExt};
use crate::commands::executor::{CommandLine, ProcessSpawner};
use crate::commands::runner::CommandRunner;
use crate::commands::steps;
use crate::constants::SMALL_DATA_PARTITION;
use crate::state::PartitionMap;

const MIB: u64 = 1024 * 1024;

/// A partition boundary as understood by parted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Mib(u64),
    Percent(u8),
}

impl Bound {
    /// Byte offset on a disk of `total` bytes
    pub fn offset(&self, total: u64) -> u64 {
        match self {
            Bound::Mib(mib) => mib * MIB,
            Bound::Percent(pct) => (total as u128 * *pct as u128 / 100) as u64,
        }
    }
}

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bound::Mib(mib) => write!(f, "{}MiB", mib),
            Bound::Percent(pct) => write!(f, "{}%", pct),
        }
    }
}

/// One partition of the layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSpec {
    /// GPT partition name
    pub name: &'static str,
    /// Filesystem type hint passed to parted
    pub fs_type: &'static str,
    /// Filesystem volume label
    pub label: &'static str,
    pub start: Bound,
    pub end: Bound,
}

pub const EFI: PartitionSpec = PartitionSpec {
    name: "EFI",
    fs_type: "fat32",
    label: "AMIEFI",
    start: Bound::Mib(1),
    end: Bound::Mib(513),
};

pub const SYSTEM: PartitionSpec = PartitionSpec {
    name: "AMICACHY",
    fs_type: "ext4",
    label: "AMICACHY",
    start: Bound::Mib(513),
    end: Bound::Percent(60),
};

pub const DATA: PartitionSpec = PartitionSpec {
    name: "AMIGADATA",
    fs_type: "ext4",
    label: "AMIGADATA",
    start: Bound::Percent(60),
    end: Bound::Percent(100),
};

/// Partitions in on-disk order (numbers 1..=3)
pub const LAYOUT: [PartitionSpec; 3] = [EFI, SYSTEM, DATA];

/// Byte range of a partition on a disk of `total` bytes
pub fn byte_range(spec: &PartitionSpec, total: u64) -> (u64, u64) {
    (spec.start.offset(total), spec.end.offset(total))
}

/// Device path of partition `number` on `device`.
/// NVMe and MMC devices need a `p` separator: /dev/nvme0n1p1, /dev/mmcblk0p1.
pub fn partition_path(device: &str, number: u8) -> String {
    if device.contains("nvme") || device.contains("mmcblk") {
        format!("{}p{}", device, number)
    } else {
        format!("{}{}", device, number)
    }
}

/// Partition paths produced by this layout on `device`
pub fn partition_map(device: &str) -> PartitionMap {
    PartitionMap {
        efi: partition_path(device, 1),
        root: partition_path(device, 2),
        data: partition_path(device, 3),
    }
}

fn parted(device: &str) -> CommandLine {
    CommandLine::new("parted").args(["-s", device])
}

/// Wipe `device`, create the GPT layout and format all three partitions
pub async fn partition_disk<S: ProcessSpawner>(
    runner: &CommandRunner<S>,
    device: &str,
    total_size: u64,
    settle: Duration,
) -> Result<PartitionMap, InstallError> {
    tracing::info!("Partitioning {}", device);

    if total_size > 0 {
        let (start, end) = byte_range(&DATA, total_size);
        let data_size = end - start;
        if data_size < SMALL_DATA_PARTITION {
            let msg = format!(
                "WARNING: data partition will only be {:.1} GiB on this disk",
                data_size as f64 / (1024.0 * MIB as f64)
            );
            tracing::warn!("{}", msg);
            runner.out(&msg);
        }
    }

    runner
        .run(&CommandLine::new("wipefs").args(["--all", "--force", device]))
        .await
        .in_step(steps::PARTITION)?;
    runner
        .run(&parted(device).args(["mklabel", "gpt"]))
        .await
        .in_step(steps::PARTITION)?;

    for (index, spec) in LAYOUT.iter().enumerate() {
        runner
            .run(&parted(device).args([
                "mkpart".to_string(),
                spec.name.to_string(),
                spec.fs_type.to_string(),
                spec.start.to_string(),
                spec.end.to_string(),
            ]))
            .await
            .in_step(steps::PARTITION)?;

        if index == 0 {
            runner
                .run(&parted(device).args(["set", "1", "esp", "on"]))
                .await
                .in_step(steps::PARTITION)?;
        }
    }

    // New partition nodes appear asynchronously after the kernel re-reads the table
    runner
        .run(&CommandLine::new("partprobe").arg(device))
        .await
        .in_step(steps::PARTITION)?;
    tokio::time::sleep(settle).await;

    let map = partition_map(device);

    runner
        .run(&CommandLine::new("mkfs.fat").args(["-F", "32", "-n", EFI.label, map.efi.as_str()]))
        .await
        .in_step(steps::PARTITION)?;
    runner
        .run(&CommandLine::new("mkfs.ext4").args(["-F", "-L", SYSTEM.label, map.root.as_str()]))
        .await
        .in_step(steps::PARTITION)?;
    runner
        .run(&CommandLine::new("mkfs.ext4").args(["-F", "-L", DATA.label, map.data.as_str()]))
        .await
        .in_step(steps::PARTITION)?;

    Ok(map)
}
