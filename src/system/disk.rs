//! Disk enumeration utilities
//!
//! Supplies the candidate installation targets: whole disks that are
//! writable, fixed, large enough, and not the live medium we booted from.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::process::Command;
use std::sync::LazyLock;

use crate::constants::MIN_DISK_SIZE;

/// Strips the partition suffix from a device path: /dev/sda1 -> sda, /dev/nvme0n1p1 -> nvme0n1
static PARENT_DEVICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/dev/(\w+?)(?:p?\d+)?$").expect("Parent device regex pattern is statically validated")
});

/// An eligible installation target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskInfo {
    pub name: String,
    pub device: String,
    pub model: String,
    pub transport: String,
    pub size_bytes: u64,
    pub size_display: String,
}

/// JSON structure for lsblk output
#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<BlockDevice>,
}

#[derive(Debug, Deserialize)]
struct BlockDevice {
    name: String,
    #[serde(default, deserialize_with = "size_or_string")]
    size: u64,
    model: Option<String>,
    #[serde(rename = "type")]
    device_type: Option<String>,
    tran: Option<String>,
    #[serde(default, deserialize_with = "bool_or_flag")]
    ro: bool,
    #[serde(default, deserialize_with = "bool_or_flag")]
    rm: bool,
}

/// lsblk emits numbers with --bytes, but older releases quote them
fn size_or_string<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
        Null(Option<()>),
    }
    Ok(match Raw::deserialize(d)? {
        Raw::Num(n) => n,
        Raw::Str(s) => s.trim().parse().unwrap_or(0),
        Raw::Null(_) => 0,
    })
}

/// lsblk emits true/false on newer releases and "0"/"1" on older ones
fn bool_or_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Str(String),
        Num(u8),
    }
    Ok(match Raw::deserialize(d)? {
        Raw::Bool(b) => b,
        Raw::Str(s) => s.trim() == "1",
        Raw::Num(n) => n == 1,
    })
}

/// List candidate installation disks
pub fn get_available_disks() -> Result<Vec<DiskInfo>> {
    let output = Command::new("lsblk")
        .args([
            "--json",
            "--bytes",
            "--output",
            "NAME,SIZE,MODEL,TYPE,TRAN,RO,RM",
        ])
        .output()
        .context("Failed to run lsblk")?;

    if !output.status.success() {
        anyhow::bail!("lsblk failed with exit code {:?}", output.status.code());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let live_device = live_medium_device();
    if let Some(dev) = &live_device {
        tracing::debug!("Excluding live medium device {}", dev);
    }

    parse_lsblk(&stdout, live_device.as_deref())
}

/// Parse lsblk JSON and keep eligible disks
fn parse_lsblk(json: &str, live_device: Option<&str>) -> Result<Vec<DiskInfo>> {
    let lsblk: LsblkOutput = serde_json::from_str(json).context("Failed to parse lsblk output")?;

    let disks = lsblk
        .blockdevices
        .into_iter()
        .filter(|dev| dev.device_type.as_deref() == Some("disk"))
        .filter(|dev| !dev.ro && !dev.rm)
        .filter(|dev| Some(dev.name.as_str()) != live_device)
        .filter(|dev| dev.size >= MIN_DISK_SIZE)
        .map(|dev| {
            let model = dev
                .model
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or("Unknown drive")
                .to_string();
            DiskInfo {
                device: format!("/dev/{}", dev.name),
                size_display: format_size(dev.size),
                transport: dev.tran.unwrap_or_default().to_uppercase(),
                name: dev.name,
                model,
                size_bytes: dev.size,
            }
        })
        .collect();

    Ok(disks)
}

/// Name of the disk backing the running live system (mounted at /)
fn live_medium_device() -> Option<String> {
    let output = Command::new("findmnt")
        .args(["-n", "-o", "SOURCE", "/"])
        .output()
        .ok()?;
    let source = String::from_utf8_lossy(&output.stdout).trim().to_string();
    parent_device_name(&source)
}

/// Parent disk name of a partition device path
fn parent_device_name(source: &str) -> Option<String> {
    PARENT_DEVICE_RE
        .captures(source)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Human-readable size, e.g. "32.0 GB"
fn format_size(bytes: u64) -> String {
    format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn lsblk_json() -> String {
        format!(
            r#"{{"blockdevices": [
                {{"name": "sda", "size": {big}, "model": "Samsung SSD 870  ", "type": "disk", "tran": "sata", "ro": false, "rm": false}},
                {{"name": "sdb", "size": {big}, "model": null, "type": "disk", "tran": "usb", "ro": false, "rm": true}},
                {{"name": "nvme0n1", "size": {big}, "model": "WD Black", "type": "disk", "tran": "nvme", "ro": "0", "rm": "0"}},
                {{"name": "sdc", "size": {small}, "model": "Tiny", "type": "disk", "tran": "sata", "ro": false, "rm": false}},
                {{"name": "sr0", "size": {big}, "model": "DVD", "type": "rom", "tran": "sata", "ro": true, "rm": true}},
                {{"name": "vda", "size": "{big}", "model": "", "type": "disk", "tran": null, "ro": false, "rm": false}}
            ]}}"#,
            big = 32 * GIB,
            small = 16 * GIB
        )
    }

    #[test]
    fn test_parse_lsblk_filters_ineligible() {
        let disks = parse_lsblk(&lsblk_json(), None).unwrap();
        let names: Vec<_> = disks.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sda", "nvme0n1", "vda"]);
    }

    #[test]
    fn test_parse_lsblk_excludes_live_device() {
        let disks = parse_lsblk(&lsblk_json(), Some("sda")).unwrap();
        assert!(disks.iter().all(|d| d.name != "sda"));
    }

    #[test]
    fn test_parse_lsblk_fields() {
        let disks = parse_lsblk(&lsblk_json(), None).unwrap();
        let sda = &disks[0];
        assert_eq!(sda.device, "/dev/sda");
        assert_eq!(sda.model, "Samsung SSD 870");
        assert_eq!(sda.transport, "SATA");
        assert_eq!(sda.size_display, "32.0 GB");

        let vda = &disks[2];
        assert_eq!(vda.model, "Unknown drive");
        assert_eq!(vda.transport, "");
        assert_eq!(vda.size_bytes, 32 * GIB);
    }

    #[test]
    fn test_parent_device_name() {
        assert_eq!(parent_device_name("/dev/sda1"), Some("sda".to_string()));
        assert_eq!(parent_device_name("/dev/nvme0n1p2"), Some("nvme0n1".to_string()));
        assert_eq!(parent_device_name("overlay"), None);
    }
}
