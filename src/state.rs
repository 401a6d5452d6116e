//! Per-session installation state
//!
//! Created once when the user confirms disk and profiles, then moved into the
//! orchestrator task, which is its only writer. The control surface learns
//! about new facts (the partition map) through events and gets the final
//! state back when the task finishes.

use serde::Serialize;

use crate::profile::ProfileSelection;
use crate::system::audit::AuditReport;
use crate::system::disk::DiskInfo;

/// Device paths produced by partitioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionMap {
    pub efi: String,
    pub root: String,
    pub data: String,
}

/// Everything the workflow needs to know about this installation
#[derive(Debug, Clone)]
pub struct InstallState {
    /// Hardware audit the profile selection was validated against
    pub audit: Option<AuditReport>,
    pub target_device: String,
    pub target_model: String,
    pub target_size: u64,
    pub selection: ProfileSelection,
    /// Set by the partitioning step
    pub partitions: Option<PartitionMap>,
}

impl InstallState {
    pub fn new(
        target_device: impl Into<String>,
        target_size: u64,
        selection: ProfileSelection,
    ) -> Self {
        Self {
            audit: None,
            target_device: target_device.into(),
            target_model: String::new(),
            target_size,
            selection,
            partitions: None,
        }
    }

    /// State for a disk reported by the disk scan
    pub fn for_disk(disk: &DiskInfo, selection: ProfileSelection) -> Self {
        Self {
            target_model: disk.model.clone(),
            ..Self::new(disk.device.clone(), disk.size_bytes, selection)
        }
    }

    pub fn with_audit(mut self, audit: AuditReport) -> Self {
        self.audit = Some(audit);
        self
    }
}
