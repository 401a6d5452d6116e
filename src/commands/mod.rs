//! Command execution and the installation workflow

pub mod errors;
pub mod executor;
pub mod install;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

use crate::state::PartitionMap;

/// Standard step names for consistent messaging
pub mod steps {
    pub const VALIDATE: &str = "validate";
    pub const PARTITION: &str = "partition";
    pub const MOUNT: &str = "mount";
    pub const SIGNING: &str = "pacman-key";
    pub const MANIFEST: &str = "manifest";
    pub const PACSTRAP: &str = "pacstrap";
    pub const FSTAB: &str = "fstab";
    pub const CONFIGURE: &str = "configure";
    pub const BOOTLOADER: &str = "bootloader";
    pub const CLEANUP: &str = "cleanup";
}

/// Orchestrator phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Partitioning,
    Mounting,
    SigningSetup,
    InstallingPackages,
    GeneratingFstab,
    Configuring,
    InstallingBootloader,
    Cleanup,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    /// Step name reported for failures raised while in this phase
    pub fn step(&self) -> &'static str {
        match self {
            Phase::Partitioning => steps::PARTITION,
            Phase::Mounting => steps::MOUNT,
            Phase::SigningSetup => steps::SIGNING,
            Phase::InstallingPackages => steps::PACSTRAP,
            Phase::GeneratingFstab => steps::FSTAB,
            Phase::Configuring => steps::CONFIGURE,
            Phase::InstallingBootloader => steps::BOOTLOADER,
            Phase::Cleanup | Phase::Done | Phase::Failed => steps::CLEANUP,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Partitioning => "Partitioning",
            Phase::Mounting => "Mounting",
            Phase::SigningSetup => "SigningSetup",
            Phase::InstallingPackages => "InstallingPackages",
            Phase::GeneratingFstab => "GeneratingFstab",
            Phase::Configuring => "Configuring",
            Phase::InstallingBootloader => "InstallingBootloader",
            Phase::Cleanup => "Cleanup",
            Phase::Done => "Done",
            Phase::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// How an installation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Success,
    Failed {
        message: String,
        step: String,
        /// Network failures can be retried from disk selection
        recoverable: bool,
    },
}

impl InstallOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InstallOutcome::Success)
    }
}

/// Messages sent from the installation task to the control surface
#[derive(Debug, Clone)]
pub enum InstallEvent {
    /// Install log line (command echo or child output)
    Log(String),
    /// Phase transition with a fixed progress milestone
    Progress {
        phase: Phase,
        description: String,
        percent: u8,
    },
    /// Partitioning finished and produced these device paths
    Partitioned(PartitionMap),
    /// Terminal result, always the last event
    Done(InstallOutcome),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_done_and_failed_are_terminal() {
        assert!(Phase::Done.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(!Phase::Cleanup.is_terminal());
        assert!(!Phase::InstallingPackages.is_terminal());
    }

    #[test]
    fn test_phase_step_names() {
        assert_eq!(Phase::InstallingPackages.step(), "pacstrap");
        assert_eq!(Phase::Configuring.step(), "configure");
        assert_eq!(Phase::Partitioning.step(), "partition");
    }
}
