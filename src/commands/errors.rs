//! Installation error taxonomy and failure classification
//!
//! Step functions return `InstallError`; the orchestrator is the single
//! place that catches it. Package-download failures whose output points at
//! name resolution or connectivity become recoverable network errors so the
//! control surface can offer a retry from disk selection.

use thiserror::Error;

use super::executor::CommandError;
use super::steps;

/// A failed installation step
#[derive(Debug, Error)]
pub enum InstallError {
    /// Any step failure not classified as network-related
    #[error("{message}")]
    Fatal { step: &'static str, message: String },

    /// Package download failed for network reasons
    #[error("Network error during package installation: {message}")]
    Network { message: String },

    /// Anything outside the modeled command failures (I/O, task failures)
    #[error("Unexpected error: {message}")]
    Unexpected { step: &'static str, message: String },
}

impl InstallError {
    pub fn fatal(step: &'static str, message: impl Into<String>) -> Self {
        InstallError::Fatal {
            step,
            message: message.into(),
        }
    }

    pub fn unexpected(step: &'static str, message: impl Into<String>) -> Self {
        InstallError::Unexpected {
            step,
            message: message.into(),
        }
    }

    /// Attach a step name to a command failure
    pub fn from_command(step: &'static str, err: CommandError) -> Self {
        match err {
            CommandError::Exit { .. } => InstallError::fatal(step, err.to_string()),
            CommandError::Spawn { .. } => InstallError::unexpected(step, err.to_string()),
        }
    }

    /// Step at which the failure occurred
    pub fn step(&self) -> &'static str {
        match self {
            InstallError::Fatal { step, .. } | InstallError::Unexpected { step, .. } => step,
            InstallError::Network { .. } => steps::PACSTRAP,
        }
    }

    /// Whether the control surface should offer a retry
    pub fn is_recoverable(&self) -> bool {
        matches!(self, InstallError::Network { .. })
    }

    /// Tag prefixed to the install log line reporting this error
    pub fn log_tag(&self) -> &'static str {
        match self {
            InstallError::Fatal { .. } => "ERROR",
            InstallError::Network { .. } => "NETWORK ERROR",
            InstallError::Unexpected { .. } => "UNEXPECTED ERROR",
        }
    }
}

/// Attach a step name to lower-level failures
pub trait StepResultExt<T> {
    fn in_step(self, step: &'static str) -> Result<T, InstallError>;
}

impl<T> StepResultExt<T> for Result<T, CommandError> {
    fn in_step(self, step: &'static str) -> Result<T, InstallError> {
        self.map_err(|e| InstallError::from_command(step, e))
    }
}

impl<T> StepResultExt<T> for std::io::Result<T> {
    fn in_step(self, step: &'static str) -> Result<T, InstallError> {
        self.map_err(|e| InstallError::unexpected(step, e.to_string()))
    }
}

/// A recognised network failure with a user-facing hint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDiagnosis {
    pub summary: &'static str,
    pub suggestion: &'static str,
}

/// (pattern, summary, suggestion); matched case-insensitively in order
const NETWORK_PATTERNS: &[(&str, &str, &str)] = &[
    (
        "could not resolve",
        "DNS resolution failed",
        "Check your internet connection and DNS settings, then retry.",
    ),
    (
        "temporary failure in name resolution",
        "DNS resolution failed",
        "Check your internet connection and DNS settings, then retry.",
    ),
    (
        "connection timed out",
        "Connection timed out",
        "A mirror did not answer in time. Check your connection and retry.",
    ),
    (
        "connection refused",
        "Connection refused",
        "A mirror refused the connection. Retry later or pick another mirror.",
    ),
    (
        "network is unreachable",
        "Network unreachable",
        "No network connectivity. Connect a cable or configure Wi-Fi, then retry.",
    ),
    (
        "no route to host",
        "Cannot reach host",
        "Network routing issue. Check your connection and retry.",
    ),
    (
        "connection",
        "Connection failed",
        "Check your internet connection and retry.",
    ),
];

/// Classify command output as a network failure
pub fn diagnose_network_failure(output: &str) -> Option<NetworkDiagnosis> {
    let lower = output.to_lowercase();
    NETWORK_PATTERNS
        .iter()
        .find(|(pattern, _, _)| lower.contains(pattern))
        .map(|(_, summary, suggestion)| NetworkDiagnosis {
            summary,
            suggestion,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_is_recoverable_pacstrap() {
        let err = InstallError::Network {
            message: "boom".to_string(),
        };
        assert_eq!(err.step(), "pacstrap");
        assert!(err.is_recoverable());
        assert_eq!(err.log_tag(), "NETWORK ERROR");
        assert_eq!(
            err.to_string(),
            "Network error during package installation: boom"
        );
    }

    #[test]
    fn test_fatal_keeps_step() {
        let err = InstallError::fatal(steps::PARTITION, "parted exploded");
        assert_eq!(err.step(), "partition");
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "parted exploded");
    }

    #[test]
    fn test_unexpected_message() {
        let err = InstallError::unexpected(steps::CONFIGURE, "permission denied");
        assert_eq!(err.to_string(), "Unexpected error: permission denied");
        assert_eq!(err.log_tag(), "UNEXPECTED ERROR");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_in_step_maps_exit_to_fatal() {
        let result: Result<(), CommandError> = Err(CommandError::Exit {
            code: 2,
            command: "mount /dev/sdb2 /mnt".to_string(),
            output: String::new(),
        });
        let err = result.in_step(steps::MOUNT).unwrap_err();
        assert!(matches!(err, InstallError::Fatal { step: "mount", .. }));
        assert!(err.to_string().contains("exit 2"));
    }

    #[test]
    fn test_in_step_maps_io_to_unexpected() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = result.in_step(steps::CONFIGURE).unwrap_err();
        assert!(matches!(err, InstallError::Unexpected { step: "configure", .. }));
    }

    #[test]
    fn test_diagnose_resolution_failure() {
        let diag =
            diagnose_network_failure("error: failed retrieving file: Could not resolve host: mirror")
                .unwrap();
        assert_eq!(diag.summary, "DNS resolution failed");
    }

    #[test]
    fn test_diagnose_connection_timeout() {
        let diag = diagnose_network_failure("curl: (28) Connection timed out after 10001 ms").unwrap();
        assert_eq!(diag.summary, "Connection timed out");
    }

    #[test]
    fn test_diagnose_generic_connection() {
        assert!(diagnose_network_failure("lost connection to mirror").is_some());
    }

    #[test]
    fn test_non_network_output() {
        assert!(diagnose_network_failure("error: target not found: linux-foo").is_none());
    }
}
