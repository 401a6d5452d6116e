//! Installer configuration file support
//!
//! Loads configuration from TOML at /etc/amicachy/installer.toml (or the path
//! given with --config). Falls back to defaults if the file doesn't exist or
//! can't be parsed.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants;

/// Installer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Filesystem locations
    pub paths: PathConfig,

    /// Fixed delays
    pub timing: TimingConfig,

    /// Target system identity
    pub system: SystemConfig,

    /// Package repository trust
    pub repository: RepositoryConfig,
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Where the target tree is mounted during installation
    pub mount_point: PathBuf,

    /// Installer data directory (manifest, overrides, scripts)
    pub installer_data_dir: PathBuf,

    /// Append-only install transcript
    pub install_log: PathBuf,

    /// Repository configuration used when the installer ships none
    pub host_pacman_conf: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from(constants::MOUNT_POINT),
            installer_data_dir: PathBuf::from(constants::INSTALLER_DATA_DIR),
            install_log: PathBuf::from(constants::INSTALL_LOG_PATH),
            host_pacman_conf: PathBuf::from(constants::HOST_PACMAN_CONF),
        }
    }
}

/// Timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait after partprobe before formatting (milliseconds)
    pub partition_settle_ms: u64,

    /// Delay between unmount attempts (milliseconds)
    pub unmount_retry_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            partition_settle_ms: 1000,
            unmount_retry_delay_ms: 2000,
        }
    }
}

impl TimingConfig {
    pub fn partition_settle(&self) -> Duration {
        Duration::from_millis(self.partition_settle_ms)
    }

    pub fn unmount_retry_delay(&self) -> Duration {
        Duration::from_millis(self.unmount_retry_delay_ms)
    }
}

/// Target system settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub hostname: String,
    /// Zone name under /usr/share/zoneinfo
    pub timezone: String,
    pub locale: String,
    pub keymap: String,
    pub console_font: String,
    /// Primary unprivileged user (auto-login on tty1)
    pub username: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            hostname: "amicachy".to_string(),
            timezone: "UTC".to_string(),
            locale: "en_US.UTF-8".to_string(),
            keymap: "us".to_string(),
            console_font: "ter-v16n".to_string(),
            username: "amiga".to_string(),
        }
    }
}

/// Repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// GPG key imported and locally signed before pacstrap
    pub signing_key: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            signing_key: constants::CACHYOS_GPG_KEY.to_string(),
        }
    }
}

impl InstallerConfig {
    /// Load configuration from `path` (or the system file), or return defaults
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.unwrap_or_else(|| Path::new(constants::CONFIG_FILE));

        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Generate example configuration content
    pub fn example_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    /// Path of the package manifest in the installer data directory
    pub fn manifest_path(&self) -> PathBuf {
        self.paths.installer_data_dir.join(constants::PACKAGE_MANIFEST)
    }
}
