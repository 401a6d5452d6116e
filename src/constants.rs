//! Application-wide constants

use std::path::PathBuf;

// =============================================================================
// Paths
// =============================================================================

/// Mount point of the target filesystem tree during installation
pub const MOUNT_POINT: &str = "/mnt/amicachy";

/// Installer data directory (optional overrides, package manifest, scripts)
pub const INSTALLER_DATA_DIR: &str = "/usr/share/amicachy/installer";

/// Append-only install transcript
pub const INSTALL_LOG_PATH: &str = "/tmp/amicachy-install.log";

/// Host package manager configuration used when the installer ships none
pub const HOST_PACMAN_CONF: &str = "/etc/pacman.conf";

/// System-wide installer configuration file
pub const CONFIG_FILE: &str = "/etc/amicachy/installer.toml";

/// Package manifest filename inside the installer data directory
pub const PACKAGE_MANIFEST: &str = "packages.x86_64";

/// Diagnostic log directory relative to home
const DATA_SUBDIR: &str = ".local/share/amicachy";

/// Fallback diagnostic log directory when home is unavailable
const FALLBACK_DATA_DIR: &str = "/tmp/amicachy";

/// Diagnostic log filename prefix (rolled daily)
pub const DIAGNOSTIC_LOG_FILE: &str = "installer.log";

// =============================================================================
// Repository
// =============================================================================

/// CachyOS repository signing key
pub const CACHYOS_GPG_KEY: &str = "882DCFE48E2051D48E2562ABF3B607488DB35A47";

/// Mirror lists copied from the installer data directory when present
pub const MIRRORLISTS: &[&str] = &["cachyos-mirrorlist", "cachyos-v3-mirrorlist"];

// =============================================================================
// Disk policy
// =============================================================================

/// Smallest disk offered as an installation target (20 GiB)
pub const MIN_DISK_SIZE: u64 = 20 * 1024 * 1024 * 1024;

/// Data partitions below this size trigger a warning (10 GiB)
pub const SMALL_DATA_PARTITION: u64 = 10 * 1024 * 1024 * 1024;

/// Unmount attempts before falling back to a lazy forced unmount
pub const UNMOUNT_ATTEMPTS: u32 = 3;

// =============================================================================
// Target system
// =============================================================================

/// Supplementary groups of the primary user
pub const USER_GROUPS: &str = "wheel,audio,video,input";

/// GECOS comment of the primary user
pub const USER_COMMENT: &str = "Amiga User";

/// Launch scripts installed into /usr/bin
pub const LAUNCH_SCRIPTS: &[&str] = &["amilaunch.sh", "start_dev_env.sh"];

/// Emulator configurations installed into /usr/share/amicachy/uae
pub const UAE_CONFIGS: &[&str] = &["a1200.uae", "os41.uae"];

/// labwc files installed into ~/.config/labwc
pub const LABWC_FILES: &[&str] = &["autostart", "environment", "rc.xml"];

/// Directory scaffolding created under the user's home
pub const AMIGA_DIRS: &[&str] = &["kickstarts", "disks", "hdf", "os41/system", "os41/work"];

/// Kernel image installed by linux-cachyos
pub const KERNEL_IMAGE: &str = "/vmlinuz-linux-cachyos";

/// Initramfs matching KERNEL_IMAGE
pub const INITRAMFS_IMAGE: &str = "/initramfs-linux-cachyos.img";

// =============================================================================
// Control surface
// =============================================================================

/// Install log lines shown next to a failure
pub const LOG_TAIL_LINES: usize = 30;

/// Directory for diagnostic logs
/// Falls back to /tmp/amicachy if home directory is unavailable
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(DATA_SUBDIR))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_DATA_DIR))
}
