//! Post-bootstrap configuration of the target system
//!
//! Runs in a fixed order against the mounted tree, partly via arch-chroot.
//! Files that come from the installer data directory are optional: when a
//! source is missing the copy is skipped. Account creation, resource limits
//! and initramfs regeneration are mandatory.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::commands::errors::{InstallError, StepResultExt};
use crate::commands::executor::ProcessSpawner;
use crate::commands::runner::CommandRunner;
use crate::commands::steps;
use crate::config::InstallerConfig;
use crate::constants::{
    AMIGA_DIRS, LABWC_FILES, LAUNCH_SCRIPTS, MIRRORLISTS, UAE_CONFIGS, USER_COMMENT, USER_GROUPS,
};
use crate::templates;

/// Write `content` to `path`, creating parent directories
fn write_file(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

/// Copy `src` to `dest` if it exists. Returns whether a copy happened.
/// Missing sources and copy errors are logged, never raised.
fn copy_optional(src: &Path, dest: &Path) -> bool {
    if !src.exists() {
        tracing::debug!("Skipping {}: not present", src.display());
        return false;
    }
    let result = dest
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| fs::copy(src, dest));
    match result {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Failed to copy {} to {}: {}", src.display(), dest.display(), e);
            false
        }
    }
}

/// Paths of the installer-supplied overrides
struct InstallerData {
    root: PathBuf,
}

impl InstallerData {
    fn file(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

/// Configure the mounted target system
pub async fn configure_system<S: ProcessSpawner>(
    runner: &CommandRunner<S>,
    config: &InstallerConfig,
) -> Result<(), InstallError> {
    let system = &config.system;
    let user = system.username.as_str();
    let home = format!("home/{}", user);
    let data = InstallerData {
        root: config.paths.installer_data_dir.clone(),
    };
    if !data.root.is_dir() {
        tracing::warn!(
            "Installer data directory {} missing, optional files will be skipped",
            data.root.display()
        );
    }

    // Time
    runner
        .chroot([
            "ln".to_string(),
            "-sf".to_string(),
            format!("/usr/share/zoneinfo/{}", system.timezone),
            "/etc/localtime".to_string(),
        ])
        .await
        .in_step(steps::CONFIGURE)?;
    runner
        .chroot(["hwclock", "--systohc"])
        .await
        .in_step(steps::CONFIGURE)?;

    // Locale
    write_file(
        &runner.target("etc/locale.gen"),
        &templates::generate_locale_gen(&system.locale),
    )
    .in_step(steps::CONFIGURE)?;
    runner.chroot(["locale-gen"]).await.in_step(steps::CONFIGURE)?;
    write_file(
        &runner.target("etc/locale.conf"),
        &templates::generate_locale_conf(&system.locale),
    )
    .in_step(steps::CONFIGURE)?;

    write_file(&runner.target("etc/hostname"), &format!("{}\n", system.hostname))
        .in_step(steps::CONFIGURE)?;
    write_file(
        &runner.target("etc/vconsole.conf"),
        &templates::generate_vconsole_conf(&system.keymap, &system.console_font),
    )
    .in_step(steps::CONFIGURE)?;

    // Repository configuration
    copy_optional(&data.file("pacman.conf"), &runner.target("etc/pacman.conf"));
    for mirrorlist in MIRRORLISTS {
        copy_optional(
            &data.file(mirrorlist),
            &runner.target(&format!("etc/pacman.d/{}", mirrorlist)),
        );
    }

    // Primary user, passwordless
    runner
        .chroot(["useradd", "-m", "-G", USER_GROUPS, "-s", "/bin/bash", "-c", USER_COMMENT, user])
        .await
        .in_step(steps::CONFIGURE)?;
    runner
        .chroot(["passwd", "-d", user])
        .await
        .in_step(steps::CONFIGURE)?;

    write_file(
        &runner.target("etc/systemd/system/getty@tty1.service.d/autologin.conf"),
        &templates::generate_autologin_override(user),
    )
    .in_step(steps::CONFIGURE)?;
    write_file(
        &runner.target(&format!("etc/security/limits.d/90-{}-rtprio.conf", user)),
        &templates::generate_rt_limits(user),
    )
    .in_step(steps::CONFIGURE)?;

    // Kiosk compositor PAM stack
    let pam = runner.target("etc/pam.d/cage");
    if !copy_optional(&data.file("pam.d/cage"), &pam) {
        write_file(&pam, templates::PAM_CAGE_DEFAULT).in_step(steps::CONFIGURE)?;
    }

    for script in LAUNCH_SCRIPTS {
        let dest = runner.target(&format!("usr/bin/{}", script));
        if copy_optional(&data.file(script), &dest) {
            fs::set_permissions(&dest, fs::Permissions::from_mode(0o755))
                .in_step(steps::CONFIGURE)?;
        }
    }

    for uae in UAE_CONFIGS {
        copy_optional(
            &data.file(&format!("uae/{}", uae)),
            &runner.target(&format!("usr/share/amicachy/uae/{}", uae)),
        );
    }

    write_file(
        &runner.target(&format!("{}/.bash_profile", home)),
        &templates::generate_bash_profile(&format!("/usr/bin/{}", LAUNCH_SCRIPTS[0])),
    )
    .in_step(steps::CONFIGURE)?;

    for file in LABWC_FILES {
        copy_optional(
            &data.file(&format!("labwc/{}", file)),
            &runner.target(&format!("{}/.config/labwc/{}", home, file)),
        );
    }

    for dir in AMIGA_DIRS {
        fs::create_dir_all(runner.target(&format!("{}/{}", home, dir)))
            .in_step(steps::CONFIGURE)?;
    }

    runner
        .chroot([
            "chown".to_string(),
            "-R".to_string(),
            format!("{}:{}", user, user),
            format!("/{}", home),
        ])
        .await
        .in_step(steps::CONFIGURE)?;
    runner
        .chroot(["systemctl", "enable", "NetworkManager"])
        .await
        .in_step(steps::CONFIGURE)?;
    runner
        .chroot(["mkinitcpio", "-P"])
        .await
        .in_step(steps::CONFIGURE)?;

    tracing::info!("System configured");
    Ok(())
}
