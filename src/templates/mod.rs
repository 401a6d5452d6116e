//! Target system file template generators

use crate::constants::{INITRAMFS_IMAGE, KERNEL_IMAGE};
use crate::profile::Profile;

/// PAM stack for the cage kiosk compositor when the installer ships none
pub const PAM_CAGE_DEFAULT: &str = "#%PAM-1.0
auth       required   pam_unix.so
auth       optional   pam_permit.so
account    required   pam_unix.so
account    optional   pam_permit.so
session    required   pam_unix.so
session    required   pam_loginuid.so
session    optional   pam_systemd.so
";

/// systemd-boot loader.conf
pub fn generate_loader_conf(default: Profile) -> String {
    format!(
        "default {}\ntimeout 5\neditor no\nconsole-mode max\n",
        default.entry_filename()
    )
}

/// systemd-boot entry for one profile
pub fn generate_boot_entry(profile: Profile) -> String {
    format!(
        "title   {title}\nlinux   {kernel}\ninitrd  {initrd}\noptions {options}\n",
        title = profile.title(),
        kernel = KERNEL_IMAGE,
        initrd = INITRAMFS_IMAGE,
        options = profile.kernel_options(),
    )
}

/// /etc/locale.gen with a single enabled locale
pub fn generate_locale_gen(locale: &str) -> String {
    let charset = locale
        .split_once('.')
        .map(|(_, charset)| charset)
        .unwrap_or("UTF-8");
    format!("{} {}\n", locale, charset)
}

/// /etc/locale.conf
pub fn generate_locale_conf(locale: &str) -> String {
    format!("LANG={}\nLC_COLLATE=C\n", locale)
}

/// /etc/vconsole.conf
pub fn generate_vconsole_conf(keymap: &str, font: &str) -> String {
    format!("KEYMAP={}\nFONT={}\n", keymap, font)
}

/// getty@tty1 drop-in that logs `username` in automatically
pub fn generate_autologin_override(username: &str) -> String {
    format!(
        r#"[Service]
ExecStart=
ExecStart=-/sbin/agetty --autologin {username} --noclear %I $TERM
Type=idle
"#
    )
}

/// limits.d entry granting realtime scheduling to the emulator user
pub fn generate_rt_limits(username: &str) -> String {
    format!(
        "{u}  -  rtprio    99\n{u}  -  memlock   unlimited\n{u}  -  nice      -20\n",
        u = username
    )
}

/// ~/.bash_profile that starts the launcher on tty1 only
pub fn generate_bash_profile(launcher: &str) -> String {
    format!(
        r#"# Auto-launch on TTY1
if [[ "$(tty)" == "/dev/tty1" ]]; then
    exec {launcher}
fi
"#
    )
}
