//! Repository trust and the pacstrap package bootstrap

use std::path::{Path, PathBuf};

use crate::commands::errors::{diagnose_network_failure, InstallError};
use crate::commands::executor::{CommandError, CommandLine, ProcessSpawner};
use crate::commands::runner::CommandRunner;
use crate::commands::steps;
use crate::config::PathConfig;

/// Import and locally sign the repository key. Best-effort: the key may
/// already be trusted, so failures are only logged.
pub async fn setup_signing<S: ProcessSpawner>(runner: &CommandRunner<S>, key: &str) {
    for action in ["--recv-keys", "--lsign-key"] {
        let cmd = CommandLine::new("pacman-key").args([action, key]);
        match runner.run_unchecked(&cmd).await {
            Ok(result) if result.success() => {}
            Ok(result) => tracing::warn!(
                "pacman-key {} exited with {}, continuing",
                action,
                result.exit_code
            ),
            Err(e) => tracing::warn!("pacman-key {} failed: {}, continuing", action, e),
        }
    }
}

/// Package names from manifest text: one per line, `#` comments and blank lines skipped
pub fn parse_manifest(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Read the package manifest
pub fn read_manifest(path: &Path) -> Result<Vec<String>, InstallError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        InstallError::unexpected(
            steps::MANIFEST,
            format!("cannot read package manifest {}: {}", path.display(), e),
        )
    })?;
    let packages = parse_manifest(&content);
    if packages.is_empty() {
        return Err(InstallError::fatal(
            steps::MANIFEST,
            format!("Package manifest {} lists no packages", path.display()),
        ));
    }
    Ok(packages)
}

/// Repository configuration for pacstrap: the installer's own, else the host's
pub fn pacman_conf(paths: &PathConfig) -> PathBuf {
    let installer_conf = paths.installer_data_dir.join("pacman.conf");
    if installer_conf.exists() {
        installer_conf
    } else {
        tracing::info!(
            "No installer pacman.conf, using {}",
            paths.host_pacman_conf.display()
        );
        paths.host_pacman_conf.clone()
    }
}

/// Bootstrap `packages` into the mounted target
pub async fn install_packages<S: ProcessSpawner>(
    runner: &CommandRunner<S>,
    packages: &[String],
    paths: &PathConfig,
) -> Result<(), InstallError> {
    let conf = pacman_conf(paths);
    let cmd = CommandLine::new("pacstrap")
        .arg("-C")
        .arg(conf.to_string_lossy())
        .arg(runner.mount_point().to_string_lossy())
        .args(packages.iter().cloned());

    tracing::info!("Installing {} packages", packages.len());
    runner
        .run(&cmd)
        .await
        .map(|_| ())
        .map_err(classify_pacstrap_failure)
}

/// Network-looking failures become recoverable; everything else is fatal
fn classify_pacstrap_failure(err: CommandError) -> InstallError {
    if let Some(diagnosis) = diagnose_network_failure(err.output()) {
        tracing::warn!("pacstrap failed: {}", diagnosis.summary);
        return InstallError::Network {
            message: err.to_string(),
        };
    }
    InstallError::from_command(steps::PACSTRAP, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::install::tests::test_runner;
    use crate::commands::testing::{Script, ScriptedSpawner};

    #[test]
    fn test_parse_manifest() {
        let content = "base\nlinux-cachyos\n#comment\n\n  networkmanager  \n   # indented comment\n";
        assert_eq!(
            parse_manifest(content),
            vec!["base", "linux-cachyos", "networkmanager"]
        );
    }

    #[test]
    fn test_read_manifest_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packages.x86_64");
        std::fs::write(&path, "base\n#comment\n\nlinux-cachyos\n").unwrap();
        let first = read_manifest(&path).unwrap();
        let second = read_manifest(&path).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec!["base", "linux-cachyos"]);
    }

    #[test]
    fn test_missing_manifest_is_unexpected() {
        let err = read_manifest(Path::new("/nonexistent/packages.x86_64")).unwrap_err();
        assert!(matches!(err, InstallError::Unexpected { step: "manifest", .. }));
    }

    #[test]
    fn test_empty_manifest_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packages.x86_64");
        std::fs::write(&path, "# nothing here\n").unwrap();
        let err = read_manifest(&path).unwrap_err();
        assert!(matches!(err, InstallError::Fatal { step: "manifest", .. }));
    }

    #[test]
    fn test_pacman_conf_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathConfig {
            installer_data_dir: dir.path().to_path_buf(),
            host_pacman_conf: PathBuf::from("/etc/pacman.conf"),
            ..PathConfig::default()
        };
        assert_eq!(pacman_conf(&paths), PathBuf::from("/etc/pacman.conf"));

        std::fs::write(dir.path().join("pacman.conf"), "[options]\n").unwrap();
        assert_eq!(pacman_conf(&paths), dir.path().join("pacman.conf"));
    }

    #[tokio::test]
    async fn test_signing_failures_are_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new()
            .script("pacman-key --recv-keys", Script::exit(2))
            .script("pacman-key --lsign-key", Script::missing());
        let calls = spawner.calls();
        let (runner, _rx) = test_runner(spawner, dir.path());

        setup_signing(&runner, "ABCD").await;

        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &["pacman-key --recv-keys ABCD", "pacman-key --lsign-key ABCD"]
        );
    }

    async fn pacstrap_with(output: &str, code: i32) -> Result<(), InstallError> {
        let dir = tempfile::tempdir().unwrap();
        let spawner =
            ScriptedSpawner::new().script("pacstrap", Script::exit(code).lines([output]));
        let (runner, _rx) = test_runner(spawner, dir.path());
        let paths = PathConfig {
            installer_data_dir: dir.path().join("data"),
            ..PathConfig::default()
        };
        install_packages(&runner, &["base".to_string()], &paths).await
    }

    #[tokio::test]
    async fn test_resolution_failure_is_recoverable() {
        let err = pacstrap_with(
            "error: failed retrieving file 'core.db' from mirror : Could not resolve host: mirror",
            1,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, InstallError::Network { .. }));
        assert_eq!(err.step(), "pacstrap");
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_other_pacstrap_failure_is_fatal() {
        let err = pacstrap_with("error: target not found: linux-foo", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::Fatal { step: "pacstrap", .. }));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_pacstrap_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new();
        let calls = spawner.calls();
        let (runner, _rx) = test_runner(spawner, dir.path());
        let paths = PathConfig {
            installer_data_dir: dir.path().join("data"),
            host_pacman_conf: PathBuf::from("/etc/pacman.conf"),
            ..PathConfig::default()
        };
        let packages = vec!["base".to_string(), "linux-cachyos".to_string()];

        install_packages(&runner, &packages, &paths).await.unwrap();

        assert_eq!(
            calls.lock().unwrap()[0],
            format!(
                "pacstrap -C /etc/pacman.conf {} base linux-cachyos",
                runner.mount_point().display()
            )
        );
    }
}
