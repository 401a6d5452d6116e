//! Unmounting the target, on success and after a failure

use std::time::Duration;

use super::mount::{boot_mount_dir, data_mount_dir};
use crate::commands::errors::{InstallError, StepResultExt};
use crate::commands::executor::{CommandLine, ProcessSpawner};
use crate::commands::runner::CommandRunner;
use crate::commands::steps;
use crate::constants::UNMOUNT_ATTEMPTS;

/// Flush buffers and unmount the whole target tree.
/// Retries the recursive unmount, then falls back to a lazy forced unmount
/// whose outcome is ignored.
pub async fn final_cleanup<S: ProcessSpawner>(
    runner: &CommandRunner<S>,
    retry_delay: Duration,
) -> Result<(), InstallError> {
    runner
        .run(&CommandLine::new("sync"))
        .await
        .in_step(steps::CLEANUP)?;

    let target = runner.mount_point().to_string_lossy().into_owned();
    for attempt in 1..=UNMOUNT_ATTEMPTS {
        let cmd = CommandLine::new("umount").args(["-R", target.as_str()]);
        match runner.run_unchecked(&cmd).await {
            Ok(result) if result.success() => return Ok(()),
            Ok(result) => tracing::warn!(
                "Unmount attempt {}/{} exited with {}",
                attempt,
                UNMOUNT_ATTEMPTS,
                result.exit_code
            ),
            Err(e) => tracing::warn!("Unmount attempt {}/{} failed: {}", attempt, UNMOUNT_ATTEMPTS, e),
        }
        if attempt < UNMOUNT_ATTEMPTS {
            tokio::time::sleep(retry_delay).await;
        }
    }

    tracing::warn!("Target still busy, forcing lazy unmount");
    let forced = CommandLine::new("umount").args(["-lfR", target.as_str()]);
    if let Err(e) = runner.run_unchecked(&forced).await {
        tracing::warn!("Forced unmount failed: {}", e);
    }
    Ok(())
}

/// Best-effort unmount of data, boot and root after a failed install.
/// Never fails.
pub async fn emergency_cleanup<S: ProcessSpawner>(runner: &CommandRunner<S>, username: &str) {
    let root = runner.mount_point().to_path_buf();
    for path in [data_mount_dir(&root, username), boot_mount_dir(&root), root.clone()] {
        let cmd = CommandLine::new("umount").arg(path.to_string_lossy());
        match runner.run_unchecked(&cmd).await {
            Ok(result) if !result.success() => {
                tracing::debug!("{} was not unmounted (exit {})", path.display(), result.exit_code)
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Emergency unmount of {} failed: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::install::tests::test_runner;
    use crate::commands::testing::{calls_matching, Script, ScriptedSpawner};

    #[tokio::test]
    async fn test_clean_unmount_stops_after_first_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new();
        let calls = spawner.calls();
        let (runner, _rx) = test_runner(spawner, dir.path());

        final_cleanup(&runner, Duration::ZERO).await.unwrap();

        let mnt = runner.mount_point().display().to_string();
        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &["sync".to_string(), format!("umount -R {}", mnt)]
        );
    }

    #[tokio::test]
    async fn test_unmount_retries_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new()
            .script_once("umount -R", Script::exit(32).lines(["umount: target is busy."]));
        let calls = spawner.calls();
        let (runner, _rx) = test_runner(spawner, dir.path());

        final_cleanup(&runner, Duration::ZERO).await.unwrap();

        assert_eq!(calls_matching(&calls, "umount -R").len(), 2);
        assert!(calls_matching(&calls, "umount -lfR").is_empty());
    }

    #[tokio::test]
    async fn test_unmount_gives_up_after_three_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new()
            .script("umount -R", Script::exit(32))
            .script("umount -lfR", Script::exit(1));
        let calls = spawner.calls();
        let (runner, _rx) = test_runner(spawner, dir.path());

        // Forced unmount failure is not an error
        final_cleanup(&runner, Duration::ZERO).await.unwrap();

        assert_eq!(calls_matching(&calls, "umount -R").len(), 3);
        assert_eq!(calls_matching(&calls, "umount -lfR").len(), 1);
    }

    #[tokio::test]
    async fn test_emergency_cleanup_ignores_failures() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new()
            .script_once("umount", Script::exit(32))
            .script_once("umount", Script::missing());
        let calls = spawner.calls();
        let (runner, _rx) = test_runner(spawner, dir.path());
        let mnt = runner.mount_point().display().to_string();

        emergency_cleanup(&runner, "amiga").await;

        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &[
                format!("umount {}/home/amiga/Amiga", mnt),
                format!("umount {}/boot", mnt),
                format!("umount {}", mnt),
            ]
        );
    }
}
