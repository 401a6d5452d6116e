//! Command runner shared by every installation step
//!
//! Provides a unified way to:
//! - Run commands with the `>>> command` echo and live output streaming
//! - Mirror every line into the install log and the event channel
//! - Run commands inside the target via arch-chroot
//! - Report progress milestones

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::executor::{CommandError, CommandLine, CommandResult, OutputLine, ProcessSpawner, Stream};
use super::{InstallEvent, Phase};
use crate::install_log::{strip_ansi, InstallLog};
use crate::state::PartitionMap;

/// Change-root helper used for commands inside the target
const CHROOT: &str = "arch-chroot";

/// Runs commands for the orchestrator and forwards their output
pub struct CommandRunner<S> {
    spawner: Arc<S>,
    log: InstallLog,
    tx: mpsc::UnboundedSender<InstallEvent>,
    mount_point: PathBuf,
    last_percent: AtomicU8,
    phase: Mutex<Option<Phase>>,
}

impl<S: ProcessSpawner> CommandRunner<S> {
    pub fn new(
        spawner: Arc<S>,
        log: InstallLog,
        tx: mpsc::UnboundedSender<InstallEvent>,
        mount_point: impl Into<PathBuf>,
    ) -> Self {
        Self {
            spawner,
            log,
            tx,
            mount_point: mount_point.into(),
            last_percent: AtomicU8::new(0),
            phase: Mutex::new(None),
        }
    }

    pub fn spawner(&self) -> &S {
        &self.spawner
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Path inside the mounted target, e.g. `target("etc/hostname")`
    pub fn target(&self, relative: &str) -> PathBuf {
        self.mount_point.join(relative)
    }

    /// Write a line to the install log and the live log
    pub fn out(&self, line: &str) {
        self.log.append(line);
        // The receiver may be gone if the control surface quit; the log file still has it
        let _ = self.tx.send(InstallEvent::Log(line.to_string()));
    }

    /// Emit a progress milestone
    pub fn progress(&self, phase: Phase, description: &str, percent: u8) {
        tracing::info!("[{:>3}%] {}", percent, description);
        self.last_percent.store(percent, Ordering::Relaxed);
        if let Ok(mut current) = self.phase.lock() {
            *current = Some(phase);
        }
        let _ = self.tx.send(InstallEvent::Progress {
            phase,
            description: description.to_string(),
            percent,
        });
    }

    /// Most recent progress milestone
    pub fn last_percent(&self) -> u8 {
        self.last_percent.load(Ordering::Relaxed)
    }

    /// Phase of the most recent progress milestone, if any
    pub fn current_phase(&self) -> Option<Phase> {
        self.phase.lock().ok().and_then(|current| *current)
    }

    /// Announce the partition map once partitioning has completed
    pub fn partitioned(&self, map: &PartitionMap) {
        let _ = self.tx.send(InstallEvent::Partitioned(map.clone()));
    }

    /// Run a command and fail on non-zero exit
    pub async fn run(&self, cmd: &CommandLine) -> Result<CommandResult, CommandError> {
        self.run_with(cmd, true, &[]).await
    }

    /// Run a command and return its result whatever the exit code
    pub async fn run_unchecked(&self, cmd: &CommandLine) -> Result<CommandResult, CommandError> {
        self.run_with(cmd, false, &[]).await
    }

    /// Run a command inside the target root
    pub async fn chroot<I, A>(&self, args: I) -> Result<CommandResult, CommandError>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.run(&self.chroot_command(args)).await
    }

    /// Run a command inside the target root, ignoring its exit code
    pub async fn chroot_unchecked<I, A>(&self, args: I) -> Result<CommandResult, CommandError>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.run_unchecked(&self.chroot_command(args)).await
    }

    fn chroot_command<I, A>(&self, args: I) -> CommandLine
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        CommandLine::new(CHROOT)
            .arg(self.mount_point.to_string_lossy())
            .args(args)
    }

    /// Run a command, streaming every output line as it arrives
    pub async fn run_with(
        &self,
        cmd: &CommandLine,
        check: bool,
        env: &[(String, String)],
    ) -> Result<CommandResult, CommandError> {
        tracing::info!("Running command: {}", cmd);
        self.out(&format!(">>> {}", cmd));

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<OutputLine>();
        let mut output = Vec::new();
        let mut stdout = Vec::new();

        let spawn = self.spawner.spawn(cmd, env, line_tx);
        let collect = async {
            while let Some(line) = line_rx.recv().await {
                let text = strip_ansi(&line.text).into_owned();
                self.out(&text);
                if line.stream != Stream::Stderr {
                    stdout.push(text.clone());
                }
                output.push(text);
            }
        };
        let (status, ()) = tokio::join!(spawn, collect);

        let exit_code = status.map_err(|source| {
            tracing::error!("Failed to spawn {}: {}", cmd.program, source);
            CommandError::Spawn {
                command: cmd.to_string(),
                source,
            }
        })?;

        tracing::debug!("{} exited with {}", cmd.program, exit_code);
        let result = CommandResult {
            exit_code,
            output,
            stdout,
        };

        if check && !result.success() {
            tracing::warn!("Command failed (exit {}): {}", exit_code, cmd);
            return Err(CommandError::Exit {
                code: exit_code,
                command: cmd.to_string(),
                output: result.text(),
            });
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::executor::SystemSpawner;
    use crate::commands::testing::{Script, ScriptedSpawner};

    fn runner(
        spawner: ScriptedSpawner,
        dir: &Path,
    ) -> (
        CommandRunner<ScriptedSpawner>,
        mpsc::UnboundedReceiver<InstallEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let log = InstallLog::open(&dir.join("install.log"));
        (
            CommandRunner::new(Arc::new(spawner), log, tx, dir.join("mnt")),
            rx,
        )
    }

    fn drain_logs(rx: &mut mpsc::UnboundedReceiver<InstallEvent>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let InstallEvent::Log(line) = event {
                lines.push(line);
            }
        }
        lines
    }

    #[tokio::test]
    async fn test_run_echoes_command_and_streams_output() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new()
            .script("echo", Script::ok().lines(["\x1b[1mhello\x1b[0m", "world"]));
        let (runner, mut rx) = runner(spawner, dir.path());

        let result = runner
            .run(&CommandLine::new("echo").args(["hello", "world"]))
            .await
            .unwrap();
        assert_eq!(result.output, vec!["hello", "world"]);

        assert_eq!(
            drain_logs(&mut rx),
            vec![">>> echo hello world", "hello", "world"]
        );

        let log = crate::install_log::tail(&dir.path().join("install.log"), 3).unwrap();
        assert_eq!(log, vec![">>> echo hello world", "hello", "world"]);
    }

    #[tokio::test]
    async fn test_run_fails_on_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new().script("false", Script::exit(1).lines(["bad"]));
        let (runner, _rx) = runner(spawner, dir.path());

        let err = runner.run(&CommandLine::new("false")).await.unwrap_err();
        match err {
            CommandError::Exit { code, command, output } => {
                assert_eq!(code, 1);
                assert_eq!(command, "false");
                assert_eq!(output, "bad");
            }
            other => panic!("Expected Exit error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_unchecked_returns_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new().script("umount", Script::exit(32));
        let (runner, _rx) = runner(spawner, dir.path());

        let result = runner
            .run_unchecked(&CommandLine::new("umount").arg("/mnt"))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 32);
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_chroot_prefixes_mount_point() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new();
        let calls = spawner.calls();
        let (runner, _rx) = runner(spawner, dir.path());

        runner.chroot(["locale-gen"]).await.unwrap();

        let expected = format!("arch-chroot {} locale-gen", dir.path().join("mnt").display());
        assert_eq!(calls.lock().unwrap().as_slice(), &[expected]);
    }

    #[tokio::test]
    async fn test_run_with_passes_env() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new();
        let envs = spawner.envs();
        let (runner, _rx) = runner(spawner, dir.path());

        let env = vec![("LANG".to_string(), "C".to_string())];
        runner
            .run_with(&CommandLine::new("pacman-key").arg("--init"), true, &env)
            .await
            .unwrap();
        assert_eq!(envs.lock().unwrap()[0], env);
    }

    #[tokio::test]
    async fn test_progress_event() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, mut rx) = runner(ScriptedSpawner::new(), dir.path());

        runner.progress(Phase::Mounting, "Mounting filesystems...", 10);
        match rx.try_recv().unwrap() {
            InstallEvent::Progress { phase, percent, .. } => {
                assert_eq!(phase, Phase::Mounting);
                assert_eq!(percent, 10);
            }
            other => panic!("Expected Progress, got {:?}", other),
        }
        assert_eq!(runner.last_percent(), 10);
    }

    #[tokio::test]
    async fn test_output_arrives_while_command_runs() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let log = InstallLog::open(&dir.path().join("install.log"));
        let runner = CommandRunner::new(Arc::new(SystemSpawner), log, tx, dir.path().join("mnt"));

        let cmd = CommandLine::new("sh").args(["-c", "echo first; sleep 1; echo second"]);
        let run = runner.run(&cmd);
        tokio::pin!(run);

        loop {
            tokio::select! {
                biased;
                event = rx.recv() => {
                    if let Some(InstallEvent::Log(line)) = event {
                        if line == "first" {
                            break;
                        }
                    }
                }
                _ = &mut run => panic!("command finished before its first line was delivered"),
            }
        }

        let result = run.await.unwrap();
        assert_eq!(result.output, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_separate_stderr_is_logged_but_not_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let spawner = ScriptedSpawner::new().script(
            "genfstab",
            Script::ok().lines(["entry"]).stderr(["warning"]),
        );
        let (runner, mut rx) = runner(spawner, dir.path());

        let result = runner
            .run(&CommandLine::new("genfstab").separate_stderr())
            .await
            .unwrap();
        assert_eq!(result.stdout, vec!["entry"]);
        assert_eq!(result.output, vec!["entry", "warning"]);
        assert_eq!(drain_logs(&mut rx), vec![">>> genfstab", "entry", "warning"]);
    }

    #[tokio::test]
    async fn test_current_phase_follows_progress() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, _rx) = runner(ScriptedSpawner::new(), dir.path());

        assert_eq!(runner.current_phase(), None);
        runner.progress(Phase::Configuring, "Configuring system...", 74);
        assert_eq!(runner.current_phase(), Some(Phase::Configuring));
    }
}
