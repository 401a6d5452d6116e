//! Async process spawning with line-by-line output streaming

use std::future::Future;
use std::io;
use std::os::fd::OwnedFd;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::unix::pipe;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Environment variables removed from every child so signing tools never prompt
const INTERACTIVE_ENV: &[&str] = &["GPG_TTY", "WAYLAND_DISPLAY", "PINENTRY_USER_DATA"];

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    /// Read stderr on its own pipe instead of sharing stdout's
    pub separate_stderr: bool,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            separate_stderr: false,
        }
    }

    /// Keep stderr apart so stdout can be used as data.
    /// Lines from the two pipes are no longer strictly ordered.
    pub fn separate_stderr(mut self) -> Self {
        self.separate_stderr = true;
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Pipe an output line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// stdout and stderr sharing one pipe
    Combined,
    Stdout,
    Stderr,
}

/// One line of child output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: Stream,
    pub text: String,
}

impl OutputLine {
    pub fn new(stream: Stream, text: impl Into<String>) -> Self {
        Self {
            stream,
            text: text.into(),
        }
    }
}

/// Exit code and collected output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    /// Every line in arrival order
    pub output: Vec<String>,
    /// Lines not read from a separate stderr pipe
    pub stdout: Vec<String>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// All output lines joined with newlines
    pub fn text(&self) -> String {
        self.output.join("\n")
    }
}

/// Failure to run a command
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Command failed (exit {code}): {command}")]
    Exit {
        code: i32,
        command: String,
        /// Captured stdout/stderr, used for failure classification
        output: String,
    },
}

impl CommandError {
    /// Captured output of a failed command (empty for spawn failures)
    pub fn output(&self) -> &str {
        match self {
            CommandError::Exit { output, .. } => output,
            CommandError::Spawn { .. } => "",
        }
    }
}

/// Launches child processes on behalf of the installer
///
/// The system implementation runs real programs; tests substitute a scripted
/// spawner so the whole workflow can run without touching block devices.
pub trait ProcessSpawner: Send + Sync {
    /// Run `cmd` to completion, sending each output line to `lines` as soon
    /// as it is read. Unless `cmd.separate_stderr` is set, stdout and stderr
    /// share one pipe and arrive in the order the child wrote them.
    /// Resolves to the exit code.
    fn spawn(
        &self,
        cmd: &CommandLine,
        env: &[(String, String)],
        lines: mpsc::UnboundedSender<OutputLine>,
    ) -> impl Future<Output = io::Result<i32>> + Send;

    /// Whether `path` exists and is a block device node
    fn is_block_device(&self, path: &Path) -> bool {
        use std::os::unix::fs::FileTypeExt;
        std::fs::metadata(path)
            .map(|m| m.file_type().is_block_device())
            .unwrap_or(false)
    }
}

/// Spawns real processes through tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSpawner;

impl ProcessSpawner for SystemSpawner {
    async fn spawn(
        &self,
        cmd: &CommandLine,
        env: &[(String, String)],
        lines: mpsc::UnboundedSender<OutputLine>,
    ) -> io::Result<i32> {
        tracing::debug!("Spawning: {}", cmd);

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args).stdin(Stdio::null()).env("DISPLAY", "");
        for key in INTERACTIVE_ENV {
            command.env_remove(key);
        }
        for (key, value) in env {
            command.env(key, value);
        }

        let mut readers: Vec<(Stream, JoinHandle<()>)> = Vec::new();
        let mut child = if cmd.separate_stderr {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
            let mut child = command.spawn()?;
            let stdout = child.stdout.take().ok_or_else(|| {
                io::Error::other(format!("Failed to capture stdout for {}", cmd.program))
            })?;
            let stderr = child.stderr.take().ok_or_else(|| {
                io::Error::other(format!("Failed to capture stderr for {}", cmd.program))
            })?;
            readers.push((
                Stream::Stdout,
                tokio::spawn(forward_lines(stdout, Stream::Stdout, lines.clone())),
            ));
            readers.push((
                Stream::Stderr,
                tokio::spawn(forward_lines(stderr, Stream::Stderr, lines)),
            ));
            child
        } else {
            let (reader, writer) = io::pipe()?;
            command.stdout(writer.try_clone()?).stderr(writer);
            let child = command.spawn()?;
            // Our copies of the write end must close or the reader never sees EOF
            drop(command);
            let receiver = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
            readers.push((
                Stream::Combined,
                tokio::spawn(forward_lines(receiver, Stream::Combined, lines)),
            ));
            child
        };

        let status = child.wait().await?;

        // Readers finish once the pipes close; a grandchild holding them open must not hang us
        for (stream, mut task) in readers {
            match tokio::time::timeout(Duration::from_secs(5), &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("{:?} reader task panicked: {}", stream, e),
                Err(_) => {
                    tracing::warn!("{:?} reader task timed out for {}", stream, cmd.program);
                    task.abort();
                }
            }
        }

        // Killed by a signal: no exit code
        Ok(status.code().unwrap_or(-1))
    }
}

/// Read a pipe line by line and forward each line; invalid UTF-8 is replaced
async fn forward_lines<R>(pipe: R, stream: Stream, lines: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let text = text.trim_end_matches(['\n', '\r']);
                if lines.send(OutputLine::new(stream, text)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Failed to read child output: {}", e);
                break;
            }
        }
    }
}
