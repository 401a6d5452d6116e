//! Append-only installation transcript
//!
//! Every executed command line is written as `>>> <command>` followed by the
//! child's interleaved stdout/stderr, one line per entry. The transcript is
//! separate from the tracing diagnostic log.

use chrono::Local;
use regex::Regex;
use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{LazyLock, Mutex};

/// CSI and OSC escape sequences emitted by pacman, systemd and friends
static ANSI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07]*\x07|\x1b[()][A-Z0-9]")
        .expect("ANSI escape regex pattern is statically validated")
});

/// Handle to the install log file
#[derive(Debug)]
pub struct InstallLog {
    file: Option<Mutex<File>>,
}

impl InstallLog {
    /// Open the log for appending and write a session header.
    /// A log that cannot be opened is disabled rather than failing the install.
    pub fn open(path: &Path) -> Self {
        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(Mutex::new(file)),
            Err(e) => {
                tracing::warn!("Cannot open install log {}: {}", path.display(), e);
                None
            }
        };
        let log = Self { file };
        log.append(&session_header());
        log
    }

    /// Append one line
    pub fn append(&self, line: &str) {
        let Some(file) = &self.file else {
            return;
        };
        match file.lock() {
            Ok(mut f) => {
                if let Err(e) = writeln!(f, "{}", line) {
                    tracing::warn!("Failed to write install log: {}", e);
                }
            }
            Err(e) => tracing::warn!("Install log lock poisoned: {}", e),
        }
    }
}

/// First line of every installer session
fn session_header() -> String {
    format!(
        "=== AmiCachy installation started {} ===",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

/// Remove terminal escape sequences from child output
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    ANSI_RE.replace_all(line, "")
}

/// Last `n` lines of the log at `path`
pub fn tail(path: &Path, n: usize) -> io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].iter().map(|l| l.to_string()).collect())
}
