//! Scripted process spawner for tests
//!
//! Records every command line and replays canned exit codes and output,
//! matched by command-line prefix. Unscripted commands succeed silently.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::executor::{CommandLine, OutputLine, ProcessSpawner, Stream};

/// Canned behaviour for matching commands
#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    exit_code: i32,
    lines: Vec<String>,
    stderr: Vec<String>,
    spawn_error: bool,
    panics: bool,
}

impl Script {
    pub(crate) fn ok() -> Self {
        Self::default()
    }

    pub(crate) fn exit(code: i32) -> Self {
        Self {
            exit_code: code,
            ..Self::default()
        }
    }

    /// The program cannot be launched at all
    pub(crate) fn missing() -> Self {
        Self {
            spawn_error: true,
            ..Self::default()
        }
    }

    /// The spawner itself panics, as a bug inside a step would
    pub(crate) fn panics() -> Self {
        Self {
            panics: true,
            ..Self::default()
        }
    }

    /// Lines written to stdout
    pub(crate) fn lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Lines written to stderr after the stdout lines
    pub(crate) fn stderr<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stderr = lines.into_iter().map(Into::into).collect();
        self
    }
}

struct Rule {
    prefix: String,
    script: Script,
    once: bool,
}

#[derive(Clone)]
pub(crate) struct ScriptedSpawner {
    rules: Arc<Mutex<Vec<Rule>>>,
    calls: Arc<Mutex<Vec<String>>>,
    envs: Arc<Mutex<Vec<Vec<(String, String)>>>>,
    block_devices: bool,
}

impl ScriptedSpawner {
    pub(crate) fn new() -> Self {
        Self {
            rules: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            envs: Arc::new(Mutex::new(Vec::new())),
            block_devices: true,
        }
    }

    /// Every command starting with `prefix` behaves like `script`
    pub(crate) fn script(self, prefix: &str, script: Script) -> Self {
        self.push(prefix, script, false)
    }

    /// The next command starting with `prefix` behaves like `script`;
    /// once rules are consulted before persistent ones
    pub(crate) fn script_once(self, prefix: &str, script: Script) -> Self {
        self.push(prefix, script, true)
    }

    /// Partition paths are reported as missing block devices
    pub(crate) fn without_block_devices(mut self) -> Self {
        self.block_devices = false;
        self
    }

    fn push(self, prefix: &str, script: Script, once: bool) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                prefix: prefix.to_string(),
                script,
                once,
            });
        }
        self
    }

    /// Shared handle to the recorded command lines
    pub(crate) fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    /// Shared handle to the extra environment of each call
    pub(crate) fn envs(&self) -> Arc<Mutex<Vec<Vec<(String, String)>>>> {
        Arc::clone(&self.envs)
    }

    fn lookup(&self, line: &str) -> Script {
        let mut rules = self.rules.lock().unwrap();
        let once = rules
            .iter()
            .position(|r| r.once && line.starts_with(&r.prefix));
        if let Some(index) = once {
            return rules.remove(index).script;
        }
        rules
            .iter()
            .find(|r| line.starts_with(&r.prefix))
            .map(|r| r.script.clone())
            .unwrap_or_default()
    }
}

impl ProcessSpawner for ScriptedSpawner {
    async fn spawn(
        &self,
        cmd: &CommandLine,
        env: &[(String, String)],
        lines: mpsc::UnboundedSender<OutputLine>,
    ) -> io::Result<i32> {
        let line = cmd.to_string();
        self.calls.lock().unwrap().push(line.clone());
        self.envs.lock().unwrap().push(env.to_vec());

        let script = self.lookup(&line);
        if script.panics {
            panic!("scripted panic in {}", line);
        }
        if script.spawn_error {
            return Err(io::Error::new(io::ErrorKind::NotFound, "No such file or directory"));
        }
        let (out, err) = if cmd.separate_stderr {
            (Stream::Stdout, Stream::Stderr)
        } else {
            (Stream::Combined, Stream::Combined)
        };
        for text in script.lines {
            let _ = lines.send(OutputLine::new(out, text));
        }
        for text in script.stderr {
            let _ = lines.send(OutputLine::new(err, text));
        }
        Ok(script.exit_code)
    }

    fn is_block_device(&self, _path: &Path) -> bool {
        self.block_devices
    }
}

/// Recorded calls starting with `prefix`
pub(crate) fn calls_matching(calls: &Arc<Mutex<Vec<String>>>, prefix: &str) -> Vec<String> {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.starts_with(prefix))
        .cloned()
        .collect()
}
