//! Command execution abstraction.
//!
//! Every external tool the cleanup layer touches (`diskutil`, `hdiutil`,
//! `xcrun simctl`, `launchctl`, `pgrep`, `df`, ...) is invoked through the
//! [`CommandRunner`] trait. The production implementation is
//! [`SubprocessRunner`]; tests inject a [`ScriptedRunner`](crate::scripted::ScriptedRunner)
//! that answers from canned output instead of touching the machine.
//!
//! A runner never fails for an ordinary command failure. Non-zero exits,
//! timeouts, and even a missing binary all come back as a [`CmdResult`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use simsweep_core::runner::{default_runner, RunOptions};
//!
//! let runner = default_runner();
//! let result = runner.run_args(
//!     &["xcrun", "simctl", "list"],
//!     &RunOptions::new().timeout(Duration::from_secs(10)),
//! );
//! if result.success() {
//!     println!("{}", result.stdout);
//! }
//! ```

use std::collections::BTreeMap;
use std::io::Read;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::shell;

/// Exit code reported for a command that exceeded its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the command could not be spawned at all.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Environment variables layered over the inherited process environment.
///
/// Ordered so the same overrides always render (and match) identically.
pub type EnvOverrides = BTreeMap<String, String>;

/// Outcome of one executed command.
///
/// Created once per execution and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CmdResult {
    /// The argv that was requested (not the `osascript` wrapper for elevated runs).
    pub cmd: Vec<String>,
    /// Exit code. `124` on timeout, `127` when the binary could not be spawned.
    pub returncode: i32,
    /// Standard output decoded as UTF-8 with replacement characters.
    pub stdout: String,
    /// Standard error decoded as UTF-8 with replacement characters.
    pub stderr: String,
    /// Raw standard output, for binary formats such as plists.
    #[serde(skip)]
    pub stdout_bytes: Vec<u8>,
    /// Raw standard error.
    #[serde(skip)]
    pub stderr_bytes: Vec<u8>,
    /// Whether the command was killed after exceeding its timeout.
    pub timed_out: bool,
}

impl CmdResult {
    /// Builds a result from raw output, decoding both streams lossily.
    pub fn from_bytes(cmd: Vec<String>, returncode: i32, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            cmd,
            returncode,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            stdout_bytes: stdout,
            stderr_bytes: stderr,
            timed_out: false,
        }
    }

    /// Builds a result from already-decoded text.
    pub fn from_text(
        cmd: Vec<String>,
        returncode: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        let stdout = stdout.into();
        let stderr = stderr.into();
        Self {
            cmd,
            returncode,
            stdout_bytes: stdout.clone().into_bytes(),
            stderr_bytes: stderr.clone().into_bytes(),
            stdout,
            stderr,
            timed_out: false,
        }
    }

    /// Builds the result for a command that ran past its timeout.
    ///
    /// Any partial output is kept; when the tool printed nothing on stderr a
    /// `timeout after {N}s` message is synthesized.
    pub fn timed_out(cmd: Vec<String>, timeout: Duration, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        let mut result = Self::from_bytes(cmd, TIMEOUT_EXIT_CODE, stdout, stderr);
        if result.stderr.is_empty() {
            result.stderr = format!("timeout after {}s", timeout.as_secs());
            result.stderr_bytes = result.stderr.clone().into_bytes();
        }
        result.timed_out = true;
        result
    }

    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.returncode == 0 && !self.timed_out
    }

    /// Stdout bytes, falling back to the re-encoded text when no raw bytes were kept.
    pub fn stdout_payload(&self) -> Vec<u8> {
        if self.stdout_bytes.is_empty() {
            self.stdout.clone().into_bytes()
        } else {
            self.stdout_bytes.clone()
        }
    }

    fn spawn_failure(cmd: Vec<String>, err: &std::io::Error) -> Self {
        let program = cmd.first().cloned().unwrap_or_default();
        Self::from_text(
            cmd,
            SPAWN_FAILURE_EXIT_CODE,
            "",
            format!("failed to execute {program}: {err}"),
        )
    }
}

/// Per-invocation execution options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Run with administrator privileges through the native macOS password dialog.
    pub sudo: bool,
    /// Kill the command if it runs longer than this.
    pub timeout: Option<Duration>,
    /// Whether the caller consumes the output as text (`false` for plists).
    pub text: bool,
    /// Extra environment variables for this invocation only.
    pub env: Option<EnvOverrides>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            sudo: false,
            timeout: None,
            text: true,
            env: None,
        }
    }
}

impl RunOptions {
    /// Plain text-mode options with no timeout, elevation, or env override.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the command runs elevated.
    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    /// Sets a timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets an optional timeout.
    pub fn maybe_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Marks the output as binary.
    pub fn binary(mut self) -> Self {
        self.text = false;
        self
    }

    /// Sets an optional environment override.
    pub fn env(mut self, env: Option<EnvOverrides>) -> Self {
        self.env = env;
        self
    }
}

/// Executes one external command and reports its outcome.
///
/// Implementations must not panic or return early for command failures;
/// everything the caller needs to judge success is in the [`CmdResult`].
pub trait CommandRunner: Send + Sync {
    /// Runs `cmd` (argv, program first) with the given options.
    fn run(&self, cmd: &[String], opts: &RunOptions) -> CmdResult;

    /// Convenience wrapper over [`run`](Self::run) for string-slice argv.
    fn run_args(&self, cmd: &[&str], opts: &RunOptions) -> CmdResult {
        let argv: Vec<String> = cmd.iter().map(|part| (*part).to_string()).collect();
        self.run(&argv, opts)
    }
}

/// Runs commands as real subprocesses.
///
/// Elevated commands are wrapped in an `osascript` `do shell script ... with
/// administrator privileges` call, so the password is entered in the system
/// dialog and never handled here.
#[derive(Debug, Default, Clone)]
pub struct SubprocessRunner;

impl SubprocessRunner {
    /// Creates a runner.
    pub fn new() -> Self {
        Self
    }

    fn build_command(cmd: &[String], opts: &RunOptions) -> Command {
        if opts.sudo {
            let script = shell::admin_script(cmd, opts.env.as_ref());
            let mut command = Command::new("osascript");
            command.arg("-e").arg(script);
            command
        } else {
            let mut command = Command::new(&cmd[0]);
            command.args(&cmd[1..]);
            if let Some(env) = &opts.env {
                // Layered over a copy of the inherited environment; ours is untouched.
                command.envs(env);
            }
            command
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| status.signal().map_or(-1, |signal| -signal))
}

impl CommandRunner for SubprocessRunner {
    fn run(&self, cmd: &[String], opts: &RunOptions) -> CmdResult {
        let argv = cmd.to_vec();
        if argv.is_empty() {
            return CmdResult::from_text(argv, SPAWN_FAILURE_EXIT_CODE, "", "empty command");
        }

        debug!(cmd = ?argv, sudo = opts.sudo, timeout = ?opts.timeout, "Running command");

        let mut command = Self::build_command(&argv, opts);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(cmd = ?argv, error = %e, "Failed to spawn command");
                return CmdResult::spawn_failure(argv, &e);
            }
        };

        // Both pipes are drained concurrently so a chatty tool can't block on a full pipe.
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let status = match opts.timeout {
            Some(limit) => match child.wait_timeout(limit) {
                Ok(Some(status)) => Ok(status),
                Ok(None) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    Err(limit)
                }
                Err(e) => {
                    warn!(cmd = ?argv, error = %e, "Failed waiting for command");
                    let _ = child.kill();
                    let _ = child.wait();
                    return CmdResult::spawn_failure(argv, &e);
                }
            },
            None => match child.wait() {
                Ok(status) => Ok(status),
                Err(e) => return CmdResult::spawn_failure(argv, &e),
            },
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        match status {
            Ok(status) => {
                let code = exit_code(status);
                debug!(cmd = ?argv, code, "Command finished");
                CmdResult::from_bytes(argv, code, stdout, stderr)
            }
            Err(limit) => {
                warn!(cmd = ?argv, timeout_secs = limit.as_secs(), "Command timed out");
                CmdResult::timed_out(argv, limit, stdout, stderr)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Process-wide default runner
// ---------------------------------------------------------------------------

static DEFAULT_RUNNER: RwLock<Option<Arc<dyn CommandRunner>>> = RwLock::new(None);

/// Returns the shared default runner, creating a [`SubprocessRunner`] on first use.
pub fn default_runner() -> Arc<dyn CommandRunner> {
    if let Some(runner) = DEFAULT_RUNNER.read().clone() {
        return runner;
    }
    let mut slot = DEFAULT_RUNNER.write();
    Arc::clone(slot.get_or_insert_with(|| Arc::new(SubprocessRunner::new())))
}

/// Replaces the shared default runner, returning the previous one.
pub fn set_default_runner(runner: Arc<dyn CommandRunner>) -> Option<Arc<dyn CommandRunner>> {
    DEFAULT_RUNNER.write().replace(runner)
}

/// Drops the shared default runner; the next [`default_runner`] call builds a fresh one.
pub fn reset_default_runner() {
    DEFAULT_RUNNER.write().take();
}
