//! A [`CommandRunner`] that answers from a script instead of spawning processes.
//!
//! Responses are keyed on `(sudo, text, argv, env)`. A key registered once
//! always answers the same way; a key registered several times answers with
//! each reply in turn and then falls back to the default. Lookups try the
//! exact env first and then the same call without env, so a script doesn't
//! need to care about env unless the test is about env.
//!
//! # Example
//!
//! ```
//! use simsweep_core::runner::{CommandRunner, RunOptions};
//! use simsweep_core::scripted::ScriptedRunner;
//!
//! let runner = ScriptedRunner::new()
//!     .on(&["pgrep", "-x", "Xcode"], 0, "123\n", "");
//!
//! let result = runner.run_args(&["pgrep", "-x", "Xcode"], &RunOptions::new());
//! assert_eq!(result.returncode, 0);
//! assert!(runner.was_called(&["pgrep", "-x", "Xcode"]));
//! ```

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;

use crate::runner::{CmdResult, CommandRunner, EnvOverrides, RunOptions};

/// Canned output for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Exit code.
    pub code: i32,
    /// Raw stdout.
    pub stdout: Vec<u8>,
    /// Raw stderr.
    pub stderr: Vec<u8>,
    /// Report the call as timed out.
    pub timed_out: bool,
}

impl Reply {
    /// A reply with the given exit code and output.
    pub fn new(code: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    /// A reply that simulates a timeout.
    pub fn timeout() -> Self {
        Self {
            code: crate::runner::TIMEOUT_EXIT_CODE,
            stdout: Vec::new(),
            stderr: b"timeout".to_vec(),
            timed_out: true,
        }
    }

    fn into_result(self, cmd: Vec<String>) -> CmdResult {
        let mut result = CmdResult::from_bytes(cmd, self.code, self.stdout, self.stderr);
        result.timed_out = self.timed_out;
        result
    }
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Whether elevation was requested.
    pub sudo: bool,
    /// Whether text output was requested.
    pub text: bool,
    /// The argv.
    pub argv: Vec<String>,
    /// Env overrides, sorted by key.
    pub env: Option<Vec<(String, String)>>,
    /// The requested timeout.
    pub timeout: Option<Duration>,
}

type Key = (bool, bool, Vec<String>, Option<Vec<(String, String)>>);

#[derive(Debug)]
enum Script {
    Always(Reply),
    Sequence(VecDeque<Reply>),
}

/// Scripted test double for [`CommandRunner`].
#[derive(Debug)]
pub struct ScriptedRunner {
    script: Mutex<HashMap<Key, Script>>,
    default: Reply,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn to_argv(cmd: &[&str]) -> Vec<String> {
    cmd.iter().map(|part| (*part).to_string()).collect()
}

fn env_key(env: Option<&EnvOverrides>) -> Option<Vec<(String, String)>> {
    env.filter(|env| !env.is_empty())
        .map(|env| env.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

impl ScriptedRunner {
    /// An empty script whose default reply is `127 / "unexpected command"`.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            default: Reply::new(127, "", "unexpected command"),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the reply for calls with no scripted match.
    pub fn with_default(mut self, code: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        self.default = Reply::new(code, stdout, stderr);
        self
    }

    /// Registers a reply for an explicit key.
    pub fn expect(
        self,
        sudo: bool,
        text: bool,
        cmd: &[&str],
        env: Option<&EnvOverrides>,
        reply: Reply,
    ) -> Self {
        let key = (sudo, text, to_argv(cmd), env_key(env));
        {
            let mut script = self.script.lock();
            match script.remove(&key) {
                None => {
                    script.insert(key, Script::Always(reply));
                }
                Some(Script::Always(first)) => {
                    script.insert(key, Script::Sequence(VecDeque::from([first, reply])));
                }
                Some(Script::Sequence(mut replies)) => {
                    replies.push_back(reply);
                    script.insert(key, Script::Sequence(replies));
                }
            }
        }
        self
    }

    /// Registers a plain text-mode, unelevated reply.
    pub fn on(self, cmd: &[&str], code: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        self.expect(false, true, cmd, None, Reply::new(code, stdout, stderr))
    }

    /// Registers a binary-mode reply (`text = false`).
    pub fn on_binary(self, cmd: &[&str], code: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        self.expect(false, false, cmd, None, Reply::new(code, stdout, stderr))
    }

    /// Registers an elevated reply.
    pub fn on_sudo(self, cmd: &[&str], code: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        self.expect(true, true, cmd, None, Reply::new(code, stdout, stderr))
    }

    /// Registers a reply that only matches when `env` is passed.
    pub fn on_with_env(
        self,
        cmd: &[&str],
        env: &EnvOverrides,
        code: i32,
        stdout: impl Into<Vec<u8>>,
        stderr: impl Into<Vec<u8>>,
    ) -> Self {
        self.expect(false, true, cmd, Some(env), Reply::new(code, stdout, stderr))
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// The argv of every call made so far, in order.
    pub fn argv_calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().iter().map(|call| call.argv.clone()).collect()
    }

    /// How many times `cmd` was run (any options).
    pub fn call_count(&self, cmd: &[&str]) -> usize {
        let argv = to_argv(cmd);
        self.calls.lock().iter().filter(|call| call.argv == argv).count()
    }

    /// Whether `cmd` was run at least once (any options).
    pub fn was_called(&self, cmd: &[&str]) -> bool {
        self.call_count(cmd) > 0
    }

    fn next_reply(&self, key: &Key) -> Option<Reply> {
        let mut script = self.script.lock();
        match script.get_mut(key)? {
            Script::Always(reply) => Some(reply.clone()),
            Script::Sequence(replies) => Some(replies.pop_front().unwrap_or_else(|| self.default.clone())),
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, cmd: &[String], opts: &RunOptions) -> CmdResult {
        let env = env_key(opts.env.as_ref());
        self.calls.lock().push(RecordedCall {
            sudo: opts.sudo,
            text: opts.text,
            argv: cmd.to_vec(),
            env: env.clone(),
            timeout: opts.timeout,
        });

        let with_env: Key = (opts.sudo, opts.text, cmd.to_vec(), env.clone());
        let reply = self
            .next_reply(&with_env)
            .or_else(|| {
                env.as_ref()
                    .and_then(|_| self.next_reply(&(opts.sudo, opts.text, cmd.to_vec(), None)))
            })
            .unwrap_or_else(|| self.default.clone());
        reply.into_result(cmd.to_vec())
    }
}
