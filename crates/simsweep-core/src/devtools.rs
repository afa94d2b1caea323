//! Developer tools pre-flight checks.
//!
//! Without a working `xcrun simctl` runtimes can't be deregistered, only
//! unmounted, and they come back on the next boot. The usual culprit is
//! `xcode-select` pointing at `/Library/Developer/CommandLineTools`, which
//! has no `simctl`. When full Xcode is installed anyway, setting
//! `DEVELOPER_DIR` for simctl calls works around it without touching the
//! system selection.
//!
//! # Example
//!
//! ```no_run
//! use simsweep_core::devtools::check_devtools;
//! use simsweep_core::runner::default_runner;
//!
//! let status = check_devtools(default_runner().as_ref());
//! if !status.ok {
//!     eprintln!("{}", status.message);
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::runner::{CommandRunner, EnvOverrides, RunOptions};

/// Where Xcode keeps its developer directory when installed from the App Store.
pub const DEFAULT_XCODE_DEVELOPER_DIR: &str = "/Applications/Xcode.app/Contents/Developer";

const SIMCTL_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of [`check_devtools`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DevtoolsStatus {
    /// Whether simctl is usable (possibly through an env override).
    pub ok: bool,
    /// Multi-line explanation, including fix instructions on failure.
    pub message: String,
}

impl DevtoolsStatus {
    fn new(ok: bool, message: impl Into<String>) -> Self {
        Self {
            ok,
            message: message.into(),
        }
    }
}

/// The command that points `xcode-select` at full Xcode.
pub fn fix_command() -> String {
    format!("sudo xcode-select --switch {DEFAULT_XCODE_DEVELOPER_DIR}")
}

/// `xcode-select -p`, or `None` if it fails.
pub fn get_xcode_select_path(runner: &dyn CommandRunner) -> Option<String> {
    let result = runner.run_args(&["xcode-select", "-p"], &RunOptions::new());
    (result.returncode == 0).then(|| result.stdout.trim().to_string())
}

/// Whether `xcrun simctl list` succeeds, optionally under `env`.
pub fn is_simctl_available(runner: &dyn CommandRunner, env: Option<&EnvOverrides>) -> bool {
    let opts = RunOptions::new()
        .timeout(SIMCTL_PROBE_TIMEOUT)
        .env(env.cloned());
    runner.run_args(&["xcrun", "simctl", "list"], &opts).returncode == 0
}

/// Whether `xcode-select` points into an Xcode.app bundle.
pub fn is_xcode_path(runner: &dyn CommandRunner) -> bool {
    get_xcode_select_path(runner).is_some_and(|path| path.contains("Xcode.app"))
}

fn developer_dir_env(dir: &str) -> EnvOverrides {
    EnvOverrides::from([("DEVELOPER_DIR".to_string(), dir.to_string())])
}

/// Decides the simctl env override from explicit inputs.
///
/// `developer_dir` is the caller's `DEVELOPER_DIR` value; it wins when it
/// names an existing directory. Otherwise no override is needed if
/// `xcode-select` already points at Xcode, and `fallback` is used if it
/// exists on disk.
pub fn resolve_simctl_env(
    runner: &dyn CommandRunner,
    developer_dir: Option<&str>,
    fallback: &Path,
) -> Option<EnvOverrides> {
    if let Some(dir) = developer_dir.filter(|dir| !dir.is_empty() && Path::new(dir).is_dir()) {
        return Some(developer_dir_env(dir));
    }
    if is_xcode_path(runner) {
        return None;
    }
    if fallback.is_dir() {
        return Some(developer_dir_env(&fallback.to_string_lossy()));
    }
    None
}

/// The simctl env override for this process, based on `DEVELOPER_DIR` and
/// the default Xcode location.
pub fn get_simctl_env(runner: &dyn CommandRunner) -> Option<EnvOverrides> {
    let developer_dir = std::env::var("DEVELOPER_DIR").ok();
    resolve_simctl_env(
        runner,
        developer_dir.as_deref(),
        Path::new(DEFAULT_XCODE_DEVELOPER_DIR),
    )
}

/// [`check_devtools`] with explicit `DEVELOPER_DIR` and fallback inputs.
pub fn check_devtools_with(
    runner: &dyn CommandRunner,
    developer_dir: Option<&str>,
    fallback: &Path,
) -> DevtoolsStatus {
    let Some(xcode_path) = get_xcode_select_path(runner) else {
        return DevtoolsStatus::new(
            false,
            format!(
                "Xcode Command Line Tools not found.\n\n\
                 Install Xcode from the App Store, then run:\n{}",
                fix_command()
            ),
        );
    };

    if xcode_path.contains("CommandLineTools") {
        let env = resolve_simctl_env(runner, developer_dir, fallback);
        if let Some(env) = env.filter(|env| is_simctl_available(runner, Some(env))) {
            let dir = env.get("DEVELOPER_DIR").cloned().unwrap_or_default();
            return DevtoolsStatus::new(
                true,
                format!(
                    "xcode-select points to CommandLineTools:\n{xcode_path}\n\n\
                     Using Xcode at:\n{dir}\nfor simctl via DEVELOPER_DIR override."
                ),
            );
        }
        return DevtoolsStatus::new(
            false,
            format!(
                "xcode-select points to CommandLineTools:\n{xcode_path}\n\n\
                 Simulator management requires full Xcode.\n\nFix with:\n{}",
                fix_command()
            ),
        );
    }

    if !is_simctl_available(runner, None) {
        debug!(path = %xcode_path, "simctl probe failed");
        return DevtoolsStatus::new(
            false,
            format!(
                "xcrun simctl not working.\nCurrent path: {xcode_path}\n\nTry:\n{}",
                fix_command()
            ),
        );
    }

    DevtoolsStatus::new(true, "Developer tools configured correctly")
}

/// Checks that simctl is reachable, explaining how to fix it if not.
pub fn check_devtools(runner: &dyn CommandRunner) -> DevtoolsStatus {
    let developer_dir = std::env::var("DEVELOPER_DIR").ok();
    check_devtools_with(
        runner,
        developer_dir.as_deref(),
        Path::new(DEFAULT_XCODE_DEVELOPER_DIR),
    )
}
