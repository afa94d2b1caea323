//! Cleanup orchestration.
//!
//! [`CleanupService`] exposes one method per user-facing cleanup action. Each
//! method runs its commands strictly in order through the injected
//! [`CommandRunner`], wraps every command in a [`StepResult`], and returns an
//! [`ActionResult`] or [`CleanupResult`]. Failures never short-circuit an
//! action, so the full log is always captured, with one exception:
//! [`remove_runtime_backing_files`](CleanupService::remove_runtime_backing_files)
//! stops as soon as it can't prove that Xcode no longer has the runtimes
//! registered. Deleting backing files that Xcode still references makes it
//! recreate them.
//!
//! # Example
//!
//! ```no_run
//! use simsweep_core::cleanup::{CleanupService, FreeSpaceOptions};
//!
//! let service = CleanupService::detect();
//! let result = service.free_runtime_space(&FreeSpaceOptions {
//!     include_system_runtime_files: true,
//!     ..FreeSpaceOptions::default()
//! });
//! if let Some(delta) = result.space_delta {
//!     println!("reclaimed {delta} bytes");
//! }
//! ```

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::devtools;
use crate::disks::parent_disk;
use crate::processes::{self, coresimulator_scope};
use crate::runner::{default_runner, CommandRunner, EnvOverrides, RunOptions};
use crate::shell;
use crate::simctl::{parse_simctl_runtime_list, RuntimeInfo};
use crate::space::{self, DATA_VOLUME};
use crate::steps::{commands_ok, first_required_error, ActionResult, CleanupResult, Requirement, StepResult};

/// Where CoreSimulator mounts runtime disk images.
pub const VOLUMES_DIR: &str = "/Library/Developer/CoreSimulator/Volumes";

/// Glob patterns matching mounted runtime volumes.
pub const RUNTIME_GLOBS: [&str; 4] = [
    "/Library/Developer/CoreSimulator/Volumes/iOS_*",
    "/Library/Developer/CoreSimulator/Volumes/tvOS_*",
    "/Library/Developer/CoreSimulator/Volumes/watchOS_*",
    "/Library/Developer/CoreSimulator/Volumes/xrOS_*",
];

/// Sealed runtime images.
pub const CRYPTEX_PATH: &str = "/Library/Developer/CoreSimulator/Cryptex";

const DEVICES_DIR: &str = "~/Library/Developer/CoreSimulator/Devices";
const PROFILES_DIR: &str = "~/Library/Developer/CoreSimulator/Profiles";
const DERIVED_DATA_DIR: &str = "~/Library/Developer/Xcode/DerivedData";

const SIMULATOR_CACHE_DIRS: [&str; 4] = [
    "~/Library/Developer/CoreSimulator/Caches",
    "~/Library/Developer/CoreSimulator/Temp",
    "~/Library/Caches/com.apple.CoreSimulator",
    DERIVED_DATA_DIR,
];

/// Expands a leading `~` to the home directory.
///
/// Paths without a leading `~`, or with no resolvable home, are returned as given.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => &rest[1..],
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

/// Result of [`CleanupService::list_runtimes`].
#[derive(Debug, Clone)]
pub struct RuntimeListing {
    /// Parsed runtimes; empty whenever `error` is set.
    pub runtimes: Vec<RuntimeInfo>,
    /// The `simctl runtime list` step.
    pub step: StepResult,
    /// Why the list could not be read.
    pub error: Option<String>,
}

/// Selection for [`CleanupService::manual_cleanup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManualCleanupOptions {
    /// `~/Library/Developer/CoreSimulator`
    pub delete_core_simulator: bool,
    /// `~/Library/Developer/Xcode/DerivedData`
    pub delete_derived_data: bool,
    /// `~/Library/Developer/Xcode/Archives`
    pub delete_archives: bool,
    /// Xcode and SwiftPM caches under `~/Library/Caches`.
    pub delete_caches: bool,
    /// `~/Library/Developer/Xcode/iOS DeviceSupport`
    pub delete_device_support: bool,
    /// Kill simulator and Xcode processes first.
    pub stop_processes: bool,
    /// Take APFS free-space snapshots around the cleanup.
    pub measure_space: bool,
}

impl Default for ManualCleanupOptions {
    fn default() -> Self {
        Self {
            delete_core_simulator: false,
            delete_derived_data: false,
            delete_archives: false,
            delete_caches: false,
            delete_device_support: false,
            stop_processes: true,
            measure_space: true,
        }
    }
}

impl ManualCleanupOptions {
    /// The selected paths, unexpanded.
    pub fn paths(&self) -> Vec<&'static str> {
        let mut paths = Vec::new();
        if self.delete_core_simulator {
            paths.push("~/Library/Developer/CoreSimulator");
        }
        if self.delete_derived_data {
            paths.push(DERIVED_DATA_DIR);
        }
        if self.delete_archives {
            paths.push("~/Library/Developer/Xcode/Archives");
        }
        if self.delete_device_support {
            paths.push("~/Library/Developer/Xcode/iOS DeviceSupport");
        }
        if self.delete_caches {
            paths.push("~/Library/Caches/com.apple.dt.Xcode");
            paths.push("~/Library/Caches/org.swift.swiftpm");
        }
        paths
    }
}

/// Selection for [`CleanupService::free_runtime_space`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreeSpaceOptions {
    /// Deregister runtimes, unmount their images and delete the backing files.
    pub include_system_runtime_files: bool,
    /// Allow the per-user deletions below.
    pub include_user_space: bool,
    /// Delete `~/Library/Developer/CoreSimulator/Devices` (needs `include_user_space`).
    pub delete_devices: bool,
    /// Delete DerivedData (needs `include_user_space`).
    pub delete_derived_data: bool,
    /// Kill simulator and Xcode processes first (only with system files).
    pub stop_processes: bool,
    /// Take APFS free-space snapshots around the cleanup.
    pub measure_space: bool,
}

impl Default for FreeSpaceOptions {
    fn default() -> Self {
        Self {
            include_system_runtime_files: false,
            include_user_space: false,
            delete_devices: false,
            delete_derived_data: false,
            stop_processes: true,
            measure_space: true,
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

fn rm_rf(path: &Path) -> Vec<String> {
    vec!["rm".to_string(), "-rf".to_string(), path.to_string_lossy().into_owned()]
}

fn log_outcome(commands_ok: bool, error: Option<&str>) {
    match error {
        Some(error) => warn!(commands_ok, error, "Action finished with errors"),
        None => info!(commands_ok, "Action finished"),
    }
}

/// Runs the simulator cleanup actions.
pub struct CleanupService {
    runner: Arc<dyn CommandRunner>,
    simctl_env: Option<EnvOverrides>,
    timeout: Option<Duration>,
    volume_patterns: Vec<String>,
    cryptex_path: PathBuf,
}

impl CleanupService {
    /// Creates a service over `runner`, passing `simctl_env` to every `xcrun simctl` call.
    pub fn new(runner: Arc<dyn CommandRunner>, simctl_env: Option<EnvOverrides>) -> Self {
        Self {
            runner,
            simctl_env: simctl_env.filter(|env| !env.is_empty()),
            timeout: None,
            volume_patterns: RUNTIME_GLOBS.iter().map(|p| (*p).to_string()).collect(),
            cryptex_path: PathBuf::from(CRYPTEX_PATH),
        }
    }

    /// A service over the process-wide default runner.
    pub fn with_default_runner(simctl_env: Option<EnvOverrides>) -> Self {
        Self::new(default_runner(), simctl_env)
    }

    /// A service over the default runner with the simctl env decided by
    /// [`devtools::get_simctl_env`].
    pub fn detect() -> Self {
        let runner = default_runner();
        let simctl_env = devtools::get_simctl_env(runner.as_ref());
        Self::new(runner, simctl_env)
    }

    /// Applies `timeout` to every command.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the runtime-volume glob patterns.
    pub fn with_volume_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.volume_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the Cryptex directory path.
    pub fn with_cryptex_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cryptex_path = path.into();
        self
    }

    /// The env override used for simctl calls.
    pub fn simctl_env(&self) -> Option<&EnvOverrides> {
        self.simctl_env.as_ref()
    }

    /// The per-command timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The runner commands go through.
    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    // -----------------------------------------------------------------------
    // Step helpers
    // -----------------------------------------------------------------------

    fn run_step(&self, label: impl Into<String>, cmd: &[String], opts: RunOptions) -> StepResult {
        let opts = if opts.timeout.is_none() {
            opts.maybe_timeout(self.timeout)
        } else {
            opts
        };
        let label = label.into();
        let result = self.runner.run(cmd, &opts);
        debug!(step = %label, code = result.returncode, timed_out = result.timed_out, "Step finished");
        StepResult::new(label, result).with_sudo(opts.sudo)
    }

    fn run_simctl_step(&self, label: &str, cmd: &[&str]) -> StepResult {
        self.run_step(label, &argv(cmd), RunOptions::new().env(self.simctl_env.clone()))
    }

    /// Runs several commands as one elevated `/bin/sh -c` call, so the user sees a single password prompt.
    fn run_sudo_batch(&self, label: &str, commands: &[Vec<String>]) -> StepResult {
        let script = shell::batch_command(commands);
        self.run_step(
            label,
            &argv(&["/bin/sh", "-c", &script]),
            RunOptions::new().sudo(true),
        )
    }

    fn space_snapshot(&self) -> Option<u64> {
        space::get_apfs_available_bytes(self.runner.as_ref(), DATA_VOLUME, self.timeout)
    }

    fn kill_all_steps(&self) -> Vec<StepResult> {
        processes::kill_all_simulators_and_xcode(self.runner.as_ref(), self.timeout)
            .into_iter()
            .map(|result| StepResult::best_effort(result.cmd.join(" "), result))
            .collect()
    }

    fn rm_rf_step(&self, path: &str) -> StepResult {
        let expanded = expand_home(path);
        self.run_step(
            format!("rm -rf {}", expanded.display()),
            &rm_rf(&expanded),
            RunOptions::new(),
        )
    }

    fn volume_paths(&self) -> Vec<PathBuf> {
        let mut paths = BTreeSet::new();
        for pattern in &self.volume_patterns {
            match glob::glob(pattern) {
                Ok(matches) => paths.extend(matches.filter_map(Result::ok)),
                Err(e) => warn!(pattern = %pattern, error = %e, "Invalid volume pattern"),
            }
        }
        paths.into_iter().collect()
    }

    // -----------------------------------------------------------------------
    // Runtimes
    // -----------------------------------------------------------------------

    /// Runs `xcrun simctl runtime list -j` and parses it.
    pub fn list_runtimes(&self) -> RuntimeListing {
        let step = self.run_simctl_step("xcrun simctl runtime list -j", &["xcrun", "simctl", "runtime", "list", "-j"]);
        if step.result.returncode != 0 {
            let stderr = step.result.stderr.trim();
            let error = if stderr.is_empty() {
                "simctl runtime list failed".to_string()
            } else {
                stderr.to_string()
            };
            return RuntimeListing {
                runtimes: Vec::new(),
                step,
                error: Some(error),
            };
        }
        match parse_simctl_runtime_list(&step.result.stdout) {
            Ok(runtimes) => RuntimeListing {
                runtimes,
                step,
                error: None,
            },
            Err(e) => RuntimeListing {
                runtimes: Vec::new(),
                step,
                error: Some(e.to_string()),
            },
        }
    }

    /// Deletes each runtime by identifier.
    pub fn delete_runtimes<S: AsRef<str>>(&self, runtime_ids: &[S]) -> ActionResult {
        let steps = runtime_ids
            .iter()
            .map(|id| {
                let id = id.as_ref();
                self.run_simctl_step(
                    &format!("xcrun simctl runtime delete {id}"),
                    &["xcrun", "simctl", "runtime", "delete", id],
                )
            })
            .collect();
        ActionResult::from_steps(steps)
    }

    /// Bulk-deletes runtimes, then deletes whatever is still listed one by one.
    pub fn delete_all_runtimes(&self) -> ActionResult {
        let _span = info_span!("delete_all_runtimes").entered();
        info!("Starting delete all runtimes");
        let mut steps = vec![self
            .run_simctl_step("xcrun simctl runtime delete all", &["xcrun", "simctl", "runtime", "delete", "all"])
            .with_requirement(Requirement::BestEffort)];

        let listing = self.list_runtimes();
        steps.push(listing.step);
        if let Some(error) = listing.error {
            log_outcome(false, Some(&error));
            return ActionResult::aborted(steps, error);
        }

        let ids: Vec<&str> = listing.runtimes.iter().map(|r| r.identifier.as_str()).collect();
        let deleted = self.delete_runtimes(&ids);
        steps.extend(deleted.steps);
        let error = deleted.error.or_else(|| first_required_error(&steps));
        let result = ActionResult {
            commands_ok: commands_ok(&steps),
            steps,
            error,
        };
        log_outcome(result.commands_ok, result.error.as_deref());
        result
    }

    /// `xcrun simctl runtime delete unavailable`.
    pub fn delete_unavailable_runtimes(&self) -> ActionResult {
        ActionResult::from_steps(vec![self.run_simctl_step(
            "xcrun simctl runtime delete unavailable",
            &["xcrun", "simctl", "runtime", "delete", "unavailable"],
        )])
    }

    // -----------------------------------------------------------------------
    // Devices, directories, caches
    // -----------------------------------------------------------------------

    fn shutdown_then_delete(&self, target: &str) -> ActionResult {
        let steps = vec![
            self.run_simctl_step("xcrun simctl shutdown all", &["xcrun", "simctl", "shutdown", "all"]),
            self.run_simctl_step(&format!("xcrun simctl delete {target}"), &["xcrun", "simctl", "delete", target]),
        ];
        ActionResult::from_steps(steps)
    }

    /// Shuts down and deletes every simulator device.
    pub fn delete_all_sim_devices(&self) -> ActionResult {
        self.shutdown_then_delete("all")
    }

    /// Shuts down all devices and deletes the unavailable ones.
    pub fn delete_unavailable_sim_devices(&self) -> ActionResult {
        self.shutdown_then_delete("unavailable")
    }

    /// Removes the CoreSimulator `Devices` and `Profiles` directories.
    pub fn remove_device_directories_and_profiles(&self) -> ActionResult {
        ActionResult::from_steps(vec![self.rm_rf_step(DEVICES_DIR), self.rm_rf_step(PROFILES_DIR)])
    }

    /// `rm -rf` each path (after `~` expansion), optionally elevated.
    pub fn clear_paths<S: AsRef<str>>(&self, paths: &[S], sudo: bool) -> ActionResult {
        let steps = paths
            .iter()
            .map(|path| {
                let expanded = expand_home(path.as_ref());
                self.run_step(
                    format!("rm -rf {}", expanded.display()),
                    &rm_rf(&expanded),
                    RunOptions::new().sudo(sudo),
                )
            })
            .collect();
        ActionResult::from_steps(steps)
    }

    /// Clears CoreSimulator caches, temp files and DerivedData.
    pub fn clear_all_simulator_caches(&self) -> ActionResult {
        self.clear_paths(&SIMULATOR_CACHE_DIRS, false)
    }

    /// Boots out and disables the per-user CoreSimulator service in one elevated batch.
    ///
    /// The step is best-effort, but its own outcome is still reported.
    pub fn disable_core_simulator_service(&self) -> ActionResult {
        let scope = coresimulator_scope();
        let step = self
            .run_sudo_batch(
                "launchctl bootout + disable CoreSimulator service",
                &[
                    vec!["launchctl".to_string(), "bootout".to_string(), scope.clone()],
                    vec!["launchctl".to_string(), "disable".to_string(), scope],
                ],
            )
            .with_requirement(Requirement::BestEffort);
        let ok = step.ok();
        let error = (!ok).then(|| step.failure_message());
        ActionResult {
            commands_ok: ok,
            steps: vec![step],
            error,
        }
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Whether Xcode or the Simulator app is running.
    pub fn is_xcode_running(&self) -> bool {
        ["Xcode", "Simulator"].into_iter().any(|name| {
            self.runner
                .run_args(&["pgrep", "-x", name], &RunOptions::new().maybe_timeout(self.timeout))
                .returncode
                == 0
        })
    }

    /// `hdiutil info` lines describing mounted simulator volumes.
    pub fn get_mounted_simulator_volumes(&self) -> Vec<String> {
        let result = self
            .runner
            .run_args(&["hdiutil", "info"], &RunOptions::new().maybe_timeout(self.timeout));
        result
            .stdout
            .lines()
            .filter(|line| line.contains("Simulator") && line.contains(VOLUMES_DIR))
            .map(|line| line.trim().to_string())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Unmounting
    // -----------------------------------------------------------------------

    /// Force-unmounts the parent disk of `device`, falling back to `hdiutil detach`.
    ///
    /// Succeeds if either attempt succeeds or reports the disk as not mounted.
    pub fn unmount_simulator_disk(&self, device: &str) -> ActionResult {
        let parent = parent_disk(device);
        let attempt = |label: String, cmd: Vec<String>| {
            self.run_step(label, &cmd, RunOptions::new())
                .with_requirement(Requirement::BestEffort)
                .allowing_not_mounted(true)
        };

        let first = attempt(
            format!("diskutil unmountDisk force {parent}"),
            argv(&["diskutil", "unmountDisk", "force", &parent]),
        );
        if first.ok() {
            return ActionResult {
                commands_ok: true,
                steps: vec![first],
                error: None,
            };
        }

        let fallback = attempt(
            format!("hdiutil detach {parent}"),
            argv(&["hdiutil", "detach", &parent, "-force"]),
        );
        let ok = fallback.ok();
        let error = if ok {
            None
        } else {
            Some(
                fallback
                    .output_message()
                    .unwrap_or_else(|| "unmount failed".to_string()),
            )
        };
        ActionResult {
            commands_ok: ok,
            steps: vec![first, fallback],
            error,
        }
    }

    /// Unmounts every mounted runtime volume, each backing disk at most once.
    ///
    /// The backing device comes from the second line of `df <volume>`. A
    /// failing `df` only skips that volume.
    pub fn unmount_simulator_volumes(&self) -> Vec<StepResult> {
        let mut steps = Vec::new();
        let mut unmounted_parents = HashSet::new();

        for volume in self.volume_paths() {
            let volume = volume.to_string_lossy().into_owned();
            let df = self
                .run_step(format!("df {volume}"), &argv(&["df", &volume]), RunOptions::new())
                .with_requirement(Requirement::BestEffort);
            let device = (df.result.returncode == 0)
                .then(|| {
                    df.result
                        .stdout
                        .lines()
                        .filter(|line| !line.trim().is_empty())
                        .nth(1)
                        .and_then(|line| line.split_whitespace().next())
                        .map(str::to_string)
                })
                .flatten();
            steps.push(df);

            let Some(device) = device else {
                debug!(volume = %volume, "No backing device for volume");
                continue;
            };
            let parent = parent_disk(&device);
            if !unmounted_parents.insert(parent) {
                continue;
            }
            steps.extend(self.unmount_simulator_disk(&device).steps);
        }
        steps
    }

    /// Removes runtime volume directories and the Cryptex directory in one elevated batch.
    pub fn remove_runtime_directories(&self) -> Vec<StepResult> {
        let mut commands: Vec<Vec<String>> = self.volume_paths().iter().map(|path| rm_rf(path)).collect();
        commands.push(rm_rf(&self.cryptex_path));
        vec![self.run_sudo_batch("rm -rf simulator runtime directories", &commands)]
    }

    /// Deregisters all runtimes, unmounts their images and optionally deletes
    /// the backing directories.
    ///
    /// Aborts without touching any volume if the runtime list can't be read,
    /// if an individual delete fails, or if any runtime seen at the start is
    /// still registered after deletion.
    pub fn remove_runtime_backing_files(&self, include_system_runtime_files: bool) -> ActionResult {
        let _span = info_span!("remove_runtime_backing_files", include_system_runtime_files).entered();
        info!("Starting remove runtime backing files");
        let mut steps = Vec::new();

        let before = self.list_runtimes();
        steps.push(before.step);
        if let Some(error) = before.error {
            return ActionResult::aborted(steps, error);
        }

        if !before.runtimes.is_empty() {
            steps.push(
                self.run_simctl_step("xcrun simctl runtime delete all", &["xcrun", "simctl", "runtime", "delete", "all"])
                    .with_requirement(Requirement::BestEffort),
            );

            let after_bulk = self.list_runtimes();
            steps.push(after_bulk.step);
            if let Some(error) = after_bulk.error {
                return ActionResult::aborted(steps, error);
            }

            let remaining: BTreeSet<&str> = after_bulk.runtimes.iter().map(|r| r.identifier.as_str()).collect();
            if !remaining.is_empty() {
                let ids: Vec<&str> = remaining.into_iter().collect();
                let deleted = self.delete_runtimes(&ids);
                steps.extend(deleted.steps);
                if let Some(error) = deleted.error {
                    return ActionResult::aborted(steps, error);
                }
            }

            let last = self.list_runtimes();
            steps.push(last.step);
            if let Some(error) = last.error {
                return ActionResult::aborted(steps, error);
            }

            let final_ids: HashSet<&str> = last.runtimes.iter().map(|r| r.identifier.as_str()).collect();
            let still_present: BTreeSet<&str> = before
                .runtimes
                .iter()
                .map(|r| r.identifier.as_str())
                .filter(|id| final_ids.contains(id))
                .collect();
            if !still_present.is_empty() {
                let error = format!(
                    "Runtime still registered: {}",
                    still_present.into_iter().collect::<Vec<_>>().join(", ")
                );
                warn!(error = %error, "Refusing to remove runtime backing files");
                return ActionResult::aborted(steps, error);
            }
        }

        steps.extend(self.unmount_simulator_volumes());
        if include_system_runtime_files {
            steps.extend(self.remove_runtime_directories());
        }
        let result = ActionResult::from_steps(steps);
        log_outcome(result.commands_ok, result.error.as_deref());
        result
    }

    // -----------------------------------------------------------------------
    // Composite actions
    // -----------------------------------------------------------------------

    /// Stops processes, unmounts runtime volumes and deletes the selected paths.
    pub fn manual_cleanup(&self, options: &ManualCleanupOptions) -> CleanupResult {
        let _span = info_span!("manual_cleanup").entered();
        info!("Starting manual cleanup");
        let space_before = options.measure_space.then(|| self.space_snapshot()).flatten();
        let mut steps = Vec::new();

        if options.stop_processes {
            steps.extend(self.kill_all_steps());
        }
        steps.extend(self.unmount_simulator_volumes());

        let paths = options.paths();
        if !paths.is_empty() {
            steps.extend(self.clear_paths(&paths, false).steps);
        }

        let space_after = options.measure_space.then(|| self.space_snapshot()).flatten();
        let error = first_required_error(&steps);
        let result = CleanupResult::new(steps, error, space_before, space_after);
        log_outcome(result.commands_ok, result.error.as_deref());
        result
    }

    /// Reclaims runtime space: removes unavailable devices, optionally user
    /// data, and optionally the runtimes themselves.
    pub fn free_runtime_space(&self, options: &FreeSpaceOptions) -> CleanupResult {
        let _span = info_span!("free_runtime_space", system = options.include_system_runtime_files).entered();
        info!("Starting free runtime space");
        let space_before = options.measure_space.then(|| self.space_snapshot()).flatten();
        let mut steps = Vec::new();

        if options.stop_processes && options.include_system_runtime_files {
            steps.extend(self.kill_all_steps());
        }
        steps.extend(self.delete_unavailable_sim_devices().steps);

        if options.include_user_space {
            if options.delete_devices {
                steps.push(self.rm_rf_step(DEVICES_DIR));
            }
            if options.delete_derived_data {
                steps.push(self.rm_rf_step(DERIVED_DATA_DIR));
            }
        }

        let mut runtime_ok = true;
        let mut runtime_error = None;
        if options.include_system_runtime_files {
            let runtime = self.remove_runtime_backing_files(true);
            runtime_ok = runtime.commands_ok;
            runtime_error = runtime.error;
            steps.extend(runtime.steps);
        }

        let space_after = options.measure_space.then(|| self.space_snapshot()).flatten();
        let error = runtime_error.or_else(|| first_required_error(&steps));
        let mut result = CleanupResult::new(steps, error, space_before, space_after);
        result.commands_ok &= runtime_ok;
        log_outcome(result.commands_ok, result.error.as_deref());
        result
    }

    /// Removes everything simulator-related: processes, devices, directories,
    /// caches, the CoreSimulator service, runtimes and their backing files.
    pub fn nuclear_cleanup(&self) -> CleanupResult {
        let _span = info_span!("nuclear_cleanup").entered();
        info!("Starting nuclear cleanup");
        let mut steps = self.kill_all_steps();
        steps.extend(self.delete_all_sim_devices().steps);
        steps.extend(self.remove_device_directories_and_profiles().steps);
        steps.extend(self.clear_all_simulator_caches().steps);
        steps.extend(self.disable_core_simulator_service().steps);

        let runtime = self.remove_runtime_backing_files(true);
        steps.extend(runtime.steps);

        let error = runtime.error.or_else(|| first_required_error(&steps));
        let mut result = CleanupResult::new(steps, error, None, None);
        result.commands_ok &= runtime.commands_ok;
        log_outcome(result.commands_ok, result.error.as_deref());
        result
    }
}
