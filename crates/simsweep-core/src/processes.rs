//! Simulator and Xcode process management.
//!
//! Killing simulator processes is pointless while the CoreSimulator launchd
//! service is loaded: launchd respawns them straight away. Every "kill all"
//! path here therefore stops the service first.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runner::{CmdResult, CommandRunner, RunOptions};
use crate::shell;

/// Substrings of a `ps aux` command column that mark a simulator process.
pub const SIMULATOR_KEYWORDS: [&str; 4] = ["Simulator", "CoreSimulator", "SimulatorTrampoline", "launchd_sim"];

/// launchd label of the CoreSimulator service.
pub const CORESIMULATOR_SERVICE: &str = "com.apple.CoreSimulator.CoreSimulatorService";

/// A running simulator-related process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorProcess {
    pub pid: String,
    pub cpu: String,
    pub mem: String,
    /// Full command line (columns 11 onwards of `ps aux`).
    pub name: String,
}

/// The per-user launchd target of the CoreSimulator service, `gui/<uid>/...`.
pub fn coresimulator_scope() -> String {
    format!("gui/{}/{CORESIMULATOR_SERVICE}", nix::unistd::getuid().as_raw())
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

/// `launchctl` commands that unload the CoreSimulator service.
fn daemon_stop_commands() -> Vec<Vec<String>> {
    vec![
        vec!["launchctl".to_string(), "bootout".to_string(), coresimulator_scope()],
        argv(&["launchctl", "remove", CORESIMULATOR_SERVICE]),
    ]
}

/// The process kill commands, run after the daemon is stopped.
pub fn kill_commands() -> Vec<Vec<String>> {
    vec![
        argv(&["pkill", "-9", "-f", "Simulator"]),
        argv(&["pkill", "-9", "-f", "CoreSimulator"]),
        argv(&["pkill", "-9", "-f", "SimulatorTrampoline"]),
        argv(&["pkill", "-9", "-f", "launchd_sim"]),
        argv(&["killall", "-9", CORESIMULATOR_SERVICE]),
        argv(&["pkill", "-9", "-x", "Xcode"]),
    ]
}

/// Parses `ps aux` output, keeping simulator-related processes.
///
/// The header line is skipped and lines with fewer than 11 columns are ignored.
pub fn parse_ps_aux(output: &str) -> Vec<SimulatorProcess> {
    output
        .split('\n')
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 11 {
                return None;
            }
            let name = parts[10..].join(" ");
            if !SIMULATOR_KEYWORDS.iter().any(|keyword| name.contains(keyword)) {
                return None;
            }
            Some(SimulatorProcess {
                pid: parts[1].to_string(),
                cpu: parts[2].to_string(),
                mem: parts[3].to_string(),
                name,
            })
        })
        .collect()
}

/// Lists running simulator-related processes.
pub fn list_simulator_processes(runner: &dyn CommandRunner) -> Vec<SimulatorProcess> {
    let result = runner.run_args(&["ps", "aux"], &RunOptions::new());
    parse_ps_aux(&result.stdout)
}

/// Sends SIGKILL to `pid`, elevated when `use_admin` is set.
pub fn kill_process(runner: &dyn CommandRunner, pid: &str, use_admin: bool) -> bool {
    runner
        .run_args(&["kill", "-9", pid], &RunOptions::new().sudo(use_admin))
        .returncode
        == 0
}

/// Unloads the CoreSimulator launchd service so killed processes stay dead.
///
/// `timeout`, when given, applies to each `launchctl` call.
pub fn stop_coresimulator_daemon(runner: &dyn CommandRunner, timeout: Option<Duration>) -> Vec<CmdResult> {
    let opts = RunOptions::new().maybe_timeout(timeout);
    daemon_stop_commands()
        .iter()
        .map(|cmd| runner.run(cmd, &opts))
        .collect()
}

/// Stops the daemon, then kills every simulator and Xcode process.
///
/// Returns one result per command: the two `launchctl` calls followed by the
/// six kill commands. `timeout`, when given, applies to each command.
pub fn kill_all_simulators_and_xcode(runner: &dyn CommandRunner, timeout: Option<Duration>) -> Vec<CmdResult> {
    let mut results = stop_coresimulator_daemon(runner, timeout);
    let opts = RunOptions::new().maybe_timeout(timeout);
    for cmd in kill_commands() {
        results.push(runner.run(&cmd, &opts));
    }
    debug!(commands = results.len(), "Killed simulator processes");
    results
}

/// Same as [`kill_all_simulators_and_xcode`], as one elevated shell batch.
///
/// Returns the batch command line and its exit code.
pub fn kill_all_simulators_and_xcode_admin(runner: &dyn CommandRunner) -> (String, i32) {
    let mut commands = daemon_stop_commands();
    commands.extend(kill_commands());
    let combined = shell::batch_command(&commands);
    let result = runner.run_args(&["/bin/sh", "-c", &combined], &RunOptions::new().sudo(true));
    (combined, result.returncode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedRunner;

    const PS_AUX: &str = "\
USER   PID  %CPU %MEM VSZ RSS TT STAT STARTED TIME COMMAND
dev    101  1.5  0.3 1 1 ?? S 9:00AM 0:01.00 /Applications/Xcode.app/Contents/Developer/Applications/Simulator.app/Contents/MacOS/Simulator
dev    102  0.0  0.1 1 1 ?? S 9:00AM 0:00.10 /Library/Developer/PrivateFrameworks/CoreSimulator.framework/Versions/A/XPCServices/com.apple.CoreSimulator.CoreSimulatorService.xpc/Contents/MacOS/com.apple.CoreSimulator.CoreSimulatorService
dev    103  0.0  0.1 1 1 ?? S 9:00AM 0:00.10 /usr/libexec/launchd_sim --flag value
dev    104  9.0  2.0 1 1 ?? S 9:00AM 0:10.00 /Applications/Safari.app/Contents/MacOS/Safari
short line
";

    #[test]
    fn test_parse_ps_aux_filters_by_keyword() {
        let processes = parse_ps_aux(PS_AUX);
        let pids: Vec<&str> = processes.iter().map(|p| p.pid.as_str()).collect();
        assert_eq!(pids, vec!["101", "102", "103"]);
        assert_eq!(processes[0].cpu, "1.5");
        assert_eq!(processes[0].mem, "0.3");
        assert_eq!(processes[2].name, "/usr/libexec/launchd_sim --flag value");
    }

    #[test]
    fn test_parse_ps_aux_skips_header_even_if_it_matches() {
        let output = "a b c d e f g h i j Simulator\n";
        assert!(parse_ps_aux(output).is_empty());
    }

    #[test]
    fn test_kill_all_stops_daemon_first() {
        let runner = ScriptedRunner::new().with_default(0, "", "");
        let results = kill_all_simulators_and_xcode(&runner, None);
        assert_eq!(results.len(), 8);

        let calls = runner.argv_calls();
        assert_eq!(calls[0][..2], ["launchctl", "bootout"]);
        assert_eq!(calls[0][2], coresimulator_scope());
        assert_eq!(calls[1], vec!["launchctl", "remove", CORESIMULATOR_SERVICE]);
        assert_eq!(calls[7], vec!["pkill", "-9", "-x", "Xcode"]);
    }

    #[test]
    fn test_kill_all_applies_timeout_to_every_command() {
        let runner = ScriptedRunner::new().with_default(0, "", "");
        kill_all_simulators_and_xcode(&runner, Some(Duration::from_secs(7)));

        let calls = runner.calls();
        assert_eq!(calls.len(), 8);
        assert!(calls.iter().all(|call| call.timeout == Some(Duration::from_secs(7))));
    }

    #[test]
    fn test_kill_all_admin_runs_one_sudo_batch() {
        let runner = ScriptedRunner::new().with_default(0, "", "");
        let (combined, code) = kill_all_simulators_and_xcode_admin(&runner);
        assert_eq!(code, 0);
        assert!(combined.starts_with("launchctl bootout gui/"));
        assert!(combined.ends_with("pkill -9 -x Xcode"));
        assert_eq!(combined.matches(" ; ").count(), 7);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].sudo);
        assert_eq!(calls[0].argv[..2], ["/bin/sh", "-c"]);
    }

    #[test]
    fn test_kill_process() {
        let runner = ScriptedRunner::new()
            .on(&["kill", "-9", "101"], 0, "", "")
            .on_sudo(&["kill", "-9", "102"], 1, "", "no such process");
        assert!(kill_process(&runner, "101", false));
        assert!(!kill_process(&runner, "102", true));
        assert!(runner.calls()[1].sudo);
    }

    #[test]
    fn test_list_simulator_processes() {
        let runner = ScriptedRunner::new().on(&["ps", "aux"], 0, PS_AUX, "");
        assert_eq!(list_simulator_processes(&runner).len(), 3);
    }
}
