//! Step and action outcomes.
//!
//! A [`StepResult`] labels one command attempt and decides whether it
//! succeeded. An [`ActionResult`] aggregates the steps of one user-facing
//! action; a [`CleanupResult`] additionally carries the APFS free-space
//! snapshots taken around the action.
//!
//! Only [`Requirement::Required`] steps gate `commands_ok`. Best-effort steps
//! (process kills, unmount attempts, probe deletes) are run and reported but
//! cannot fail an action on their own.

use serde::{Deserialize, Serialize};

use crate::runner::CmdResult;

/// Output fragments meaning the OS refused the operation, even on exit code 0.
pub const DENIED_MARKERS: [&str; 2] = ["operation not permitted", "permission denied"];

/// Output fragments meaning the target was already unmounted.
pub const NOT_MOUNTED_MARKERS: [&str; 3] = ["not mounted", "not currently mounted", "not a mount point"];

/// Whether a step's failure fails the whole action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// Failure fails the action.
    Required,
    /// Attempted and logged, but cannot fail the action by itself.
    BestEffort,
}

fn combined_output(result: &CmdResult) -> String {
    format!("{} {}", result.stderr, result.stdout).to_lowercase()
}

/// Whether the output carries a permission-denied marker.
pub fn is_denied(result: &CmdResult) -> bool {
    let message = combined_output(result);
    DENIED_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Whether the output says the target is not mounted.
pub fn is_not_mounted(result: &CmdResult) -> bool {
    let message = combined_output(result);
    NOT_MOUNTED_MARKERS.iter().any(|marker| message.contains(marker))
}

/// One labeled command attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    /// Human-readable description, usually the command line.
    pub label: String,
    /// What the command did.
    pub result: CmdResult,
    /// Whether failure here fails the action.
    pub requirement: Requirement,
    /// Whether the command ran elevated.
    pub sudo: bool,
    /// Whether an "already unmounted" failure counts as success.
    pub allow_not_mounted: bool,
}

impl StepResult {
    /// A required, unelevated step.
    pub fn new(label: impl Into<String>, result: CmdResult) -> Self {
        Self {
            label: label.into(),
            result,
            requirement: Requirement::Required,
            sudo: false,
            allow_not_mounted: false,
        }
    }

    /// A best-effort, unelevated step.
    pub fn best_effort(label: impl Into<String>, result: CmdResult) -> Self {
        Self::new(label, result).with_requirement(Requirement::BestEffort)
    }

    /// Sets the requirement.
    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirement = requirement;
        self
    }

    /// Marks the step as elevated.
    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    /// Lets "not mounted" output count as success.
    pub fn allowing_not_mounted(mut self, allow: bool) -> Self {
        self.allow_not_mounted = allow;
        self
    }

    /// Whether failure here fails the action.
    pub fn is_required(&self) -> bool {
        self.requirement == Requirement::Required
    }

    /// Whether the step succeeded.
    ///
    /// Timeouts and permission-denied output always fail, whatever the exit
    /// code says; some tools print a denial and still exit 0.
    pub fn ok(&self) -> bool {
        if self.result.timed_out || is_denied(&self.result) {
            return false;
        }
        if self.result.returncode == 0 {
            return true;
        }
        self.allow_not_mounted && is_not_mounted(&self.result)
    }

    /// Trimmed stderr, else trimmed stdout, else `None`.
    pub fn output_message(&self) -> Option<String> {
        [&self.result.stderr, &self.result.stdout]
            .into_iter()
            .map(|text| text.trim())
            .find(|text| !text.is_empty())
            .map(str::to_string)
    }

    /// The message to surface when this step failed.
    pub fn failure_message(&self) -> String {
        self.output_message()
            .unwrap_or_else(|| format!("{} failed", self.label))
    }
}

/// True iff every required step is ok.
pub fn commands_ok(steps: &[StepResult]) -> bool {
    steps.iter().filter(|step| step.is_required()).all(StepResult::ok)
}

/// The failure message of the first required step that is not ok.
pub fn first_required_error(steps: &[StepResult]) -> Option<String> {
    steps
        .iter()
        .find(|step| step.is_required() && !step.ok())
        .map(StepResult::failure_message)
}

/// Outcome of one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    /// True iff every required step is ok.
    pub commands_ok: bool,
    /// Steps in execution order.
    pub steps: Vec<StepResult>,
    /// First failing required step's message, or an abort reason.
    pub error: Option<String>,
}

impl ActionResult {
    /// Aggregates steps with the default required-step rules.
    pub fn from_steps(steps: Vec<StepResult>) -> Self {
        Self {
            commands_ok: commands_ok(&steps),
            error: first_required_error(&steps),
            steps,
        }
    }

    /// An action that stopped early with `error`.
    pub fn aborted(steps: Vec<StepResult>, error: impl Into<String>) -> Self {
        Self {
            commands_ok: false,
            steps,
            error: Some(error.into()),
        }
    }
}

/// Outcome of a space-reclaiming action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupResult {
    /// True iff every required step is ok.
    pub commands_ok: bool,
    /// APFS available bytes before the action.
    pub space_before: Option<u64>,
    /// APFS available bytes after the action.
    pub space_after: Option<u64>,
    /// `space_after - space_before`.
    pub space_delta: Option<i64>,
    /// Whether the delta is strictly positive.
    pub space_ok: Option<bool>,
    /// Steps in execution order.
    pub steps: Vec<StepResult>,
    /// First failing required step's message, or an abort reason.
    pub error: Option<String>,
}

impl CleanupResult {
    /// Builds the result, computing the delta when both snapshots exist.
    pub fn new(
        steps: Vec<StepResult>,
        error: Option<String>,
        space_before: Option<u64>,
        space_after: Option<u64>,
    ) -> Self {
        let space_delta = match (space_before, space_after) {
            (Some(before), Some(after)) => Some(after as i64 - before as i64),
            _ => None,
        };
        Self {
            commands_ok: commands_ok(&steps),
            space_before,
            space_after,
            space_delta,
            space_ok: space_delta.map(|delta| delta > 0),
            steps,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(code: i32, stdout: &str, stderr: &str) -> CmdResult {
        CmdResult::from_text(vec!["cmd".to_string()], code, stdout, stderr)
    }

    #[test]
    fn test_denied_marker_forces_failure() {
        let step = StepResult::new("rm -rf Cryptex", cmd(0, "", "Operation not permitted"));
        assert!(!step.ok());
        let step = StepResult::new("rm", cmd(0, "rm: Permission denied", ""));
        assert!(!step.ok());
    }

    #[test]
    fn test_timed_out_forces_failure() {
        let mut result = cmd(0, "", "");
        result.timed_out = true;
        assert!(!StepResult::new("simctl runtime list", result).ok());
    }

    #[test]
    fn test_allow_not_mounted_passes_on_not_mounted() {
        let step = StepResult::new("unmount", cmd(1, "", "disk7 not mounted")).allowing_not_mounted(true);
        assert!(step.ok());
        let step = StepResult::new("unmount", cmd(1, "", "disk7 not mounted"));
        assert!(!step.ok());
    }

    #[test]
    fn test_denial_beats_not_mounted() {
        let step = StepResult::new("unmount", cmd(1, "", "not mounted: permission denied")).allowing_not_mounted(true);
        assert!(!step.ok());
    }

    #[test]
    fn test_best_effort_failure_does_not_gate() {
        let steps = vec![
            StepResult::best_effort("pkill", cmd(1, "", "no process")),
            StepResult::new("rm", cmd(0, "", "")),
        ];
        let action = ActionResult::from_steps(steps);
        assert!(action.commands_ok);
        assert!(action.error.is_none());
    }

    #[test]
    fn test_first_required_error_prefers_stderr_then_stdout_then_label() {
        let steps = vec![
            StepResult::new("a", cmd(0, "", "")),
            StepResult::new("b", cmd(1, "out b", "  ")),
            StepResult::new("c", cmd(1, "", "err c")),
        ];
        assert_eq!(first_required_error(&steps).as_deref(), Some("out b"));
        let silent = vec![StepResult::new("xcrun simctl delete all", cmd(2, "", ""))];
        assert_eq!(first_required_error(&silent).as_deref(), Some("xcrun simctl delete all failed"));
    }

    #[test]
    fn test_cleanup_result_space_delta() {
        let result = CleanupResult::new(Vec::new(), None, Some(100), Some(155));
        assert_eq!(result.space_delta, Some(55));
        assert_eq!(result.space_ok, Some(true));

        let result = CleanupResult::new(Vec::new(), None, Some(100), Some(100));
        assert_eq!(result.space_ok, Some(false));

        let result = CleanupResult::new(Vec::new(), None, Some(100), Some(90));
        assert_eq!(result.space_delta, Some(-10));
        assert_eq!(result.space_ok, Some(false));

        let result = CleanupResult::new(Vec::new(), None, None, Some(90));
        assert_eq!(result.space_delta, None);
        assert_eq!(result.space_ok, None);
    }

    #[test]
    fn test_aborted_is_never_ok() {
        let action = ActionResult::aborted(vec![StepResult::new("a", cmd(0, "", ""))], "Runtime still registered: x");
        assert!(!action.commands_ok);
        assert_eq!(action.error.as_deref(), Some("Runtime still registered: x"));
    }
}
