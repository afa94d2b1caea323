//! System Integrity Protection status.

use crate::runner::{CommandRunner, RunOptions};

/// Reads `csrutil status`.
///
/// `Some(true)` when enabled, `Some(false)` when disabled, `None` when the
/// output says neither (or `csrutil` is unavailable).
pub fn is_sip_enabled(runner: &dyn CommandRunner) -> Option<bool> {
    let result = runner.run_args(&["csrutil", "status"], &RunOptions::new());
    let output = result.stdout.trim().to_lowercase();
    // "enabled" is checked first: custom configurations print both words.
    if output.contains("enabled") {
        Some(true)
    } else if output.contains("disabled") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedRunner;

    fn status(stdout: &str) -> Option<bool> {
        let runner = ScriptedRunner::new().on(&["csrutil", "status"], 0, stdout.to_string(), "");
        is_sip_enabled(&runner)
    }

    #[test]
    fn test_sip_states() {
        assert_eq!(status("System Integrity Protection status: enabled.\n"), Some(true));
        assert_eq!(status("System Integrity Protection status: disabled.\n"), Some(false));
        assert_eq!(status(""), None);
    }

    #[test]
    fn test_sip_missing_tool() {
        assert_eq!(is_sip_enabled(&ScriptedRunner::new()), None);
    }
}
