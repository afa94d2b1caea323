//! Shell quoting for elevated and batched commands.
//!
//! Elevated commands cannot be passed as argv: `osascript` takes one shell
//! string inside an AppleScript string literal. These helpers render argv as
//! POSIX shell text and then escape it for AppleScript.

use crate::runner::EnvOverrides;

/// Shell-escape a string using single quotes. Internal single quotes become `'\''`.
pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    let safe = |c: char| c.is_ascii_alphanumeric() || "-_./@%+=:,".contains(c);
    if s.chars().all(safe) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Renders argv as one shell command line.
pub fn join_command<S: AsRef<str>>(cmd: &[S]) -> String {
    cmd.iter()
        .map(|part| shell_escape(part.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders `KEY=value` assignments to prefix a command line.
pub fn env_prefix(env: &EnvOverrides) -> String {
    env.iter()
        .map(|(key, value)| format!("{key}={}", shell_escape(value)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Joins several commands with ` ; ` so they run in sequence regardless of failures.
pub fn batch_command(commands: &[Vec<String>]) -> String {
    commands
        .iter()
        .map(|cmd| join_command(cmd))
        .collect::<Vec<_>>()
        .join(" ; ")
}

/// Escapes text for embedding in a double-quoted AppleScript string.
pub fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Builds the `osascript -e` script that runs `cmd` with administrator privileges.
pub fn admin_script<S: AsRef<str>>(cmd: &[S], env: Option<&EnvOverrides>) -> String {
    let mut line = join_command(cmd);
    if let Some(env) = env.filter(|env| !env.is_empty()) {
        line = format!("{} {line}", env_prefix(env));
    }
    format!(
        "do shell script \"{}\" with administrator privileges",
        escape_applescript(&line)
    )
}
