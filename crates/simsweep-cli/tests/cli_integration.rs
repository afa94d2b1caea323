use assert_cmd::Command;
use predicates::prelude::*;

fn simsweep() -> Command {
    let mut cmd = Command::cargo_bin("simsweep").unwrap();
    cmd.env_remove("SIMSWEEP_TIMEOUT");
    cmd
}

#[test]
fn test_help_exits_zero() {
    simsweep()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("simsweep"))
        .stdout(predicate::str::contains("free-space"))
        .stdout(predicate::str::contains("nuclear"));
}

#[test]
fn test_version_exits_zero() {
    simsweep()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("simsweep "));
}

#[test]
fn test_unknown_subcommand_is_usage_error() {
    simsweep()
        .arg("defragment")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_missing_subcommand_is_usage_error() {
    simsweep().assert().code(2);
}

#[test]
fn test_nuclear_requires_confirmation() {
    simsweep()
        .arg("nuclear")
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn test_delete_runtime_requires_identifier() {
    simsweep().arg("delete-runtime").assert().code(2);
}

#[test]
fn test_invalid_format_is_usage_error() {
    simsweep()
        .args(["--format", "yaml", "runtimes"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("yaml"));
}

#[test]
fn test_invalid_timeout_is_usage_error() {
    simsweep()
        .args(["--timeout", "soon", "runtimes"])
        .assert()
        .code(2);
}

#[test]
fn test_free_space_help_lists_flags() {
    simsweep()
        .args(["free-space", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--system"))
        .stdout(predicate::str::contains("--user-space"))
        .stdout(predicate::str::contains("--no-measure"));
}

#[test]
fn test_keep_system_files_help_describes_deregister_and_unmount() {
    simsweep()
        .args(["remove-backing-files", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deregister runtimes"))
        .stdout(predicate::str::contains("Cryptex").not());
}
