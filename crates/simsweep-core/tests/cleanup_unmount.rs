//! Tests for unmounting simulator disks and runtime volumes.
//!
//! Volume discovery globs real directories, so these tests lay out fake
//! runtime volumes in a temp directory and point the service at it.

mod common;

use std::fs;
use std::path::Path;

use common::{df_output, service, service_with_volumes};

use simsweep_core::scripted::ScriptedRunner;

fn volume_patterns(root: &Path) -> Vec<String> {
    ["iOS_*", "tvOS_*", "watchOS_*", "xrOS_*"]
        .iter()
        .map(|pattern| root.join(pattern).to_string_lossy().into_owned())
        .collect()
}

#[test]
fn test_unmount_simulator_disk_falls_back_to_hdiutil() {
    let (runner, service) = service(
        ScriptedRunner::new()
            .on(&["diskutil", "unmountDisk", "force", "/dev/disk7"], 1, "", "diskutil fail")
            .on(&["hdiutil", "detach", "/dev/disk7", "-force"], 0, "", ""),
    );

    let result = service.unmount_simulator_disk("/dev/disk7s1");

    assert!(result.commands_ok);
    assert!(result.error.is_none());
    assert_eq!(
        runner.argv_calls(),
        vec![
            vec!["diskutil", "unmountDisk", "force", "/dev/disk7"],
            vec!["hdiutil", "detach", "/dev/disk7", "-force"],
        ]
    );
}

#[test]
fn test_unmount_simulator_disk_steps_are_best_effort() {
    let (_, service) = service(ScriptedRunner::new().with_default(1, "", "Resource busy"));

    let result = service.unmount_simulator_disk("disk7s1");

    assert!(!result.commands_ok);
    assert_eq!(result.error.as_deref(), Some("Resource busy"));
    assert!(result.steps.iter().all(|step| !step.is_required() && step.allow_not_mounted));
}

#[test]
fn test_unmount_volumes_dedupes_parent_disk() {
    let root = tempfile::tempdir().unwrap();
    let ios = root.path().join("iOS_22G86");
    let watch = root.path().join("watchOS_22R349");
    fs::create_dir(&ios).unwrap();
    fs::create_dir(&watch).unwrap();
    let ios_str = ios.to_string_lossy().into_owned();
    let watch_str = watch.to_string_lossy().into_owned();

    let (runner, service) = service_with_volumes(
        ScriptedRunner::new()
            .on(&["df", &ios_str], 0, df_output("/dev/disk7s1", &ios), "")
            .on(&["df", &watch_str], 0, df_output("/dev/disk7s2", &watch), "")
            .on(&["diskutil", "unmountDisk", "force", "/dev/disk7"], 0, "", ""),
        volume_patterns(root.path()),
    );

    let steps = service.unmount_simulator_volumes();

    assert_eq!(runner.call_count(&["diskutil", "unmountDisk", "force", "/dev/disk7"]), 1);
    assert_eq!(runner.call_count(&["df", &ios_str]), 1);
    assert_eq!(runner.call_count(&["df", &watch_str]), 1);
    assert_eq!(steps.len(), 3);
    assert!(steps.iter().all(|step| !step.is_required()));
}

#[test]
fn test_unmount_volumes_skips_failed_df() {
    let root = tempfile::tempdir().unwrap();
    let ios = root.path().join("iOS_22G86");
    let tv = root.path().join("tvOS_22J580");
    fs::create_dir(&ios).unwrap();
    fs::create_dir(&tv).unwrap();
    let ios_str = ios.to_string_lossy().into_owned();
    let tv_str = tv.to_string_lossy().into_owned();

    let (runner, service) = service_with_volumes(
        ScriptedRunner::new()
            .on(&["df", &ios_str], 1, "", "df: no such file or directory")
            .on(&["df", &tv_str], 0, df_output("/dev/disk9s1", &tv), "")
            .on(&["diskutil", "unmountDisk", "force", "/dev/disk9"], 0, "", ""),
        volume_patterns(root.path()),
    );

    let steps = service.unmount_simulator_volumes();

    assert_eq!(steps.len(), 3);
    assert!(runner.was_called(&["diskutil", "unmountDisk", "force", "/dev/disk9"]));
    assert_eq!(runner.argv_calls().iter().filter(|cmd| cmd[0] == "diskutil").count(), 1);
}

#[test]
fn test_unmount_volumes_ignores_non_runtime_dirs() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir(root.path().join("Other")).unwrap();

    let (runner, service) = service_with_volumes(ScriptedRunner::new(), volume_patterns(root.path()));

    assert!(service.unmount_simulator_volumes().is_empty());
    assert!(runner.calls().is_empty());
}

#[test]
fn test_remove_runtime_directories_batches_all_paths() {
    let root = tempfile::tempdir().unwrap();
    let ios = root.path().join("iOS_22G86");
    let xr = root.path().join("xrOS_22N895");
    fs::create_dir(&ios).unwrap();
    fs::create_dir(&xr).unwrap();

    let (runner, service) = service_with_volumes(ScriptedRunner::new().with_default(0, "", ""), volume_patterns(root.path()));

    let steps = service.remove_runtime_directories();

    assert_eq!(steps.len(), 1);
    assert!(steps[0].is_required());
    assert_eq!(steps[0].label, "rm -rf simulator runtime directories");

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].sudo);
    let script = &calls[0].argv[2];
    assert_eq!(script.matches("rm -rf").count(), 3);
    assert_eq!(script.matches(" ; ").count(), 2);
    assert!(script.ends_with("rm -rf /nonexistent/simsweep/Cryptex"));
}
