//! Free-space measurement.
//!
//! The number that matters after a cleanup is the APFS container's
//! unallocated capacity. Volumes in one container share space, so the sizes
//! of mounted disk images say nothing about what was actually reclaimed; the
//! container has to be measured before and after. `df` is kept as a
//! secondary reading.
//!
//! # Example
//!
//! ```
//! use simsweep_core::space::parse_df_output;
//!
//! let usage = parse_df_output("Filesystem 1K-blocks Used Available\n/dev/disk1 10 2 8\n").unwrap();
//! assert_eq!(usage.available_bytes, 8192);
//! ```

use std::io::Cursor;
use std::time::Duration;

use plist::{Dictionary, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runner::{CommandRunner, RunOptions};

/// The user data volume on modern macOS.
pub const DATA_VOLUME: &str = "/System/Volumes/Data";

const CAPACITY_KEYS: [&str; 3] = ["CapacityNotAllocated", "CapacityFree", "CapacityAvailable"];

/// Capacity figures from `df -k`, converted to bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DfUsage {
    /// Total size.
    pub blocks_bytes: u64,
    /// Used space.
    pub used_bytes: u64,
    /// Available space.
    pub available_bytes: u64,
}

/// Parses `df -k <path>` output.
///
/// Only the last non-blank line is read, since long filesystem names can wrap
/// a row onto two lines. Returns `None` for fewer than two non-blank lines,
/// fewer than four columns, or non-numeric counts.
pub fn parse_df_output(text: &str) -> Option<DfUsage> {
    let lines: Vec<&str> = text.lines().filter(|line| !line.trim().is_empty()).collect();
    if lines.len() < 2 {
        return None;
    }
    let parts: Vec<&str> = lines.last()?.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }
    let kib = |column: &str| column.parse::<u64>().ok().map(|blocks| blocks * 1024);
    Some(DfUsage {
        blocks_bytes: kib(parts[1])?,
        used_bytes: kib(parts[2])?,
        available_bytes: kib(parts[3])?,
    })
}

/// Runs `df -k <path>` and parses it. `None` on a non-zero exit.
pub fn df_bytes(runner: &dyn CommandRunner, path: &str) -> Option<DfUsage> {
    let result = runner.run_args(&["df", "-k", path], &RunOptions::new());
    if result.returncode != 0 {
        return None;
    }
    parse_df_output(&result.stdout)
}

fn dictionaries<'a>(parent: &'a Dictionary, key: &str) -> impl Iterator<Item = &'a Dictionary> {
    parent
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_dictionary)
}

/// Finds the container holding `mount_point`.
///
/// A volume with the Data role also matches, but only when the query is for
/// [`DATA_VOLUME`] itself.
fn find_container_for_mount<'a>(apfs: &'a Dictionary, mount_point: &str) -> Option<&'a Dictionary> {
    dictionaries(apfs, "Containers").find(|container| {
        dictionaries(container, "Volumes").any(|volume| {
            if volume.get("MountPoint").and_then(Value::as_string) == Some(mount_point) {
                return true;
            }
            mount_point == DATA_VOLUME
                && volume
                    .get("Roles")
                    .and_then(Value::as_array)
                    .is_some_and(|roles| roles.iter().any(|role| role.as_string() == Some("Data")))
        })
    })
}

/// Reads the free capacity of the container holding `mount_point` from
/// `diskutil apfs list -plist` output (binary or XML).
///
/// Tries `CapacityNotAllocated`, then `CapacityFree`, then
/// `CapacityAvailable`, returning the first integer value.
pub fn parse_apfs_not_allocated(plist_bytes: &[u8], mount_point: &str) -> Option<u64> {
    let apfs = match Value::from_reader(Cursor::new(plist_bytes)) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Failed to parse APFS plist");
            return None;
        }
    };
    let container = find_container_for_mount(apfs.as_dictionary()?, mount_point)?;
    CAPACITY_KEYS
        .iter()
        .find_map(|key| container.get(key).and_then(Value::as_unsigned_integer))
}

/// Queries the APFS container free space for `mount_point`.
///
/// `None` when `diskutil` fails, times out, or its output can't be interpreted.
pub fn get_apfs_available_bytes(
    runner: &dyn CommandRunner,
    mount_point: &str,
    timeout: Option<Duration>,
) -> Option<u64> {
    let opts = RunOptions::new().binary().maybe_timeout(timeout);
    let result = runner.run_args(&["diskutil", "apfs", "list", "-plist"], &opts);
    if result.returncode != 0 {
        debug!(code = result.returncode, "diskutil apfs list failed");
        return None;
    }
    parse_apfs_not_allocated(&result.stdout_payload(), mount_point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedRunner;

    fn apfs_plist(volume: &str, capacity: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Containers</key>
    <array>
        <dict>
            <key>ContainerReference</key>
            <string>disk1</string>
            <key>CapacityFree</key>
            <integer>5</integer>
            {capacity}
            <key>Volumes</key>
            <array>
                {volume}
            </array>
        </dict>
    </array>
</dict>
</plist>"#
        )
    }

    const DATA_ROLE_VOLUME: &str =
        "<dict><key>Roles</key><array><string>Data</string></array></dict>";

    #[test]
    fn test_parse_df_output() {
        let usage = parse_df_output("Filesystem 1K-blocks Used Available\n/dev/disk1 10 2 8\n").unwrap();
        assert_eq!(
            usage,
            DfUsage {
                blocks_bytes: 10240,
                used_bytes: 2048,
                available_bytes: 8192
            }
        );
    }

    #[test]
    fn test_parse_df_output_wrapped_line() {
        let text = "Filesystem 1K-blocks Used Available Capacity\nmap very-long-filesystem-name\n  x 100 40 60 40%\n";
        assert_eq!(parse_df_output(text).unwrap().available_bytes, 60 * 1024);
    }

    #[test]
    fn test_parse_df_output_rejects_bad_input() {
        assert!(parse_df_output("").is_none());
        assert!(parse_df_output("/dev/disk1 10 2 8\n").is_none());
        assert!(parse_df_output("Filesystem 1K-blocks\n/dev/disk1 10 2\n").is_none());
        assert!(parse_df_output("Filesystem 1K-blocks Used Available\n/dev/disk1 ten 2 8\n").is_none());
    }

    #[test]
    fn test_df_bytes_runs_df_k() {
        let runner = ScriptedRunner::new().on(
            &["df", "-k", DATA_VOLUME],
            0,
            "Filesystem 1K-blocks Used Available\n/dev/disk3s5 100 50 50\n",
            "",
        );
        assert_eq!(df_bytes(&runner, DATA_VOLUME).unwrap().used_bytes, 50 * 1024);

        let failing = ScriptedRunner::new().with_default(1, "", "df: no such file");
        assert!(df_bytes(&failing, DATA_VOLUME).is_none());
    }

    #[test]
    fn test_parse_apfs_not_allocated_data_role() {
        let xml = apfs_plist(
            DATA_ROLE_VOLUME,
            "<key>CapacityNotAllocated</key><integer>100000000000</integer>",
        );
        assert_eq!(parse_apfs_not_allocated(xml.as_bytes(), DATA_VOLUME), Some(100_000_000_000));
    }

    #[test]
    fn test_parse_apfs_falls_back_to_capacity_free() {
        let xml = apfs_plist(DATA_ROLE_VOLUME, "");
        assert_eq!(parse_apfs_not_allocated(xml.as_bytes(), DATA_VOLUME), Some(5));
    }

    #[test]
    fn test_parse_apfs_matches_mount_point() {
        let volume = "<dict><key>MountPoint</key><string>/Volumes/External</string></dict>";
        let xml = apfs_plist(volume, "<key>CapacityNotAllocated</key><integer>42</integer>");
        assert_eq!(parse_apfs_not_allocated(xml.as_bytes(), "/Volumes/External"), Some(42));
        assert_eq!(parse_apfs_not_allocated(xml.as_bytes(), DATA_VOLUME), None);
    }

    #[test]
    fn test_parse_apfs_data_role_only_for_data_volume() {
        let xml = apfs_plist(DATA_ROLE_VOLUME, "<key>CapacityNotAllocated</key><integer>42</integer>");
        assert_eq!(parse_apfs_not_allocated(xml.as_bytes(), "/Volumes/Other"), None);
    }

    #[test]
    fn test_parse_apfs_rejects_garbage() {
        assert_eq!(parse_apfs_not_allocated(b"not a plist", DATA_VOLUME), None);
    }

    #[test]
    fn test_get_apfs_available_bytes_uses_binary_mode() {
        let xml = apfs_plist(
            DATA_ROLE_VOLUME,
            "<key>CapacityNotAllocated</key><integer>155000000000</integer>",
        );
        let runner = ScriptedRunner::new().on_binary(&["diskutil", "apfs", "list", "-plist"], 0, xml, "");
        assert_eq!(
            get_apfs_available_bytes(&runner, DATA_VOLUME, Some(Duration::from_secs(20))),
            Some(155_000_000_000)
        );
        assert!(!runner.calls()[0].text);
        assert_eq!(runner.calls()[0].timeout, Some(Duration::from_secs(20)));
    }

    #[test]
    fn test_get_apfs_available_bytes_none_on_failure() {
        let runner = ScriptedRunner::new().on_binary(&["diskutil", "apfs", "list", "-plist"], 1, "", "boom");
        assert_eq!(get_apfs_available_bytes(&runner, DATA_VOLUME, None), None);
    }
}
