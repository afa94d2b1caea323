//! Simulator disk-image discovery via `diskutil`.
//!
//! Runtime disk images show up in `diskutil list` as slices such as
//! `disk7s1` next to a volume name mentioning Simulator or an OS family.
//! The parsing functions here are pure; [`list_simulator_disks`] and
//! [`force_unmount_disk`] run the tools through a [`CommandRunner`].

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::runner::{CommandRunner, RunOptions};

/// Keywords that mark a `diskutil list` line as simulator-related.
pub const DEFAULT_KEYWORDS: [&str; 6] = ["Simulator", "Xcode", "iOS", "watchOS", "tvOS", "xrOS"];

static SLICE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(disk\d+s\d+)\b").expect("constant regex pattern is valid"));

static PARENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(/dev/disk\d+)").expect("constant regex pattern is valid"));

static BYTES_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)\s+Bytes\)").expect("constant regex pattern is valid"));

/// Errors from unmounting a disk.
#[derive(Error, Debug)]
pub enum DiskError {
    /// Both `diskutil unmountDisk` and `hdiutil detach` failed.
    #[error("Failed to unmount {device}: {message}")]
    UnmountFailed {
        /// The parent disk that was targeted.
        device: String,
        /// Tool output.
        message: String,
    },
}

/// Details of one volume from `diskutil info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    /// Volume name, `"Unknown"` when absent.
    pub name: String,
    /// Mount point, `"Not Mounted"` when absent or not applicable.
    pub mount: String,
    /// Human-readable size such as `59.6 GB`, `"Unknown"` when absent.
    pub size: String,
    /// Exact size in bytes when diskutil printed it.
    pub size_bytes: Option<u64>,
}

/// A simulator disk slice with its details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorDisk {
    /// Device path, e.g. `/dev/disk7s1`.
    pub device: String,
    /// Volume details.
    #[serde(flatten)]
    pub info: DiskInfo,
}

/// Extracts simulator disk slices (`diskNsM`) from `diskutil list` output.
///
/// Only lines mentioning one of `keywords` are considered. Results are
/// deduplicated and kept in first-seen order.
pub fn parse_diskutil_list(text: &str, keywords: &[&str]) -> Vec<String> {
    let mut disks: Vec<String> = Vec::new();
    for line in text.lines() {
        if !keywords.iter().any(|keyword| line.contains(keyword)) {
            continue;
        }
        let Some(captures) = SLICE_PATTERN.captures(line) else {
            continue;
        };
        let device = captures[1].to_string();
        if !disks.contains(&device) {
            disks.push(device);
        }
    }
    disks
}

/// Splits `Disk Size: 59.6 GB (64021856256 Bytes)` into the human string and byte count.
fn parse_size_line(line: &str) -> (String, Option<u64>) {
    let Some((_, value)) = line.split_once(':') else {
        return (String::new(), None);
    };
    let value = value.trim();
    let size_bytes = BYTES_PATTERN
        .captures(value)
        .and_then(|captures| captures[1].parse().ok());
    let size = value.split('(').next().unwrap_or_default().trim().to_string();
    (size, size_bytes)
}

fn field_after<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.split_once(marker).map(|(_, rest)| rest.trim())
}

/// Parses `diskutil info <device>` output.
///
/// `Total Size:` is only used when no `Disk Size:` line came first. Mount
/// points reported as "Not Applicable" or "Not Mounted" become `Not Mounted`.
pub fn parse_diskutil_info(text: &str) -> DiskInfo {
    let mut name = String::new();
    let mut mount = String::new();
    let mut size = String::new();
    let mut size_bytes = None;

    for line in text.lines() {
        if let Some(value) = field_after(line, "Volume Name:") {
            name = value.to_string();
        } else if let Some(value) = field_after(line, "Mount Point:") {
            mount = value.to_string();
        } else if line.contains("Disk Size:") {
            (size, size_bytes) = parse_size_line(line);
        } else if line.contains("Total Size:") && size.is_empty() {
            (size, size_bytes) = parse_size_line(line);
        }
    }

    let lowered = mount.to_lowercase();
    if lowered.starts_with("not applicable") || lowered.starts_with("not mounted") {
        mount.clear();
    }

    let or_default = |value: String, default: &str| {
        if value.is_empty() {
            default.to_string()
        } else {
            value
        }
    };

    DiskInfo {
        name: or_default(name, "Unknown"),
        mount: or_default(mount, "Not Mounted"),
        size: or_default(size, "Unknown"),
        size_bytes,
    }
}

/// Maps a slice (`disk7s1` or `/dev/disk7s1`) to its parent disk (`/dev/disk7`).
///
/// Input that doesn't look like a disk device is returned as given (with a
/// `/dev/` prefix if it started with `disk`).
pub fn parent_disk(device: &str) -> String {
    let device = if device.starts_with("disk") {
        format!("/dev/{device}")
    } else {
        device.to_string()
    };
    PARENT_PATTERN
        .captures(&device)
        .map_or(device.clone(), |captures| captures[1].to_string())
}

/// Lists simulator disk slices with their `diskutil info` details.
///
/// `progress`, when given, is called with a 0-99 percentage before each slice
/// is queried.
pub fn list_simulator_disks(
    runner: &dyn CommandRunner,
    mut progress: Option<&mut dyn FnMut(u8)>,
) -> Vec<SimulatorDisk> {
    let listing = runner.run_args(&["diskutil", "list"], &RunOptions::new());
    let devices = parse_diskutil_list(&listing.stdout, &DEFAULT_KEYWORDS);
    let total = devices.len().max(1);

    let mut disks = Vec::with_capacity(devices.len());
    for (index, device) in devices.iter().enumerate() {
        if let Some(report) = progress.as_mut() {
            report((index * 100 / total) as u8);
        }
        let device_path = format!("/dev/{device}");
        let info = runner.run_args(&["diskutil", "info", &device_path], &RunOptions::new());
        disks.push(SimulatorDisk {
            device: device_path,
            info: parse_diskutil_info(&info.stdout),
        });
    }
    debug!(count = disks.len(), "Listed simulator disks");
    disks
}

/// Force-unmounts the parent disk of `device`.
///
/// Tries `diskutil unmountDisk force` first and falls back to
/// `hdiutil detach -force`. A disk that is already unmounted counts as success.
///
/// # Errors
///
/// [`DiskError::UnmountFailed`] with the last tool output when both attempts fail.
pub fn force_unmount_disk(
    runner: &dyn CommandRunner,
    device: &str,
    timeout: Duration,
) -> Result<String, DiskError> {
    let parent = parent_disk(device);
    let timeout = timeout.max(Duration::from_secs(1));
    let opts = RunOptions::new().timeout(timeout);

    let result = runner.run_args(&["diskutil", "unmountDisk", "force", &parent], &opts);
    if result.success() {
        return Ok(format!("Unmounted {parent}"));
    }

    let result = runner.run_args(&["hdiutil", "detach", "-force", &parent], &opts);
    if result.success() {
        return Ok(format!("Detached {parent}"));
    }

    let message = [result.stderr.trim(), result.stdout.trim()]
        .into_iter()
        .find(|text| !text.is_empty())
        .map_or_else(|| format!("Failed to unmount {parent}"), str::to_string);
    if message.to_lowercase().contains("not mounted") {
        return Ok(format!("{parent} already unmounted"));
    }
    Err(DiskError::UnmountFailed {
        device: parent,
        message,
    })
}
