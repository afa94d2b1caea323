//! Shared test helpers for simsweep-core integration tests.
//!
//! Fixtures mirror real tool output, and [`service`] builds a
//! [`CleanupService`] over a [`ScriptedRunner`] whose volume globs point at
//! nothing, so no test ever looks at the real `/Library`.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use simsweep_core::cleanup::CleanupService;
use simsweep_core::scripted::ScriptedRunner;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const IOS_18_6: &str = "com.apple.CoreSimulator.SimRuntime.iOS-18-6";

pub const RUNTIME_LIST_JSON: &str = r#"{
  "com.apple.CoreSimulator.SimRuntime.iOS-18-6" : {
    "build" : "22G86",
    "deletable" : true,
    "identifier" : "com.apple.CoreSimulator.SimRuntime.iOS-18-6",
    "name" : "iOS 18.6",
    "sizeBytes" : 8947372032,
    "state" : "Ready",
    "version" : "18.6"
  }
}"#;

pub const RUNTIME_LIST_EMPTY: &str = "{}";

pub const RUNTIME_LIST_CMD: [&str; 5] = ["xcrun", "simctl", "runtime", "list", "-j"];

pub const APFS_LIST_CMD: [&str; 4] = ["diskutil", "apfs", "list", "-plist"];

pub const APFS_BEFORE_BYTES: u64 = 100_000_000_000;
pub const APFS_AFTER_BYTES: u64 = 155_000_000_000;

/// `diskutil apfs list -plist` output with one container holding the Data volume.
pub fn apfs_plist(not_allocated: u64) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>Containers</key>
	<array>
		<dict>
			<key>APFSContainerUUID</key>
			<string>6F2C9B4A-1D1E-4C59-9D3B-2B0E5A7C8F10</string>
			<key>CapacityCeiling</key>
			<integer>994662584320</integer>
			<key>CapacityNotAllocated</key>
			<integer>{not_allocated}</integer>
			<key>ContainerReference</key>
			<string>disk3</string>
			<key>Volumes</key>
			<array>
				<dict>
					<key>DeviceIdentifier</key>
					<string>disk3s1</string>
					<key>Name</key>
					<string>Macintosh HD - Data</string>
					<key>Roles</key>
					<array>
						<string>Data</string>
					</array>
				</dict>
			</array>
		</dict>
	</array>
</dict>
</plist>
"#
    )
}

/// `df <volume>` output whose backing device is `device`.
pub fn df_output(device: &str, volume: &Path) -> String {
    format!(
        "Filesystem     512-blocks     Used Available Capacity iused ifree %iused  Mounted on\n\
         {device} 1 1 1 1% 1 1 1% {}\n",
        volume.display()
    )
}

// ---------------------------------------------------------------------------
// Service construction
// ---------------------------------------------------------------------------

/// A service over `runner` with no volume globs and a throwaway Cryptex path.
pub fn service(runner: ScriptedRunner) -> (Arc<ScriptedRunner>, CleanupService) {
    service_with_volumes(runner, Vec::<String>::new())
}

/// A service over `runner` globbing `patterns` for runtime volumes.
pub fn service_with_volumes(runner: ScriptedRunner, patterns: Vec<String>) -> (Arc<ScriptedRunner>, CleanupService) {
    let runner = Arc::new(runner);
    let service = CleanupService::new(runner.clone(), None)
        .with_volume_patterns(patterns)
        .with_cryptex_path("/nonexistent/simsweep/Cryptex");
    (runner, service)
}
