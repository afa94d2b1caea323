//! # simsweep-core
//!
//! Core library for reclaiming disk space used by Xcode Simulator runtimes,
//! devices, and caches on macOS.
//!
//! The library drives Apple's command-line tools (`xcrun simctl`, `diskutil`,
//! `hdiutil`, `launchctl`, `df`) in carefully ordered sequences: stop
//! processes, deregister devices and runtimes, unmount runtime disk images,
//! delete backing files, then measure what was actually reclaimed.
//!
//! ## Modules
//!
//! - [`runner`] - Command execution trait, subprocess implementation, and the shared default runner
//! - [`scripted`] - Scripted runner for tests
//! - [`shell`] - Shell and AppleScript quoting for elevated and batched commands
//! - [`steps`] - Step and action result model
//! - [`simctl`] - `simctl runtime list` JSON parsing
//! - [`disks`] - `diskutil` parsing, simulator disk listing, force unmount
//! - [`space`] - APFS container and `df` free-space measurement
//! - [`processes`] - Simulator and Xcode process listing and termination
//! - [`cleanup`] - The cleanup orchestration service
//! - [`devtools`] - Xcode / `xcode-select` pre-flight checks
//! - [`sip`] - System Integrity Protection status
//! - [`config`] - Persistent user configuration
//!
//! ## External Dependencies
//!
//! - **Xcode** (for `xcrun simctl`). The Command Line Tools alone are not
//!   enough; see [`devtools::check_devtools`].
//!
//! ## Example
//!
//! ```no_run
//! use simsweep_core::cleanup::CleanupService;
//!
//! let service = CleanupService::detect();
//! let listing = service.list_runtimes();
//! for runtime in &listing.runtimes {
//!     println!("{} ({} bytes)", runtime.name, runtime.size_bytes);
//! }
//!
//! let result = service.delete_unavailable_sim_devices();
//! assert!(result.commands_ok || result.error.is_some());
//! ```

pub mod cleanup;
pub mod config;
pub mod devtools;
pub mod disks;
pub mod processes;
pub mod runner;
pub mod scripted;
pub mod shell;
pub mod simctl;
pub mod sip;
pub mod space;
pub mod steps;
