//! CLI for reclaiming disk space used by Xcode Simulator runtimes and devices.
//!
//! Every action prints its steps and exits 0 when all required steps
//! succeeded, 1 otherwise.
//!
//! # Usage
//!
//! ```bash
//! # Check that Xcode's simctl is usable
//! simsweep doctor
//!
//! # List installed runtimes as JSON
//! simsweep --format json runtimes
//!
//! # Delete one runtime
//! simsweep delete-runtime com.apple.CoreSimulator.SimRuntime.iOS-18-6
//!
//! # Delete devices simctl reports as unavailable
//! simsweep delete-devices --unavailable
//!
//! # Remove runtime disk images and backing files, measuring reclaimed space
//! simsweep free-space --system
//!
//! # Also delete DerivedData
//! simsweep free-space --system --user-space --derived-data
//!
//! # Wipe everything simulator related
//! simsweep nuclear --yes
//!
//! # Use a specific Xcode and a 60 second per-command timeout
//! simsweep --developer-dir /Applications/Xcode-beta.app/Contents/Developer --timeout 60 runtimes
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;
use simsweep_core::cleanup::{CleanupService, FreeSpaceOptions, ManualCleanupOptions};
use simsweep_core::config::SweepConfig;
use simsweep_core::devtools::{self, DEFAULT_XCODE_DEVELOPER_DIR};
use simsweep_core::runner::{default_runner, CmdResult};
use simsweep_core::steps::{ActionResult, CleanupResult, StepResult};
use simsweep_core::{disks, processes, sip, space};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simsweep")]
#[command(about = "Reclaim disk space used by Xcode Simulator runtimes, devices and caches")]
#[command(version)]
struct Cli {
    /// Output format
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Log progress at info level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Xcode developer directory passed to simctl
    #[arg(long, env = "DEVELOPER_DIR", global = true)]
    developer_dir: Option<String>,

    /// Per-command timeout in seconds
    #[arg(long, env = "SIMSWEEP_TIMEOUT", global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Check that Xcode command line tools can run simctl
    Doctor,

    /// List installed simulator runtimes
    Runtimes,

    /// Delete runtimes by identifier
    DeleteRuntime {
        /// Runtime identifiers (e.g. com.apple.CoreSimulator.SimRuntime.iOS-18-6)
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Delete every installed runtime
    DeleteAllRuntimes,

    /// Delete runtimes simctl reports as unusable
    DeleteUnavailableRuntimes,

    /// Delete simulator devices
    DeleteDevices {
        /// Only delete unavailable devices
        #[arg(long)]
        unavailable: bool,
    },

    /// Remove the per-user Devices directory and installed provisioning profiles
    RemoveDeviceDirs,

    /// Clear per-user simulator caches
    ClearCaches,

    /// Disable the CoreSimulator launch service (requires admin)
    DisableService,

    /// Show Xcode, volume, SIP and free-space status
    Status,

    /// List simulator disk images attached to the system
    Disks,

    /// Force-unmount a simulator disk
    Unmount {
        /// Device path or identifier (e.g. /dev/disk7s1)
        device: String,
    },

    /// List running simulator processes
    Processes,

    /// Stop CoreSimulator and kill simulator and Xcode processes
    KillAll,

    /// Unmount runtime volumes and delete their backing files (requires admin)
    RemoveBackingFiles {
        /// Only deregister runtimes and unmount their volumes
        #[arg(long)]
        keep_system_files: bool,
    },

    /// Delete selected per-user developer directories
    Manual {
        /// ~/Library/Developer/CoreSimulator
        #[arg(long)]
        core_simulator: bool,

        /// ~/Library/Developer/Xcode/DerivedData
        #[arg(long)]
        derived_data: bool,

        /// ~/Library/Developer/Xcode/Archives
        #[arg(long)]
        archives: bool,

        /// Xcode and SwiftPM caches
        #[arg(long)]
        caches: bool,

        /// ~/Library/Developer/Xcode/iOS DeviceSupport
        #[arg(long)]
        device_support: bool,

        /// Do not kill simulator and Xcode processes first
        #[arg(long)]
        no_stop: bool,

        /// Do not measure free space before and after
        #[arg(long)]
        no_measure: bool,
    },

    /// Free space held by simulator runtimes
    FreeSpace {
        /// Remove runtimes, their disk images and backing files (requires admin)
        #[arg(long)]
        system: bool,

        /// Allow per-user deletions
        #[arg(long)]
        user_space: bool,

        /// Delete simulator devices (with --user-space)
        #[arg(long)]
        devices: bool,

        /// Delete DerivedData (with --user-space)
        #[arg(long)]
        derived_data: bool,

        /// Do not kill simulator and Xcode processes first
        #[arg(long)]
        no_stop: bool,

        /// Do not measure free space before and after
        #[arg(long)]
        no_measure: bool,
    },

    /// Remove every simulator runtime, device, cache and service registration
    Nuclear {
        /// Confirm the irreversible cleanup
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

#[derive(Debug)]
enum CliError {
    ActionFailed(String),
    Usage(String),
    Devtools(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::ActionFailed(_) => ExitCode::from(1),
            CliError::Usage(_) => ExitCode::from(2),
            CliError::Devtools(_) => ExitCode::from(3),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::ActionFailed(msg) => write!(f, "Action failed: {}", msg),
            CliError::Usage(msg) => write!(f, "{}", msg),
            CliError::Devtools(msg) => write!(f, "Developer tools not ready: {}", msg),
        }
    }
}

/// Builds the service from flags, falling back to the saved config and then
/// to `xcode-select` detection.
fn build_service(cli: &Cli) -> CleanupService {
    let config = SweepConfig::load();
    let runner = default_runner();

    let developer_dir = cli.developer_dir.clone().or_else(|| {
        config
            .developer_dir
            .as_ref()
            .map(|dir| dir.to_string_lossy().into_owned())
    });
    let simctl_env = match developer_dir {
        Some(dir) => devtools::resolve_simctl_env(
            runner.as_ref(),
            Some(&dir),
            Path::new(DEFAULT_XCODE_DEVELOPER_DIR),
        ),
        None => devtools::get_simctl_env(runner.as_ref()),
    };
    let timeout = cli
        .timeout
        .map(Duration::from_secs)
        .or_else(|| config.command_timeout());

    debug!(?simctl_env, ?timeout, "Resolved service settings");
    CleanupService::new(runner, simctl_env).with_timeout(timeout)
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Command::Nuclear { yes: false } = cli.command {
        return Err(CliError::Usage(
            "nuclear cleanup deletes every simulator runtime, device and cache; pass --yes to confirm"
                .to_string(),
        ));
    }

    let service = build_service(&cli);
    let format = cli.format;

    match &cli.command {
        Command::Doctor => {
            let status = devtools::check_devtools(service.runner());
            match format {
                OutputFormat::Json => println!("{}", json!(status)),
                OutputFormat::Text if status.ok => println!("✓ {}", status.message),
                OutputFormat::Text => {}
            }
            if status.ok {
                Ok(())
            } else {
                Err(CliError::Devtools(status.message))
            }
        }
        Command::Runtimes => {
            let listing = service.list_runtimes();
            if let Some(error) = listing.error {
                return Err(CliError::ActionFailed(error));
            }
            match format {
                OutputFormat::Json => println!("{}", json!({ "runtimes": listing.runtimes })),
                OutputFormat::Text => {
                    if listing.runtimes.is_empty() {
                        eprintln!("No simulator runtimes installed");
                    }
                    for runtime in &listing.runtimes {
                        println!(
                            "{}  {} ({})  {}  {}",
                            runtime.identifier,
                            runtime.name,
                            runtime.build,
                            runtime.state,
                            format_bytes(runtime.size_bytes)
                        );
                    }
                }
            }
            Ok(())
        }
        Command::DeleteRuntime { ids } => report_action(format, service.delete_runtimes(ids.as_slice())),
        Command::DeleteAllRuntimes => report_action(format, service.delete_all_runtimes()),
        Command::DeleteUnavailableRuntimes => {
            report_action(format, service.delete_unavailable_runtimes())
        }
        Command::DeleteDevices { unavailable } => {
            let result = if *unavailable {
                service.delete_unavailable_sim_devices()
            } else {
                service.delete_all_sim_devices()
            };
            report_action(format, result)
        }
        Command::RemoveDeviceDirs => {
            report_action(format, service.remove_device_directories_and_profiles())
        }
        Command::ClearCaches => report_action(format, service.clear_all_simulator_caches()),
        Command::DisableService => report_action(format, service.disable_core_simulator_service()),
        Command::Status => {
            let runner = service.runner();
            let xcode_running = service.is_xcode_running();
            let volumes = service.get_mounted_simulator_volumes();
            let sip_enabled = sip::is_sip_enabled(runner);
            let free_bytes = space::get_apfs_available_bytes(runner, space::DATA_VOLUME, service.timeout());
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    json!({
                        "xcode_running": xcode_running,
                        "mounted_volumes": volumes,
                        "sip_enabled": sip_enabled,
                        "free_bytes": free_bytes,
                    })
                ),
                OutputFormat::Text => {
                    println!("Xcode running:   {}", if xcode_running { "yes" } else { "no" });
                    println!(
                        "SIP:             {}",
                        match sip_enabled {
                            Some(true) => "enabled",
                            Some(false) => "disabled",
                            None => "unknown",
                        }
                    );
                    println!(
                        "Free space:      {}",
                        free_bytes.map_or_else(|| "unknown".to_string(), format_bytes)
                    );
                    println!("Mounted volumes: {}", volumes.len());
                    for volume in &volumes {
                        println!("  {}", volume);
                    }
                }
            }
            Ok(())
        }
        Command::Disks => {
            let disks = disks::list_simulator_disks(service.runner(), None);
            match format {
                OutputFormat::Json => println!("{}", json!({ "disks": disks })),
                OutputFormat::Text => {
                    if disks.is_empty() {
                        eprintln!("No simulator disks attached");
                    }
                    for disk in &disks {
                        println!(
                            "{}  {}  {}  {}",
                            disk.device, disk.info.name, disk.info.size, disk.info.mount
                        );
                    }
                }
            }
            Ok(())
        }
        Command::Unmount { device } => report_action(format, service.unmount_simulator_disk(device)),
        Command::Processes => {
            let processes = processes::list_simulator_processes(service.runner());
            match format {
                OutputFormat::Json => println!("{}", json!({ "processes": processes })),
                OutputFormat::Text => {
                    if processes.is_empty() {
                        eprintln!("No simulator processes running");
                    }
                    for process in &processes {
                        println!(
                            "{:>7}  {:>5}%  {:>5}%  {}",
                            process.pid, process.cpu, process.mem, process.name
                        );
                    }
                }
            }
            Ok(())
        }
        Command::KillAll => {
            let results = processes::kill_all_simulators_and_xcode(service.runner(), service.timeout());
            match format {
                OutputFormat::Json => {
                    let commands: Vec<_> = results.iter().map(command_json).collect();
                    println!("{}", json!({ "commands": commands }));
                }
                OutputFormat::Text => {
                    for result in &results {
                        println!("{} {}", mark(result.success()), result.cmd.join(" "));
                    }
                }
            }
            Ok(())
        }
        Command::RemoveBackingFiles { keep_system_files } => {
            report_action(format, service.remove_runtime_backing_files(!keep_system_files))
        }
        Command::Manual {
            core_simulator,
            derived_data,
            archives,
            caches,
            device_support,
            no_stop,
            no_measure,
        } => {
            let options = ManualCleanupOptions {
                delete_core_simulator: *core_simulator,
                delete_derived_data: *derived_data,
                delete_archives: *archives,
                delete_caches: *caches,
                delete_device_support: *device_support,
                stop_processes: !no_stop,
                measure_space: !no_measure,
            };
            report_cleanup(format, service.manual_cleanup(&options))
        }
        Command::FreeSpace {
            system,
            user_space,
            devices,
            derived_data,
            no_stop,
            no_measure,
        } => {
            let options = FreeSpaceOptions {
                include_system_runtime_files: *system,
                include_user_space: *user_space,
                delete_devices: *devices,
                delete_derived_data: *derived_data,
                stop_processes: !no_stop,
                measure_space: !no_measure,
            };
            report_cleanup(format, service.free_runtime_space(&options))
        }
        Command::Nuclear { .. } => report_cleanup(format, service.nuclear_cleanup()),
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn mark(ok: bool) -> &'static str {
    if ok { "✓" } else { "✗" }
}

fn print_step(step: &StepResult) {
    let suffix = if step.is_required() { "" } else { " (best effort)" };
    println!("{} {}{}", mark(step.ok()), step.label, suffix);
    if !step.ok() {
        println!("    {}", step.failure_message());
    }
}

fn command_json(result: &CmdResult) -> serde_json::Value {
    json!({
        "cmd": result.cmd,
        "returncode": result.returncode,
        "stdout": result.stdout,
        "stderr": result.stderr,
        "timed_out": result.timed_out,
    })
}

fn step_json(step: &StepResult) -> serde_json::Value {
    json!({
        "label": step.label,
        "ok": step.ok(),
        "requirement": step.requirement,
        "sudo": step.sudo,
        "result": command_json(&step.result),
    })
}

fn outcome(commands_ok: bool, error: Option<String>) -> Result<(), CliError> {
    if commands_ok {
        Ok(())
    } else {
        Err(CliError::ActionFailed(
            error.unwrap_or_else(|| "one or more required steps failed".to_string()),
        ))
    }
}

fn report_action(format: OutputFormat, result: ActionResult) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let steps: Vec<_> = result.steps.iter().map(step_json).collect();
            println!(
                "{}",
                json!({
                    "commands_ok": result.commands_ok,
                    "error": result.error,
                    "steps": steps,
                })
            );
        }
        OutputFormat::Text => result.steps.iter().for_each(print_step),
    }
    outcome(result.commands_ok, result.error)
}

fn report_cleanup(format: OutputFormat, result: CleanupResult) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let steps: Vec<_> = result.steps.iter().map(step_json).collect();
            println!(
                "{}",
                json!({
                    "commands_ok": result.commands_ok,
                    "space_before": result.space_before,
                    "space_after": result.space_after,
                    "space_delta": result.space_delta,
                    "space_ok": result.space_ok,
                    "error": result.error,
                    "steps": steps,
                })
            );
        }
        OutputFormat::Text => {
            result.steps.iter().for_each(print_step);
            match result.space_delta {
                Some(delta) if delta > 0 => println!("Reclaimed {}", format_bytes(delta.unsigned_abs())),
                Some(_) => println!("No free space was reclaimed"),
                None => {}
            }
        }
    }
    outcome(result.commands_ok, result.error)
}

/// Decimal units, matching how Finder and `df -H` report sizes.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1_500), "1.5 KB");
        assert_eq!(format_bytes(8_947_372_032), "8.9 GB");
        assert_eq!(format_bytes(55_000_000_000), "55.0 GB");
    }

    #[test]
    fn test_free_space_flags_parse() {
        let cli = Cli::try_parse_from(["simsweep", "free-space", "--system", "--no-stop"]).unwrap();
        match cli.command {
            Command::FreeSpace { system, user_space, no_stop, no_measure, .. } => {
                assert!(system);
                assert!(!user_space);
                assert!(no_stop);
                assert!(!no_measure);
            }
            _ => panic!("expected free-space"),
        }
    }

    #[test]
    fn test_delete_runtime_requires_id() {
        assert!(Cli::try_parse_from(["simsweep", "delete-runtime"]).is_err());
    }

    #[test]
    fn test_nuclear_without_yes_is_usage_error() {
        let cli = Cli::try_parse_from(["simsweep", "nuclear"]).unwrap();
        let err = run(cli).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
    }
}
