//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls event/report format).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "chargerd", version, about = "Battery charging supervisor")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/charger.toml")]
    pub config: PathBuf,

    /// Emit events and reports as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the supervisor against power-supply-class devices
    Run {
        /// Root of the power-supply class tree
        #[arg(long, value_name = "DIR", default_value = "/sys/class/power_supply")]
        sysfs_root: PathBuf,

        /// Fuel gauge device name under the sysfs root
        #[arg(long, value_name = "NAME")]
        fuel_gauge: String,

        /// Charger device names (first is the main charger; repeat for
        /// the secondary fast-charge IC)
        #[arg(long = "charger", value_name = "NAME", required = true)]
        chargers: Vec<String>,

        /// Fast-charge negotiation device name, if any
        #[arg(long, value_name = "NAME")]
        fast_charger: Option<String>,

        /// Path of the persisted capacity calibration record
        #[arg(long, value_name = "FILE")]
        capacity_file: Option<PathBuf>,

        /// This boot was caused by plugging a charger into a dead battery
        #[arg(long, action = ArgAction::SetTrue)]
        charger_boot_mode: bool,

        /// Load the OCV table from CSV instead of the config TOML
        #[arg(long, value_name = "FILE")]
        ocv_table: Option<PathBuf>,
    },

    /// Validate the config file and exit
    CheckConfig,
}
