//! CLI argument definitions and shared statics.

use clap::{ArgAction, ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "actuator", version, about = "Drive a simulated actuator through the control core")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/actuator.toml")]
    pub config: PathBuf,

    /// Preset table CSV (single `position` column); overrides [presets] positions
    #[arg(long, value_name = "FILE")]
    pub presets: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Log level (error|warn|info|debug|trace); overrides [logging] level
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Knobs shared by every motion command.
#[derive(Args, Debug, Clone)]
pub struct Motion {
    /// Owner token presented to the ownership gate
    #[arg(long, value_name = "NAME")]
    pub owner: Option<String>,

    /// Give up after this many milliseconds
    #[arg(long, value_name = "MS", default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Emit controller target/input/output at debug level every tick
    #[arg(long, action = ArgAction::SetTrue)]
    pub trace_pid: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply open-loop power for a fixed time
    Power {
        /// Power in [-1, 1]
        #[arg(long, allow_hyphen_values = true)]
        value: f64,
        /// How long to hold the power before stopping
        #[arg(long, value_name = "MS")]
        duration_ms: u64,
        /// Wait this long before applying the power
        #[arg(long, value_name = "MS", default_value_t = 0)]
        delay_ms: u64,
        #[command(flatten)]
        motion: Motion,
    },
    /// Closed-loop move to a target position
    Position {
        #[arg(long, allow_hyphen_values = true)]
        target: f64,
        /// Cap the loop output magnitude
        #[arg(long, value_name = "POWER")]
        power_limit: Option<f64>,
        /// Cut power on arrival instead of holding the target
        #[arg(long, action = ArgAction::SetTrue)]
        no_hold: bool,
        #[command(flatten)]
        motion: Motion,
    },
    /// Drive toward the lower limit until it closes or the actuator stalls, then zero
    Calibrate {
        /// Calibration power (negative drives toward the lower limit)
        #[arg(long, allow_hyphen_values = true, default_value_t = -0.3)]
        power: f64,
        #[command(flatten)]
        motion: Motion,
    },
    /// Move to a preset position
    #[command(group(ArgGroup::new("which").required(true).args(["index", "up", "down"])))]
    Preset {
        /// Index into the preset table
        #[arg(long)]
        index: Option<usize>,
        /// Next preset above the current position
        #[arg(long, action = ArgAction::SetTrue)]
        up: bool,
        /// Next preset below the current position
        #[arg(long, action = ArgAction::SetTrue)]
        down: bool,
        #[arg(long, value_name = "POWER")]
        power_limit: Option<f64>,
        #[command(flatten)]
        motion: Motion,
    },
    /// Build the actuator from config and report what it supports
    SelfCheck,
}
