//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "gbw", version, about = "Grind-by-weight controller")]
pub struct Cli {
    /// Path to config TOML; built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Persisted settings file (overrides [store] path)
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); falls back to [logging] level, then info
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum TriggerArg {
    /// Hold the trigger button
    Button,
    /// Place the empty cup
    Cup,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the appliance until Ctrl-C or a limit below
    Run {
        /// Use simulated hardware
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
        /// Scenario for the simulator (implies --sim)
        #[arg(long, value_name = "FILE")]
        sim_script: Option<PathBuf>,
        /// Stop after this many completed doses
        #[arg(long, value_name = "N")]
        shots: Option<u64>,
        /// Stop after this long
        #[arg(long, value_name = "MS")]
        max_runtime_ms: Option<u64>,
        /// Grind trigger for this session only
        #[arg(long, value_enum, value_name = "MODE")]
        trigger: Option<TriggerArg>,
        /// Draw the text display on stdout
        #[arg(long, action = ArgAction::SetTrue)]
        display: bool,
    },
    /// Quick health check: config, settings file and one scale reading
    SelfCheck {
        /// Check against simulated hardware
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
    },
    /// Inspect or edit persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsCmd,
    },
    /// Fit counts-per-gram from a `raw,grams` CSV
    Calibrate {
        #[arg(long, value_name = "FILE")]
        csv: PathBuf,
        /// Persist the fitted factor
        #[arg(long, action = ArgAction::SetTrue)]
        save: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsCmd {
    /// Print the persisted settings
    Show,
    /// Apply a configuration-page update, e.g. `setWeight=17.5&offset=-2`
    Set {
        /// Request body
        body: String,
        /// Body encoding
        #[arg(long, value_name = "TYPE", default_value = "application/x-www-form-urlencoded")]
        content_type: String,
    },
    /// Restore defaults (the shot counter is kept)
    Reset,
}
