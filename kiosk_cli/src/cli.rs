//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "kiosk", version, about = "Coin, hopper and paper kiosk controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/kiosk.toml")]
    pub config: PathBuf,

    /// Optional denomination CSV (strict header); overrides the config table
    #[arg(long, value_name = "FILE")]
    pub denominations: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
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
    /// Serve the host line protocol on stdin/stdout
    Run {
        /// Poll loop period in ms (takes precedence over runtime.tick_ms)
        #[arg(long, value_name = "MS")]
        tick_ms: Option<u64>,
        /// Keep ticking this long after stdin closes, then exit
        #[arg(
            long,
            value_name = "MS",
            long_help = "Keep the loop ticking for MS milliseconds after stdin reaches end of input, then halt every actuator and exit.\n\nWithout this flag the loop keeps running after EOF until Ctrl-C, so jobs started by the last command still finish."
        )]
        exit_after_eof_ms: Option<u64>,
    },
    /// Validate config and wiring, then print the instance table
    SelfCheck,
    /// Health check for operational monitoring
    Health,
}
