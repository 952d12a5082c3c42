//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use scalelink_traits::Parity;
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "scalelink", version, about = "Serial scale to server bridge")]
pub struct Cli {
    /// Path to the station TOML
    #[arg(long, value_name = "FILE", default_value = "etc/scalelink.toml")]
    pub config: PathBuf,

    /// Log and print as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Log level (error|warn|info|debug|trace); defaults to logging.level, then info
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Acquire from every configured scale and sync to the server until Ctrl-C
    Run {
        /// Use in-memory scales on the configured ports instead of real devices
        #[arg(long, action = ArgAction::SetTrue)]
        simulate: bool,
        /// Stop on its own after this many seconds
        #[arg(long = "for", value_name = "SECS")]
        run_for: Option<u64>,
    },
    /// Check that the server is reachable and accepts the token
    Verify,
    /// Register this station with the server
    Register {
        /// Station name shown on the server (defaults to station.name)
        #[arg(long)]
        name: Option<String>,
        /// Save the returned station id and key into the config file
        #[arg(long, action = ArgAction::SetTrue)]
        write: bool,
    },
    /// List serial ports
    Ports,
    /// Try every known profile on every serial port
    Detect,
    /// Take a single test reading
    Probe {
        #[arg(long)]
        port: String,
        #[arg(long, default_value = "torrey-fs250")]
        profile: String,
        /// Probe an in-memory scale instead of the real port
        #[arg(long, action = ArgAction::SetTrue)]
        simulate: bool,
    },
    /// Add a scale to the station file
    AddScale {
        #[arg(long = "id")]
        scale_id: String,
        #[arg(long)]
        port: String,
        /// Built-in profile; use `custom` together with the framing flags
        #[arg(long, default_value = "torrey-fs250")]
        profile: String,
        #[arg(long)]
        baud_rate: Option<u32>,
        #[arg(long)]
        data_bits: Option<u8>,
        #[arg(long, value_parser = parse_parity)]
        parity: Option<Parity>,
        #[arg(long)]
        stop_bits: Option<u8>,
        /// Poll command with escapes, e.g. 'W\r\n'; empty for continuous devices
        #[arg(long)]
        poll_command: Option<String>,
        /// Line delimiter with escapes, e.g. '\r'
        #[arg(long)]
        delimiter: Option<String>,
        #[arg(long)]
        read_interval_ms: Option<u64>,
        /// Add the scale outside the work zone
        #[arg(long, action = ArgAction::SetTrue)]
        not_working: bool,
    },
    /// Remove a scale from the station file
    RemoveScale {
        #[arg(long = "id")]
        scale_id: String,
    },
    /// Put a scale in or out of the work zone
    SetWorking {
        #[arg(long = "id")]
        scale_id: String,
        #[arg(long, action = ArgAction::Set)]
        working: bool,
    },
    /// Push every scale's work-zone flag to the server
    SyncZones,
    /// Print the station file and the resolved scale list
    Status,
}

fn parse_parity(s: &str) -> Result<Parity, String> {
    match s.to_ascii_lowercase().as_str() {
        "none" | "n" => Ok(Parity::None),
        "even" | "e" => Ok(Parity::Even),
        "odd" | "o" => Ok(Parity::Odd),
        other => Err(format!("unknown parity '{other}' (none|even|odd)")),
    }
}
