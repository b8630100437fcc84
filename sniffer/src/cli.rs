use clap::{Parser, ValueEnum};
use directories::ProjectDirs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(about, version, author)]
pub struct Cli {
    /// Radio channel to sniff on (37, 38 and 39 are the BLE advertising channels)
    #[clap(default_value = "37")]
    pub channel: u16,

    /// Capture file to write, defaults to a timestamped file in the current directory
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Transmit power level to configure, overriding the settings file
    #[clap(long)]
    pub power: Option<u8>,

    /// Drop frames whose header length doesn't match the received transfer
    #[clap(long)]
    pub strict_framing: bool,

    /// Minimum log level to print out
    #[clap(long, value_enum, default_value = "info")]
    pub log_level: LevelFilter,

    /// Location of the sniffer settings file on disk
    #[clap(long, default_value_os_t = default_config_location())]
    pub config: PathBuf,
}

fn default_config_location() -> PathBuf {
    ProjectDirs::from("org", "ccsniff", "ccsniff")
        .map(|dirs| dirs.config_dir().join("settings.json"))
        .unwrap_or_else(|| PathBuf::from("ccsniff.json"))
}

/// Mirrors `log::LevelFilter`, which can't derive `ValueEnum` itself.
#[derive(ValueEnum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum LevelFilter {
    /// Silent
    Off,
    Error,
    Warn,
    /// Bring-up progress and capture statistics
    Info,
    /// Every bring-up step
    Debug,
    /// Hex dump of every bulk read
    Trace,
}
