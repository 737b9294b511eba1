use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "ptpsync-rs",
    about = "Track and resume photo sync sessions for PTP cameras"
)]
pub struct Cli {
    /// Directory holding the sync-state database
    #[arg(
        long,
        global = true,
        env = "PTPSYNC_DATA_DIR",
        default_value = "~/.ptpsync-rs"
    )]
    pub data_dir: String,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every known device and its sync state
    Devices,
    /// Show the full sync record for one device
    Status(StatusArgs),
    /// Delete a device's sync record so it starts from scratch
    Forget(ForgetArgs),
    /// Export all sync records as a JSON snapshot
    Export(ExportArgs),
    /// Import a JSON snapshot, replacing records with matching identity keys
    Import(ImportArgs),
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Identity key of the device (as printed by `devices`)
    #[arg(long)]
    pub identity: String,
}

#[derive(Args, Debug)]
pub struct ForgetArgs {
    /// Identity key of the device (as printed by `devices`)
    #[arg(long)]
    pub identity: String,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Write the snapshot to this file instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Snapshot file produced by `export`
    #[arg(long)]
    pub input: PathBuf,
}
