//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Parser)]
#[command(name = "bluelink")]
#[command(author, version, about = "Discover, connect to and inspect BLE peripherals", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use this configuration file instead of the default one
    #[arg(long, global = true, env = "BLUELINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for nearby peripherals
    Scan {
        /// Scan duration in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Connect to a peripheral and list its services and characteristics
    Connect {
        /// Device identifier (address, or CoreBluetooth UUID on macOS)
        #[arg(env = "BLUELINK_DEVICE")]
        device: Option<String>,

        /// Connection timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Store the signal strength observed while connecting as a snapshot
        #[arg(long)]
        save: bool,
    },

    /// Manage stored snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotAction,
    },

    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Snapshot subcommands
#[derive(Subcommand)]
pub enum SnapshotAction {
    /// List stored snapshots, newest first
    List {
        /// Only show snapshots from this device
        #[arg(short, long)]
        device: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show one snapshot with its samples
    Show {
        /// Snapshot id
        id: Uuid,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete one snapshot
    Remove {
        /// Snapshot id
        id: Uuid,
    },

    /// Delete every snapshot
    Clear {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Write all snapshots to a JSON file
    Export {
        /// Destination file
        path: PathBuf,
    },

    /// Merge snapshots from an exported JSON file
    Import {
        /// Source file
        path: PathBuf,
    },
}

/// Configuration subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show configuration file path
    Path,

    /// Show current configuration
    Show,

    /// Write a default configuration file if none exists
    Init,
}
