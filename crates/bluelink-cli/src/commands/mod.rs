//! Command implementations for the CLI.

mod config;
mod connect;
mod scan;
mod snapshots;

pub use config::cmd_config;
pub use connect::{ConnectArgs, cmd_connect};
pub use scan::cmd_scan;
pub use snapshots::cmd_snapshots;
