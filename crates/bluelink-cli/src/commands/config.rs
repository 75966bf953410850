//! Config command implementation.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::cli::ConfigAction;
use crate::config::Config;
use crate::util::write_output;

pub fn cmd_config(
    action: ConfigAction,
    config_path: &Path,
    config: &Config,
    output: Option<&PathBuf>,
) -> Result<()> {
    match action {
        ConfigAction::Path => write_output(output, &format!("{}\n", config_path.display())),
        ConfigAction::Show => {
            let content = toml::to_string_pretty(config)?;
            let content = if content.trim().is_empty() {
                "# No configuration set\n".to_string()
            } else {
                content
            };
            let store = format!("# Snapshot store: {}\n", config.store_path().display());
            write_output(output, &format!("{}{}", content, store))
        }
        ConfigAction::Init => {
            if config_path.exists() {
                eprintln!("Config file already exists: {}", config_path.display());
                return Ok(());
            }
            Config::default().save(config_path)?;
            eprintln!("Created config file: {}", config_path.display());
            Ok(())
        }
    }
}
