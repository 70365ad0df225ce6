//! Command line interface for the macOS USB builder.
//!
//! This module provides argument parsing, config loading, command dispatch,
//! and coloured user feedback.

mod args;
pub mod commands;
mod output;

pub use args::{
    Args, Command, EnhanceArgs, ExtractArgs, HardwareArgs, LocateArgs, RuntimeConfig, WriteArgs,
};
pub use output::OutputManager;

use crate::{
    error::{CliError, Result},
    installer::ConfigFile,
};
use std::path::Path;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    args.validate()
        .map_err(|reason| CliError::InvalidArguments { reason })?;

    let runtime_config = RuntimeConfig::from(&args);
    let config = load_config(args.config.as_deref())?;

    match &args.command {
        Command::Write(write) => commands::write::execute(write, &config, &runtime_config).await,
        Command::Enhance(enhance) => commands::enhance::execute(enhance, &runtime_config),
        Command::Locate(locate) => commands::locate::execute(locate, &config, &runtime_config),
        Command::Extract(extract) => {
            commands::extract::execute(extract, &config, &runtime_config).await
        }
        Command::Hardware(hardware) => commands::hardware::execute(hardware, &runtime_config),
    }
}

/// An explicit `--config` must exist; the default location is optional.
fn load_config(path: Option<&Path>) -> Result<ConfigFile> {
    match path {
        Some(path) => {
            log::debug!("Loading config from {}", path.display());
            let text = std::fs::read_to_string(path)?;
            Ok(ConfigFile::parse(&text)?)
        }
        None => Ok(ConfigFile::load_default()?),
    }
}
