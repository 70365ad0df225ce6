//! Run configuration.
//!
//! [`Settings`] is what one write run needs, built and validated through
//! [`SettingsBuilder`]. [`ConfigFile`] is the optional TOML layer beneath the
//! command line: flags override the file, the file overrides defaults.

mod builder;
mod core;
mod file;

pub use builder::SettingsBuilder;
pub use core::{Settings, ToolOverrides};
pub use file::{CONFIG_FILE_NAME, ConfigFile, default_config_path};
