//! Bootable macOS installer USB builder
//!
//! This library provides the pieces behind the `macos-usb-builder` CLI:
//! - installer asset discovery and placement
//! - BaseSystem HFS+ image extraction
//! - GPT partitioning, formatting and raw writes per host OS
//! - OpenCore `config.plist` tuning from detected hardware
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod cli;
pub mod error;
pub mod installer;

// Re-export commonly used types
pub use error::{AppError, CliError, Result};
