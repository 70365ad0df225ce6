//! Subcommand implementations.
//!
//! Each `execute` returns the process exit code; installer failures that
//! were already reported to the operator return a non-zero code instead of
//! an error so the final message is printed exactly once.

pub mod enhance;
pub mod extract;
pub mod hardware;
pub mod locate;
pub mod write;
