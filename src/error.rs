//! Application-level error types.
//!
//! Installer failures keep their own [`installer::Error`](crate::installer::Error);
//! this module wraps them with the CLI's own failure modes.

use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, AppError>;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Installer pipeline errors
    #[error("{0}")]
    Installer(#[from] crate::installer::Error),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Destructive command run without confirmation
    #[error("Refusing to erase {device} without confirmation (pass --yes)")]
    NotConfirmed {
        /// Target device
        device: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl AppError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        use crate::installer::Error as E;
        match self {
            AppError::Installer(E::ToolNotFound { tool }) => {
                vec![format!("Install `{tool}` or point the config file at it")]
            }
            AppError::Installer(E::NotPrivileged) => {
                vec!["Re-run with sudo; partitioning needs root".to_string()]
            }
            AppError::Installer(E::MissingRequiredAsset { .. }) => vec![
                "Check --downloads points at the folder your download tool wrote".to_string(),
            ],
            AppError::Toml(_) => vec!["Fix the config file or pass --config".to_string()],
            AppError::Cli(CliError::NotConfirmed { .. }) => {
                vec!["Double-check the device, then pass --yes".to_string()]
            }
            _ => Vec::new(),
        }
    }
}
