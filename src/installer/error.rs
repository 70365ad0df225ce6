//! Error types for the installer pipeline.
//!
//! Variants follow the pipeline's failure taxonomy: degraded conditions are
//! logged and never reach this type, fatal conditions abort the run, and
//! [`Error::RestoreFailed`] is the one critical condition an operator must see.

use std::{fmt::Display, io, path::PathBuf};
use thiserror::Error;

/// Result type alias for installer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the installer pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Free-form failure with a message
    #[error("{0}")]
    GenericError(String),

    /// Plain I/O failure without path context
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// I/O failure while operating on a known path
    #[error("{context} {}: {error}", path.display())]
    Fs {
        /// What was being attempted
        context: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        error: io::Error,
    },

    /// Property-list (de)serialisation failure
    #[error("plist error: {0}")]
    Plist(#[from] plist::Error),

    /// Invalid glob pattern
    #[error("invalid pattern: {0}")]
    Glob(#[from] glob::PatternError),

    /// Directory traversal failure
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// Path prefix stripping failure
    #[error("path error: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    /// Zip archive failure
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A required external tool is not installed
    #[error("required tool `{tool}` was not found in PATH")]
    ToolNotFound {
        /// Tool executable name
        tool: String,
    },

    /// External command exited unsuccessfully
    #[error("command `{command}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        /// Rendered command line
        command: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Captured standard error, trimmed
        stderr: String,
    },

    /// A required installer asset is missing from the download tree
    #[error("required installer asset `{name}` not found under {}", searched.display())]
    MissingRequiredAsset {
        /// Asset description, e.g. `BaseSystem.dmg`
        name: String,
        /// Product folder that was searched
        searched: PathBuf,
    },

    /// Partitions could not be identified after partitioning
    #[error("could not identify the partitions on {device} after partitioning")]
    PartitionsNotFound {
        /// Target device
        device: String,
    },

    /// Operation not possible on this host
    #[error("unsupported on this host: {0}")]
    UnsupportedHost(String),

    /// Block-device work requires root
    #[error("this operation must be run as root")]
    NotPrivileged,

    /// The run was cancelled by the user
    #[error("operation cancelled")]
    Cancelled,

    /// Another write is already running in this session
    #[error("another operation is already running")]
    Busy,

    /// Source plist could not be parsed; nothing was written
    #[error("{} is not a valid property list: {source}", path.display())]
    InvalidPlist {
        /// Plist path
        path: PathBuf,
        /// Parse error
        source: plist::Error,
    },

    /// Writing the plist failed and the backup was restored
    #[error("failed to save {}: {reason} (backup restored)", path.display())]
    PlistWriteFailed {
        /// Plist path
        path: PathBuf,
        /// Description of the write failure
        reason: String,
    },

    /// Writing the plist failed and restoring the backup failed too
    #[error(
        "CRITICAL: failed to save {} ({write_error}) and FAILED TO RESTORE BACKUP ({restore_error}); the file may be corrupt",
        path.display()
    )]
    RestoreFailed {
        /// Plist path
        path: PathBuf,
        /// Description of the write failure
        write_error: String,
        /// Description of the restore failure
        restore_error: String,
    },
}

impl Error {
    /// Whether the original file's integrity is unknown.
    pub fn is_critical(&self) -> bool {
        matches!(self, Error::RestoreFailed { .. })
    }
}

/// Convenient conversion from static string messages
impl From<&'static str> for Error {
    fn from(s: &'static str) -> Self {
        Error::GenericError(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::GenericError(s)
    }
}

/// Attach a message to a failure.
pub trait Context<T> {
    /// Replace the error with `context: <error>`.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Lazily built variant of [`Context::context`].
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E: Display> Context<T> for std::result::Result<T, E> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::GenericError(format!("{context}: {e}")))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::GenericError(format!("{}: {e}", f())))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Attach a path to an I/O failure.
pub trait ErrorExt<T> {
    /// Map an `io::Error` into [`Error::Fs`].
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}

/// Return early with an [`Error::GenericError`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::installer::Error::GenericError(format!($($arg)*)))
    };
}
