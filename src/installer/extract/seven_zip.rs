use super::Archiver;
use crate::installer::{
    error::{Error, Result},
    process::{CommandRunner, Interruptible},
};
use std::path::{Path, PathBuf};

/// Executable names tried in order when no override is configured.
pub const SEVEN_ZIP_NAMES: [&str; 3] = ["7z", "7zz", "7za"];

/// [`Archiver`] backed by the `7z` command line tool.
#[derive(Debug)]
pub struct SevenZip<'a> {
    program: PathBuf,
    runner: &'a CommandRunner,
}

impl<'a> SevenZip<'a> {
    pub fn new(program: impl Into<PathBuf>, runner: &'a CommandRunner) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    /// Use `program` when given, else the first of [`SEVEN_ZIP_NAMES`] on `PATH`.
    pub fn locate(program: Option<&Path>, runner: &'a CommandRunner) -> Result<Self> {
        if let Some(program) = program {
            return Ok(Self::new(program, runner));
        }
        SEVEN_ZIP_NAMES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(|path| Self::new(path, runner))
            .ok_or_else(|| Error::ToolNotFound { tool: "7z".into() })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Archiver for SevenZip<'_> {
    async fn extract(&self, archive: &Path, patterns: &[&str], out_dir: &Path) -> Result<()> {
        let mut args: Vec<String> = vec![
            "e".into(),
            "-y".into(),
            format!("-o{}", out_dir.display()),
            archive.display().to_string(),
        ];
        args.extend(patterns.iter().map(|p| p.to_string()));
        if !patterns.is_empty() {
            args.push("-r".into());
        }

        let program = self.program.to_string_lossy();
        match self.runner.stream(&program, &args, Interruptible::Yes).await {
            // Exit 1 is a warning: Apple DMGs routinely trip 7z's header checks.
            Err(Error::CommandFailed { code: Some(1), .. }) => {
                log::warn!("7z reported warnings extracting {}", archive.display());
                Ok(())
            }
            other => other,
        }
    }
}
