//! Command line argument parsing and validation.

use crate::installer::MacOsVersion;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Bootable macOS installer USB builder
#[derive(Parser, Debug)]
#[command(
    name = "macos-usb-builder",
    version,
    about = "Builds bootable macOS installer USB drives with an OpenCore EFI",
    long_about = "Builds a bootable macOS installer USB drive from assets a download tool already fetched.

The target gets a GPT with a 550 MiB FAT32 EFI partition and an HFS+ installer
partition. The BaseSystem image is written raw, the installer assets are copied
into Apple's layout, and an OpenCore EFI folder tuned to this machine's
hardware is deployed to the EFI partition.

Usage:
  macos-usb-builder write --device /dev/sdb --macos sonoma --downloads ~/macos --yes
  macos-usb-builder write --device /dev/sdb --macos ventura --downloads ~/macos --dry-run
  macos-usb-builder locate --downloads ~/macos --macos big-sur
  macos-usb-builder enhance EFI/OC/config.plist --macos sonoma
  macos-usb-builder hardware --json

Exit code 0 = the drive (or the requested artifact) is ready."
)]
pub struct Args {
    /// Config file (default: <config dir>/macos-usb-builder/config.toml)
    #[arg(long, global = true, value_name = "PATH", env = "MACOS_USB_BUILDER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Show detailed output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Partition a device and write a complete installer to it
    Write(WriteArgs),
    /// Tune an OpenCore config.plist for this machine's hardware
    Enhance(EnhanceArgs),
    /// Show which installer assets would be used and where they go
    Locate(LocateArgs),
    /// Extract the raw HFS+ image from a .pkg or .dmg
    Extract(ExtractArgs),
    /// Print the detected hardware
    Hardware(HardwareArgs),
}

#[derive(ClapArgs, Debug)]
pub struct WriteArgs {
    /// Whole-disk target: /dev/sdX, /dev/diskN, a Windows disk number, or a raw image file
    #[arg(short, long, value_name = "DEVICE")]
    pub device: String,

    /// macOS version, by name or tag (sonoma, big-sur, "High Sierra", ...)
    #[arg(short = 'm', long = "macos", visible_alias = "target", value_name = "VERSION")]
    pub version: MacOsVersion,

    /// Folder the download tool wrote the installer to
    #[arg(long, value_name = "DIR")]
    pub downloads: Option<PathBuf>,

    /// OpenCore EFI template: a directory, .zip or .tar.gz
    #[arg(long, value_name = "PATH")]
    pub efi_template: Option<PathBuf>,

    /// Leave config.plist as the template ships it
    #[arg(long)]
    pub no_enhance: bool,

    /// Scratch directory for extraction and mount points
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Print every command without running any of them
    #[arg(long)]
    pub dry_run: bool,

    /// Path to a 7z-compatible extractor
    #[arg(long, value_name = "PATH")]
    pub seven_zip: Option<PathBuf>,

    /// Confirm that all data on the device will be erased
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(ClapArgs, Debug)]
pub struct EnhanceArgs {
    /// config.plist to tune in place (a .backup is written next to it)
    #[arg(value_name = "PLIST")]
    pub plist: PathBuf,

    /// Target macOS version
    #[arg(short = 'm', long = "macos", visible_alias = "target", value_name = "VERSION")]
    pub version: MacOsVersion,

    /// Use a snapshot saved with `hardware --json` instead of probing this host
    #[arg(long, value_name = "JSON")]
    pub hardware: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct LocateArgs {
    /// Folder the download tool wrote the installer to
    #[arg(long, value_name = "DIR")]
    pub downloads: Option<PathBuf>,

    /// Target macOS version
    #[arg(short = 'm', long = "macos", visible_alias = "target", value_name = "VERSION")]
    pub version: MacOsVersion,
}

#[derive(ClapArgs, Debug)]
pub struct ExtractArgs {
    /// InstallAssistant.pkg, InstallESD.dmg, SharedSupport.dmg or BaseSystem.dmg
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Where the HFS+ image is written
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Parent of the scratch directory
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Minimum size in bytes of an unnamed image candidate
    #[arg(long, value_name = "BYTES")]
    pub min_size: Option<u64>,

    /// Path to a 7z-compatible extractor
    #[arg(long, value_name = "PATH")]
    pub seven_zip: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct HardwareArgs {
    /// Print the snapshot as JSON
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Write(write) => {
                if write.device.trim().is_empty() {
                    return Err("Device cannot be empty".to_string());
                }
                if let Some(template) = &write.efi_template
                    && !template.exists()
                {
                    return Err(format!("EFI template not found: {}", template.display()));
                }
            }
            Command::Extract(extract) => {
                if extract.source == extract.output {
                    return Err("Output must differ from the source archive".to_string());
                }
            }
            Command::Enhance(_) | Command::Locate(_) | Command::Hardware(_) => {}
        }
        Ok(())
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for colored terminal output
    output: super::OutputManager,
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self {
            output: super::OutputManager::new(args.verbose, args.quiet),
        }
    }
}

impl RuntimeConfig {
    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Print verbose message if in verbose mode
    pub fn verbose_println(&self, message: &str) -> std::io::Result<()> {
        self.output.verbose(message)
    }

    /// Print success message if not in quiet mode
    pub fn success(&self, message: &str) -> std::io::Result<()> {
        self.output.success(message)
    }

    /// Print warning message if not in quiet mode
    pub fn warn(&self, message: &str) -> std::io::Result<()> {
        self.output.warn(message)
    }

    /// Print error message
    pub fn error(&self, message: &str) -> std::io::Result<()> {
        self.output.error(message)
    }

    /// Print progress message
    pub fn progress(&self, message: &str) -> std::io::Result<()> {
        self.output.progress(message)
    }

    /// Print section header
    pub fn section(&self, title: &str) -> std::io::Result<()> {
        self.output.section(title)
    }

    /// Print indented text
    pub fn indent(&self, message: &str) -> std::io::Result<()> {
        self.output.indent(message)
    }

    /// Print a line regardless of `--quiet`
    pub fn println(&self, message: &str) -> std::io::Result<()> {
        self.output.println(message)
    }

    /// Progress sink that renders installer lines as indented output.
    pub fn progress_sink(&self) -> crate::installer::ProgressSink {
        let output = self.output.clone();
        std::sync::Arc::new(move |line: &str| {
            log::debug!("{}", line);
            // A closed stdout must not abort the run.
            let _ = output.indent(line);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn write_parses_version_tags() {
        let args = Args::try_parse_from([
            "macos-usb-builder",
            "write",
            "--device",
            "/dev/sdb",
            "--macos",
            "big-sur",
            "--dry-run",
        ])
        .unwrap();
        match args.command {
            Command::Write(write) => {
                assert_eq!(write.version, MacOsVersion::BigSur);
                assert!(write.dry_run);
                assert!(!write.yes);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_version_is_rejected() {
        let parsed = Args::try_parse_from(["macos-usb-builder", "locate", "--macos", "sierra"]);
        assert!(parsed.is_err());
    }
}
