//! The installer write pipeline.
//!
//! One OS-agnostic state machine drives a [`BlockDeviceBackend`]:
//!
//! ```text
//! Idle → DependencyCheck → Cleanup → Partition → FormatEsp → FormatInstaller
//!      → ExtractBaseSystem → WriteBaseSystemImage → MountInstaller
//!      → CopyInstallerAssets → BuildEfi → CopyEfiToEsp → Done
//! ```
//!
//! Any error moves to `Failed`; the cleanup registry runs on every exit.
//!
//! [`BlockDeviceBackend`]: crate::installer::platform::BlockDeviceBackend

mod cleanup;
mod orchestrator;
pub mod tool_detection;

pub use cleanup::Cleanup;
pub use orchestrator::InstallerWriter;

use crate::installer::{
    MacOsVersion,
    assets::PlacementPlan,
    platform::{ManualGuide, PartitionPaths},
};
use std::fmt;

/// Pipeline position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    DependencyCheck,
    Cleanup,
    Partition,
    FormatEsp,
    FormatInstaller,
    ExtractBaseSystem,
    WriteBaseSystemImage,
    MountInstaller,
    CopyInstallerAssets,
    BuildEfi,
    CopyEfiToEsp,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::DependencyCheck => "checking dependencies and assets",
            Stage::Cleanup => "cleaning up previous runs",
            Stage::Partition => "partitioning",
            Stage::FormatEsp => "formatting EFI partition",
            Stage::FormatInstaller => "formatting installer partition",
            Stage::ExtractBaseSystem => "extracting BaseSystem image",
            Stage::WriteBaseSystemImage => "writing BaseSystem image",
            Stage::MountInstaller => "mounting installer partition",
            Stage::CopyInstallerAssets => "copying installer assets",
            Stage::BuildEfi => "building EFI folder",
            Stage::CopyEfiToEsp => "copying EFI folder",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct WriteSummary {
    pub device: String,
    pub version: MacOsVersion,
    pub partitions: PartitionPaths,
    pub assets_written: usize,
    /// SHA-256 over the EFI tree copied to the ESP
    pub efi_digest: Option<String>,
    /// Degraded conditions the run continued past
    pub warnings: Vec<String>,
}

/// Terminal result of a successful pipeline run.
#[derive(Debug, Clone)]
pub enum WriteOutcome {
    Completed(WriteSummary),
    /// The host cannot finish the installer partition; not a failure.
    ManualStepsRequired {
        summary: WriteSummary,
        guide: ManualGuide,
    },
    /// Nothing was written; `commands` lists what would have run.
    DryRun {
        plan: PlacementPlan,
        commands: Vec<String>,
        warnings: Vec<String>,
    },
}

impl WriteOutcome {
    pub fn warnings(&self) -> &[String] {
        match self {
            WriteOutcome::Completed(summary) | WriteOutcome::ManualStepsRequired { summary, .. } => {
                &summary.warnings
            }
            WriteOutcome::DryRun { warnings, .. } => warnings,
        }
    }
}
