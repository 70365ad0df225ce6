use crate::installer::MacOsVersion;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Paths to external tools that replace the `PATH` lookup.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ToolOverrides {
    /// `7z`-compatible extractor
    pub seven_zip: Option<PathBuf>,
}

/// Settings for one installer write.
///
/// Constructed via [`SettingsBuilder`](super::SettingsBuilder).
#[derive(Clone, Debug)]
pub struct Settings {
    /// Whole-disk device: `/dev/sdX`, `/dev/diskN`, or a Windows disk number.
    device: String,

    version: MacOsVersion,

    /// Where the download tool left the product folders.
    download_root: PathBuf,

    /// OpenCore template; `None` uses the placeholder tree.
    efi_template: Option<PathBuf>,

    enhance_plist: bool,

    /// Parent of scratch directories and mount points.
    work_dir: PathBuf,

    dry_run: bool,

    tools: ToolOverrides,
}

impl Settings {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        device: String,
        version: MacOsVersion,
        download_root: PathBuf,
        efi_template: Option<PathBuf>,
        enhance_plist: bool,
        work_dir: PathBuf,
        dry_run: bool,
        tools: ToolOverrides,
    ) -> Self {
        Self {
            device,
            version,
            download_root,
            efi_template,
            enhance_plist,
            work_dir,
            dry_run,
            tools,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn version(&self) -> MacOsVersion {
        self.version
    }

    pub fn download_root(&self) -> &Path {
        &self.download_root
    }

    pub fn efi_template(&self) -> Option<&Path> {
        self.efi_template.as_deref()
    }

    pub fn enhance_plist(&self) -> bool {
        self.enhance_plist
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Plan and record commands without touching the device.
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn tools(&self) -> &ToolOverrides {
        &self.tools
    }
}
