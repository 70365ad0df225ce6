//! Builder for constructing Settings.

use super::{ConfigFile, Settings, ToolOverrides};
use crate::installer::{MacOsVersion, error::Result};
use std::path::{Path, PathBuf};

/// Builder for constructing [`Settings`].
///
/// # Examples
///
/// ```no_run
/// use macos_usb_builder::installer::{MacOsVersion, SettingsBuilder};
///
/// # fn example() -> macos_usb_builder::installer::Result<()> {
/// let settings = SettingsBuilder::new()
///     .device("/dev/sdb")
///     .version(MacOsVersion::Sonoma)
///     .download_root("/srv/macos-downloads")
///     .dry_run(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default, Debug, Clone)]
pub struct SettingsBuilder {
    device: Option<String>,
    version: Option<MacOsVersion>,
    download_root: Option<PathBuf>,
    efi_template: Option<PathBuf>,
    enhance_plist: Option<bool>,
    work_dir: Option<PathBuf>,
    dry_run: bool,
    tools: ToolOverrides,
}

impl SettingsBuilder {
    /// Creates a new settings builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Seed values from a config file; later setters override them.
    pub fn from_config(config: &ConfigFile) -> Self {
        Self {
            download_root: config.download_root.clone(),
            efi_template: config.efi_template.clone(),
            enhance_plist: config.enhance_plist,
            work_dir: config.work_dir.clone(),
            tools: config.tools.clone(),
            ..Default::default()
        }
    }

    /// Target whole-disk device.
    ///
    /// # Required
    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// # Required
    pub fn version(mut self, version: MacOsVersion) -> Self {
        self.version = Some(version);
        self
    }

    /// # Required
    pub fn download_root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.download_root = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn efi_template<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.efi_template = Some(path.as_ref().to_path_buf());
        self
    }

    /// Default: true
    pub fn enhance_plist(mut self, enhance: bool) -> Self {
        self.enhance_plist = Some(enhance);
        self
    }

    /// Default: the system temp directory
    pub fn work_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.work_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn seven_zip<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.tools.seven_zip = Some(path.as_ref().to_path_buf());
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if `device`, `version` or `download_root` is missing.
    pub fn build(self) -> Result<Settings> {
        use crate::installer::error::Context;

        let device = self.device.context("device is required")?;
        if device.trim().is_empty() {
            crate::bail!("device must not be empty");
        }

        Ok(Settings::new(
            device,
            self.version.context("version is required")?,
            self.download_root.context("download_root is required")?,
            self.efi_template,
            self.enhance_plist.unwrap_or(true),
            self.work_dir.unwrap_or_else(std::env::temp_dir),
            self.dry_run,
            self.tools,
        ))
    }
}
