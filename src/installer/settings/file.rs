use super::ToolOverrides;
use crate::installer::error::{Context, ErrorExt, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// `<config dir>/macos-usb-builder/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("macos-usb-builder").join(CONFIG_FILE_NAME))
}

/// On-disk defaults for the command line.
///
/// ```toml
/// download_root = "/srv/macos-downloads"
/// efi_template = "/srv/OpenCore-EFI.zip"
/// enhance_plist = true
///
/// [tools]
/// seven_zip = "/usr/local/bin/7zz"
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub download_root: Option<PathBuf>,
    pub efi_template: Option<PathBuf>,
    pub enhance_plist: Option<bool>,
    pub work_dir: Option<PathBuf>,
    pub tools: ToolOverrides,
}

impl ConfigFile {
    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).fs_context("reading config file", path)?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// The default file when it exists, else built-in defaults.
    pub fn load_default() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.is_file() => {
                log::debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}
