//! Supported macOS installer versions.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A macOS release this tool can build an installer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MacOsVersion {
    Sequoia,
    Sonoma,
    Ventura,
    Monterey,
    BigSur,
    Catalina,
    Mojave,
    HighSierra,
}

impl MacOsVersion {
    /// Every supported version, newest first.
    pub const ALL: [MacOsVersion; 8] = [
        MacOsVersion::Sequoia,
        MacOsVersion::Sonoma,
        MacOsVersion::Ventura,
        MacOsVersion::Monterey,
        MacOsVersion::BigSur,
        MacOsVersion::Catalina,
        MacOsVersion::Mojave,
        MacOsVersion::HighSierra,
    ];

    /// Marketing name, e.g. `Big Sur`.
    pub fn display_name(self) -> &'static str {
        match self {
            MacOsVersion::Sequoia => "Sequoia",
            MacOsVersion::Sonoma => "Sonoma",
            MacOsVersion::Ventura => "Ventura",
            MacOsVersion::Monterey => "Monterey",
            MacOsVersion::BigSur => "Big Sur",
            MacOsVersion::Catalina => "Catalina",
            MacOsVersion::Mojave => "Mojave",
            MacOsVersion::HighSierra => "High Sierra",
        }
    }

    /// Lowercase short tag used in download folder names, e.g. `big-sur`.
    pub fn short_tag(self) -> &'static str {
        match self {
            MacOsVersion::Sequoia => "sequoia",
            MacOsVersion::Sonoma => "sonoma",
            MacOsVersion::Ventura => "ventura",
            MacOsVersion::Monterey => "monterey",
            MacOsVersion::BigSur => "big-sur",
            MacOsVersion::Catalina => "catalina",
            MacOsVersion::Mojave => "mojave",
            MacOsVersion::HighSierra => "high-sierra",
        }
    }

    /// Targets that still load the NVIDIA web drivers.
    pub fn uses_legacy_nvidia_driver(self) -> bool {
        matches!(self, MacOsVersion::HighSierra)
    }

    /// `Install macOS <Version>.app`
    pub fn installer_app_name(self) -> String {
        format!("Install macOS {}.app", self.display_name())
    }

    /// Volume label for the installer partition, truncated to `limit` characters.
    pub fn installer_label(self, limit: usize) -> String {
        truncate_label(&format!("Install macOS {}", self.display_name()), limit)
    }

    /// Lowercased names a folder may contain to count as this version's product folder.
    pub(crate) fn folder_needles(self) -> [String; 3] {
        [
            self.display_name().to_lowercase(),
            self.short_tag().to_string(),
            self.display_name().to_lowercase().replace(' ', ""),
        ]
    }
}

pub(crate) fn truncate_label(label: &str, limit: usize) -> String {
    label.chars().take(limit).collect::<String>().trim_end().to_string()
}

impl fmt::Display for MacOsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for MacOsVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        MacOsVersion::ALL
            .into_iter()
            .find(|v| v.display_name().to_lowercase() == wanted || v.short_tag() == wanted)
            .ok_or_else(|| {
                format!(
                    "Unsupported macOS version: {}. Supported: {}",
                    s,
                    MacOsVersion::ALL.map(|v| v.display_name()).join(", ")
                )
            })
    }
}

impl TryFrom<String> for MacOsVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacOsVersion> for String {
    fn from(value: MacOsVersion) -> Self {
        value.display_name().to_string()
    }
}
