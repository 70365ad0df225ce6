//! Best-effort host hardware detection.
//!
//! Every query returns an empty collection when the underlying tool is missing
//! or fails; hardware information only ever tunes the EFI, it never gates a run.
//!
//! - [`pci`] - `lspci -nnk` parsing into [`DeviceRecord`]s
//! - [`audio`] - codec names from `/proc/asound`
//! - [`cpu`] - `lscpu` key/value parsing

mod audio;
mod cpu;
mod pci;

pub use audio::{codec_hint_from_card_id, parse_codec_file, read_audio_codecs};
pub use cpu::parse_lscpu;
pub use pci::{clean_description, parse_lspci};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Device class as derived from the lspci class description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceCategory {
    Vga,
    Audio,
    Ethernet,
    /// "Network controller"; usually Wi-Fi, not confirmed
    NetworkOther,
}

/// One detected PCI device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub category: DeviceCategory,
    /// Lowercase 4-digit hex
    pub vendor_id: String,
    /// Lowercase 4-digit hex
    pub device_id: String,
    /// Description with the vendor prefix stripped, for display only
    pub description: String,
    #[serde(default)]
    pub raw_line: String,
}

impl DeviceRecord {
    /// Lookup key `vendor:device`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.vendor_id, self.device_id)
    }

    pub fn is(&self, vendor_id: &str, device_id: &str) -> bool {
        self.vendor_id == vendor_id && self.device_id == device_id
    }
}

/// Everything one enhancement pass knows about the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareSnapshot {
    pub pci_devices: Vec<DeviceRecord>,
    pub audio_codecs: Vec<String>,
    pub cpu: BTreeMap<String, String>,
}

impl HardwareSnapshot {
    pub fn is_empty(&self) -> bool {
        self.pci_devices.is_empty() && self.audio_codecs.is_empty() && self.cpu.is_empty()
    }
}

/// Source of hardware information.
pub trait HardwareProbe: Send + Sync {
    fn pci_devices(&self) -> Vec<DeviceRecord>;
    fn audio_codecs(&self) -> Vec<String>;
    fn cpu_info(&self) -> BTreeMap<String, String>;

    /// Whether this probe can observe real hardware at all.
    fn is_capable(&self) -> bool {
        true
    }

    fn snapshot(&self) -> HardwareSnapshot {
        HardwareSnapshot {
            pci_devices: self.pci_devices(),
            audio_codecs: self.audio_codecs(),
            cpu: self.cpu_info(),
        }
    }
}

/// Probe for the current host: [`SystemProbe`] on Linux, [`NullProbe`] elsewhere.
pub fn host_probe() -> Box<dyn HardwareProbe> {
    if cfg!(target_os = "linux") {
        Box::new(SystemProbe::default())
    } else {
        log::debug!(
            "Hardware detection is not available on {}",
            std::env::consts::OS
        );
        Box::new(NullProbe)
    }
}

/// Linux probe backed by `lspci`, `lscpu` and `/proc/asound`.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    asound_root: std::path::PathBuf,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self {
            asound_root: std::path::PathBuf::from("/proc/asound"),
        }
    }
}

impl SystemProbe {
    /// Read codec metadata from another directory laid out like `/proc/asound`.
    pub fn with_asound_root(root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            asound_root: root.into(),
        }
    }
}

impl HardwareProbe for SystemProbe {
    fn pci_devices(&self) -> Vec<DeviceRecord> {
        run_query("lspci", &["-nnk"])
            .map(|out| parse_lspci(&out))
            .unwrap_or_default()
    }

    fn audio_codecs(&self) -> Vec<String> {
        read_audio_codecs(&self.asound_root)
    }

    fn cpu_info(&self) -> BTreeMap<String, String> {
        run_query("lscpu", &[])
            .map(|out| parse_lscpu(&out))
            .unwrap_or_default()
    }
}

/// Empty-result sentinel for hosts without detection support.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProbe;

impl HardwareProbe for NullProbe {
    fn pci_devices(&self) -> Vec<DeviceRecord> {
        Vec::new()
    }

    fn audio_codecs(&self) -> Vec<String> {
        Vec::new()
    }

    fn cpu_info(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn is_capable(&self) -> bool {
        false
    }
}

/// A fixed snapshot, for replaying a saved or synthetic host.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe(pub HardwareSnapshot);

impl HardwareProbe for StaticProbe {
    fn pci_devices(&self) -> Vec<DeviceRecord> {
        self.0.pci_devices.clone()
    }

    fn audio_codecs(&self) -> Vec<String> {
        self.0.audio_codecs.clone()
    }

    fn cpu_info(&self) -> BTreeMap<String, String> {
        self.0.cpu.clone()
    }
}

fn run_query(program: &str, args: &[&str]) -> Option<String> {
    match std::process::Command::new(program).args(args).output() {
        Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        Ok(output) => {
            log::warn!(
                "{} exited with {:?}: {}",
                program,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            None
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::warn!("Command '{}' not found; hardware info unavailable", program);
            None
        }
        Err(e) => {
            log::warn!("Failed to run {}: {}", program, e);
            None
        }
    }
}
