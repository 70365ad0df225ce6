//! Hardware-aware OpenCore `config.plist` tuning.

use super::{
    BootArgs,
    store::{FileStore, PlistStore, sort_keys_recursive},
    tables::DeviceProfileTable,
};
use crate::installer::{
    MacOsVersion, ProgressSink,
    error::{Error, Result},
    hardware::{DeviceCategory, DeviceRecord, HardwareProbe, HardwareSnapshot, host_probe},
};
use plist::{Dictionary, Value};
use std::path::{Path, PathBuf};

/// Device path of the Intel iGPU
pub const IGPU_PCI_PATH: &str = "PciRoot(0x0)/Pci(0x2,0x0)";
/// Device path of the on-board HDA controller
pub const AUDIO_PCI_PATH: &str = "PciRoot(0x0)/Pci(0x1f,0x3)";
/// NVRAM GUID holding `boot-args`
pub const BOOT_ARGS_GUID: &str = "7C436110-AB2A-4BBB-A880-FE41995C9F82";

const INTEL_VENDOR: &str = "8086";
const GTX_970: (&str, &str) = ("10de", "13c2");
const APPLE_ALC: &str = "AppleALC.kext";

/// What an enhancement pass did.
#[derive(Debug, Clone, Default)]
pub struct EnhanceOutcome {
    /// One entry per modified field; empty means the file was not rewritten.
    pub changes: Vec<String>,
    /// Whether a hardware probe was able to run at all
    pub hardware_detected: bool,
    /// The `.backup` sibling, when it could be created
    pub backup: Option<PathBuf>,
}

impl EnhanceOutcome {
    pub fn is_modified(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Which table entry produced the audio layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioMatch {
    pub layout_id: u8,
    /// Table key that matched, e.g. `Realtek ALC897` or `pci_8086:7ad0`
    pub key: String,
}

/// Rewrites an OpenCore config.plist for the detected hardware.
pub struct PlistEnhancer {
    tables: DeviceProfileTable,
    probe: Box<dyn HardwareProbe>,
    store: Box<dyn PlistStore>,
}

impl std::fmt::Debug for PlistEnhancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlistEnhancer")
            .field("tables", &self.tables)
            .field("probe_capable", &self.probe.is_capable())
            .finish()
    }
}

impl PlistEnhancer {
    pub fn new(probe: Box<dyn HardwareProbe>) -> Self {
        Self {
            tables: DeviceProfileTable::builtin(),
            probe,
            store: Box::new(FileStore),
        }
    }

    /// Enhancer using the current host's probe and the built-in tables.
    pub fn for_host() -> Self {
        Self::new(host_probe())
    }

    pub fn with_tables(mut self, tables: DeviceProfileTable) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_store(mut self, store: Box<dyn PlistStore>) -> Self {
        self.store = store;
        self
    }

    pub fn tables(&self) -> &DeviceProfileTable {
        &self.tables
    }

    /// Tune `plist_path` in place for `version`.
    ///
    /// A `.backup` sibling is written before anything else. The file is only
    /// rewritten when at least one field changes; a failed write restores the
    /// backup, and a failed restore is [`Error::RestoreFailed`].
    pub fn enhance(
        &self,
        plist_path: &Path,
        version: MacOsVersion,
        progress: &ProgressSink,
    ) -> Result<EnhanceOutcome> {
        let report = |msg: &str| {
            let line = format!("[PlistEnhancer] {msg}");
            log::debug!("{}", line);
            progress(&line);
        };

        report(&format!(
            "Starting config.plist enhancement for: {}",
            plist_path.display()
        ));
        report(&format!("Target macOS version: {}", version.display_name()));

        if !plist_path.is_file() {
            report(&format!("Error: plist not found at {}", plist_path.display()));
            return Err(Error::Fs {
                context: "reading plist",
                path: plist_path.to_path_buf(),
                error: std::io::ErrorKind::NotFound.into(),
            });
        }

        let backup_path = backup_path_for(plist_path);
        let backup = match std::fs::copy(plist_path, &backup_path) {
            Ok(_) => {
                report(&format!("Created backup: {}", backup_path.display()));
                Some(backup_path)
            }
            Err(e) => {
                log::warn!("Backup of {} failed: {}", plist_path.display(), e);
                report(&format!(
                    "Error creating backup for {}: {}. Proceeding cautiously.",
                    plist_path.display(),
                    e
                ));
                None
            }
        };

        let mut config = match self.store.load(plist_path) {
            Ok(value) => value,
            Err(e) => {
                report(&format!("Error loading plist: {e}"));
                return Err(e);
            }
        };

        let hardware = if self.probe.is_capable() {
            let snapshot = self.probe.snapshot();
            if snapshot.pci_devices.is_empty() {
                report("Warning: could not retrieve PCI hardware info.");
            }
            if snapshot.audio_codecs.is_empty() {
                report("Warning: could not detect specific audio codecs.");
            }
            snapshot
        } else {
            report("Hardware detection is not available on this host. Skipping hardware-specific changes.");
            HardwareSnapshot::default()
        };

        let mut outcome = EnhanceOutcome {
            changes: Vec::new(),
            hardware_detected: self.probe.is_capable(),
            backup,
        };

        let Some(root) = config.as_dictionary_mut() else {
            return Err(Error::GenericError(format!(
                "{} does not have a dictionary at its root",
                plist_path.display()
            )));
        };

        let intel_igpu = hardware
            .pci_devices
            .iter()
            .find(|d| d.category == DeviceCategory::Vga && d.vendor_id == INTEL_VENDOR);
        let dgpu_present = hardware
            .pci_devices
            .iter()
            .any(|d| d.category == DeviceCategory::Vga && d.vendor_id != INTEL_VENDOR);

        apply_igpu(&self.tables, root, intel_igpu, dgpu_present, &mut outcome.changes, &report);
        apply_audio(&self.tables, root, &hardware, &mut outcome.changes, &report);
        apply_ethernet(&self.tables, root, &hardware.pci_devices, &mut outcome.changes, &report);
        apply_gpu_quirks(
            root,
            &hardware.pci_devices,
            version,
            intel_igpu.is_some(),
            &mut outcome.changes,
            &report,
        );

        if !outcome.is_modified() {
            report("No changes needed; config.plist left untouched.");
            return Ok(outcome);
        }

        sort_keys_recursive(&mut config);
        match self.store.save(plist_path, &config) {
            Ok(()) => {
                report(&format!(
                    "Successfully saved config.plist to {} ({} change(s))",
                    plist_path.display(),
                    outcome.changes.len()
                ));
                Ok(outcome)
            }
            Err(write_error) => {
                report(&format!("Error saving modified plist: {write_error}"));
                Err(rollback(plist_path, outcome.backup.as_deref(), write_error, &report))
            }
        }
    }
}

/// `<path>.backup`
pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

fn rollback(path: &Path, backup: Option<&Path>, write_error: Error, report: &dyn Fn(&str)) -> Error {
    let Some(backup) = backup else {
        log::error!("No backup exists for {}; its integrity is unknown", path.display());
        report("CRITICAL: no backup was available to restore.");
        return Error::RestoreFailed {
            path: path.to_path_buf(),
            write_error: write_error.to_string(),
            restore_error: "no backup was created".into(),
        };
    };

    match std::fs::copy(backup, path) {
        Ok(_) => {
            report("Restored backup successfully.");
            Error::PlistWriteFailed {
                path: path.to_path_buf(),
                reason: write_error.to_string(),
            }
        }
        Err(restore_error) => {
            log::error!(
                "Restoring {} from {} failed: {}",
                path.display(),
                backup.display(),
                restore_error
            );
            report(&format!("CRITICAL: FAILED TO RESTORE BACKUP: {restore_error}"));
            Error::RestoreFailed {
                path: path.to_path_buf(),
                write_error: write_error.to_string(),
                restore_error: restore_error.to_string(),
            }
        }
    }
}

fn apply_igpu(
    tables: &DeviceProfileTable,
    root: &mut Dictionary,
    intel_igpu: Option<&DeviceRecord>,
    dgpu_present: bool,
    changes: &mut Vec<String>,
    report: &dyn Fn(&str),
) {
    let Some(igpu) = intel_igpu else { return };
    let key = igpu.key();

    let Some((chosen, properties)) = tables.igpu_for(&key, dgpu_present) else {
        report(&format!(
            "Found Intel iGPU: {} ({}) but no default properties are known for it.",
            igpu.description, key
        ));
        return;
    };
    if chosen != key {
        report(&format!(
            "Intel iGPU ({}) detected with a dGPU. Applying headless properties: {}",
            igpu.description, chosen
        ));
    } else {
        report(&format!(
            "Intel iGPU ({}) detected. Applying display properties: {}",
            igpu.description, chosen
        ));
    }

    let Some(target) = device_properties(root, IGPU_PCI_PATH) else {
        report("Warning: DeviceProperties.Add is not a dictionary; iGPU properties skipped.");
        return;
    };
    for (name, bytes) in properties {
        if set_data(target, name, bytes) {
            report(&format!("  Set {IGPU_PCI_PATH} -> {name}"));
            changes.push(format!("{IGPU_PCI_PATH}/{name}"));
        }
    }
}

/// Choose the audio layout: codec names first, then the controller's PCI id.
pub fn select_audio_layout(
    tables: &DeviceProfileTable,
    codecs: &[String],
    devices: &[DeviceRecord],
) -> Option<AudioMatch> {
    for codec in codecs {
        let codec_lower = codec.to_lowercase();
        let normalized = codec_lower
            .split_whitespace()
            .take(2)
            .collect::<Vec<_>>()
            .join(" ");

        // "Vendor Model" exact key
        if let Some((key, id)) = tables
            .codec_layouts()
            .find(|(key, _)| key.to_lowercase() == normalized)
        {
            return Some(AudioMatch {
                layout_id: id,
                key: key.to_string(),
            });
        }
        // Known key anywhere in the codec name
        if let Some((key, id)) = tables
            .codec_layouts()
            .find(|(key, _)| codec_lower.contains(&key.to_lowercase()))
        {
            return Some(AudioMatch {
                layout_id: id,
                key: key.to_string(),
            });
        }
        // Model alone, for names without a vendor such as card ids
        if let Some((key, id)) = tables.codec_layouts().find(|(key, _)| {
            key.rsplit(' ')
                .next()
                .is_some_and(|model| codec_lower.contains(&model.to_lowercase()))
        }) {
            return Some(AudioMatch {
                layout_id: id,
                key: key.to_string(),
            });
        }
    }

    devices
        .iter()
        .filter(|d| d.category == DeviceCategory::Audio)
        .find_map(|d| {
            tables.pci_audio_layout(&d.key()).map(|id| AudioMatch {
                layout_id: id,
                key: format!("{}{}", super::tables::PCI_AUDIO_PREFIX, d.key()),
            })
        })
}

fn apply_audio(
    tables: &DeviceProfileTable,
    root: &mut Dictionary,
    hardware: &HardwareSnapshot,
    changes: &mut Vec<String>,
    report: &dyn Fn(&str),
) {
    if !hardware.audio_codecs.is_empty() {
        report(&format!("Detected audio codecs: {:?}", hardware.audio_codecs));
    }
    let Some(found) = select_audio_layout(tables, &hardware.audio_codecs, &hardware.pci_devices)
    else {
        if !hardware.audio_codecs.is_empty() || !hardware.pci_devices.is_empty() {
            report("No audio codec or controller matched the layout table.");
        }
        return;
    };
    report(&format!(
        "Matched audio entry '{}'. Setting layout-id {}.",
        found.key, found.layout_id
    ));

    let Some(target) = device_properties(root, AUDIO_PCI_PATH) else {
        report("Warning: DeviceProperties.Add is not a dictionary; layout-id skipped.");
        return;
    };
    if set_data(target, "layout-id", &found.layout_id.to_le_bytes()) {
        report(&format!("  Set {AUDIO_PCI_PATH} -> layout-id = {}", found.layout_id));
        changes.push(format!("{AUDIO_PCI_PATH}/layout-id"));
    }

    match enable_kext(root, APPLE_ALC) {
        KextToggle::Enabled => {
            report("  Ensured AppleALC.kext is enabled.");
            changes.push(format!("Kernel.Add/{APPLE_ALC}"));
        }
        KextToggle::AlreadyEnabled => {}
        KextToggle::Missing => {
            report("  Warning: AppleALC.kext is not in Kernel.Add; it cannot be injected, only toggled.")
        }
    }
}

fn apply_ethernet(
    tables: &DeviceProfileTable,
    root: &mut Dictionary,
    devices: &[DeviceRecord],
    changes: &mut Vec<String>,
    report: &dyn Fn(&str),
) {
    for device in devices.iter().filter(|d| d.category == DeviceCategory::Ethernet) {
        let Some(kext) = tables.ethernet_kext(&device.key()) else {
            continue;
        };
        report(&format!(
            "Found Ethernet: {}. Ensuring {} is enabled.",
            device.description, kext
        ));
        match enable_kext(root, kext) {
            KextToggle::Enabled => {
                report(&format!("  Enabled {kext}."));
                changes.push(format!("Kernel.Add/{kext}"));
            }
            KextToggle::AlreadyEnabled => report(&format!("  {kext} already enabled.")),
            KextToggle::Missing => report(&format!(
                "  Warning: {} for {} is not in Kernel.Add; it cannot be injected, only toggled.",
                kext, device.description
            )),
        }
    }
}

fn apply_gpu_quirks(
    root: &mut Dictionary,
    devices: &[DeviceRecord],
    version: MacOsVersion,
    intel_igpu_present: bool,
    changes: &mut Vec<String>,
    report: &dyn Fn(&str),
) {
    if !devices.iter().any(|d| d.is(GTX_970.0, GTX_970.1)) {
        return;
    }
    report("NVIDIA GTX 970 detected.");

    let mut args = BootArgs::parse(&current_boot_args(root));
    let before = args.clone();

    if version.uses_legacy_nvidia_driver() {
        args.insert("nvda_drv=1");
        args.remove("nv_disable=1");
        report("  Configured for NVIDIA Web Drivers (legacy target).");
    } else {
        args.remove("nvda_drv=1");
        args.insert("amfi_get_out_of_my_way=0x1");
        report(&format!(
            "  Added amfi_get_out_of_my_way=0x1 for {version} (OCLP preparation)."
        ));
        if intel_igpu_present {
            args.insert("nv_disable=1");
            report(&format!(
                "  Added nv_disable=1 for {version} so the iGPU stays primary."
            ));
        } else {
            args.remove("nv_disable=1");
            report("  GTX 970 is the only GPU; nv_disable=1 not forced. Expect basic display only.");
        }
    }

    if args == before {
        return;
    }
    let Some(section) = boot_args_section(root) else {
        report("Warning: NVRAM.Add is not a dictionary; boot-args skipped.");
        return;
    };
    let rendered = args.render();
    report(&format!("Updated boot-args to: '{rendered}'"));
    section.insert("boot-args".to_string(), Value::String(rendered));
    changes.push("NVRAM.Add/boot-args".to_string());
}

fn current_boot_args(root: &Dictionary) -> String {
    root.get("NVRAM")
        .and_then(Value::as_dictionary)
        .and_then(|nvram| nvram.get("Add"))
        .and_then(Value::as_dictionary)
        .and_then(|add| add.get(BOOT_ARGS_GUID))
        .and_then(Value::as_dictionary)
        .and_then(|section| section.get("boot-args"))
        .and_then(Value::as_string)
        .unwrap_or_default()
        .to_string()
}

/// Child dictionary with `setdefault` semantics; `None` if the key holds another type.
fn child_dict<'a>(dict: &'a mut Dictionary, key: &str) -> Option<&'a mut Dictionary> {
    if !dict.contains_key(key) {
        dict.insert(key.to_string(), Value::Dictionary(Dictionary::new()));
    }
    dict.get_mut(key).and_then(Value::as_dictionary_mut)
}

fn device_properties<'a>(root: &'a mut Dictionary, pci_path: &str) -> Option<&'a mut Dictionary> {
    let add = child_dict(child_dict(root, "DeviceProperties")?, "Add")?;
    child_dict(add, pci_path)
}

fn boot_args_section(root: &mut Dictionary) -> Option<&mut Dictionary> {
    let add = child_dict(child_dict(root, "NVRAM")?, "Add")?;
    child_dict(add, BOOT_ARGS_GUID)
}

fn set_data(target: &mut Dictionary, key: &str, bytes: &[u8]) -> bool {
    let wanted = Value::Data(bytes.to_vec());
    if target.get(key) == Some(&wanted) {
        return false;
    }
    target.insert(key.to_string(), wanted);
    true
}

enum KextToggle {
    Enabled,
    AlreadyEnabled,
    Missing,
}

fn enable_kext(root: &mut Dictionary, bundle: &str) -> KextToggle {
    let Some(entries) = root
        .get_mut("Kernel")
        .and_then(Value::as_dictionary_mut)
        .and_then(|kernel| kernel.get_mut("Add"))
        .and_then(Value::as_array_mut)
    else {
        return KextToggle::Missing;
    };

    let suffix = format!("/{bundle}");
    for entry in entries.iter_mut() {
        let Some(kext) = entry.as_dictionary_mut() else { continue };
        let matches = kext
            .get("BundlePath")
            .and_then(Value::as_string)
            .is_some_and(|path| path == bundle || path.ends_with(&suffix));
        if !matches {
            continue;
        }
        if kext.get("Enabled").and_then(Value::as_boolean) == Some(true) {
            return KextToggle::AlreadyEnabled;
        }
        kext.insert("Enabled".to_string(), Value::Boolean(true));
        return KextToggle::Enabled;
    }
    KextToggle::Missing
}
