//! Device-to-configuration lookup tables.
//!
//! Keys are lowercase `vendor:device` hex. iGPU values are the raw bytes
//! OpenCore expects inside `<data>`: little-endian device-id, platform-id as
//! published for each framebuffer.

use std::collections::BTreeMap;

/// Ordered `(property, bytes)` pairs applied to one PCI path.
pub type PropertySet = Vec<(String, Vec<u8>)>;

/// Suffixes of iGPU entries used when a discrete GPU drives the display.
pub const HEADLESS_SUFFIXES: [&str; 2] = ["_headless", "_dgpu"];

/// Prefix of audio keys that match a PCI id instead of a codec name.
pub const PCI_AUDIO_PREFIX: &str = "pci_";

/// Immutable lookup tables consulted by the plist enhancer.
#[derive(Debug, Clone, Default)]
pub struct DeviceProfileTable {
    igpu: BTreeMap<String, PropertySet>,
    /// Order matters: substring matching takes the first hit.
    audio_layouts: Vec<(String, u8)>,
    ethernet_kexts: BTreeMap<String, String>,
}

impl DeviceProfileTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_igpu(mut self, key: &str, properties: &[(&str, &[u8])]) -> Self {
        self.igpu.insert(
            key.to_lowercase(),
            properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
        );
        self
    }

    pub fn with_audio_layout(mut self, key: &str, layout_id: u8) -> Self {
        let key = if key.starts_with(PCI_AUDIO_PREFIX) {
            key.to_lowercase()
        } else {
            key.to_string()
        };
        self.audio_layouts.push((key, layout_id));
        self
    }

    pub fn with_ethernet_kext(mut self, key: &str, kext: &str) -> Self {
        self.ethernet_kexts.insert(key.to_lowercase(), kext.to_string());
        self
    }

    pub fn igpu(&self, key: &str) -> Option<&PropertySet> {
        self.igpu.get(key)
    }

    /// The iGPU entry to apply, preferring a headless variant when a dGPU is present.
    pub fn igpu_for(&self, key: &str, dgpu_present: bool) -> Option<(String, &PropertySet)> {
        if dgpu_present {
            for suffix in HEADLESS_SUFFIXES {
                let variant = format!("{key}{suffix}");
                if let Some(props) = self.igpu.get(&variant) {
                    return Some((variant, props));
                }
            }
        }
        self.igpu.get(key).map(|props| (key.to_string(), props))
    }

    /// Codec-name keys in table order.
    pub fn codec_layouts(&self) -> impl Iterator<Item = (&str, u8)> {
        self.audio_layouts
            .iter()
            .filter(|(k, _)| !k.starts_with(PCI_AUDIO_PREFIX))
            .map(|(k, v)| (k.as_str(), *v))
    }

    /// Layout for an audio controller's `vendor:device`.
    pub fn pci_audio_layout(&self, key: &str) -> Option<u8> {
        let wanted = format!("{PCI_AUDIO_PREFIX}{key}");
        self.audio_layouts
            .iter()
            .find(|(k, _)| *k == wanted)
            .map(|(_, v)| *v)
    }

    pub fn ethernet_kext(&self, key: &str) -> Option<&str> {
        self.ethernet_kexts.get(key).map(String::as_str)
    }

    /// Tables shipped with the tool.
    pub fn builtin() -> Self {
        const FB_PATCH: &[u8] = &[0x01, 0x00, 0x00, 0x00];
        const HDMI20: &[u8] = &[0x01, 0x00, 0x00, 0x00];
        const ADL_HEADLESS: &[u8] = &[0x04, 0x00, 0x12, 0x40];

        let mut table = Self::new()
            // Coffee Lake desktop, UHD 630
            .with_igpu(
                "8086:3e9b",
                &[
                    ("AAPL,ig-platform-id", &[0x07, 0x00, 0x9b, 0x3e]),
                    ("device-id", &[0x9b, 0x3e, 0x00, 0x00]),
                    ("framebuffer-patch-enable", FB_PATCH),
                ],
            )
            // Kaby Lake desktop, HD 630
            .with_igpu(
                "8086:5912",
                &[
                    ("AAPL,ig-platform-id", &[0x05, 0x00, 0x12, 0x59]),
                    ("device-id", &[0x12, 0x59, 0x00, 0x00]),
                    ("framebuffer-patch-enable", FB_PATCH),
                ],
            )
            // Skylake desktop, HD 530
            .with_igpu(
                "8086:1912",
                &[
                    ("AAPL,ig-platform-id", &[0x00, 0x00, 0x12, 0x19]),
                    ("device-id", &[0x12, 0x19, 0x00, 0x00]),
                    ("framebuffer-patch-enable", FB_PATCH),
                ],
            );

        // Alder Lake-S, UHD 730/770
        for (device, platform_id) in [
            ("4690", [0x0a, 0x00, 0x9b, 0x46]),
            ("4680", [0x0a, 0x00, 0x9b, 0x46]),
            ("4692", [0x0a, 0x00, 0x92, 0x46]),
        ] {
            let id = u16::from_str_radix(device, 16).unwrap_or_default().to_le_bytes();
            let device_id = [id[0], id[1], 0x00, 0x00];
            let key = format!("8086:{device}");
            table = table
                .with_igpu(
                    &key,
                    &[
                        ("AAPL,ig-platform-id", &platform_id),
                        ("device-id", &device_id),
                        ("enable-hdmi20", HDMI20),
                    ],
                )
                .with_igpu(
                    &format!("{key}_headless"),
                    &[
                        ("AAPL,ig-platform-id", ADL_HEADLESS),
                        ("device-id", &device_id),
                    ],
                );
        }

        for (codec, layout) in [
            ("Realtek ALC221", 11),
            ("Realtek ALC233", 11),
            ("Realtek ALC235", 28),
            ("Realtek ALC255", 11),
            ("Realtek ALC256", 11),
            ("Realtek ALC257", 11),
            ("Realtek ALC269", 11),
            ("Realtek ALC271", 11),
            ("Realtek ALC282", 11),
            ("Realtek ALC283", 11),
            ("Realtek ALC285", 11),
            ("Realtek ALC289", 11),
            ("Realtek ALC295", 11),
            ("Realtek ALC662", 5),
            ("Realtek ALC671", 11),
            ("Realtek ALC887", 7),
            ("Realtek ALC888", 7),
            ("Realtek ALC892", 1),
            ("Realtek ALC897", 11),
            ("Realtek ALC1150", 1),
            ("Realtek ALC1200", 7),
            ("Realtek ALC1220", 7),
            ("Realtek ALC1220-VB", 7),
            ("Conexant CX20756", 3),
            // Generic Intel HDA controllers
            ("pci_8086:a170", 1),
            ("pci_8086:a2f0", 1),
            ("pci_8086:a348", 3),
            ("pci_8086:f0c8", 3),
            ("pci_8086:43c8", 11),
            ("pci_8086:7ad0", 11),
        ] {
            table = table.with_audio_layout(codec, layout);
        }

        for (id, kext) in [
            ("8086:15b8", "IntelMausi.kext"),
            ("8086:153a", "IntelMausi.kext"),
            ("8086:10f0", "IntelMausi.kext"),
            ("8086:15be", "IntelMausi.kext"),
            ("8086:0d4f", "IntelMausi.kext"),
            ("8086:15b7", "IntelMausi.kext"),
            ("8086:1a1c", "IntelMausi.kext"),
            ("10ec:8168", "RealtekRTL8111.kext"),
            ("10ec:8111", "RealtekRTL8111.kext"),
            ("10ec:2502", "LucyRTL8125Ethernet.kext"),
            ("10ec:2600", "LucyRTL8125Ethernet.kext"),
            ("10ec:8125", "LucyRTL8125Ethernet.kext"),
            ("8086:15ec", "AppleIntelI210Ethernet.kext"),
            ("8086:15f3", "AppleIntelI210Ethernet.kext"),
        ] {
            table = table.with_ethernet_kext(id, kext);
        }

        table
    }
}
