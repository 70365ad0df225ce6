//! `lspci -nnk` output parsing.

use super::{DeviceCategory, DeviceRecord};
use regex::Regex;
use std::sync::LazyLock;

// 01:00.0 VGA compatible controller [0300]: NVIDIA Corporation GM204 [GeForce GTX 970] [10de:13c2] (rev a1)
static LSPCI_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[0-9a-fA-F]{4}:)?[0-9a-fA-F]{2}:[0-9a-fA-F]{2}\.\d\s+(.+?)\s+\[[0-9a-fA-F]{4}\]:\s+(.+?)\s+\[([0-9a-fA-F]{4}):([0-9a-fA-F]{4})\]",
    )
    .expect("lspci pattern is valid")
});

static AMD_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:advanced micro devices, inc\.\s*\[amd/ati\]|amd\s*\[ati\]|advanced micro devices, inc\.|amd)\s*")
        .expect("AMD prefix pattern is valid")
});

/// Parse `lspci -nnk` output, keeping the device classes the enhancer cares about.
///
/// Driver lines (`Kernel driver in use:` etc.) and unrelated classes are skipped.
pub fn parse_lspci(output: &str) -> Vec<DeviceRecord> {
    output
        .lines()
        .filter_map(|line| {
            let caps = LSPCI_LINE.captures(line)?;
            let category = classify(caps[1].trim())?;
            Some(DeviceRecord {
                category,
                vendor_id: caps[3].to_lowercase(),
                device_id: caps[4].to_lowercase(),
                description: clean_description(caps[2].trim()),
                raw_line: line.trim().to_string(),
            })
        })
        .collect()
}

fn classify(class_desc: &str) -> Option<DeviceCategory> {
    if class_desc.contains("VGA compatible controller") || class_desc.contains("3D controller") {
        Some(DeviceCategory::Vga)
    } else if class_desc.contains("Audio device") {
        Some(DeviceCategory::Audio)
    } else if class_desc.contains("Ethernet controller") {
        Some(DeviceCategory::Ethernet)
    } else if class_desc.contains("Network controller") {
        Some(DeviceCategory::NetworkOther)
    } else {
        None
    }
}

/// Strip the vendor name from an lspci description, for display.
pub fn clean_description(full: &str) -> String {
    let lower = full.to_lowercase();
    for prefix in [
        "intel corporation ",
        "nvidia corporation ",
        "realtek semiconductor co., ltd. ",
    ] {
        if lower.starts_with(prefix) {
            return full[prefix.len()..].trim().to_string();
        }
    }
    if lower.starts_with("advanced micro devices") || lower.starts_with("amd") {
        return AMD_PREFIX.replace(full, "").trim().to_string();
    }
    full.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
00:02.0 VGA compatible controller [0300]: Intel Corporation AlderLake-S GT1 [8086:4680] (rev 0c)
\tSubsystem: ASUSTeK Computer Inc. Device [1043:8882]
\tKernel driver in use: i915
00:1f.3 Audio device [0403]: Intel Corporation Alder Lake-S HD Audio Controller [8086:7ad0] (rev 11)
01:00.0 VGA compatible controller [0300]: NVIDIA Corporation GM204 [GeForce GTX 970] [10de:13c2] (rev a1)
03:00.0 Ethernet controller [0200]: Realtek Semiconductor Co., Ltd. RTL8125 2.5GbE Controller [10ec:8125] (rev 05)
04:00.0 Network controller [0280]: Intel Corporation Wi-Fi 6 AX200 [8086:2723] (rev 1a)
05:00.0 Non-Volatile memory controller [0108]: Samsung Electronics Co Ltd NVMe SSD Controller [144d:a808]
";

    #[test]
    fn classifies_relevant_devices_only() {
        let devices = parse_lspci(SAMPLE);
        let categories: Vec<_> = devices.iter().map(|d| d.category).collect();
        assert_eq!(
            categories,
            vec![
                DeviceCategory::Vga,
                DeviceCategory::Audio,
                DeviceCategory::Vga,
                DeviceCategory::Ethernet,
                DeviceCategory::NetworkOther,
            ]
        );
    }

    #[test]
    fn extracts_lowercase_ids_and_clean_descriptions() {
        let devices = parse_lspci(SAMPLE);
        assert_eq!(devices[0].key(), "8086:4680");
        assert_eq!(devices[0].description, "AlderLake-S GT1");
        assert_eq!(devices[2].description, "GM204 [GeForce GTX 970]");
        assert_eq!(devices[3].description, "RTL8125 2.5GbE Controller");
    }

    #[test]
    fn strips_amd_vendor_variants() {
        assert_eq!(
            clean_description("Advanced Micro Devices, Inc. [AMD/ATI] Navi 21 [Radeon RX 6800]"),
            "Navi 21 [Radeon RX 6800]"
        );
        assert_eq!(clean_description("AMD [ATI] Ellesmere"), "Ellesmere");
    }
}
