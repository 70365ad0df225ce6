use crate::installer::{
    error::{ErrorExt, Result},
    plist::{BOOT_ARGS_GUID, sort_keys_recursive},
};
use plist::{Dictionary, Value};
use std::path::Path;

/// Value of every platform identity field the operator must fill in.
pub const PLACEHOLDER_MARKER: &str = "REPLACE_ME";

const STUB_FILES: [&str; 2] = ["BOOT/BOOTx64.efi", "OC/OpenCore.efi"];
const OC_DIRS: [&str; 4] = ["Kexts", "ACPI", "Drivers", "Tools"];

fn dict<const N: usize>(entries: [(&str, Value); N]) -> Value {
    Value::Dictionary(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<Dictionary>(),
    )
}

fn empty_dict() -> Value {
    Value::Dictionary(Dictionary::new())
}

/// Minimal OpenCore config: secure boot off, scan policy 0, identity placeholders.
pub fn placeholder_config() -> Value {
    let marker = || Value::String(PLACEHOLDER_MARKER.to_string());
    let mut config = dict([
        ("ACPI", dict([("Add", Value::Array(Vec::new()))])),
        (
            "DeviceProperties",
            dict([("Add", empty_dict()), ("Delete", empty_dict())]),
        ),
        ("Kernel", dict([("Add", Value::Array(Vec::new()))])),
        (
            "Misc",
            dict([(
                "Security",
                dict([
                    ("SecureBootModel", Value::String("Disabled".into())),
                    ("ScanPolicy", Value::Integer(0i64.into())),
                    ("Vault", Value::String("Optional".into())),
                ]),
            )]),
        ),
        (
            "NVRAM",
            dict([
                (
                    "Add",
                    dict([(
                        BOOT_ARGS_GUID,
                        dict([("boot-args", Value::String("-v keepsyms=1".into()))]),
                    )]),
                ),
                ("Delete", empty_dict()),
            ]),
        ),
        (
            "PlatformInfo",
            dict([(
                "Generic",
                dict([
                    ("MLB", marker()),
                    ("SystemProductName", marker()),
                    ("SystemSerialNumber", marker()),
                    ("SystemUUID", marker()),
                    ("ROM", Value::Data(vec![0; 6])),
                ]),
            )]),
        ),
        ("UEFI", dict([("Drivers", Value::Array(Vec::new()))])),
    ]);
    sort_keys_recursive(&mut config);
    config
}

/// Write the placeholder tree into an `EFI` directory.
pub fn write_placeholder(efi_dir: &Path) -> Result<()> {
    for dir in OC_DIRS {
        let path = efi_dir.join("OC").join(dir);
        std::fs::create_dir_all(&path).fs_context("creating directory", &path)?;
    }
    for stub in STUB_FILES {
        let path = efi_dir.join(stub);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
        }
        std::fs::write(&path, b"").fs_context("writing stub", &path)?;
    }
    let config = super::config_plist_path(efi_dir);
    placeholder_config().to_file_xml(&config)?;
    Ok(())
}
