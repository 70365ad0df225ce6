use macos_usb_builder::installer::{
    Error, MacOsVersion, ProgressSink, Result,
    hardware::{DeviceCategory, DeviceRecord, HardwareSnapshot, NullProbe, StaticProbe},
    plist::{
        AUDIO_PCI_PATH, BOOT_ARGS_GUID, DeviceProfileTable, FileStore, IGPU_PCI_PATH,
        PlistEnhancer, PlistStore, backup_path_for, select_audio_layout,
    },
};
use plist::{Dictionary, Value};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

fn device(category: DeviceCategory, vendor: &str, id: &str) -> DeviceRecord {
    DeviceRecord {
        category,
        vendor_id: vendor.into(),
        device_id: id.into(),
        description: format!("test device {vendor}:{id}"),
        raw_line: String::new(),
    }
}

fn snapshot(devices: Vec<DeviceRecord>, codecs: &[&str]) -> HardwareSnapshot {
    HardwareSnapshot {
        pci_devices: devices,
        audio_codecs: codecs.iter().map(|c| c.to_string()).collect(),
        ..Default::default()
    }
}

fn enhancer(snapshot: HardwareSnapshot) -> PlistEnhancer {
    PlistEnhancer::new(Box::new(StaticProbe(snapshot)))
}

fn collecting_sink() -> (ProgressSink, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&lines);
    let sink: ProgressSink = Arc::new(move |line: &str| {
        captured.lock().unwrap().push(line.to_string());
    });
    (sink, lines)
}

fn quiet() -> ProgressSink {
    Arc::new(|_: &str| {})
}

fn write_config(dir: &Path, boot_args: &str, kexts: &[(&str, bool)]) -> PathBuf {
    let mut section = Dictionary::new();
    section.insert("boot-args".into(), Value::String(boot_args.into()));
    let mut nvram_add = Dictionary::new();
    nvram_add.insert(BOOT_ARGS_GUID.into(), Value::Dictionary(section));
    let mut nvram = Dictionary::new();
    nvram.insert("Add".into(), Value::Dictionary(nvram_add));

    let entries = kexts
        .iter()
        .map(|(bundle, enabled)| {
            let mut kext = Dictionary::new();
            kext.insert("BundlePath".into(), Value::String(bundle.to_string()));
            kext.insert("Enabled".into(), Value::Boolean(*enabled));
            Value::Dictionary(kext)
        })
        .collect();
    let mut kernel = Dictionary::new();
    kernel.insert("Add".into(), Value::Array(entries));

    let mut root = Dictionary::new();
    root.insert("NVRAM".into(), Value::Dictionary(nvram));
    root.insert("Kernel".into(), Value::Dictionary(kernel));
    root.insert("#Comment".into(), Value::String("keep me".into()));

    let path = dir.join("config.plist");
    plist::to_file_xml(&path, &Value::Dictionary(root)).unwrap();
    path
}

fn load(path: &Path) -> Dictionary {
    plist::from_file::<_, Value>(path)
        .unwrap()
        .into_dictionary()
        .unwrap()
}

fn boot_args(root: &Dictionary) -> String {
    let section = root
        .get("NVRAM")
        .and_then(Value::as_dictionary)
        .and_then(|nvram| nvram.get("Add"))
        .and_then(Value::as_dictionary)
        .and_then(|add| add.get(BOOT_ARGS_GUID))
        .and_then(Value::as_dictionary)
        .unwrap();
    section.get("boot-args").and_then(Value::as_string).unwrap().to_string()
}

fn device_property<'a>(root: &'a Dictionary, pci_path: &str, key: &str) -> Option<&'a [u8]> {
    root.get("DeviceProperties")?
        .as_dictionary()?
        .get("Add")?
        .as_dictionary()?
        .get(pci_path)?
        .as_dictionary()?
        .get(key)?
        .as_data()
}

fn gtx970_with_coffee_lake() -> HardwareSnapshot {
    snapshot(
        vec![
            device(DeviceCategory::Vga, "8086", "3e9b"),
            device(DeviceCategory::Vga, "10de", "13c2"),
        ],
        &[],
    )
}

#[test]
fn gtx970_with_igpu_on_sonoma_sets_sorted_boot_args() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "-v debug=0x100", &[]);

    let outcome = enhancer(gtx970_with_coffee_lake())
        .enhance(&path, MacOsVersion::Sonoma, &quiet())
        .unwrap();
    assert!(outcome.is_modified());
    assert!(outcome.hardware_detected);

    let root = load(&path);
    assert_eq!(
        boot_args(&root),
        "-v amfi_get_out_of_my_way=0x1 debug=0x100 nv_disable=1"
    );
    assert_eq!(
        device_property(&root, IGPU_PCI_PATH, "AAPL,ig-platform-id"),
        Some(&[0x07, 0x00, 0x9b, 0x3e][..])
    );
}

#[test]
fn gtx970_on_high_sierra_uses_web_drivers() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "-v nv_disable=1", &[]);

    enhancer(gtx970_with_coffee_lake())
        .enhance(&path, MacOsVersion::HighSierra, &quiet())
        .unwrap();

    assert_eq!(boot_args(&load(&path)), "-v nvda_drv=1");
}

#[test]
fn second_pass_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "-v", &[("AppleALC.kext", false)]);
    let hardware = snapshot(
        vec![
            device(DeviceCategory::Vga, "8086", "3e9b"),
            device(DeviceCategory::Vga, "10de", "13c2"),
            device(DeviceCategory::Audio, "8086", "a348"),
        ],
        &["Realtek ALC897"],
    );

    let first = enhancer(hardware.clone())
        .enhance(&path, MacOsVersion::Ventura, &quiet())
        .unwrap();
    assert!(first.is_modified());
    let after_first = std::fs::read(&path).unwrap();

    let (sink, lines) = collecting_sink();
    let second = enhancer(hardware)
        .enhance(&path, MacOsVersion::Ventura, &sink)
        .unwrap();
    assert!(!second.is_modified());
    assert_eq!(std::fs::read(&path).unwrap(), after_first);
    assert!(
        lines
            .lock()
            .unwrap()
            .iter()
            .any(|l| l == "[PlistEnhancer] No changes needed; config.plist left untouched.")
    );
}

#[test]
fn unrelated_keys_survive() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "-v", &[]);

    enhancer(gtx970_with_coffee_lake())
        .enhance(&path, MacOsVersion::Sonoma, &quiet())
        .unwrap();

    let root = load(&path);
    assert_eq!(root.get("#Comment").and_then(Value::as_string), Some("keep me"));
    assert!(root.contains_key("Kernel"));
}

#[test]
fn codec_name_wins_over_controller_id() {
    let tables = DeviceProfileTable::new()
        .with_audio_layout("Realtek ALC897", 11)
        .with_audio_layout("pci_8086:7ad0", 3);
    let controller = vec![device(DeviceCategory::Audio, "8086", "7ad0")];

    let by_codec =
        select_audio_layout(&tables, &["Realtek ALC897 Analog".to_string()], &controller).unwrap();
    assert_eq!(by_codec.layout_id, 11);
    assert_eq!(by_codec.key, "Realtek ALC897");

    let by_pci = select_audio_layout(&tables, &[], &controller).unwrap();
    assert_eq!(by_pci.layout_id, 3);
    assert_eq!(by_pci.key, "pci_8086:7ad0");
}

#[test]
fn audio_sets_layout_and_enables_apple_alc() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "-v", &[("Kexts/AppleALC.kext", false), ("Lilu.kext", true)]);

    let tables = DeviceProfileTable::new().with_audio_layout("Realtek ALC1220", 7);
    enhancer(snapshot(Vec::new(), &["Realtek ALC1220"]))
        .with_tables(tables)
        .enhance(&path, MacOsVersion::Monterey, &quiet())
        .unwrap();

    let root = load(&path);
    assert_eq!(
        device_property(&root, AUDIO_PCI_PATH, "layout-id"),
        Some(&[7u8][..])
    );
    let kexts = root
        .get("Kernel")
        .and_then(Value::as_dictionary)
        .and_then(|kernel| kernel.get("Add"))
        .and_then(Value::as_array)
        .unwrap();
    let first = kexts[0].as_dictionary().unwrap();
    assert_eq!(first.get("Enabled").and_then(Value::as_boolean), Some(true));
}

#[test]
fn headless_variant_used_with_discrete_gpu() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "-v", &[]);
    let hardware = snapshot(
        vec![
            device(DeviceCategory::Vga, "8086", "4680"),
            device(DeviceCategory::Vga, "10de", "2484"),
        ],
        &[],
    );

    enhancer(hardware)
        .enhance(&path, MacOsVersion::Sonoma, &quiet())
        .unwrap();

    assert_eq!(
        device_property(&load(&path), IGPU_PCI_PATH, "AAPL,ig-platform-id"),
        Some(&[0x04, 0x00, 0x12, 0x40][..])
    );
}

#[test]
fn invalid_plist_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.plist");
    std::fs::write(&path, b"<plist><dict><key>broken").unwrap();

    let err = enhancer(gtx970_with_coffee_lake())
        .enhance(&path, MacOsVersion::Sonoma, &quiet())
        .unwrap_err();

    assert!(matches!(err, Error::InvalidPlist { .. }));
    assert_eq!(std::fs::read(&path).unwrap(), b"<plist><dict><key>broken");
}

#[test]
fn missing_plist_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = enhancer(HardwareSnapshot::default())
        .enhance(&dir.path().join("absent.plist"), MacOsVersion::Sonoma, &quiet())
        .unwrap_err();
    assert!(matches!(err, Error::Fs { .. }));
}

/// Loads normally, then corrupts the file and fails on save.
struct CorruptingStore {
    drop_backup: bool,
}

impl PlistStore for CorruptingStore {
    fn load(&self, path: &Path) -> Result<Value> {
        FileStore.load(path)
    }

    fn save(&self, path: &Path, _value: &Value) -> Result<()> {
        std::fs::write(path, b"half-written").unwrap();
        if self.drop_backup {
            std::fs::remove_file(backup_path_for(path)).unwrap();
        }
        Err(Error::GenericError("disk full".into()))
    }
}

#[test]
fn failed_save_restores_backup() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "-v", &[]);
    let original = std::fs::read(&path).unwrap();

    let err = enhancer(gtx970_with_coffee_lake())
        .with_store(Box::new(CorruptingStore { drop_backup: false }))
        .enhance(&path, MacOsVersion::Sonoma, &quiet())
        .unwrap_err();

    assert!(matches!(err, Error::PlistWriteFailed { .. }));
    assert!(!err.is_critical());
    assert_eq!(std::fs::read(&path).unwrap(), original);
}

#[test]
fn failed_restore_is_critical() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "-v", &[]);

    let (sink, lines) = collecting_sink();
    let err = enhancer(gtx970_with_coffee_lake())
        .with_store(Box::new(CorruptingStore { drop_backup: true }))
        .enhance(&path, MacOsVersion::Sonoma, &sink)
        .unwrap_err();

    assert!(err.is_critical());
    assert!(err.to_string().starts_with("CRITICAL"));
    assert!(lines.lock().unwrap().iter().any(|l| l.contains("FAILED TO RESTORE BACKUP")));
}

#[test]
fn no_detection_means_no_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "-v", &[]);
    let original = std::fs::read(&path).unwrap();

    let outcome = PlistEnhancer::new(Box::new(NullProbe))
        .enhance(&path, MacOsVersion::Sonoma, &quiet())
        .unwrap();

    assert!(!outcome.is_modified());
    assert!(!outcome.hardware_detected);
    assert_eq!(std::fs::read(&path).unwrap(), original);
    assert!(backup_path_for(&path).exists());
}
