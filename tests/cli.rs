use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("macos-usb-builder").unwrap();
    // An empty HOME keeps a developer's own config file out of the run.
    cmd.env("HOME", std::env::temp_dir().join("macos-usb-builder-no-home"))
        .env("XDG_CONFIG_HOME", std::env::temp_dir().join("macos-usb-builder-no-home"))
        .env_remove("MACOS_USB_BUILDER_CONFIG");
    cmd
}

fn touch(path: &Path, len: usize) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, vec![b'x'; len]).unwrap();
}

const CONFIG_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>NVRAM</key>
  <dict>
    <key>Add</key>
    <dict>
      <key>7C436110-AB2A-4BBB-A880-FE41995C9F82</key>
      <dict>
        <key>boot-args</key><string>-v</string>
      </dict>
    </dict>
  </dict>
</dict>
</plist>"#;

const COFFEE_LAKE_WITH_GTX970: &str = r#"{
  "pci_devices": [
    { "category": "Vga", "vendor_id": "8086", "device_id": "3e9b", "description": "UHD Graphics 630" },
    { "category": "Vga", "vendor_id": "10de", "device_id": "13c2", "description": "GM204 [GeForce GTX 970]" }
  ]
}"#;

#[test]
fn help_names_the_binary() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("macos-usb-builder"))
        .stdout(predicate::str::contains("write"));
}

#[test]
fn unknown_version_is_rejected() {
    bin()
        .args(["locate", "--downloads", ".", "--macos", "sierra"])
        .assert()
        .failure();
}

#[test]
fn hardware_json_has_the_snapshot_shape() {
    bin()
        .args(["hardware", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"pci_devices\""))
        .stdout(predicate::str::contains("\"audio_codecs\""));
}

#[test]
fn enhance_replays_a_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let plist = dir.path().join("config.plist");
    let snapshot = dir.path().join("host.json");
    std::fs::write(&plist, CONFIG_PLIST).unwrap();
    std::fs::write(&snapshot, COFFEE_LAKE_WITH_GTX970).unwrap();

    bin()
        .arg("enhance")
        .arg(&plist)
        .args(["--macos", "sonoma", "--hardware"])
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied"));

    let tuned = std::fs::read_to_string(&plist).unwrap();
    assert!(tuned.contains("nv_disable=1"), "{tuned}");
}

#[test]
fn locate_lists_the_plan() {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join("publicrelease/052-83321 - macOS Sonoma 14.4.1");
    touch(&folder.join("BaseSystem.dmg"), 64);
    touch(&folder.join("InstallAssistant.pkg"), 128);

    bin()
        .arg("locate")
        .arg("--downloads")
        .arg(dir.path())
        .args(["--macos", "sonoma"])
        .assert()
        .success()
        .stdout(predicate::str::contains("InstallAssistant.pkg"))
        .stdout(predicate::str::contains("placement(s) planned"));
}

#[test]
fn write_requires_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    bin()
        .args(["write", "--device", "/dev/sdz", "--macos", "sonoma", "--downloads"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("/dev/sdz"));
}
