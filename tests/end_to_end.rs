//! Full pipeline runs in dry-run mode against a mock download tree.

use macos_usb_builder::installer::{
    CommandRunner, Error, InstallerWriter, LinuxBackend, MacOsVersion, PlistEnhancer, ProgressSink,
    Settings, SettingsBuilder, WindowsBackend, WriteOutcome, hardware::NullProbe, log_sink,
    writer::Cleanup,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio_util::sync::CancellationToken;

fn touch(path: &Path, len: usize) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, vec![b'x'; len]).unwrap();
}

fn sonoma_downloads(root: &Path) -> PathBuf {
    let folder = root
        .join("downloads/publicrelease")
        .join("052-83321 - macOS Sonoma 14.4.1");
    touch(&folder.join("BaseSystem.dmg"), 64);
    touch(&folder.join("BaseSystem.chunklist"), 8);
    touch(&folder.join("InstallAssistant.pkg"), 128);
    touch(&folder.join("AppleDiagnostics.dmg"), 16);
    std::fs::write(folder.join("InstallInfo.plist"), INSTALL_INFO).unwrap();
    root.join("downloads")
}

const INSTALL_INFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
  <key>System Image Info</key>
  <dict>
    <key>version</key><string>14.4.1</string>
  </dict>
</dict>
</plist>"#;

fn settings(root: &Path, device: &str, downloads: &Path) -> Settings {
    SettingsBuilder::new()
        .device(device)
        .version(MacOsVersion::Sonoma)
        .download_root(downloads)
        .work_dir(root.join("work"))
        .dry_run(true)
        .build()
        .unwrap()
}

fn dry_runner() -> CommandRunner {
    CommandRunner::new(log_sink(), CancellationToken::new()).with_dry_run(true)
}

fn quiet_enhancer() -> PlistEnhancer {
    PlistEnhancer::new(Box::new(NullProbe))
}

/// A dry runner whose token trips on the first progress line starting with `prefix`.
fn runner_stopping_at(prefix: &'static str) -> CommandRunner {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let sink: ProgressSink = Arc::new(move |line: &str| {
        if line.starts_with(prefix) {
            trigger.cancel();
        }
    });
    CommandRunner::new(sink, cancel).with_dry_run(true)
}

#[tokio::test]
async fn linux_dry_run_plans_every_stage() {
    let dir = tempfile::tempdir().unwrap();
    let downloads = sonoma_downloads(dir.path());
    let settings = settings(dir.path(), "/dev/sdb", &downloads);
    let runner = dry_runner();

    let outcome = InstallerWriter::new(&settings, LinuxBackend, &runner)
        .with_enhancer(quiet_enhancer())
        .run()
        .await
        .unwrap();

    let WriteOutcome::DryRun {
        plan,
        commands,
        warnings,
    } = outcome
    else {
        panic!("dry run should not write anything");
    };

    let position = |prefix: &str| {
        commands
            .iter()
            .position(|c| c.starts_with(prefix))
            .unwrap_or_else(|| panic!("no `{prefix}` in {commands:#?}"))
    };
    let mklabel = position("parted -s /dev/sdb mklabel gpt");
    let vfat = position("mkfs.vfat -F 32 -n EFI /dev/sdb1");
    let hfs = position("mkfs.hfsplus -v");
    let dd = position("dd if=");
    let sync = position("sync");
    assert!(mklabel < vfat && vfat < hfs && hfs < dd && dd < sync);
    assert!(commands[dd].contains("of=/dev/sdb2"));

    let destinations: Vec<&Path> = plan.destinations().collect();
    for expected in [
        "System/Installation/Packages/InstallAssistant.pkg",
        "Install macOS Sonoma.app/Contents/Info.plist",
        "Install macOS Sonoma.app/Contents/SharedSupport/AppleDiagnostics.dmg",
        "InstallInfo.plist",
    ] {
        assert!(
            destinations.contains(&Path::new(expected)),
            "missing {expected} in {destinations:?}"
        );
    }
    assert!(
        !plan.skipped.iter().any(|s| s.contains("AppleDiagnostics")),
        "{:?}",
        plan.skipped
    );
    // Hardware tuning is skipped without a probe, which is only a warning.
    assert!(warnings.iter().any(|w| w.contains("Hardware detection unavailable")));

    let work = dir.path().join("work");
    let leftovers: Vec<_> = std::fs::read_dir(&work)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("mnt-") || name.starts_with("efi-stage-"))
        .collect();
    assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
}

#[tokio::test]
async fn missing_base_system_fails_before_partitioning() {
    let dir = tempfile::tempdir().unwrap();
    let downloads = dir.path().join("downloads");
    touch(&downloads.join("macOS Sonoma/InstallAssistant.pkg"), 16);
    let settings = settings(dir.path(), "/dev/sdb", &downloads);
    let runner = dry_runner();

    let err = InstallerWriter::new(&settings, LinuxBackend, &runner)
        .with_enhancer(quiet_enhancer())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MissingRequiredAsset { .. }), "{err:?}");
    assert!(!runner.history().iter().any(|c| c.starts_with("parted")));
}

#[tokio::test]
async fn windows_dry_run_scripts_diskpart() {
    let dir = tempfile::tempdir().unwrap();
    let downloads = sonoma_downloads(dir.path());
    let settings = settings(dir.path(), "2", &downloads);
    let runner = dry_runner();

    let outcome = InstallerWriter::new(&settings, WindowsBackend::new(dir.path()), &runner)
        .with_enhancer(quiet_enhancer())
        .run()
        .await
        .unwrap();

    let WriteOutcome::DryRun { commands, .. } = outcome else {
        panic!("dry run should not write anything");
    };
    assert!(commands.iter().any(|c| c.starts_with("diskpart /s")));
    assert!(!commands.iter().any(|c| c.starts_with("dd ")));
}

#[tokio::test]
async fn cancelled_run_stops_at_the_first_stage() {
    let dir = tempfile::tempdir().unwrap();
    let downloads = sonoma_downloads(dir.path());
    let settings = settings(dir.path(), "/dev/sdb", &downloads);
    let cancel = CancellationToken::new();
    let runner = CommandRunner::new(log_sink(), cancel.clone()).with_dry_run(true);
    cancel.cancel();

    let err = InstallerWriter::new(&settings, LinuxBackend, &runner)
        .with_enhancer(quiet_enhancer())
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(runner.history().is_empty());
}

#[tokio::test]
async fn cleanup_after_a_stop_still_unmounts_and_detaches() {
    let runner = dry_runner();
    let mut cleanup = Cleanup::new();
    cleanup.push_attached("/dev/loop7");
    cleanup.push_mount(Path::new("/tmp/mnt-installer-1"));
    runner.cancel_token().cancel();

    cleanup.run(&LinuxBackend, &runner).await;

    assert_eq!(
        runner.history(),
        vec!["umount /tmp/mnt-installer-1", "losetup -d /dev/loop7"]
    );
}

#[tokio::test]
async fn stop_after_mount_unwinds_before_detaching_the_image() {
    let dir = tempfile::tempdir().unwrap();
    let downloads = sonoma_downloads(dir.path());
    let image = dir.path().join("usb.img");
    touch(&image, 4096);
    let settings = settings(dir.path(), image.to_str().unwrap(), &downloads);
    let runner = runner_stopping_at("[dry-run] mount -t hfsplus");

    let err = InstallerWriter::new(&settings, LinuxBackend, &runner)
        .with_enhancer(quiet_enhancer())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled), "{err:?}");

    let history = runner.history();
    let position = |prefix: &str| {
        history
            .iter()
            .rposition(|c| c.starts_with(prefix))
            .unwrap_or_else(|| panic!("no `{prefix}` in {history:#?}"))
    };
    let mounted = position("mount -t hfsplus");
    let unmounted = position("umount");
    let detached = position("losetup -d /dev/loop0");
    assert!(mounted < unmounted && unmounted < detached, "{history:#?}");
    assert!(history[unmounted].contains("mnt-installer-"));
    assert!(!history.iter().any(|c| c.starts_with("mount -t vfat")));

    let work = dir.path().join("work");
    assert!(
        !std::fs::read_dir(&work)
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().starts_with("mnt-"))
    );
}

#[tokio::test]
async fn stop_after_diskpart_removes_the_esp_letter() {
    let dir = tempfile::tempdir().unwrap();
    let downloads = sonoma_downloads(dir.path());
    let settings = settings(dir.path(), "2", &downloads);
    let runner = runner_stopping_at("[dry-run] diskpart");

    let err = InstallerWriter::new(&settings, WindowsBackend::new(dir.path()), &runner)
        .with_enhancer(quiet_enhancer())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled), "{err:?}");

    let scripts: Vec<String> = runner
        .history()
        .into_iter()
        .filter(|c| c.starts_with("diskpart /s"))
        .collect();
    assert_eq!(scripts.len(), 2, "{scripts:#?}");
    assert!(scripts[0].contains("partition-"));
    assert!(scripts[1].contains("release-"));
}
