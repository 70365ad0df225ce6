use macos_usb_builder::installer::{
    Error, MacOsVersion,
    assets::{InstallerAssetSet, PayloadKind, PlacementPlan, PlacementSource, find_asset, product_folder},
};
use std::path::{Path, PathBuf};

fn touch(path: &Path, len: usize) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, vec![b'x'; len]).unwrap();
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

/// `downloads/publicrelease/<id> - macOS Sonoma 14.4.1/` with a full asset set.
fn sonoma_tree(root: &Path) -> PathBuf {
    let folder = root
        .join("downloads/publicrelease")
        .join("052-83321 - macOS Sonoma 14.4.1");
    touch(&folder.join("BaseSystem.dmg"), 64);
    touch(&folder.join("BaseSystem.chunklist"), 8);
    touch(&folder.join("InstallAssistant.pkg"), 128);
    touch(&folder.join("AppleDiagnostics.dmg"), 16);
    std::fs::write(folder.join("InstallInfo.plist"), INSTALL_INFO).unwrap();
    folder
}

#[test]
fn product_folder_for_every_version() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let names = [
        (MacOsVersion::Sequoia, "001 - macOS Sequoia 15.0"),
        (MacOsVersion::Sonoma, "002 - macOS Sonoma 14.4"),
        (MacOsVersion::Ventura, "003 - macOS Ventura 13.6"),
        (MacOsVersion::Monterey, "004 - macOS Monterey 12.7"),
        (MacOsVersion::BigSur, "005 - macOS Big Sur 11.7"),
        (MacOsVersion::Catalina, "006 - macOS Catalina 10.15"),
        (MacOsVersion::Mojave, "007 - mojave"),
        (MacOsVersion::HighSierra, "008 - macOS High Sierra 10.13"),
    ];
    for (_, name) in &names {
        std::fs::create_dir_all(root.join("publicrelease").join(name)).unwrap();
    }

    for (version, name) in names {
        assert_eq!(
            product_folder(root, version),
            root.join("publicrelease").join(name),
            "{version}"
        );
    }
}

#[test]
fn catalog_folders_win_over_root_children() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("Sonoma-old")).unwrap();
    std::fs::create_dir_all(root.join("content/DeveloperSeed/macOS Sonoma beta")).unwrap();

    assert_eq!(
        product_folder(root, MacOsVersion::Sonoma),
        root.join("content/DeveloperSeed/macOS Sonoma beta")
    );
}

#[test]
fn missing_product_folder_falls_back_to_root() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(product_folder(dir.path(), MacOsVersion::Ventura), dir.path());
}

#[test]
fn find_is_case_insensitive_and_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let folder = sonoma_tree(dir.path());
    touch(&folder.join("basesystem.DMG.partial"), 4);

    let first = find_asset(&["basesystem.dmg"], &folder, false);
    let second = find_asset(&["basesystem.dmg"], &folder, false);
    assert_eq!(first, Some(folder.join("BaseSystem.dmg")));
    assert_eq!(first, second);
}

#[test]
fn largest_match_wins_within_a_stage() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    touch(&root.join("a-BaseSystem.dmg"), 10);
    touch(&root.join("b-BaseSystem.dmg"), 30);
    touch(&root.join("c-BaseSystem.dmg"), 30);

    assert_eq!(
        find_asset(&["*BaseSystem.dmg"], root, false),
        Some(root.join("b-BaseSystem.dmg"))
    );
}

#[test]
fn installer_app_contents_are_searched_before_deep_walk() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let app = root.join("Install macOS Ventura.app/Contents/SharedSupport");
    touch(&app.join("SharedSupport.dmg"), 20);
    touch(&root.join("nested/deeper/SharedSupport.dmg"), 500);

    assert_eq!(
        find_asset(&["SharedSupport.dmg"], root, true),
        Some(app.join("SharedSupport.dmg"))
    );
    assert_eq!(
        find_asset(&["SharedSupport.dmg"], &root.join("nested"), false),
        None
    );
    assert_eq!(
        find_asset(&["SharedSupport.dmg"], &root.join("nested"), true),
        Some(root.join("nested/deeper/SharedSupport.dmg"))
    );
}

#[test]
fn locate_resolves_full_set() {
    let dir = tempfile::tempdir().unwrap();
    let folder = sonoma_tree(dir.path());

    let assets = InstallerAssetSet::locate(dir.path(), MacOsVersion::Sonoma).unwrap();
    assert_eq!(assets.product_folder, folder);
    assert_eq!(assets.payload_kind, PayloadKind::InstallAssistant);
    assert_eq!(assets.base_system_chunklist, Some(folder.join("BaseSystem.chunklist")));
    assert_eq!(assets.diagnostics_chunklist, None);
    assert_eq!(assets.boot_efi, None);
}

#[test]
fn payload_preference_order() {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join("macOS Monterey");
    touch(&folder.join("BaseSystem.dmg"), 4);
    touch(&folder.join("SharedSupport.dmg"), 400);
    touch(&folder.join("InstallESD.dmg"), 40);

    let assets = InstallerAssetSet::locate(dir.path(), MacOsVersion::Monterey).unwrap();
    assert_eq!(assets.payload_kind, PayloadKind::InstallEsd);
}

#[test]
fn missing_base_system_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("macOS Sonoma/InstallAssistant.pkg"), 4);

    match InstallerAssetSet::locate(dir.path(), MacOsVersion::Sonoma) {
        Err(Error::MissingRequiredAsset { name, .. }) => assert_eq!(name, "BaseSystem.dmg"),
        other => panic!("expected MissingRequiredAsset, got {other:?}"),
    }
}

#[test]
fn plan_mirrors_installer_app_layout() {
    let dir = tempfile::tempdir().unwrap();
    sonoma_tree(dir.path());
    let assets = InstallerAssetSet::locate(dir.path(), MacOsVersion::Sonoma).unwrap();
    let plan = PlacementPlan::build(&assets, MacOsVersion::Sonoma).unwrap();

    let destinations: Vec<PathBuf> = plan.destinations().map(Path::to_path_buf).collect();
    for expected in [
        "System/Library/CoreServices/BaseSystem.dmg",
        "System/Library/CoreServices/BaseSystem.chunklist",
        "Install macOS Sonoma.app/Contents/Info.plist",
        "Install macOS Sonoma.app/Contents/SharedSupport/BaseSystem.dmg",
        "Install macOS Sonoma.app/Contents/SharedSupport/InstallAssistant.pkg",
        "Install macOS Sonoma.app/Contents/SharedSupport/AppleDiagnostics.dmg",
        "System/Installation/Packages/InstallAssistant.pkg",
        "InstallInfo.plist",
        ".IAProductInfo",
    ] {
        assert!(
            destinations.contains(&PathBuf::from(expected)),
            "missing {expected} in {destinations:?}"
        );
    }

    let product_info = plan
        .entries
        .iter()
        .find(|e| e.dest == Path::new(".IAProductInfo"))
        .unwrap();
    let PlacementSource::Generated(bytes) = &product_info.source else {
        panic!(".IAProductInfo should be generated");
    };
    let info: plist::Value = plist::from_bytes(bytes).unwrap();
    let info = info.as_dictionary().unwrap();
    assert_eq!(
        info.get("Product Version").and_then(plist::Value::as_string),
        Some("14.4.1")
    );
    assert_eq!(
        info.get("Product ID").and_then(plist::Value::as_string),
        Some("052-83321")
    );

    assert!(plan.skipped.iter().any(|s| s.contains("boot.efi")));
}

#[tokio::test]
async fn plan_applies_onto_a_partition_root() {
    let dir = tempfile::tempdir().unwrap();
    sonoma_tree(dir.path());
    let assets = InstallerAssetSet::locate(dir.path(), MacOsVersion::Sonoma).unwrap();
    let plan = PlacementPlan::build(&assets, MacOsVersion::Sonoma).unwrap();

    let target = tempfile::tempdir().unwrap();
    let progress = macos_usb_builder::installer::log_sink();
    let written = plan.apply(target.path(), &progress).await.unwrap();

    assert_eq!(written, plan.entries.len());
    assert_eq!(
        std::fs::metadata(target.path().join("System/Installation/Packages/InstallAssistant.pkg"))
            .unwrap()
            .len(),
        128
    );
    assert!(target.path().join(".IAProductInfo").is_file());
}
