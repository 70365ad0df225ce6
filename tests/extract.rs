//! HFS+ extraction driven by a tar-backed archiver, so no 7z is needed.

use macos_usb_builder::installer::{
    Error, Result,
    extract::{Archiver, ExtractOptions, extract_hfs},
    log_sink,
};
use std::{
    fs::File,
    path::{Path, PathBuf},
};

/// Treats every archive as a tar file and extracts matches flat, like 7z `e`.
struct TarArchiver;

impl Archiver for TarArchiver {
    async fn extract(&self, archive: &Path, patterns: &[&str], out_dir: &Path) -> Result<()> {
        let patterns: Vec<glob::Pattern> = patterns
            .iter()
            .map(|p| glob::Pattern::new(p))
            .collect::<std::result::Result<_, _>>()?;
        let mut tar = tar::Archive::new(File::open(archive)?);
        for entry in tar.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let full = path.to_string_lossy().into_owned();
            let wanted = patterns.is_empty()
                || patterns.iter().any(|p| p.matches(&name) || p.matches(&full));
            if wanted {
                entry.unpack(out_dir.join(&name))?;
            }
        }
        Ok(())
    }
}

/// An archive at `path` holding `members` (`(name, bytes)`).
fn tar_file(path: &Path, members: &[(&str, &[u8])]) -> PathBuf {
    let mut builder = tar::Builder::new(File::create(path).unwrap());
    for (name, bytes) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *bytes).unwrap();
    }
    builder.finish().unwrap();
    path.to_path_buf()
}

fn options(work: &Path) -> ExtractOptions {
    ExtractOptions::default().with_work_dir(work)
}

fn scratch_is_clean(work: &Path) -> bool {
    std::fs::read_dir(work)
        .unwrap()
        .filter_map(|e| e.ok())
        .all(|e| !e.file_name().to_string_lossy().starts_with("hfs-extract-"))
}

#[tokio::test]
async fn pkg_to_base_system_to_hfs() {
    let dir = tempfile::tempdir().unwrap();
    let hfs = b"H+ volume header and catalog".repeat(64);

    let base_system = tar_file(
        &dir.path().join("BaseSystem.dmg"),
        &[("BaseSystem.chunklist", &b"chunks"[..]), ("4.hfs", hfs.as_slice())],
    );
    let base_bytes = std::fs::read(&base_system).unwrap();
    let pkg = tar_file(
        &dir.path().join("InstallAssistant.pkg"),
        &[
            ("Payload", &b"payload"[..]),
            ("SharedSupport.dmg", &b"shared"[..]),
            ("BaseSystem.dmg", base_bytes.as_slice()),
        ],
    );

    let work = dir.path().join("work");
    let output = dir.path().join("out/BaseSystem.hfs");
    let image = extract_hfs(&TarArchiver, &pkg, &output, &options(&work), &log_sink())
        .await
        .unwrap();

    assert_eq!(image, output);
    assert_eq!(std::fs::read(&output).unwrap(), hfs);
    assert!(scratch_is_clean(&work));
}

#[tokio::test]
async fn install_esd_nests_base_system() {
    let dir = tempfile::tempdir().unwrap();
    let hfs = vec![0x48u8; 2048];

    let inner = tar_file(&dir.path().join("inner.tar"), &[("BaseSystem.hfs", hfs.as_slice())]);
    let inner_bytes = std::fs::read(&inner).unwrap();
    let esd = tar_file(
        &dir.path().join("InstallESD.dmg"),
        &[
            ("BaseSystem/BaseSystem.dmg", inner_bytes.as_slice()),
            ("Packages/Core.pkg", &b"core"[..]),
        ],
    );

    let output = dir.path().join("BaseSystem.hfs");
    extract_hfs(&TarArchiver, &esd, &output, &options(dir.path()), &log_sink())
        .await
        .unwrap();

    assert_eq!(std::fs::read(&output).unwrap(), hfs);
}

#[tokio::test]
async fn unnamed_image_found_by_size() {
    let dir = tempfile::tempdir().unwrap();
    let image = vec![0x11u8; 4096];
    let manifest = vec![b'<'; 8192];

    let base_system = tar_file(
        &dir.path().join("BaseSystem.dmg"),
        &[
            ("manifest.xml", manifest.as_slice()),
            ("2.img", image.as_slice()),
            ("small.bin", &b"tiny"[..]),
        ],
    );

    let output = dir.path().join("out.hfs");
    let opts = options(dir.path()).with_fallback_min_size(1024);
    extract_hfs(&TarArchiver, &base_system, &output, &opts, &log_sink())
        .await
        .unwrap();

    assert_eq!(std::fs::read(&output).unwrap(), image);
}

#[tokio::test]
async fn nothing_above_threshold_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let base_system = tar_file(&dir.path().join("BaseSystem.dmg"), &[("2.img", &[0u8; 512][..])]);

    let output = dir.path().join("out.hfs");
    let work = dir.path().join("work");
    let err = extract_hfs(&TarArchiver, &base_system, &output, &options(&work), &log_sink())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("no HFS+ image found"));
    assert!(!output.exists());
    assert!(scratch_is_clean(&work));
}

#[tokio::test]
async fn unsupported_source_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("installer.iso");
    std::fs::write(&source, b"iso").unwrap();

    let err = extract_hfs(
        &TarArchiver,
        &source,
        &dir.path().join("out.hfs"),
        &options(dir.path()),
        &log_sink(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::GenericError(_)));
}
