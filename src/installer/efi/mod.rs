//! OpenCore EFI folder staging.
//!
//! A template may be a directory, a `.zip`, or a `.tar.gz`/`.tgz`. The
//! template's `EFI` folder is used when present, else its root. A missing or
//! empty template yields a placeholder tree that boots nothing until the
//! operator fills in the marked fields.

mod placeholder;

pub use placeholder::{PLACEHOLDER_MARKER, placeholder_config, write_placeholder};

use crate::installer::{
    ProgressSink,
    error::{Error, ErrorExt, Result},
    utils::fs::{copy_dir, create_dir_all, is_empty_dir},
};
use std::{
    fs::File,
    path::{Path, PathBuf},
};

/// How a template path is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Directory,
    Zip,
    TarGz,
}

impl TemplateKind {
    pub fn detect(path: &Path) -> Option<Self> {
        if path.is_dir() {
            return Some(TemplateKind::Directory);
        }
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".zip") {
            Some(TemplateKind::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(TemplateKind::TarGz)
        } else {
            None
        }
    }
}

/// `EFI/OC/config.plist` below an `EFI` directory.
pub fn config_plist_path(efi_dir: &Path) -> PathBuf {
    efi_dir.join("OC").join("config.plist")
}

/// Stage a working `EFI` tree under `staging` and return its path.
pub async fn stage_efi(
    template: Option<&Path>,
    staging: &Path,
    progress: &ProgressSink,
) -> Result<PathBuf> {
    let efi_dir = staging.join("EFI");
    create_dir_all(&efi_dir, true).await?;

    let source = match template {
        Some(path) if path.exists() => unpack_template(path, staging).await?,
        Some(path) => {
            log::warn!("EFI template {} does not exist", path.display());
            None
        }
        None => None,
    };

    match source {
        Some(source) if !is_empty_dir(&source) => {
            progress(&format!("Copying EFI template from {}", source.display()));
            let copied = copy_dir(&source, &efi_dir).await?;
            log::info!("✓ Staged EFI template ({} files)", copied);
        }
        _ => {
            progress("No usable EFI template; creating a placeholder EFI structure");
            write_placeholder(&efi_dir)?;
            log::warn!(
                "Placeholder EFI written to {}; fields marked {} must be replaced before booting",
                efi_dir.display(),
                PLACEHOLDER_MARKER
            );
        }
    }
    Ok(efi_dir)
}

/// Directory whose contents become the staged `EFI` folder.
async fn unpack_template(path: &Path, staging: &Path) -> Result<Option<PathBuf>> {
    let root = match TemplateKind::detect(path) {
        Some(TemplateKind::Directory) => path.to_path_buf(),
        Some(kind) => {
            let unpacked = staging.join("template");
            create_dir_all(&unpacked, true).await?;
            let archive = path.to_path_buf();
            let dest = unpacked.clone();
            tokio::task::spawn_blocking(move || unpack_archive(kind, &archive, &dest))
                .await
                .map_err(|e| Error::GenericError(format!("Template unpack task panicked: {e}")))??;
            unpacked
        }
        None => {
            return Err(Error::GenericError(format!(
                "unsupported EFI template {}: expected a directory, .zip or .tar.gz",
                path.display()
            )));
        }
    };

    let nested = root.join("EFI");
    Ok(Some(if nested.is_dir() { nested } else { root }))
}

fn unpack_archive(kind: TemplateKind, archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive).fs_context("opening EFI template", archive)?;
    match kind {
        TemplateKind::Zip => {
            zip::ZipArchive::new(file)?.extract(dest)?;
        }
        TemplateKind::TarGz => {
            tar::Archive::new(flate2::read::GzDecoder::new(file))
                .unpack(dest)
                .fs_context("unpacking EFI template", archive)?;
        }
        TemplateKind::Directory => {}
    }
    Ok(())
}
