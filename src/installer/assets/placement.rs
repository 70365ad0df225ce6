//! Where each located asset lands on the installer partition.
//!
//! The layout mirrors Apple's installer app so both OpenCore and the macOS
//! recovery environment recognize the partition:
//!
//! ```text
//! System/Library/CoreServices/{BaseSystem.dmg,BaseSystem.chunklist,boot.efi}
//! Install macOS <Version>.app/Contents/Info.plist
//! Install macOS <Version>.app/Contents/SharedSupport/{BaseSystem.*,<payload>,AppleDiagnostics.*}
//! System/Installation/Packages/<payload>
//! InstallInfo.plist
//! .IAProductInfo
//! ```

use super::InstallerAssetSet;
use crate::installer::{
    MacOsVersion, ProgressSink,
    error::{Error, Result},
    utils::fs::copy_file,
};
use plist::{Dictionary, Value};
use std::path::{Path, PathBuf};

/// Content written to one destination.
#[derive(Debug, Clone)]
pub enum PlacementSource {
    /// Copied from the download tree
    File(PathBuf),
    /// Synthesized at plan time
    Generated(Vec<u8>),
}

/// One copy step.
#[derive(Debug, Clone)]
pub struct Placement {
    pub source: PlacementSource,
    /// Relative to the installer partition root
    pub dest: PathBuf,
    /// A failed required copy aborts the run.
    pub required: bool,
}

/// Ordered list of copy steps for the installer partition.
#[derive(Debug, Clone, Default)]
pub struct PlacementPlan {
    pub entries: Vec<Placement>,
    /// Optional assets that were not found and are skipped
    pub skipped: Vec<String>,
}

impl PlacementPlan {
    pub fn build(assets: &InstallerAssetSet, version: MacOsVersion) -> Result<Self> {
        let mut plan = Self::default();
        let core_services = PathBuf::from("System/Library/CoreServices");
        let contents = PathBuf::from(version.installer_app_name()).join("Contents");
        let shared_support = contents.join("SharedSupport");
        let packages = PathBuf::from("System/Installation/Packages");
        let payload_name = assets.payload_kind.file_name();

        plan.file(&assets.base_system, core_services.join("BaseSystem.dmg"), true);
        plan.optional(
            assets.base_system_chunklist.as_deref(),
            core_services.join("BaseSystem.chunklist"),
            "BaseSystem.chunklist",
        );
        plan.optional(assets.boot_efi.as_deref(), core_services.join("boot.efi"), "boot.efi");

        plan.optional(
            assets.install_info.as_deref(),
            contents.join("Info.plist"),
            "InstallInfo.plist",
        );
        plan.file(&assets.base_system, shared_support.join("BaseSystem.dmg"), true);
        if let Some(chunklist) = assets.base_system_chunklist.as_deref() {
            plan.file(chunklist, shared_support.join("BaseSystem.chunklist"), false);
        }
        plan.file(&assets.payload, shared_support.join(payload_name), true);
        plan.optional(
            assets.diagnostics.as_deref(),
            shared_support.join("AppleDiagnostics.dmg"),
            "AppleDiagnostics.dmg",
        );
        if let Some(chunklist) = assets.diagnostics_chunklist.as_deref() {
            plan.file(chunklist, shared_support.join("AppleDiagnostics.chunklist"), false);
        }

        plan.file(&assets.payload, packages.join(payload_name), true);

        if let Some(info) = assets.install_info.as_deref() {
            plan.file(info, PathBuf::from("InstallInfo.plist"), false);
        }
        plan.entries.push(Placement {
            source: PlacementSource::Generated(product_info(assets, version)?),
            dest: PathBuf::from(".IAProductInfo"),
            required: false,
        });

        Ok(plan)
    }

    fn file(&mut self, source: &Path, dest: PathBuf, required: bool) {
        self.entries.push(Placement {
            source: PlacementSource::File(source.to_path_buf()),
            dest,
            required,
        });
    }

    fn optional(&mut self, source: Option<&Path>, dest: PathBuf, name: &str) {
        match source {
            Some(source) => self.file(source, dest, false),
            None => {
                log::warn!("Optional asset {} not found; it will not be copied", name);
                self.skipped.push(name.to_string());
            }
        }
    }

    pub fn destinations(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|e| e.dest.as_path())
    }

    /// `source -> dest` lines for display and manual copying.
    pub fn describe(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| {
                let source = match &e.source {
                    PlacementSource::File(path) => path.display().to_string(),
                    PlacementSource::Generated(_) => "(generated)".to_string(),
                };
                let flag = if e.required { "" } else { " (optional)" };
                format!("{} -> {}{}", source, e.dest.display(), flag)
            })
            .collect()
    }

    /// Copy every entry below `root`. Returns the number of entries written.
    pub async fn apply(&self, root: &Path, progress: &ProgressSink) -> Result<usize> {
        let mut written = 0;
        for entry in &self.entries {
            let dest = root.join(&entry.dest);
            let result = match &entry.source {
                PlacementSource::File(source) => {
                    progress(&format!("Copying {} to {}", source.display(), entry.dest.display()));
                    copy_file(source, &dest).await.map(|_| ())
                }
                PlacementSource::Generated(bytes) => {
                    progress(&format!("Writing {}", entry.dest.display()));
                    write_generated(&dest, bytes).await
                }
            };

            match result {
                Ok(()) => written += 1,
                Err(e) if entry.required => {
                    return Err(Error::GenericError(format!(
                        "failed to copy required asset to {}: {e}",
                        entry.dest.display()
                    )));
                }
                Err(e) => {
                    log::warn!("Skipping optional {}: {}", entry.dest.display(), e);
                    progress(&format!("Warning: could not write {}: {e}", entry.dest.display()));
                }
            }
        }
        log::info!("✓ Placed {} installer asset(s)", written);
        Ok(written)
    }
}

async fn write_generated(dest: &Path, bytes: &[u8]) -> Result<()> {
    use crate::installer::error::ErrorExt;
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .fs_context("creating directory", parent)?;
    }
    tokio::fs::write(dest, bytes).await.fs_context("writing file", dest)
}

/// `.IAProductInfo` as an XML plist.
fn product_info(assets: &InstallerAssetSet, version: MacOsVersion) -> Result<Vec<u8>> {
    let folder_name = assets
        .product_folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut dict = Dictionary::new();
    if let Some(id) = product_id_from_folder(&folder_name) {
        dict.insert("Product ID".into(), Value::String(id));
    }
    let product_version = assets
        .install_info
        .as_deref()
        .and_then(version_from_install_info)
        .or_else(|| version_from_folder(&folder_name));
    if let Some(v) = product_version {
        dict.insert("Product Version".into(), Value::String(v));
    }
    dict.insert(
        "Product Name".into(),
        Value::String(format!("macOS {}", version.display_name())),
    );

    let mut bytes = Vec::new();
    plist::to_writer_xml(&mut bytes, &Value::Dictionary(dict))?;
    Ok(bytes)
}

/// `System Image Info.version` of an InstallInfo.plist.
fn version_from_install_info(path: &Path) -> Option<String> {
    let value = plist::Value::from_file(path)
        .map_err(|e| log::debug!("Could not read {}: {}", path.display(), e))
        .ok()?;
    value
        .as_dictionary()?
        .get("System Image Info")?
        .as_dictionary()?
        .get("version")?
        .as_string()
        .map(str::to_string)
}

/// Catalog product id such as `062-01234` at the start of a folder name.
fn product_id_from_folder(name: &str) -> Option<String> {
    let token = name.split_whitespace().next()?;
    let (a, b) = token.split_once('-')?;
    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    (digits(a) && digits(b)).then(|| token.to_string())
}

/// Trailing dotted version such as `14.4.1` in a folder name.
fn version_from_folder(name: &str) -> Option<String> {
    name.split_whitespace()
        .rev()
        .find(|t| t.contains('.') && t.split('.').all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit())))
        .map(str::to_string)
}
