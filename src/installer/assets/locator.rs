//! Product folder discovery and asset search.

use crate::installer::{
    MacOsVersion,
    error::{Error, Result},
};
use glob::{MatchOptions, Pattern};
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Catalog subfolders a download tool sorts products into.
pub const CATALOG_DIRS: [&str; 3] = ["publicrelease", "developerseed", "customerseed"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Folder holding `version`'s assets under `download_root`.
///
/// Catalog folders (at the root and one level below it) are searched before
/// the root's own children. With no match the root itself is returned.
pub fn product_folder(download_root: &Path, version: MacOsVersion) -> PathBuf {
    let needles = version.folder_needles();
    let mut search_dirs = catalog_dirs(download_root);
    search_dirs.push(download_root.to_path_buf());

    for dir in &search_dirs {
        let found = sorted_children(dir)
            .into_iter()
            .filter(|p| p.is_dir())
            .find(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().to_lowercase())
                    .is_some_and(|name| needles.iter().any(|needle| name.contains(needle.as_str())))
            });
        if let Some(folder) = found {
            log::debug!("Product folder for {}: {}", version, folder.display());
            return folder;
        }
    }

    log::warn!(
        "No folder for macOS {} under {}; searching the download root directly",
        version,
        download_root.display()
    );
    download_root.to_path_buf()
}

fn catalog_dirs(root: &Path) -> Vec<PathBuf> {
    let is_catalog = |p: &Path| {
        p.is_dir()
            && p.file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .is_some_and(|name| CATALOG_DIRS.contains(&name.as_str()))
    };

    let mut found: Vec<PathBuf> = Vec::new();
    let children = sorted_children(root);
    found.extend(children.iter().filter(|p| is_catalog(p.as_path())).cloned());
    for child in children.iter().filter(|p| p.is_dir() && !is_catalog(p.as_path())) {
        found.extend(sorted_children(child).into_iter().filter(|p| is_catalog(p.as_path())));
    }
    found
}

fn sorted_children(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut children: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    children.sort();
    children
}

/// Find the file matching any of `patterns` (file-name globs, case-insensitive).
///
/// Stages, first hit wins: `search_root`, `search_root/SharedSupport`, every
/// `Install macOS*.app/Contents/{SharedSupport,Resources}`, then with `deep`
/// a recursive walk. Within a stage the largest file wins, ties going to the
/// lexically first path. Not finding anything is `None`, never an error.
pub fn find_asset(patterns: &[&str], search_root: &Path, deep: bool) -> Option<PathBuf> {
    let compiled: Vec<Pattern> = patterns
        .iter()
        .filter_map(|p| match Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                log::warn!("Ignoring invalid asset pattern '{}': {}", p, e);
                None
            }
        })
        .collect();
    if compiled.is_empty() {
        return None;
    }

    for dir in shallow_stages(search_root) {
        let hits = sorted_children(&dir)
            .into_iter()
            .filter(|p| p.is_file() && name_matches(p, &compiled));
        if let Some(found) = largest(hits) {
            log::debug!("Found {:?} at {}", patterns, found.display());
            return Some(found);
        }
    }

    if deep {
        let hits = WalkDir::new(search_root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::debug!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|p| name_matches(p, &compiled));
        if let Some(found) = largest(hits) {
            log::debug!("Found {:?} by recursive search at {}", patterns, found.display());
            return Some(found);
        }
    }

    log::warn!(
        "Asset matching {:?} not found under {}",
        patterns,
        search_root.display()
    );
    None
}

fn shallow_stages(root: &Path) -> Vec<PathBuf> {
    let mut stages = vec![root.to_path_buf(), root.join("SharedSupport")];
    let app_pattern = Pattern::new("Install macOS*.app").ok();
    for app in sorted_children(root).into_iter().filter(|p| p.is_dir()) {
        let is_app = app
            .file_name()
            .zip(app_pattern.as_ref())
            .is_some_and(|(name, pattern)| pattern.matches_with(&name.to_string_lossy(), MATCH_OPTIONS));
        if is_app {
            stages.push(app.join("Contents").join("SharedSupport"));
            stages.push(app.join("Contents").join("Resources"));
        }
    }
    stages
}

fn name_matches(path: &Path, patterns: &[Pattern]) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|name| patterns.iter().any(|p| p.matches_with(&name, MATCH_OPTIONS)))
}

/// Largest file by size; equal sizes resolve to the smallest path.
pub(crate) fn largest(candidates: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    candidates
        .into_iter()
        .map(|p| (fs::metadata(&p).map(|m| m.len()).unwrap_or(0), p))
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
        .map(|(_, p)| p)
}

/// Main installer payload, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    InstallAssistant,
    InstallEsd,
    SharedSupport,
}

impl PayloadKind {
    pub const PREFERENCE: [PayloadKind; 3] = [
        PayloadKind::InstallAssistant,
        PayloadKind::InstallEsd,
        PayloadKind::SharedSupport,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            PayloadKind::InstallAssistant => "InstallAssistant.pkg",
            PayloadKind::InstallEsd => "InstallESD.dmg",
            PayloadKind::SharedSupport => "SharedSupport.dmg",
        }
    }
}

/// Every asset found for one product.
#[derive(Debug, Clone)]
pub struct InstallerAssetSet {
    pub version: MacOsVersion,
    pub product_folder: PathBuf,
    pub base_system: PathBuf,
    pub base_system_chunklist: Option<PathBuf>,
    pub install_info: Option<PathBuf>,
    pub payload: PathBuf,
    pub payload_kind: PayloadKind,
    pub diagnostics: Option<PathBuf>,
    pub diagnostics_chunklist: Option<PathBuf>,
    pub boot_efi: Option<PathBuf>,
}

impl InstallerAssetSet {
    /// Resolve the full set for `version`. BaseSystem.dmg and a payload are required.
    pub fn locate(download_root: &Path, version: MacOsVersion) -> Result<Self> {
        let folder = product_folder(download_root, version);

        let base_system = find_asset(&["BaseSystem.dmg"], &folder, true).ok_or_else(|| {
            Error::MissingRequiredAsset {
                name: "BaseSystem.dmg".into(),
                searched: folder.clone(),
            }
        })?;

        let (payload_kind, payload) = PayloadKind::PREFERENCE
            .into_iter()
            .find_map(|kind| find_asset(&[kind.file_name()], &folder, true).map(|p| (kind, p)))
            .ok_or_else(|| Error::MissingRequiredAsset {
                name: "main installer payload (InstallAssistant.pkg, InstallESD.dmg or SharedSupport.dmg)"
                    .into(),
                searched: folder.clone(),
            })?;

        let set = Self {
            version,
            base_system_chunklist: find_asset(&["BaseSystem.chunklist"], &folder, true),
            install_info: find_asset(&["InstallInfo.plist"], &folder, true),
            diagnostics: find_asset(&["AppleDiagnostics.dmg"], &folder, true),
            diagnostics_chunklist: find_asset(&["AppleDiagnostics.chunklist"], &folder, true),
            boot_efi: find_asset(&["boot.efi"], &folder, true),
            product_folder: folder,
            base_system,
            payload,
            payload_kind,
        };
        log::info!(
            "✓ Located macOS {} assets in {} (payload: {})",
            version,
            set.product_folder.display(),
            set.payload_kind.file_name()
        );
        Ok(set)
    }
}
