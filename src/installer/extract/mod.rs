//! Nested extraction of the raw HFS+ image from installer archives.
//!
//! # Process
//!
//! 1. `.pkg`: pull the embedded `.dmg` files and pick one
//! 2. Non-BaseSystem DMG: pull the nested `BaseSystem.dmg`
//! 3. BaseSystem.dmg: pull `*.hfs`, else everything and take the largest
//!    non-sidecar file above the size threshold
//! 4. Move the image to the output path
//!
//! All intermediate files live in one scratch directory that is removed
//! however the run ends. The internal DMG layout is undocumented; every step
//! past the first logs which heuristic it fell back to.

mod seven_zip;

pub use seven_zip::{SEVEN_ZIP_NAMES, SevenZip};

use crate::installer::{
    ProgressSink,
    assets::largest,
    error::{Error, ErrorExt, Result},
    utils::checksum::sha256_file,
};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Minimum size of an unnamed HFS+ candidate
pub const DEFAULT_FALLBACK_MIN_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Members that are never the filesystem image.
pub const SIDECAR_EXTENSIONS: [&str; 4] = ["xml", "chunklist", "plist", "txt"];

/// Extracts archive members into a directory.
#[allow(async_fn_in_trait)]
pub trait Archiver {
    /// Extract members whose name or path matches any of `patterns` (all
    /// members when empty) into `out_dir`, without their directory structure.
    async fn extract(&self, archive: &Path, patterns: &[&str], out_dir: &Path) -> Result<()>;
}

/// Tunables for [`extract_hfs`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Parent of the scratch directory
    pub work_dir: PathBuf,
    pub fallback_min_size: u64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir(),
            fallback_min_size: DEFAULT_FALLBACK_MIN_SIZE,
        }
    }
}

impl ExtractOptions {
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_fallback_min_size(mut self, size: u64) -> Self {
        self.fallback_min_size = size;
        self
    }
}

/// Extract the HFS+ image inside `source` (a `.pkg` or `.dmg`) to `output`.
pub async fn extract_hfs<A: Archiver>(
    archiver: &A,
    source: &Path,
    output: &Path,
    options: &ExtractOptions,
    progress: &ProgressSink,
) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(Error::Fs {
            context: "reading installer archive",
            path: source.to_path_buf(),
            error: std::io::ErrorKind::NotFound.into(),
        });
    }

    std::fs::create_dir_all(&options.work_dir).fs_context("creating work directory", &options.work_dir)?;
    let scratch = tempfile::Builder::new()
        .prefix(&format!("hfs-extract-{}-", std::process::id()))
        .tempdir_in(&options.work_dir)
        .fs_context("creating scratch directory", &options.work_dir)?;
    log::debug!("Extraction scratch directory: {}", scratch.path().display());

    let image = resolve_image(archiver, source, scratch.path(), options, progress).await?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).fs_context("creating output directory", parent)?;
    }
    move_file(&image, output)?;

    let digest = sha256_file(output).await?;
    log::info!("✓ Extracted HFS+ image to {} (sha256 {})", output.display(), digest);
    progress(&format!("Extracted HFS+ image: {}", output.display()));
    Ok(output.to_path_buf())
}

async fn resolve_image<A: Archiver>(
    archiver: &A,
    source: &Path,
    scratch: &Path,
    options: &ExtractOptions,
    progress: &ProgressSink,
) -> Result<PathBuf> {
    let extension = source
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let dmg = match extension.as_str() {
        "pkg" => {
            progress(&format!("Extracting disk images from {}", source.display()));
            let dir = stage_dir(scratch, "pkg")?;
            archiver.extract(source, &["*.dmg"], &dir).await?;
            pick_dmg(files_under(&dir)).ok_or_else(|| {
                Error::GenericError(format!("no .dmg found inside {}", source.display()))
            })?
        }
        "dmg" => source.to_path_buf(),
        _ => {
            return Err(Error::GenericError(format!(
                "unsupported installer archive {}: expected .pkg or .dmg",
                source.display()
            )));
        }
    };

    let base_system = if is_named(&dmg, "BaseSystem.dmg") {
        dmg
    } else {
        progress(&format!("Extracting BaseSystem.dmg from {}", display_name(&dmg)));
        let dir = stage_dir(scratch, "nested")?;
        archiver
            .extract(&dmg, &["BaseSystem.dmg", "*/BaseSystem.dmg"], &dir)
            .await?;
        largest(files_under(&dir).into_iter().filter(|p| is_named(p, "BaseSystem.dmg")))
            .ok_or_else(|| {
                Error::GenericError(format!("no BaseSystem.dmg found inside {}", dmg.display()))
            })?
    };

    progress(&format!("Extracting HFS+ image from {}", display_name(&base_system)));
    let dir = stage_dir(scratch, "hfs")?;
    match archiver.extract(&base_system, &["*.hfs"], &dir).await {
        Ok(()) => {
            let named = files_under(&dir).into_iter().filter(|p| has_extension(p, "hfs"));
            if let Some(image) = largest(named) {
                return Ok(image);
            }
            log::warn!(
                "No *.hfs member in {}; falling back to the largest member",
                base_system.display()
            );
        }
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(e) => log::warn!(
            "Extracting *.hfs from {} failed ({}); falling back to a full extraction",
            base_system.display(),
            e
        ),
    }

    progress("No named HFS+ member; extracting all members to find the image");
    let dir = stage_dir(scratch, "all")?;
    archiver.extract(&base_system, &[], &dir).await?;
    let candidates = files_under(&dir).into_iter().filter(|p| {
        !is_sidecar(p)
            && std::fs::metadata(p)
                .map(|m| m.len() >= options.fallback_min_size)
                .unwrap_or(false)
    });
    let image = largest(candidates).ok_or_else(|| {
        Error::GenericError(format!(
            "no HFS+ image found in {} (no *.hfs member and nothing above {} bytes)",
            base_system.display(),
            options.fallback_min_size
        ))
    })?;
    log::info!("Using {} as the HFS+ image", image.display());
    Ok(image)
}

/// Preference: `BaseSystem.dmg`, then the largest InstallESD, SharedSupport, any.
pub fn pick_dmg(candidates: Vec<PathBuf>) -> Option<PathBuf> {
    let dmgs: Vec<PathBuf> = candidates
        .into_iter()
        .filter(|p| has_extension(p, "dmg"))
        .collect();

    if let Some(exact) = dmgs.iter().find(|p| is_named(p, "BaseSystem.dmg")) {
        return Some(exact.clone());
    }
    for needle in ["installesd", "sharedsupport"] {
        let hits = dmgs
            .iter()
            .filter(|p| display_name(p).to_lowercase().contains(needle))
            .cloned();
        if let Some(found) = largest(hits) {
            return Some(found);
        }
    }
    largest(dmgs)
}

fn stage_dir(scratch: &Path, name: &str) -> Result<PathBuf> {
    let dir = scratch.join(name);
    std::fs::create_dir_all(&dir).fs_context("creating scratch directory", &dir)?;
    Ok(dir)
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_named(path: &Path, name: &str) -> bool {
    display_name(path).eq_ignore_ascii_case(name)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
}

fn is_sidecar(path: &Path) -> bool {
    SIDECAR_EXTENSIONS.iter().any(|ext| has_extension(path, ext))
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // Scratch and output may sit on different filesystems.
    std::fs::copy(from, to).fs_context("copying extracted image", to)?;
    std::fs::remove_file(from).fs_context("removing extracted image", from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized(dir: &Path, name: &str, len: usize) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; len]).unwrap();
        path
    }

    #[test]
    fn base_system_beats_larger_dmgs() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            sized(dir.path(), "InstallESD.dmg", 30),
            sized(dir.path(), "BaseSystem.dmg", 10),
        ];
        assert!(is_named(&pick_dmg(files).unwrap(), "BaseSystem.dmg"));
    }

    #[test]
    fn install_esd_beats_shared_support() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            sized(dir.path(), "SharedSupport.dmg", 50),
            sized(dir.path(), "InstallESD.dmg", 20),
            sized(dir.path(), "Other.dmg", 90),
        ];
        assert!(is_named(&pick_dmg(files).unwrap(), "InstallESD.dmg"));
    }

    #[test]
    fn largest_dmg_overall_as_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            sized(dir.path(), "a.dmg", 5),
            sized(dir.path(), "b.dmg", 9),
            sized(dir.path(), "notes.txt", 100),
        ];
        assert!(is_named(&pick_dmg(files).unwrap(), "b.dmg"));
    }

    #[test]
    fn sidecars_are_recognized() {
        assert!(is_sidecar(Path::new("x/BaseSystem.chunklist")));
        assert!(is_sidecar(Path::new("Info.PLIST")));
        assert!(!is_sidecar(Path::new("4.hfs")));
    }
}
