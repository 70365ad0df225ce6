//! Loading and persisting property lists.

use crate::installer::error::{Error, ErrorExt, Result};
use plist::Value;
use std::path::Path;

/// Where the enhancer reads and writes plists.
pub trait PlistStore: Send + Sync {
    /// Parse the plist at `path`. Parse failures are [`Error::InvalidPlist`].
    fn load(&self, path: &Path) -> Result<Value>;

    /// Replace the plist at `path` with `value` in XML form.
    fn save(&self, path: &Path, value: &Value) -> Result<()>;
}

/// Filesystem store; saves through a sibling temp file and rename.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStore;

impl PlistStore for FileStore {
    fn load(&self, path: &Path) -> Result<Value> {
        let bytes = std::fs::read(path).fs_context("reading plist", path)?;
        let value = plist::from_bytes::<Value>(&bytes).map_err(|source| Error::InvalidPlist {
            path: path.to_path_buf(),
            source,
        })?;
        if value.as_dictionary().is_none() {
            return Err(Error::GenericError(format!(
                "{} does not have a dictionary at its root",
                path.display()
            )));
        }
        Ok(value)
    }

    fn save(&self, path: &Path, value: &Value) -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).fs_context("creating temporary plist", dir)?;
        plist::to_writer_xml(tmp.as_file_mut(), value)?;
        tmp.as_file_mut()
            .sync_all()
            .fs_context("flushing temporary plist", tmp.path().to_path_buf())?;
        tmp.persist(path)
            .map_err(|e| e.error)
            .fs_context("replacing plist", path)?;
        Ok(())
    }
}

/// Sort dictionary keys at every level so output is canonical.
pub fn sort_keys_recursive(value: &mut Value) {
    match value {
        Value::Dictionary(dict) => {
            dict.sort_keys();
            for (_, child) in dict.iter_mut() {
                sort_keys_recursive(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(sort_keys_recursive),
        _ => {}
    }
}
