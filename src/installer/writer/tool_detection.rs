//! Preflight checks for privileges and external tools.

use std::sync::LazyLock;

/// Whether the process runs as root. Cached for the process lifetime.
#[cfg(unix)]
pub static IS_PRIVILEGED: LazyLock<bool> = LazyLock::new(|| {
    let uid = users::get_current_uid();
    log::debug!("Running with uid {}", uid);
    uid == 0
});

/// Elevation is enforced by diskpart itself on Windows.
#[cfg(not(unix))]
pub static IS_PRIVILEGED: LazyLock<bool> = LazyLock::new(|| true);

/// Tools from `tools` that are not on `PATH`.
pub fn missing_tools(tools: &[&str]) -> Vec<String> {
    tools
        .iter()
        .filter(|tool| match which::which(tool) {
            Ok(path) => {
                log::debug!("Found {} at: {}", tool, path.display());
                false
            }
            Err(e) => {
                log::debug!("{} not found in PATH: {}", tool, e);
                true
            }
        })
        .map(|tool| tool.to_string())
        .collect()
}
