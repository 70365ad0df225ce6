//! Teardown of everything a run mounted, attached or created.

use crate::installer::{platform::BlockDeviceBackend, process::CommandRunner};
use std::path::{Path, PathBuf};

/// Resources registered during a run, released in a safe order:
/// mounts (newest first), then attached devices, then scratch paths.
#[derive(Debug, Default)]
pub struct Cleanup {
    mounts: Vec<PathBuf>,
    attached: Vec<String>,
    paths: Vec<PathBuf>,
}

impl Cleanup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_mount(&mut self, mount_point: &Path) {
        self.mounts.push(mount_point.to_path_buf());
    }

    /// Forget a mount that was already unmounted in the normal flow.
    pub fn pop_mount(&mut self, mount_point: &Path) {
        self.mounts.retain(|m| m != mount_point);
    }

    pub fn push_attached(&mut self, device: &str) {
        self.attached.push(device.to_string());
    }

    /// A file or empty directory deleted at the end of the run.
    pub fn push_path(&mut self, path: &Path) {
        self.paths.push(path.to_path_buf());
    }

    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty() && self.attached.is_empty() && self.paths.is_empty()
    }

    /// Forget a device that was already released in the normal flow.
    pub fn pop_attached(&mut self, device: &str) {
        self.attached.retain(|d| d != device);
    }

    /// Release everything; failures are logged, never raised.
    ///
    /// Runs even after a stop request: teardown commands go through
    /// [`CommandRunner::teardown`].
    pub async fn run<B: BlockDeviceBackend>(&mut self, backend: &B, runner: &CommandRunner) {
        if self.is_empty() {
            return;
        }
        let runner = &runner.teardown();
        runner.report("Cleaning up mounts and temporary files...");

        while let Some(mount) = self.mounts.pop() {
            if let Err(e) = backend.unmount(runner, &mount).await {
                log::warn!("Failed to unmount {}: {}", mount.display(), e);
            }
        }
        while let Some(device) = self.attached.pop() {
            if let Err(e) = backend.detach(runner, &device).await {
                log::warn!("Failed to detach {}: {}", device, e);
            }
        }
        while let Some(path) = self.paths.pop() {
            if runner.is_dry_run() && !path.exists() {
                continue;
            }
            // Directories are mount points: only ever removed when empty.
            let removed = if path.is_dir() {
                std::fs::remove_dir(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match removed {
                Ok(()) => log::debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        log::info!("✓ Cleanup complete");
    }
}
