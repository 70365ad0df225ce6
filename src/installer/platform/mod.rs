//! Per-OS block device operations behind one interface.
//!
//! Each backend only builds and runs native tool invocations through the
//! [`CommandRunner`]; ordering, cleanup and asset logic live in the writer.
//! All backends compile on every host so plans can be rendered anywhere.

mod linux;
mod macos;
mod windows;

pub use linux::{LinuxBackend, partition_node};
pub use macos::{MacOsBackend, find_partition_in_diskutil_plist};
pub use windows::{HFS_PARTITION_TYPE, ManualGuide, WindowsBackend, render_diskpart_script};

use crate::installer::{error::Result, process::CommandRunner};
use std::path::{Path, PathBuf};

/// ESP size in MiB; the installer partition takes the rest.
pub const ESP_SIZE_MIB: u64 = 550;

/// ESP volume label
pub const ESP_LABEL: &str = "EFI";

/// Result of an operation a host may not be able to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability<T> {
    Done(T),
    /// Not possible on this host; the reason is shown to the operator.
    Unsupported(String),
}

/// Which partition an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionRole {
    Esp,
    Installer,
}

impl PartitionRole {
    /// Short name used in mount point names
    pub fn tag(self) -> &'static str {
        match self {
            PartitionRole::Esp => "esp",
            PartitionRole::Installer => "installer",
        }
    }
}

/// The target after preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDevice {
    /// Device node partitioning operates on
    pub device: String,
    /// Set when an image file was attached as a virtual device
    pub attached: bool,
}

/// Partition nodes found after partitioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPaths {
    pub esp: String,
    pub installer: String,
}

/// Native disk operations for one host OS.
#[allow(async_fn_in_trait)]
pub trait BlockDeviceBackend {
    fn name(&self) -> &'static str;

    /// Executables that must be on `PATH` before anything destructive runs.
    fn required_tools(&self) -> &'static [&'static str];

    /// Maximum installer volume label length.
    fn installer_label_limit(&self) -> usize;

    /// Unmount anything on `device`; attach it first when it is an image file.
    async fn prepare_device(&self, runner: &CommandRunner, device: &str) -> Result<PreparedDevice>;

    /// Write a fresh GPT with the ESP and the installer partition.
    async fn partition(&self, runner: &CommandRunner, device: &str, label: &str) -> Result<PartitionPaths>;

    async fn format_esp(&self, runner: &CommandRunner, esp: &str) -> Result<()>;

    async fn format_installer(
        &self,
        runner: &CommandRunner,
        partition: &str,
        label: &str,
    ) -> Result<Capability<()>>;

    /// Byte-for-byte copy of `image` over `partition`.
    async fn write_raw_image(
        &self,
        runner: &CommandRunner,
        image: &Path,
        partition: &str,
    ) -> Result<Capability<()>>;

    /// Mount `partition` at `mount_point`, returning where it is reachable.
    async fn mount(
        &self,
        runner: &CommandRunner,
        partition: &str,
        role: PartitionRole,
        mount_point: &Path,
    ) -> Result<Capability<PathBuf>>;

    async fn unmount(&self, runner: &CommandRunner, mount_point: &Path) -> Result<()>;

    /// Detach a device attached by [`BlockDeviceBackend::prepare_device`],
    /// or a handle returned by [`BlockDeviceBackend::partition_handle`].
    async fn detach(&self, runner: &CommandRunner, device: &str) -> Result<()>;

    /// Something partitioning assigned on the host (a drive letter) that
    /// must be undone if the run stops before [`BlockDeviceBackend::release`].
    fn partition_handle(&self, _partitions: &PartitionPaths) -> Option<String> {
        None
    }

    /// Final hand-back of the device once everything is unmounted.
    async fn release(&self, runner: &CommandRunner, device: &str, partitions: &PartitionPaths) -> Result<()>;
}
