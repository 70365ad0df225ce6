//! Bootable macOS installer USB creation.
//!
//! The pipeline locates the installer assets a download tool left on disk,
//! extracts the raw BaseSystem HFS+ image, partitions the target with the
//! host's native tools, copies the assets, and deploys an OpenCore EFI
//! folder whose `config.plist` is tuned to the detected hardware.
//!
//! Entry points:
//! - [`Session`] runs one write on a worker thread and yields a [`Verdict`]
//! - [`InstallerWriter`] is the same pipeline for callers already in async code
//! - [`PlistEnhancer`], [`InstallerAssetSet`] and [`extract_hfs`] are usable alone

pub mod assets;
pub mod efi;
pub mod error;
pub mod extract;
pub mod hardware;
pub mod platform;
pub mod plist;
pub mod process;
pub mod session;
pub mod settings;
pub mod utils;
pub mod version;
pub mod writer;

pub use assets::{InstallerAssetSet, PlacementPlan};
pub use error::{Context, Error, ErrorExt, Result};
pub use extract::{ExtractOptions, SevenZip, extract_hfs};
pub use hardware::{HardwareProbe, HardwareSnapshot, host_probe};
pub use platform::{BlockDeviceBackend, LinuxBackend, MacOsBackend, ManualGuide, WindowsBackend};
pub use plist::{EnhanceOutcome, PlistEnhancer};
pub use process::{CommandRunner, ProgressSink, log_sink};
pub use session::{Session, Verdict, WorkerHandle};
pub use settings::{ConfigFile, Settings, SettingsBuilder};
pub use version::MacOsVersion;
pub use writer::{InstallerWriter, Stage, WriteOutcome, WriteSummary};
