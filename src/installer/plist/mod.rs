//! OpenCore `config.plist` enhancement.
//!
//! - [`tables`] - immutable device-to-setting tables
//! - [`boot_args`] - `boot-args` token set
//! - [`store`] - load/save seam with atomic file saves
//! - [`enhancer`] - the hardware-aware rewrite itself

mod boot_args;
mod enhancer;
mod store;
mod tables;

pub use boot_args::BootArgs;
pub use enhancer::{
    AUDIO_PCI_PATH, AudioMatch, BOOT_ARGS_GUID, EnhanceOutcome, IGPU_PCI_PATH, PlistEnhancer,
    backup_path_for, select_audio_layout,
};
pub use store::{FileStore, PlistStore, sort_keys_recursive};
pub use tables::{DeviceProfileTable, HEADLESS_SUFFIXES, PCI_AUDIO_PREFIX, PropertySet};
