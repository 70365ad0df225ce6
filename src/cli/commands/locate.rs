//! `locate`: show the assets a write would use and where they land.

use crate::{
    cli::{LocateArgs, RuntimeConfig},
    error::{CliError, Result},
    installer::{ConfigFile, InstallerAssetSet, PlacementPlan},
};

pub fn execute(args: &LocateArgs, config: &ConfigFile, runtime_config: &RuntimeConfig) -> Result<i32> {
    let root = args
        .downloads
        .as_ref()
        .or(config.download_root.as_ref())
        .ok_or_else(|| CliError::InvalidArguments {
            reason: "--downloads is required when the config file sets no download_root".into(),
        })?;

    let assets = InstallerAssetSet::locate(root, args.version)?;
    let plan = PlacementPlan::build(&assets, args.version)?;

    runtime_config.section(&format!("macOS {} installer assets", args.version))?;
    runtime_config.indent(&format!("Product folder: {}", assets.product_folder.display()))?;
    runtime_config.indent(&format!("BaseSystem:     {}", assets.base_system.display()))?;
    runtime_config.indent(&format!(
        "Payload:        {} ({})",
        assets.payload.display(),
        assets.payload_kind.file_name()
    ))?;

    runtime_config.section("Placement on the installer partition")?;
    for line in plan.describe() {
        runtime_config.indent(&line)?;
    }
    for skipped in &plan.skipped {
        runtime_config.warn(&format!("Optional asset {skipped} not found; it will be skipped"))?;
    }
    runtime_config.success(&format!("{} placement(s) planned", plan.entries.len()))?;
    Ok(0)
}
