//! Installer asset discovery and placement planning.

mod locator;
mod placement;

pub use locator::{
    CATALOG_DIRS, InstallerAssetSet, PayloadKind, find_asset, product_folder,
};
pub(crate) use locator::largest;
pub use placement::{Placement, PlacementPlan, PlacementSource};
