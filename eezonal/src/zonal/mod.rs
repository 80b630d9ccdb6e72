pub mod asset;
pub mod categorical;
pub mod continuous;
pub mod record;
pub mod zonal_stats;

pub use asset::{resolve_asset, AssetKind};
pub use record::{FieldValue, Record};
pub use zonal_stats::{zonal_stats, ReductionKind, ZonalStats};
