pub mod collect;
pub mod commons;
pub mod error;
pub mod geo_core;
pub mod zonal;

pub use collect::earth_engine::{AssetInfo, Backend, ClientOptions, EarthEngineClient};
pub use error::{Result, ZonalError};
pub use geo_core::{PolygonInput, Region};
pub use zonal::{zonal_stats, FieldValue, Record, ReductionKind, ZonalStats};
