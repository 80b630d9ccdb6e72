use log::info;

use crate::collect::earth_engine::Backend;
use crate::error::{Result, ZonalError};

/// Asset kinds the reducers can handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    ImageCollection,
}

impl AssetKind {
    /// Classify a backend asset type string
    pub fn from_type(asset_id: &str, asset_type: &str) -> Result<Self> {
        match asset_type {
            "IMAGE" | "Image" => Ok(AssetKind::Image),
            "IMAGE_COLLECTION" | "ImageCollection" => Ok(AssetKind::ImageCollection),
            other => Err(ZonalError::UnsupportedAssetKind {
                asset_id: asset_id.to_string(),
                kind: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "IMAGE",
            AssetKind::ImageCollection => "IMAGE_COLLECTION",
        }
    }
}

/// Look up `asset_id` and tell whether it is a single image or a collection
pub fn resolve_asset(backend: &dyn Backend, asset_id: &str) -> Result<AssetKind> {
    let asset_id = asset_id.trim();
    if asset_id.is_empty() {
        return Err(ZonalError::InvalidArgument("asset id is empty".to_string()));
    }
    let asset = backend.get_asset(asset_id)?;
    let kind = AssetKind::from_type(asset_id, &asset.asset_type)?;
    info!("Asset {} resolved as {}", asset_id, kind.as_str());
    Ok(kind)
}
