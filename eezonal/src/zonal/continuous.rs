use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::collect::earth_engine::expression::{algorithms, ValueNode};
use crate::zonal::record::FieldValue;

/// Statistics produced for continuous rasters, in output order
pub const STATISTICS: [&str; 3] = ["min", "max", "mean"];

/// min, max and mean of the image's single band inside `geometry`.
/// Best effort lets the backend coarsen the scale for very large regions.
pub fn reduce_continuous(image: ValueNode, geometry: ValueNode, scale: ValueNode) -> ValueNode {
    algorithms::reduce_region(
        image,
        algorithms::reducer_min_max_mean(),
        geometry,
        scale,
        true,
        None,
    )
}

/// `<band>_min`, `<band>_max`, `<band>_mean`; `Null` when the region holds no valid pixels
pub fn continuous_fields(
    band: &str,
    reduction: Option<&Map<String, Value>>,
) -> BTreeMap<String, FieldValue> {
    STATISTICS
        .iter()
        .map(|stat| {
            let key = format!("{band}_{stat}");
            let value = reduction
                .and_then(|r| r.get(&key))
                .map(FieldValue::from_json)
                .unwrap_or(FieldValue::Null);
            (key, value)
        })
        .collect()
}
