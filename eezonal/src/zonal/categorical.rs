use log::debug;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::collect::earth_engine::expression::{algorithms, ValueNode};
use crate::collect::global_variables::M2_PER_HECTARE;
use crate::commons::basic_functions::format_category_key;
use crate::error::{Result, ZonalError};
use crate::zonal::record::FieldValue;

/// Hectares per category value inside `geometry`.
///
/// Band 0 is the pixel area in hectares, band 1 the category code; the sum
/// of band 0 is grouped by band 1.
pub fn reduce_categorical(
    image: ValueNode,
    geometry: ValueNode,
    scale: ValueNode,
    max_pixels: f64,
) -> ValueNode {
    let stacked = algorithms::add_bands(algorithms::pixel_area(M2_PER_HECTARE), image);
    algorithms::reduce_region(
        stacked,
        algorithms::reducer_grouped_sum(1),
        geometry,
        scale,
        false,
        Some(max_pixels),
    )
}

/// One field per category present, keyed by the stringified code.
///
/// Categories without positive area are left out.
pub fn categorical_fields(
    reduction: Option<&Map<String, Value>>,
) -> Result<BTreeMap<String, FieldValue>> {
    let groups = match reduction.and_then(|r| r.get("groups")) {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Array(groups)) => groups,
        Some(other) => {
            return Err(ZonalError::backend(format!(
                "unexpected response: `groups` is not a list: {other}"
            )))
        }
    };

    let mut areas: BTreeMap<String, f64> = BTreeMap::new();
    for group in groups {
        let code = group.get("group").and_then(Value::as_f64);
        let sum = group.get("sum").and_then(Value::as_f64);
        match (code, sum) {
            (Some(code), Some(sum)) => {
                if !sum.is_finite() || sum <= 0.0 {
                    debug!("Skipping category {} with area {}", code, sum);
                    continue;
                }
                *areas.entry(format_category_key(code)).or_insert(0.0) += sum;
            }
            // Masked pixels come back with a null group
            (None, _) if group.get("group").map_or(false, Value::is_null) => continue,
            _ => {
                return Err(ZonalError::backend(format!(
                    "unexpected response: malformed group entry {group}"
                )))
            }
        }
    }

    Ok(areas
        .into_iter()
        .map(|(k, v)| (k, FieldValue::Number(v)))
        .collect())
}
