use log::{debug, info};
use serde_json::{json, Value};

use crate::collect::earth_engine::expression::{algorithms, argument, dictionary, Expression, ExpressionGraph, ValueNode};
use crate::collect::earth_engine::Backend;
use crate::collect::global_variables::{DEFAULT_MAX_PIXELS, IDENTITY_PROPERTIES};
use crate::commons::basic_functions::DateRange;
use crate::error::{Result, ZonalError};
use crate::geo_core::{PolygonInput, Region};
use crate::zonal::asset::{resolve_asset, AssetKind};
use crate::zonal::categorical::{categorical_fields, reduce_categorical};
use crate::zonal::continuous::{continuous_fields, reduce_continuous};
use crate::zonal::record::{ImageSummary, Record};

const SELECT_VAR: &str = "_MAPPING_VAR_0_0";
const REDUCE_VAR: &str = "_MAPPING_VAR_1_0";

/// Reduction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionKind {
    /// min/max/mean of a continuous band
    Continuous,
    /// hectares per category code
    Categorical,
}

impl ReductionKind {
    pub fn from_flag(categorical: bool) -> Self {
        if categorical {
            ReductionKind::Categorical
        } else {
            ReductionKind::Continuous
        }
    }
}

/// Zonal statistics for every raster of `asset_id` inside `polygon`.
///
/// Collections are filtered to `[ini_date, end_date)` and to `band`; a single
/// image uses its first band, renamed to `band`. One record per raster, in
/// collection order. A date range matching nothing yields an empty list.
pub fn zonal_stats(
    backend: &dyn Backend,
    asset_id: &str,
    ini_date: &str,
    end_date: &str,
    band: &str,
    polygon: &PolygonInput,
    categorical: bool,
) -> Result<Vec<Record>> {
    let mut zonal = ZonalStats::new(asset_id, band);
    zonal.set_date_range(ini_date, end_date);
    zonal.set_polygon(polygon.clone());
    zonal.set_categorical(categorical);
    zonal.run_internal(backend)?;
    Ok(zonal.take_records())
}

/// Builder-style zonal statistics processor
#[derive(Debug, Clone)]
pub struct ZonalStats {
    asset_id: String,
    band: String,
    date_range: Option<(String, String)>,
    polygon: Option<PolygonInput>,
    kind: ReductionKind,
    max_pixels: f64,
    records: Option<Vec<Record>>,
}

impl ZonalStats {
    pub fn new(asset_id: &str, band: &str) -> Self {
        ZonalStats {
            asset_id: asset_id.trim().to_string(),
            band: band.trim().to_string(),
            date_range: None,
            polygon: None,
            kind: ReductionKind::Continuous,
            max_pixels: DEFAULT_MAX_PIXELS,
            records: None,
        }
    }

    /// `YYYY-MM-DD` bounds, end exclusive
    pub fn set_date_range(&mut self, ini_date: &str, end_date: &str) {
        self.date_range = Some((ini_date.to_string(), end_date.to_string()));
    }

    pub fn set_polygon(&mut self, polygon: PolygonInput) {
        self.polygon = Some(polygon);
    }

    pub fn set_categorical(&mut self, categorical: bool) {
        self.kind = ReductionKind::from_flag(categorical);
    }

    /// Pixel budget of categorical reductions
    pub fn set_max_pixels(&mut self, max_pixels: f64) {
        self.max_pixels = max_pixels;
    }

    pub fn get_kind(&self) -> ReductionKind {
        self.kind
    }

    pub fn run(mut self, backend: &dyn Backend) -> Result<Self> {
        self.run_internal(backend)?;
        Ok(self)
    }

    /// Validate arguments, resolve the asset and evaluate the reduction
    pub fn run_internal(&mut self, backend: &dyn Backend) -> Result<()> {
        if self.band.is_empty() {
            return Err(ZonalError::InvalidArgument("band name is empty".to_string()));
        }
        let (ini_date, end_date) = self.date_range.as_ref().ok_or_else(|| {
            ZonalError::InvalidArgument("date range must be set before running".to_string())
        })?;
        let range = DateRange::parse(ini_date, end_date)?;
        let polygon = self.polygon.as_ref().ok_or_else(|| {
            ZonalError::InvalidArgument("polygon must be set before running".to_string())
        })?;
        let region = polygon.to_region()?;
        if let Some(bbox) = region.get_bbox() {
            debug!(
                "Region: {} polygon(s), lon {}..{}, lat {}..{}",
                region.polygon_count(),
                bbox.min_x,
                bbox.max_x,
                bbox.min_y,
                bbox.max_y
            );
        }

        let asset_kind = resolve_asset(backend, &self.asset_id)?;

        let records = match asset_kind {
            AssetKind::ImageCollection => {
                info!(
                    "Reducing {} ({:?}) over {}..{}",
                    self.asset_id,
                    self.kind,
                    range.start_str(),
                    range.end_str()
                );
                let expression = collection_expression(
                    &self.asset_id,
                    &range,
                    &self.band,
                    &region,
                    self.kind,
                    self.max_pixels,
                );
                let reply = backend.compute_value(&expression)?;
                collection_records(&reply, &self.band, self.kind)?
            }
            AssetKind::Image => {
                info!("Reducing image {} ({:?})", self.asset_id, self.kind);
                let expression =
                    image_expression(&self.asset_id, &self.band, &region, self.kind, self.max_pixels);
                let reply = backend.compute_value(&expression)?;
                vec![summary_record(&reply, &self.band, self.kind)?]
            }
        };

        info!("{} record(s) for {}", records.len(), self.asset_id);
        self.records = Some(records);
        Ok(())
    }

    pub fn get_records(&self) -> Option<&[Record]> {
        self.records.as_deref()
    }

    pub fn take_records(&mut self) -> Vec<Record> {
        self.records.take().unwrap_or_default()
    }
}

/// Per-raster summary: the reduction plus the raster identity properties
fn image_summary(
    kind: ReductionKind,
    image: ValueNode,
    geometry: &ValueNode,
    scale: &ValueNode,
    max_pixels: f64,
) -> ValueNode {
    let reduction = match kind {
        ReductionKind::Continuous => reduce_continuous(image.clone(), geometry.clone(), scale.clone()),
        ReductionKind::Categorical => {
            reduce_categorical(image.clone(), geometry.clone(), scale.clone(), max_pixels)
        }
    };
    let properties: Vec<&str> = IDENTITY_PROPERTIES.iter().map(|(p, _)| *p).collect();
    let identity = algorithms::element_to_dictionary(image, &properties);
    algorithms::feature(dictionary([("reduction", reduction), ("identity", identity)]))
}

/// Filter, band-select and reduce a collection in one server-side expression.
///
/// The scale comes from the first raster; the size guard keeps an empty
/// collection from ever evaluating it.
pub fn collection_expression(
    asset_id: &str,
    range: &DateRange,
    band: &str,
    region: &Region,
    kind: ReductionKind,
    max_pixels: f64,
) -> Expression {
    let mut graph = ExpressionGraph::new();
    let geometry = graph.intern(region.to_value_node());

    let filtered = algorithms::filter_date(
        algorithms::image_collection_load(asset_id),
        &range.start_str(),
        &range.end_str(),
    );
    let select = graph.function(
        &[SELECT_VAR],
        algorithms::image_select(argument(SELECT_VAR), vec![json!(band)], None),
    );
    let dataset = graph.intern(algorithms::collection_map(filtered, select));
    let scale = graph.intern(algorithms::nominal_scale(algorithms::collection_first(
        dataset.clone(),
    )));

    let summary = image_summary(kind, argument(REDUCE_VAR), &geometry, &scale, max_pixels);
    let reduce = graph.function(&[REDUCE_VAR], summary);
    let features = algorithms::collection_map(dataset.clone(), reduce);

    let size = graph.intern(algorithms::collection_size(dataset));
    let result = algorithms::if_else(
        size.clone(),
        algorithms::collection_to_list(features, size),
        algorithms::empty_list(),
    );
    graph.finish(result)
}

/// Reduce the first band of a single image, renamed to `band`
pub fn image_expression(
    asset_id: &str,
    band: &str,
    region: &Region,
    kind: ReductionKind,
    max_pixels: f64,
) -> Expression {
    let mut graph = ExpressionGraph::new();
    let geometry = graph.intern(region.to_value_node());
    let image = graph.intern(algorithms::image_select(
        algorithms::image_load(asset_id),
        vec![json!(0)],
        Some(vec![band.to_string()]),
    ));
    let scale = graph.intern(algorithms::nominal_scale(image.clone()));
    let summary = image_summary(kind, image, &geometry, &scale, max_pixels);
    graph.finish(summary)
}

fn collection_records(reply: &Value, band: &str, kind: ReductionKind) -> Result<Vec<Record>> {
    match reply {
        Value::Array(features) => features
            .iter()
            .map(|feature| summary_record(feature, band, kind))
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(ZonalError::backend(format!(
            "unexpected response: expected a list of features, got {}",
            json_type(other)
        ))),
    }
}

/// Assemble the flat record of one raster
fn summary_record(feature: &Value, band: &str, kind: ReductionKind) -> Result<Record> {
    let summary = ImageSummary::from_feature(feature)?;
    let mut record = Record::new();
    match kind {
        ReductionKind::Continuous => record.extend(continuous_fields(band, summary.reduction)),
        ReductionKind::Categorical => record.extend(categorical_fields(summary.reduction)?),
    }
    record.insert_identity(summary.identity);
    Ok(record)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
