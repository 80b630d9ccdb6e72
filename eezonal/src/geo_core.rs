use geo::{BoundingRect, Coord, LineString, MultiPolygon, Polygon};
use geojson::GeoJson;
use serde_json::Value;
use std::collections::HashSet;

use crate::collect::earth_engine::expression::{algorithms, ValueNode};
use crate::error::{Result, ZonalError};

/// Polygon supplied by the caller.
///
/// Both encodings are tagged explicitly; neither is guessed from the other.
#[derive(Debug, Clone, PartialEq)]
pub enum PolygonInput {
    /// One polygon as `[[lon, lat], ...]` rings: exterior first, then holes
    Rings(Vec<Vec<[f64; 2]>>),
    /// GeoJSON text: a Polygon/MultiPolygon geometry, a Feature wrapping one,
    /// or any object with a MultiPolygon `coordinates` member
    GeoJson(String),
}

impl PolygonInput {
    /// Resolve into a validated region (WGS84 lon/lat)
    pub fn to_region(&self) -> Result<Region> {
        match self {
            PolygonInput::Rings(rings) => Region::from_rings(rings),
            PolygonInput::GeoJson(text) => Region::from_geojson_str(text),
        }
    }
}

/// Validated region the reductions are constrained to
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    geometry: MultiPolygon<f64>,
}

impl Region {
    pub fn from_rings(rings: &[Vec<[f64; 2]>]) -> Result<Self> {
        let polygon = polygon_from_rings(rings)?;
        Ok(Region {
            geometry: MultiPolygon::new(vec![polygon]),
        })
    }

    pub fn from_geojson_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ZonalError::MalformedGeometry(format!("invalid GeoJSON: {e}")))?;

        // Bare `{"coordinates": [...]}` objects without a type are MultiPolygons
        if value.get("type").is_none() {
            let coordinates = value.get("coordinates").ok_or_else(|| {
                ZonalError::MalformedGeometry("GeoJSON has no `coordinates` member".to_string())
            })?;
            return Self::from_multi_polygon_coordinates(coordinates);
        }

        let geojson = GeoJson::from_json_value(value)
            .map_err(|e| ZonalError::MalformedGeometry(format!("invalid GeoJSON: {e}")))?;

        let geometry = match geojson {
            GeoJson::Geometry(g) => g,
            GeoJson::Feature(f) => f.geometry.ok_or_else(|| {
                ZonalError::MalformedGeometry("GeoJSON feature has no geometry".to_string())
            })?,
            GeoJson::FeatureCollection(_) => {
                return Err(ZonalError::MalformedGeometry(
                    "expected a single Polygon or MultiPolygon, got a FeatureCollection"
                        .to_string(),
                ))
            }
        };

        let geometry: geo::Geometry<f64> = geometry.try_into().map_err(|e| {
            ZonalError::MalformedGeometry(format!("unsupported GeoJSON geometry: {e}"))
        })?;

        let multi = match geometry {
            geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
            geo::Geometry::MultiPolygon(mp) => mp,
            other => {
                return Err(ZonalError::MalformedGeometry(format!(
                    "expected Polygon or MultiPolygon, got {}",
                    geometry_type_name(&other)
                )))
            }
        };

        Self::from_multi_polygon(multi)
    }

    /// `[[[ [lon, lat], ... ]]]` as in a GeoJSON MultiPolygon
    fn from_multi_polygon_coordinates(coordinates: &Value) -> Result<Self> {
        let polygons: Vec<Vec<Vec<[f64; 2]>>> = serde_json::from_value(coordinates.clone())
            .map_err(|e| {
                ZonalError::MalformedGeometry(format!("invalid MultiPolygon coordinates: {e}"))
            })?;
        if polygons.is_empty() {
            return Err(ZonalError::MalformedGeometry(
                "MultiPolygon has no polygons".to_string(),
            ));
        }
        let polygons = polygons
            .iter()
            .map(|rings| polygon_from_rings(rings))
            .collect::<Result<Vec<_>>>()?;
        Ok(Region {
            geometry: MultiPolygon::new(polygons),
        })
    }

    fn from_multi_polygon(multi: MultiPolygon<f64>) -> Result<Self> {
        if multi.0.is_empty() {
            return Err(ZonalError::MalformedGeometry(
                "MultiPolygon has no polygons".to_string(),
            ));
        }
        // Re-validate through the ring path so both inputs obey the same rules
        let polygons = multi
            .0
            .iter()
            .map(|p| {
                let rings: Vec<Vec<[f64; 2]>> = std::iter::once(p.exterior())
                    .chain(p.interiors().iter())
                    .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
                    .collect();
                polygon_from_rings(&rings)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Region {
            geometry: MultiPolygon::new(polygons),
        })
    }

    pub fn get_geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn polygon_count(&self) -> usize {
        self.geometry.0.len()
    }

    /// Extent in lon/lat
    pub fn get_bbox(&self) -> Option<BoundingBox> {
        self.geometry
            .bounding_rect()
            .map(|r| BoundingBox::new(r.min().x, r.min().y, r.max().x, r.max().y))
    }

    /// GeoJSON-style MultiPolygon coordinates
    pub fn coordinates(&self) -> Value {
        let polygons: Vec<Value> = self
            .geometry
            .0
            .iter()
            .map(|p| {
                let rings: Vec<Value> = std::iter::once(p.exterior())
                    .chain(p.interiors().iter())
                    .map(|ring| {
                        Value::Array(
                            ring.coords()
                                .map(|c| serde_json::json!([c.x, c.y]))
                                .collect(),
                        )
                    })
                    .collect();
                Value::Array(rings)
            })
            .collect();
        Value::Array(polygons)
    }

    /// Server-side geometry constructor for this region
    pub fn to_value_node(&self) -> ValueNode {
        algorithms::multi_polygon(self.coordinates())
    }
}

/// Bounding box structure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64, // min longitude
    pub min_y: f64, // min latitude
    pub max_x: f64, // max longitude
    pub max_y: f64, // max latitude
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }
}

fn polygon_from_rings(rings: &[Vec<[f64; 2]>]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().enumerate().map(|(i, ring)| ring_from_positions(i, ring));
    let exterior = rings
        .next()
        .ok_or_else(|| ZonalError::MalformedGeometry("polygon has no rings".to_string()))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn ring_from_positions(index: usize, positions: &[[f64; 2]]) -> Result<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(positions.len() + 1);
    for [lon, lat] in positions {
        if !lon.is_finite() || !lat.is_finite() {
            return Err(ZonalError::MalformedGeometry(format!(
                "ring {index} has a non-finite coordinate"
            )));
        }
        if !(-180.0..=180.0).contains(lon) || !(-90.0..=90.0).contains(lat) {
            return Err(ZonalError::MalformedGeometry(format!(
                "ring {index} has coordinate ({lon}, {lat}) outside lon/lat bounds"
            )));
        }
        coords.push(Coord { x: *lon, y: *lat });
    }

    // + 0.0 folds -0.0 into 0.0 before comparing bit patterns
    let distinct = coords
        .iter()
        .map(|c| ((c.x + 0.0).to_bits(), (c.y + 0.0).to_bits()))
        .collect::<HashSet<_>>()
        .len();
    if distinct < 3 {
        return Err(ZonalError::MalformedGeometry(format!(
            "ring {index} needs at least 3 distinct positions, got {distinct}"
        )));
    }

    if coords.first() != coords.last() {
        coords.push(coords[0]);
    }
    Ok(LineString::new(coords))
}

fn geometry_type_name(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}
