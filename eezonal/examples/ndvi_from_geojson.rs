use anyhow::{Context, Result};
use eezonal::{EarthEngineClient, PolygonInput, ZonalStats};

/// Example: NDVI min/max/mean for a GeoJSON MultiPolygon over one growing season
fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let geojson_path = args
        .get(1)
        .context("usage: ndvi_from_geojson <polygon.geojson>")?;
    let geojson = std::fs::read_to_string(geojson_path)
        .with_context(|| format!("Failed to read {}", geojson_path))?;

    let client = EarthEngineClient::from_env()?;

    let mut zonal = ZonalStats::new("MODIS/061/MOD13Q1", "NDVI");
    zonal.set_date_range("2021-04-01", "2021-10-01");
    zonal.set_polygon(PolygonInput::GeoJson(geojson));
    let zonal = zonal.run(&client)?;

    let records = zonal.get_records().unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(records)?);

    Ok(())
}
