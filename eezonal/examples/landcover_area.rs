use anyhow::{Context, Result};
use eezonal::{zonal_stats, EarthEngineClient, PolygonInput};

/// Example: hectares per MODIS land cover class around Medellín, one record per year
fn main() -> Result<()> {
    env_logger::init();

    // Project and token come from EE_PROJECT / EE_ACCESS_TOKEN
    let client = EarthEngineClient::from_env().context("Failed to create Earth Engine client")?;

    let polygon = PolygonInput::Rings(vec![vec![
        [-75.081688, 6.072885],
        [-75.050185, 6.12395],
        [-75.144696, 6.121032],
        [-75.158616, 6.040785],
        [-75.081688, 6.072885],
    ]]);

    let records = zonal_stats(
        &client,
        "MODIS/061/MCD12Q1",
        "2018-01-01",
        "2022-01-01",
        "LC_Type1",
        &polygon,
        true,
    )?;

    println!("{} yearly record(s)", records.len());
    for record in &records {
        let year = record
            .time_start()
            .map(|t| t.format("%Y").to_string())
            .unwrap_or_else(|| "?".to_string());
        let total: f64 = record.value_fields().filter_map(|(_, v)| v.as_f64()).sum();
        println!("  {}: {:.1} ha over {} class(es)", year, total, record.value_fields().count());
        for (class, area) in record.value_fields() {
            println!("    class {:>3}: {:.2} ha", class, area.as_f64().unwrap_or(0.0));
        }
    }

    Ok(())
}
