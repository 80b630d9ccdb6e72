use pyo3::prelude::*;

mod bindings;

use bindings::PyEarthEngine;

// Python bindings for eezonal
// Zonal statistics over Earth Engine images and image collections

/// One-shot zonal statistics with a client configured from EE_PROJECT / EE_ACCESS_TOKEN
#[pyfunction]
#[pyo3(signature = (asset_id, ini_date, end_date, band, polygon, categorical = false))]
fn zonal_stats(
    py: Python,
    asset_id: &str,
    ini_date: &str,
    end_date: &str,
    band: &str,
    polygon: &Bound<'_, PyAny>,
    categorical: bool,
) -> PyResult<Py<PyAny>> {
    let client = PyEarthEngine::from_env()?;
    client.zonal_stats(py, asset_id, ini_date, end_date, band, polygon, categorical)
}

#[pymodule]
fn pyeezonal(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyEarthEngine>()?;
    // Alias for Pythonic API
    m.setattr("EarthEngine", m.getattr("PyEarthEngine")?)?;
    m.add_function(wrap_pyfunction!(zonal_stats, m)?)?;

    m.add(
        "__doc__",
        "Python bindings for eezonal - zonal statistics over Earth Engine assets",
    )?;

    Ok(())
}
