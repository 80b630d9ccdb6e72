use eezonal::{zonal_stats, ClientOptions, EarthEngineClient, PolygonInput, Record};
use pyo3::exceptions::{PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::time::Duration;

/// Earth Engine client handle
#[pyclass]
pub struct PyEarthEngine {
    inner: EarthEngineClient,
}

#[pymethods]
impl PyEarthEngine {
    /// Missing arguments fall back to EE_PROJECT / EE_ACCESS_TOKEN
    #[new]
    #[pyo3(signature = (project = None, token = None, timeout = None, max_retries = None))]
    fn new(
        project: Option<String>,
        token: Option<String>,
        timeout: Option<u64>,
        max_retries: Option<u32>,
    ) -> PyResult<Self> {
        let mut options = ClientOptions::from_env();
        if let Some(project) = project {
            options.set_project(&project);
        }
        if token.is_some() {
            options.set_access_token(token);
        }
        if let Some(timeout) = timeout {
            options.set_timeout(Duration::from_secs(timeout));
        }
        if let Some(max_retries) = max_retries {
            options.set_max_retries(max_retries);
        }
        match EarthEngineClient::new(options) {
            Ok(client) => Ok(PyEarthEngine { inner: client }),
            Err(e) => Err(PyValueError::new_err(format!(
                "Failed to create Earth Engine client: {}",
                e
            ))),
        }
    }

    #[getter]
    fn project(&self) -> String {
        self.inner.get_options().project.clone()
    }

    /// Zonal statistics as a list of dicts, one per raster
    #[pyo3(signature = (asset_id, ini_date, end_date, band, polygon, categorical = false))]
    pub fn zonal_stats(
        &self,
        py: Python,
        asset_id: &str,
        ini_date: &str,
        end_date: &str,
        band: &str,
        polygon: &Bound<'_, PyAny>,
        categorical: bool,
    ) -> PyResult<Py<PyAny>> {
        let polygon = extract_polygon(polygon)?;
        let records = zonal_stats(
            &self.inner,
            asset_id,
            ini_date,
            end_date,
            band,
            &polygon,
            categorical,
        )
        .map_err(|e| PyValueError::new_err(format!("Failed to compute zonal statistics: {}", e)))?;
        records_to_python(py, &records)
    }
}

impl PyEarthEngine {
    /// Client configured from the environment only
    pub fn from_env() -> PyResult<Self> {
        Self::new(None, None, None, None)
    }
}

/// str -> GeoJSON text, dict -> GeoJSON object, nested list -> polygon rings
pub fn extract_polygon(polygon: &Bound<'_, PyAny>) -> PyResult<PolygonInput> {
    if let Ok(text) = polygon.extract::<String>() {
        return Ok(PolygonInput::GeoJson(text));
    }
    if polygon.is_instance_of::<PyDict>() {
        let json = polygon.py().import("json")?;
        let text: String = json.call_method1("dumps", (polygon,))?.extract()?;
        return Ok(PolygonInput::GeoJson(text));
    }
    if let Ok(rings) = polygon.extract::<Vec<Vec<[f64; 2]>>>() {
        return Ok(PolygonInput::Rings(rings));
    }
    Err(PyTypeError::new_err(
        "polygon must be GeoJSON (str or dict) or a list of [lon, lat] rings",
    ))
}

fn records_to_python(py: Python, records: &[Record]) -> PyResult<Py<PyAny>> {
    let json_str = serde_json::to_string(records)
        .map_err(|e| PyValueError::new_err(format!("Failed to serialize records: {}", e)))?;
    let json = py.import("json")?;
    let records: Bound<PyAny> = json.call_method1("loads", (json_str,))?;
    Ok(records.unbind())
}
