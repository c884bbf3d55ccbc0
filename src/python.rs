//! Python extension module `_core`

use numpy::{PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::path::PathBuf;

use crate::config::{AppConfig, PipelineConfig};
use crate::core::geometry::polygon_area_sqkm;
use crate::core::intervals::{generate_intervals as schedule_intervals, Frequency};
use crate::core::ndvi::compute_ndvi as ndvi_raster;
use crate::core::pipeline::NdviPipeline;
use crate::io::provider::SceneBands;
use crate::io::sentinel_hub::SentinelHubProvider;
use crate::types::{NdviError, ProcessingRequest, ValidationError, DATE_FORMAT};

/// Convert PyReadonlyArray2 to ndarray Array2
fn numpy_to_array2<T>(arr: PyReadonlyArray2<T>) -> ndarray::Array2<T>
where
    T: Copy + numpy::Element,
{
    arr.as_array().to_owned()
}

fn to_py_err(err: NdviError) -> PyErr {
    if err.is_client_error() {
        PyValueError::new_err(err.to_string())
    } else {
        PyRuntimeError::new_err(err.to_string())
    }
}

fn validation_err(err: ValidationError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Full pipeline against the Copernicus Data Space; JSON result or None
#[pyfunction]
#[pyo3(signature = (
    polygon,
    start_date,
    end_date,
    frequency,
    max_images_to_consider = 30,
    max_polygon_area_sqkm = 25.0,
    max_cloud_coverage_in_polygon = 0.5,
    output_dir = None
))]
#[allow(clippy::too_many_arguments)]
fn process_ndvi(
    py: Python,
    polygon: Vec<[f64; 2]>,
    start_date: &str,
    end_date: &str,
    frequency: &str,
    max_images_to_consider: usize,
    max_polygon_area_sqkm: f64,
    max_cloud_coverage_in_polygon: f64,
    output_dir: Option<PathBuf>,
) -> PyResult<Option<String>> {
    let request = ProcessingRequest::from_strings(polygon, start_date, end_date, frequency)
        .map_err(validation_err)?;

    let app = AppConfig::load(None).map_err(to_py_err)?;
    let defaults = PipelineConfig::default();
    let config = PipelineConfig {
        max_images_to_consider,
        max_polygon_area_sqkm,
        max_cloud_coverage_in_polygon,
        output_dir: output_dir.unwrap_or(defaults.output_dir.clone()),
        ..defaults
    };

    let provider = SentinelHubProvider::new(app.provider).map_err(to_py_err)?;
    let pipeline = NdviPipeline::new(provider, config).map_err(to_py_err)?;

    let result = py
        .allow_threads(|| pipeline.run(&request))
        .map_err(to_py_err)?;

    match result {
        Some(result) => Ok(Some(result.to_json().map_err(to_py_err)?)),
        None => Ok(None),
    }
}

/// Approximate area of a `[lon, lat]` ring in km²
#[pyfunction]
fn calculate_polygon_area_sqkm(polygon: Vec<[f64; 2]>) -> f64 {
    polygon_area_sqkm(&polygon)
}

/// `(start, end)` ISO date pairs for the requested frequency
#[pyfunction]
fn generate_intervals(start: &str, end: &str, frequency: &str) -> PyResult<Vec<(String, String)>> {
    let parse = |value: &str| {
        chrono::NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
            .map_err(|e| PyValueError::new_err(format!("Invalid date '{}': {}", value, e)))
    };
    let frequency = frequency.parse::<Frequency>().map_err(validation_err)?;

    Ok(schedule_intervals(parse(start)?, parse(end)?, frequency)
        .into_iter()
        .map(|interval| {
            (
                interval.start.format(DATE_FORMAT).to_string(),
                interval.end.format(DATE_FORMAT).to_string(),
            )
        })
        .collect())
}

/// Masked NDVI raster and its mean from raw band arrays
#[pyfunction]
fn compute_ndvi(
    py: Python,
    red: PyReadonlyArray2<f32>,
    nir: PyReadonlyArray2<f32>,
    scl: PyReadonlyArray2<u8>,
    data_mask: PyReadonlyArray2<u8>,
) -> PyResult<(PyObject, Option<f64>)> {
    let bands = SceneBands::new(
        numpy_to_array2(red),
        numpy_to_array2(nir),
        numpy_to_array2(scl),
        numpy_to_array2(data_mask),
    )
    .map_err(|e| PyValueError::new_err(e.to_string()))?;

    let raster = py.allow_threads(|| ndvi_raster(&bands));
    let mean = raster.mean();
    Ok((raster.data().to_pyarray(py).into(), mean))
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(process_ndvi, m)?)?;
    m.add_function(wrap_pyfunction!(calculate_polygon_area_sqkm, m)?)?;
    m.add_function(wrap_pyfunction!(generate_intervals, m)?)?;
    m.add_function(wrap_pyfunction!(compute_ndvi, m)?)?;
    Ok(())
}
