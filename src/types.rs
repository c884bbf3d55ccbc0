use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::intervals::Frequency;

/// Single-band reflectance raster (rows x cols)
pub type ReflectanceBand = Array2<f32>;

/// Single-band categorical raster (scene classification, data mask)
pub type ClassBand = Array2<u8>;

/// Date format used on the wire and in artifact names
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeInterval {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of calendar days covered, both ends included
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl std::fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}

/// Pixel grid dimensions requested from the imagery provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    pub width: usize,
    pub height: usize,
}

/// One rendered NDVI map for an interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLayer {
    pub date: NaiveDate,
    /// Reference to the rendered PNG (`/output/<file>`)
    pub url: String,
    /// `[[south, west], [north, east]]` in degrees
    pub bounds: [[f64; 2]; 2],
    #[serde(rename = "meanNDVI")]
    pub mean_ndvi: Option<f64>,
}

/// One point of the aggregate NDVI time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// Final document returned to callers when at least one layer was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub graph_data: Vec<TimeSeriesPoint>,
    pub image_layers: Vec<MapLayer>,
    pub graph_png_path: Option<PathBuf>,
    pub legend_png_path: Option<PathBuf>,
}

impl ProcessingResult {
    pub fn to_json(&self) -> NdviResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A validated-shape processing request
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingRequest {
    /// `[lon, lat]` vertices in WGS84 degrees, implicitly closed
    pub polygon: Vec<[f64; 2]>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: Frequency,
}

impl ProcessingRequest {
    pub fn new(
        polygon: Vec<[f64; 2]>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        frequency: Frequency,
    ) -> Result<Self, ValidationError> {
        if polygon.len() < 3 {
            return Err(ValidationError::InvalidPolygon(format!(
                "expected at least 3 vertices, got {}",
                polygon.len()
            )));
        }
        if polygon
            .iter()
            .any(|p| !p[0].is_finite() || !p[1].is_finite())
        {
            return Err(ValidationError::InvalidPolygon(
                "vertex coordinates must be finite".to_string(),
            ));
        }

        Ok(Self {
            polygon,
            start_date,
            end_date,
            frequency,
        })
    }

    /// Build a request from the raw string parameters of an API call
    pub fn from_strings(
        polygon: Vec<[f64; 2]>,
        start_date: &str,
        end_date: &str,
        frequency: &str,
    ) -> Result<Self, ValidationError> {
        let start_date = parse_date("startDate", start_date)?;
        let end_date = parse_date("endDate", end_date)?;
        if frequency.trim().is_empty() {
            return Err(ValidationError::MissingParameter("frequency".to_string()));
        }
        let frequency = frequency.parse::<Frequency>()?;

        Self::new(polygon, start_date, end_date, frequency)
    }
}

fn parse_date(name: &str, value: &str) -> Result<NaiveDate, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingParameter(name.to_string()));
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
        ValidationError::InvalidParameter(format!("{} '{}' is not a YYYY-MM-DD date: {}", name, value, e))
    })
}

/// Request validation failures; these abort the whole request
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Polygon area ({area:.2} km²) exceeds the maximum allowed size ({max} km²)")]
    AreaExceeded { area: f64, max: f64 },

    #[error("The maximum duration of the time series is limited to {max} days, got {days}")]
    SpanExceeded { days: i64, max: i64 },

    #[error("Invalid polygon: {0}")]
    InvalidPolygon(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Error types for NDVI processing
#[derive(Debug, thiserror::Error)]
pub enum NdviError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Band decoding error: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl NdviError {
    /// True for failures caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(self, NdviError::Validation(_))
    }
}

/// Result type for NDVI operations
pub type NdviResult<T> = Result<T, NdviError>;
