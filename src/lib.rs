//! ndvi-series: cloud-aware Sentinel-2 NDVI time series for small polygons
//!
//! For a polygon and a date range the pipeline splits the range into weekly or
//! monthly intervals, picks the least cloudy Sentinel-2 L2A acquisition of each
//! interval (cloud fraction measured inside the polygon only), computes a masked
//! NDVI raster from it and renders map layers, a time series chart and a legend.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    MapLayer, NdviError, NdviResult, ProcessingRequest, ProcessingResult, TimeInterval,
    TimeSeriesPoint, ValidationError,
};
pub use config::{AppConfig, PipelineConfig, ProviderConfig};
pub use crate::core::{Frequency, NdviPipeline};
pub use io::{ArtifactStore, CancellationToken, SceneProvider, SentinelHubProvider};
