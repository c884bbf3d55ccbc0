//! Core NDVI processing modules

pub mod geometry;
pub mod intervals;
pub mod cloud_mask;
pub mod ndvi;
pub mod render;
pub mod pipeline;

// Re-export main types
pub use geometry::{BoundingBox, polygon_area_sqkm};
pub use intervals::{Frequency, generate_intervals};
pub use cloud_mask::{CloudSelector, CloudSelectorParams, ScoredScene};
pub use ndvi::{NdviRaster, compute_ndvi, NDVI_NODATA};
pub use render::ColorScale;
pub use pipeline::{NdviPipeline, assemble_result};
