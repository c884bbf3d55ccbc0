//! End-to-end NDVI time series extraction
//!
//! polygon -> validation -> bbox -> intervals -> per interval: search, score,
//! select, NDVI, map layer -> chart + legend -> assembled result.

use chrono::Local;
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::core::cloud_mask::{unique_dates, CloudSelector, CloudSelectorParams};
use crate::core::geometry::{validate_area, validate_span, BoundingBox};
use crate::core::intervals::generate_intervals;
use crate::core::ndvi::{compute_ndvi, round4};
use crate::core::render::{render_legend, render_ndvi_map, render_time_series_chart, ColorScale};
use crate::io::artifacts::ArtifactStore;
use crate::io::provider::{CancellationToken, SceneProvider};
use crate::types::{
    GridSize, MapLayer, NdviResult, ProcessingRequest, ProcessingResult, TimeInterval,
    TimeSeriesPoint, ValidationError,
};

/// Run timestamp embedded in artifact names
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Output of one interval that found a usable scene
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalOutput {
    pub layer: MapLayer,
    pub point: TimeSeriesPoint,
}

/// Checked request geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedArea {
    pub area_sqkm: f64,
    pub bbox: BoundingBox,
}

/// Collect per-interval outputs into the final document.
/// `None` when no interval produced a layer.
pub fn assemble_result(
    mut image_layers: Vec<MapLayer>,
    mut graph_data: Vec<TimeSeriesPoint>,
    graph_png_path: Option<PathBuf>,
    legend_png_path: Option<PathBuf>,
) -> Option<ProcessingResult> {
    if image_layers.is_empty() {
        return None;
    }

    image_layers.sort_by_key(|layer| layer.date);
    graph_data.sort_by_key(|point| point.date);

    Some(ProcessingResult {
        graph_data,
        image_layers,
        graph_png_path,
        legend_png_path,
    })
}

/// NDVI time series pipeline over an injected imagery provider
pub struct NdviPipeline<P: SceneProvider> {
    provider: P,
    config: PipelineConfig,
    store: ArtifactStore,
    color_scale: ColorScale,
    selector: CloudSelector,
    cancel: CancellationToken,
}

impl<P: SceneProvider> NdviPipeline<P> {
    pub fn new(provider: P, config: PipelineConfig) -> NdviResult<Self> {
        config.validate()?;

        let selector = CloudSelector::new(CloudSelectorParams {
            max_cloud_coverage: config.max_cloud_coverage_in_polygon,
            concurrency: config.effective_concurrency(),
        })?;

        Ok(Self {
            store: ArtifactStore::new(&config.output_dir),
            color_scale: ColorScale::ndvi(),
            cancel: CancellationToken::new(),
            provider,
            config,
            selector,
        })
    }

    pub fn with_color_scale(mut self, color_scale: ColorScale) -> Self {
        self.color_scale = color_scale;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Handle that stops remaining searches and fetches of a running pipeline
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Area and time-span checks; nothing is fetched when these fail
    pub fn validate(&self, request: &ProcessingRequest) -> Result<ValidatedArea, ValidationError> {
        let area_sqkm = validate_area(&request.polygon, self.config.max_polygon_area_sqkm)?;
        validate_span(request.start_date, request.end_date, self.config.max_span_days)?;

        let bbox = BoundingBox::from_polygon(&request.polygon)
            .ok_or_else(|| ValidationError::InvalidPolygon("polygon has no vertices".to_string()))?;

        Ok(ValidatedArea { area_sqkm, bbox })
    }

    /// Process a request. `Ok(None)` means every interval was skipped.
    pub fn run(&self, request: &ProcessingRequest) -> NdviResult<Option<ProcessingResult>> {
        let run_timestamp = Local::now().format(RUN_TIMESTAMP_FORMAT).to_string();
        self.run_with_timestamp(request, &run_timestamp)
    }

    pub fn run_with_timestamp(
        &self,
        request: &ProcessingRequest,
        run_timestamp: &str,
    ) -> NdviResult<Option<ProcessingResult>> {
        let validated = self.validate(request)?;
        let bbox = validated.bbox;
        let grid = bbox.grid_size(self.config.resolution_m);
        let intervals = generate_intervals(request.start_date, request.end_date, request.frequency);

        log::info!(
            "Processing {} to {} ({}), polygon area {:.2} km², {} intervals, grid {}x{}",
            request.start_date,
            request.end_date,
            request.frequency,
            validated.area_sqkm,
            intervals.len(),
            grid.width,
            grid.height
        );

        if let Err(e) = self.store.ensure_root() {
            log::error!(
                "Cannot create output directory {}: {}",
                self.store.root().display(),
                e
            );
        }

        let mut image_layers = Vec::new();
        let mut graph_data = Vec::new();
        for interval in &intervals {
            if let Some(output) = self.process_interval(interval, &bbox, grid, run_timestamp) {
                image_layers.push(output.layer);
                graph_data.push(output.point);
            }
        }

        if image_layers.is_empty() {
            log::warn!("No suitable imagery found for any interval");
            return Ok(None);
        }

        let graph_png_path = self.write_chart(&graph_data, run_timestamp);
        let legend_png_path = self.write_legend(run_timestamp);

        log::info!("Produced {} map layers", image_layers.len());
        Ok(assemble_result(image_layers, graph_data, graph_png_path, legend_png_path))
    }

    /// Search, select and render one interval; `None` when it is skipped
    pub fn process_interval(
        &self,
        interval: &TimeInterval,
        bbox: &BoundingBox,
        grid: GridSize,
        run_timestamp: &str,
    ) -> Option<IntervalOutput> {
        if self.cancel.is_cancelled() {
            log::warn!("Run cancelled, skipping interval {}", interval);
            return None;
        }

        log::info!("Searching for images for the interval: {}", interval);
        let scenes = match self
            .provider
            .search(bbox, interval, self.config.max_images_to_consider)
        {
            Ok(scenes) => scenes,
            Err(e) => {
                log::warn!("Catalog search failed for {}: {}. Skipping.", interval, e);
                return None;
            }
        };

        let mut scenes = unique_dates(scenes);
        scenes.truncate(self.config.max_images_to_consider);
        if scenes.is_empty() {
            log::warn!("No images found for the interval {}. Skipping.", interval);
            return None;
        }

        let selected = match self.selector.select(&self.provider, &scenes, bbox, grid, &self.cancel) {
            Some(selected) => selected,
            None => {
                log::warn!(
                    "No images with acceptable cloud coverage (<={:.0}%) found in {}. Skipping.",
                    self.config.max_cloud_coverage_in_polygon * 100.0,
                    interval
                );
                return None;
            }
        };

        let scene_date = selected.scene.date;
        let bands = selected.bands?;
        log::info!(
            "Selected image from {} ({:.2}% cloud in polygon)",
            scene_date,
            selected.cloud_coverage * 100.0
        );

        let raster = compute_ndvi(&bands);
        let mean_ndvi = raster.mean().map(round4);

        let name = ArtifactStore::map_layer_name(scene_date, run_timestamp);
        let written = render_ndvi_map(&raster, &self.color_scale)
            .and_then(|image| self.store.write_png(&name, &image));
        if let Err(e) = written {
            log::error!("Failed to render NDVI map for {}: {}", scene_date, e);
            return None;
        }

        let layer = MapLayer {
            date: scene_date,
            url: ArtifactStore::url_for(&name),
            bounds: bbox.corner_bounds(),
            mean_ndvi,
        };
        let point = TimeSeriesPoint {
            date: scene_date,
            value: mean_ndvi,
        };
        Some(IntervalOutput { layer, point })
    }

    fn write_chart(&self, graph_data: &[TimeSeriesPoint], run_timestamp: &str) -> Option<PathBuf> {
        let image = match render_time_series_chart(graph_data) {
            Some(image) => image,
            None => {
                log::warn!("No valid NDVI values, time series chart not generated");
                return None;
            }
        };

        match self.store.write_png(&ArtifactStore::graph_name(run_timestamp), &image) {
            Ok(path) => Some(path),
            Err(e) => {
                log::error!("Failed to write time series chart: {}", e);
                None
            }
        }
    }

    fn write_legend(&self, run_timestamp: &str) -> Option<PathBuf> {
        let image = render_legend(&self.color_scale);
        match self.store.write_png(&ArtifactStore::legend_name(run_timestamp), &image) {
            Ok(path) => Some(path),
            Err(e) => {
                log::error!("Failed to write legend: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate};

    fn layer(day: u32, mean: Option<f64>) -> MapLayer {
        MapLayer {
            date: NaiveDate::from_ymd_opt(2023, 5, day).unwrap(),
            url: format!("/output/ndvi_map_{}.png", day),
            bounds: [[49.0, 18.0], [49.1, 18.1]],
            mean_ndvi: mean,
        }
    }

    fn point(day: u32, value: Option<f64>) -> TimeSeriesPoint {
        TimeSeriesPoint {
            date: NaiveDate::from_ymd_opt(2023, 5, day).unwrap(),
            value,
        }
    }

    #[test]
    fn test_assemble_empty_is_absent() {
        assert!(assemble_result(Vec::new(), Vec::new(), None, None).is_none());
    }

    #[test]
    fn test_assemble_sorts_by_date() {
        let result = assemble_result(
            vec![layer(20, Some(0.4)), layer(3, None), layer(11, Some(0.6))],
            vec![point(20, Some(0.4)), point(3, None), point(11, Some(0.6))],
            Some(PathBuf::from("graph_1.png")),
            None,
        )
        .unwrap();

        let layer_days: Vec<u32> = result.image_layers.iter().map(|l| l.date.day()).collect();
        assert_eq!(layer_days, vec![3, 11, 20]);
        assert!(result.graph_data.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(result.graph_data[0].value, None);
        assert!(result.legend_png_path.is_none());
    }
}
