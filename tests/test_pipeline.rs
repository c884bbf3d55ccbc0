mod common;

use approx::assert_relative_eq;
use tempfile::TempDir;

use common::{date, init_logging, large_polygon, small_polygon, FakeProvider, FakeScene};
use ndvi_series::core::intervals::Frequency;
use ndvi_series::{NdviError, NdviPipeline, PipelineConfig, ProcessingRequest, ValidationError};

const RUN: &str = "20230801120000";

fn config(output: &TempDir) -> PipelineConfig {
    PipelineConfig {
        output_dir: output.path().to_path_buf(),
        fetch_concurrency: 2,
        ..PipelineConfig::default()
    }
}

fn weekly_request() -> ProcessingRequest {
    ProcessingRequest::new(small_polygon(), date(2023, 1, 1), date(2023, 1, 14), Frequency::Weekly)
        .unwrap()
}

#[test]
fn test_area_exceeded_fetches_nothing() {
    init_logging();
    let output = TempDir::new().unwrap();
    let provider = FakeProvider::new(vec![FakeScene::new("a", date(2023, 1, 3), 0.0)]);
    let pipeline = NdviPipeline::new(&provider, config(&output)).unwrap();

    let request =
        ProcessingRequest::new(large_polygon(), date(2023, 1, 1), date(2023, 1, 14), Frequency::Weekly)
            .unwrap();
    let err = pipeline.run_with_timestamp(&request, RUN).unwrap_err();

    assert!(err.is_client_error());
    assert!(matches!(
        err,
        NdviError::Validation(ValidationError::AreaExceeded { .. })
    ));
    assert_eq!(provider.searches(), 0);
    assert_eq!(provider.fetches(), 0);
}

#[test]
fn test_span_exceeded_fetches_nothing() {
    let output = TempDir::new().unwrap();
    let provider = FakeProvider::default();
    let pipeline = NdviPipeline::new(&provider, config(&output)).unwrap();

    let request =
        ProcessingRequest::new(small_polygon(), date(2023, 1, 1), date(2024, 1, 2), Frequency::Monthly)
            .unwrap();
    let err = pipeline.run_with_timestamp(&request, RUN).unwrap_err();

    assert!(matches!(
        err,
        NdviError::Validation(ValidationError::SpanExceeded { days: 366, max: 365 })
    ));
    assert_eq!(provider.searches(), 0);
}

#[test]
fn test_weekly_run_picks_clearest_scene() {
    init_logging();
    let output = TempDir::new().unwrap();
    let provider = FakeProvider::new(vec![
        FakeScene::new("cloudy", date(2023, 1, 2), 0.6),
        FakeScene::new("clear", date(2023, 1, 5), 0.2),
        FakeScene::new("overcast", date(2023, 1, 10), 0.9),
    ]);
    let pipeline = NdviPipeline::new(&provider, config(&output)).unwrap();

    let result = pipeline
        .run_with_timestamp(&weekly_request(), RUN)
        .unwrap()
        .expect("first week has a usable scene");

    assert_eq!(provider.searches(), 2);
    assert_eq!(provider.fetches(), 3);

    assert_eq!(result.image_layers.len(), 1);
    let layer = &result.image_layers[0];
    assert_eq!(layer.date, date(2023, 1, 5));
    assert_eq!(layer.url, "/output/ndvi_map_2023-01-05_20230801120000.png");
    assert_eq!(layer.bounds, [[49.792, 18.435], [49.801, 18.448]]);
    // cloudy pixels of the selected scene are masked, the rest are 0.5
    assert_relative_eq!(layer.mean_ndvi.unwrap(), 0.5, epsilon = 1e-9);

    assert_eq!(result.graph_data.len(), 1);
    assert_eq!(result.graph_data[0].date, date(2023, 1, 5));
    assert_eq!(result.graph_data[0].value, layer.mean_ndvi);

    assert!(output
        .path()
        .join("ndvi_map_2023-01-05_20230801120000.png")
        .exists());
    let graph = result.graph_png_path.as_ref().unwrap();
    let legend = result.legend_png_path.as_ref().unwrap();
    assert!(graph.ends_with("graph_20230801120000.png") && graph.exists());
    assert!(legend.ends_with("legend_20230801120000.png") && legend.exists());
}

#[test]
fn test_result_absent_when_every_interval_skipped() {
    let output = TempDir::new().unwrap();
    let provider = FakeProvider::new(vec![
        FakeScene::new("a", date(2023, 1, 2), 0.6),
        FakeScene::new("b", date(2023, 1, 4), 0.7),
        FakeScene::new("c", date(2023, 1, 6), 0.9),
    ]);
    let pipeline = NdviPipeline::new(&provider, config(&output)).unwrap();

    let result = pipeline.run_with_timestamp(&weekly_request(), RUN).unwrap();

    assert!(result.is_none());
    // second week had an empty catalog, so only the first week fetched anything
    assert_eq!(provider.searches(), 2);
    assert_eq!(provider.fetches(), 3);
    assert!(!output.path().join("graph_20230801120000.png").exists());
    assert!(!output.path().join("legend_20230801120000.png").exists());
}

#[test]
fn test_monthly_layers_are_date_ascending() {
    let output = TempDir::new().unwrap();
    // catalog lists the newest acquisitions first
    let provider = FakeProvider::new(vec![
        FakeScene::new("mar", date(2023, 3, 8), 0.1).with_reflectance(0.1, 0.5),
        FakeScene::new("feb-late", date(2023, 2, 25), 0.3),
        FakeScene::new("feb-early", date(2023, 2, 3), 0.0).with_reflectance(0.2, 0.4),
        FakeScene::new("jan", date(2023, 1, 20), 0.0),
    ]);
    let pipeline = NdviPipeline::new(&provider, config(&output)).unwrap();

    let request =
        ProcessingRequest::new(small_polygon(), date(2023, 1, 15), date(2023, 3, 10), Frequency::Monthly)
            .unwrap();
    let result = pipeline.run_with_timestamp(&request, RUN).unwrap().unwrap();

    let dates: Vec<_> = result.image_layers.iter().map(|l| l.date).collect();
    assert_eq!(dates, vec![date(2023, 1, 20), date(2023, 2, 3), date(2023, 3, 8)]);
    assert!(result.graph_data.windows(2).all(|w| w[0].date < w[1].date));

    let means: Vec<f64> = result.image_layers.iter().map(|l| l.mean_ndvi.unwrap()).collect();
    assert_relative_eq!(means[0], 0.5, epsilon = 1e-9);
    assert_relative_eq!(means[1], 0.3333, epsilon = 1e-9);
    assert_relative_eq!(means[2], 0.6667, epsilon = 1e-9);
}

#[test]
fn test_provider_failures_are_not_fatal() {
    let output = TempDir::new().unwrap();
    let provider = FakeProvider::new(vec![
        FakeScene::new("broken", date(2023, 1, 3), 0.0).failing(),
        FakeScene::new("ok", date(2023, 1, 4), 0.4),
        FakeScene::new("week2", date(2023, 1, 9), 0.0),
    ])
    .fail_search_at(date(2023, 1, 8));
    let pipeline = NdviPipeline::new(&provider, config(&output)).unwrap();

    let result = pipeline.run_with_timestamp(&weekly_request(), RUN).unwrap().unwrap();

    assert_eq!(result.image_layers.len(), 1);
    assert_eq!(result.image_layers[0].date, date(2023, 1, 4));
}

#[test]
fn test_all_masked_scene_has_null_mean() {
    let output = TempDir::new().unwrap();
    let provider = FakeProvider::new(vec![
        FakeScene::new("dark", date(2023, 1, 3), 0.0).with_reflectance(0.0, 0.0)
    ]);
    let pipeline = NdviPipeline::new(&provider, config(&output)).unwrap();

    let result = pipeline.run_with_timestamp(&weekly_request(), RUN).unwrap().unwrap();

    assert_eq!(result.image_layers.len(), 1);
    assert_eq!(result.image_layers[0].mean_ndvi, None);
    assert_eq!(result.graph_data[0].value, None);
    // nothing to plot, but the legend is still produced
    assert!(result.graph_png_path.is_none());
    assert!(result.legend_png_path.is_some());

    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert!(json["imageLayers"][0]["meanNDVI"].is_null());
    assert!(json["graphPngPath"].is_null());
    assert_eq!(json["graphData"][0]["date"], "2023-01-03");
}

#[test]
fn test_cancelled_run_is_empty() {
    let output = TempDir::new().unwrap();
    let provider = FakeProvider::new(vec![FakeScene::new("a", date(2023, 1, 3), 0.0)]);
    let pipeline = NdviPipeline::new(&provider, config(&output)).unwrap();

    pipeline.cancellation_token().cancel();
    let result = pipeline.run_with_timestamp(&weekly_request(), RUN).unwrap();

    assert!(result.is_none());
    assert_eq!(provider.searches(), 0);
}

#[test]
fn test_duplicate_catalog_dates_fetched_once() {
    let output = TempDir::new().unwrap();
    let provider = FakeProvider::new(vec![
        FakeScene::new("tile-a", date(2023, 1, 3), 0.0),
        FakeScene::new("tile-b", date(2023, 1, 3), 0.0),
    ]);
    let pipeline = NdviPipeline::new(&provider, config(&output)).unwrap();

    let result = pipeline.run_with_timestamp(&weekly_request(), RUN).unwrap().unwrap();

    assert_eq!(provider.fetches(), 1);
    assert_eq!(result.image_layers.len(), 1);
}

#[test]
fn test_reversed_range_is_empty() {
    let output = TempDir::new().unwrap();
    let provider = FakeProvider::new(vec![FakeScene::new("a", date(2023, 1, 3), 0.0)]);
    let pipeline = NdviPipeline::new(&provider, config(&output)).unwrap();

    let request =
        ProcessingRequest::new(small_polygon(), date(2023, 1, 14), date(2023, 1, 1), Frequency::Weekly)
            .unwrap();
    assert!(pipeline.run_with_timestamp(&request, RUN).unwrap().is_none());
    assert_eq!(provider.searches(), 0);
}

#[test]
fn test_unwritable_legend_keeps_layers_and_chart() {
    init_logging();
    let output = TempDir::new().unwrap();
    // a directory squatting on the legend name makes the PNG write fail
    std::fs::create_dir_all(output.path().join("legend_20230801120000.png")).unwrap();
    let provider = FakeProvider::new(vec![FakeScene::new("clear", date(2023, 1, 5), 0.2)]);
    let pipeline = NdviPipeline::new(&provider, config(&output)).unwrap();

    let result = pipeline.run_with_timestamp(&weekly_request(), RUN).unwrap().unwrap();

    assert_eq!(result.image_layers.len(), 1);
    assert!(result.legend_png_path.is_none());
    assert!(result.graph_png_path.as_ref().unwrap().exists());
}

#[test]
fn test_unwritable_map_skips_only_that_interval() {
    init_logging();
    let output = TempDir::new().unwrap();
    std::fs::create_dir_all(output.path().join("ndvi_map_2023-01-05_20230801120000.png")).unwrap();
    let provider = FakeProvider::new(vec![
        FakeScene::new("week1", date(2023, 1, 5), 0.0),
        FakeScene::new("week2", date(2023, 1, 9), 0.0),
    ]);
    let pipeline = NdviPipeline::new(&provider, config(&output)).unwrap();

    let result = pipeline.run_with_timestamp(&weekly_request(), RUN).unwrap().unwrap();

    let dates: Vec<_> = result.image_layers.iter().map(|l| l.date).collect();
    assert_eq!(dates, vec![date(2023, 1, 9)]);
    assert_eq!(result.graph_data.len(), 1);
    assert_eq!(result.graph_data[0].date, date(2023, 1, 9));
    assert!(result.legend_png_path.is_some());
}
