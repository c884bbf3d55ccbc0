//! In-polygon cloud scoring and best-scene selection

use ndarray::Zip;
use rayon::prelude::*;
use std::cmp::Ordering;

use crate::core::geometry::BoundingBox;
use crate::io::provider::{CancellationToken, SceneBands, SceneDescriptor, SceneProvider};
use crate::types::{ClassBand, GridSize, NdviError, NdviResult};

/// SCL codes treated as cloud: 3 cloud shadow, 8 medium-probability cloud,
/// 9 high-probability cloud, 10 thin cirrus
pub const CLOUD_SCL_CLASSES: [u8; 4] = [3, 8, 9, 10];

/// Data mask value of a usable sample
pub const VALID_DATA: u8 = 1;

pub fn is_cloud_class(code: u8) -> bool {
    CLOUD_SCL_CLASSES.contains(&code)
}

/// Fraction of valid samples classified as cloud, shadow or cirrus.
/// A scene without a single valid sample scores 1.0.
pub fn cloud_coverage(scene_classification: &ClassBand, data_mask: &ClassBand) -> f64 {
    let mut valid = 0usize;
    let mut cloudy = 0usize;

    Zip::from(scene_classification)
        .and(data_mask)
        .for_each(|&scl, &mask| {
            if mask == VALID_DATA {
                valid += 1;
                if is_cloud_class(scl) {
                    cloudy += 1;
                }
            }
        });

    if valid == 0 {
        1.0
    } else {
        cloudy as f64 / valid as f64
    }
}

/// A fetched candidate with its in-polygon cloud score
#[derive(Debug, Clone)]
pub struct ScoredScene {
    pub scene: SceneDescriptor,
    /// Position in the catalog response, used as the final tie-breaker
    pub catalog_index: usize,
    pub cloud_coverage: f64,
    /// Retained only for candidates that pass the cloud threshold
    pub bands: Option<SceneBands>,
}

/// Lowest cloud coverage among candidates at or below `max_cloud_coverage`;
/// ties go to the earliest acquisition, then to catalog order.
pub fn select_best(candidates: Vec<ScoredScene>, max_cloud_coverage: f64) -> Option<ScoredScene> {
    candidates
        .into_iter()
        .filter(|candidate| candidate.cloud_coverage <= max_cloud_coverage)
        .min_by(compare_candidates)
}

fn compare_candidates(a: &ScoredScene, b: &ScoredScene) -> Ordering {
    a.cloud_coverage
        .total_cmp(&b.cloud_coverage)
        .then_with(|| a.scene.date.cmp(&b.scene.date))
        .then_with(|| a.catalog_index.cmp(&b.catalog_index))
}

/// Drop repeated acquisition dates, keeping the first catalog occurrence
pub fn unique_dates(scenes: Vec<SceneDescriptor>) -> Vec<SceneDescriptor> {
    let mut unique: Vec<SceneDescriptor> = Vec::with_capacity(scenes.len());
    for scene in scenes {
        if !unique.iter().any(|kept| kept.date == scene.date) {
            unique.push(scene);
        }
    }
    unique
}

/// Cloud selection parameters
#[derive(Debug, Clone)]
pub struct CloudSelectorParams {
    /// Highest acceptable in-polygon cloud fraction
    pub max_cloud_coverage: f64,
    /// Simultaneous band downloads
    pub concurrency: usize,
}

impl Default for CloudSelectorParams {
    fn default() -> Self {
        Self {
            max_cloud_coverage: 0.5,
            concurrency: 4,
        }
    }
}

/// Scores candidates on a bounded worker pool and picks the clearest one
pub struct CloudSelector {
    params: CloudSelectorParams,
    pool: rayon::ThreadPool,
}

impl CloudSelector {
    pub fn new(params: CloudSelectorParams) -> NdviResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.concurrency.max(1))
            .thread_name(|i| format!("scene-fetch-{}", i))
            .build()
            .map_err(|e| NdviError::Config(format!("Failed to build fetch pool: {}", e)))?;

        Ok(Self { params, pool })
    }

    pub fn params(&self) -> &CloudSelectorParams {
        &self.params
    }

    /// Fetch and score every candidate. Failed or cancelled fetches are
    /// excluded; the result keeps catalog order.
    pub fn score_candidates<P: SceneProvider>(
        &self,
        provider: &P,
        scenes: &[SceneDescriptor],
        bbox: &BoundingBox,
        grid: GridSize,
        cancel: &CancellationToken,
    ) -> Vec<ScoredScene> {
        self.pool.install(|| {
            scenes
                .par_iter()
                .enumerate()
                .filter_map(|(index, scene)| self.score_one(provider, index, scene, bbox, grid, cancel))
                .collect()
        })
    }

    /// Score all candidates and return the best one passing the threshold
    pub fn select<P: SceneProvider>(
        &self,
        provider: &P,
        scenes: &[SceneDescriptor],
        bbox: &BoundingBox,
        grid: GridSize,
        cancel: &CancellationToken,
    ) -> Option<ScoredScene> {
        let scored = self.score_candidates(provider, scenes, bbox, grid, cancel);
        select_best(scored, self.params.max_cloud_coverage)
    }

    fn score_one<P: SceneProvider>(
        &self,
        provider: &P,
        index: usize,
        scene: &SceneDescriptor,
        bbox: &BoundingBox,
        grid: GridSize,
        cancel: &CancellationToken,
    ) -> Option<ScoredScene> {
        if cancel.is_cancelled() {
            log::warn!("Run cancelled, excluding scene {} from {}", scene.id, scene.date);
            return None;
        }

        let bands = match provider.fetch(scene.date, bbox, grid) {
            Ok(bands) => bands,
            Err(e) => {
                log::warn!("Excluding scene {} from {}: {}", scene.id, scene.date, e);
                return None;
            }
        };

        if bands.dim() != (grid.height, grid.width) {
            log::warn!(
                "Excluding scene {} from {}: got {:?} pixels, requested {}x{}",
                scene.id,
                scene.date,
                bands.dim(),
                grid.height,
                grid.width
            );
            return None;
        }

        let coverage = cloud_coverage(bands.scene_classification(), bands.data_mask());
        log::info!(
            "  - Image from {}: Cloud coverage in polygon = {:.2}%",
            scene.date,
            coverage * 100.0
        );

        let passes = coverage <= self.params.max_cloud_coverage;
        Some(ScoredScene {
            scene: scene.clone(),
            catalog_index: index,
            cloud_coverage: coverage,
            bands: if passes { Some(bands) } else { None },
        })
    }
}
