//! In-memory imagery provider for pipeline tests

#![allow(dead_code)]

use chrono::NaiveDate;
use ndarray::Array2;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ndvi_series::core::geometry::BoundingBox;
use ndvi_series::io::provider::{SceneBands, SceneDescriptor, SceneProvider};
use ndvi_series::types::{GridSize, NdviError, NdviResult, TimeInterval};

/// `[lon, lat]` square of roughly 0.93 km²
pub fn small_polygon() -> Vec<[f64; 2]> {
    vec![
        [18.435, 49.792],
        [18.435, 49.801],
        [18.448, 49.801],
        [18.448, 49.792],
    ]
}

/// One degree square, far above the default 25 km² limit
pub fn large_polygon() -> Vec<[f64; 2]> {
    vec![[18.0, 49.0], [18.0, 50.0], [19.0, 50.0], [19.0, 49.0]]
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone)]
pub struct FakeScene {
    pub id: String,
    pub date: NaiveDate,
    pub red: f32,
    pub nir: f32,
    /// Share of pixels classified as high-probability cloud
    pub cloud_fraction: f64,
    pub fail_fetch: bool,
    /// Classification band delivered one row and column larger than the rest
    pub ragged: bool,
}

impl FakeScene {
    pub fn new(id: &str, date: NaiveDate, cloud_fraction: f64) -> Self {
        Self {
            id: id.to_string(),
            date,
            red: 0.1,
            nir: 0.3,
            cloud_fraction,
            fail_fetch: false,
            ragged: false,
        }
    }

    pub fn with_reflectance(mut self, red: f32, nir: f32) -> Self {
        self.red = red;
        self.nir = nir;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn ragged(mut self) -> Self {
        self.ragged = true;
        self
    }

    fn bands(&self, grid: GridSize) -> NdviResult<SceneBands> {
        let shape = (grid.height, grid.width);
        let total = grid.height * grid.width;
        let cloudy = (self.cloud_fraction * total as f64).round() as usize;

        let scl_shape = if self.ragged {
            (grid.height + 1, grid.width + 1)
        } else {
            shape
        };
        let mut scl = Array2::from_elem(scl_shape, 4u8);
        for (i, value) in scl.iter_mut().enumerate() {
            if i < cloudy {
                *value = 9;
            }
        }

        SceneBands::new(
            Array2::from_elem(shape, self.red),
            Array2::from_elem(shape, self.nir),
            scl,
            Array2::from_elem(shape, 1u8),
        )
    }
}

/// Catalog backed by a fixed scene list, counting every call
#[derive(Default)]
pub struct FakeProvider {
    scenes: Vec<FakeScene>,
    failing_searches: Vec<NaiveDate>,
    pub search_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub fetched: Mutex<Vec<NaiveDate>>,
}

impl FakeProvider {
    pub fn new(scenes: Vec<FakeScene>) -> Self {
        Self {
            scenes,
            ..Self::default()
        }
    }

    /// Searches of the interval starting on `start` fail
    pub fn fail_search_at(mut self, start: NaiveDate) -> Self {
        self.failing_searches.push(start);
        self
    }

    pub fn searches(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

impl SceneProvider for FakeProvider {
    fn search(
        &self,
        _bbox: &BoundingBox,
        interval: &TimeInterval,
        limit: usize,
    ) -> NdviResult<Vec<SceneDescriptor>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_searches.contains(&interval.start) {
            return Err(NdviError::Provider("catalog unavailable".to_string()));
        }

        Ok(self
            .scenes
            .iter()
            .filter(|scene| scene.date >= interval.start && scene.date <= interval.end)
            .take(limit)
            .map(|scene| SceneDescriptor {
                id: scene.id.clone(),
                date: scene.date,
            })
            .collect())
    }

    fn fetch(&self, scene_date: NaiveDate, _bbox: &BoundingBox, grid: GridSize) -> NdviResult<SceneBands> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(scene_date);

        let scene = self
            .scenes
            .iter()
            .find(|scene| scene.date == scene_date)
            .ok_or_else(|| NdviError::Provider(format!("no scene on {}", scene_date)))?;

        if scene.fail_fetch {
            return Err(NdviError::Provider(format!("download of {} timed out", scene.id)));
        }
        scene.bands(grid)
    }
}
