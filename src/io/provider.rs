use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::geometry::BoundingBox;
use crate::types::{ClassBand, GridSize, NdviError, NdviResult, ReflectanceBand, TimeInterval};

/// A scene as listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneDescriptor {
    pub id: String,
    pub date: NaiveDate,
}

/// Raw bands of one acquisition over the requested grid
///
/// Only built through [`SceneBands::new`], so all four rasters always share
/// one shape.
#[derive(Debug, Clone)]
pub struct SceneBands {
    red: ReflectanceBand,
    nir: ReflectanceBand,
    scene_classification: ClassBand,
    data_mask: ClassBand,
}

impl SceneBands {
    /// Assemble bands, checking that every raster shares one grid
    pub fn new(
        red: ReflectanceBand,
        nir: ReflectanceBand,
        scene_classification: ClassBand,
        data_mask: ClassBand,
    ) -> NdviResult<Self> {
        let shape = red.dim();
        if nir.dim() != shape || scene_classification.dim() != shape || data_mask.dim() != shape {
            return Err(NdviError::Decode(format!(
                "band shapes differ: red {:?}, nir {:?}, scl {:?}, mask {:?}",
                shape,
                nir.dim(),
                scene_classification.dim(),
                data_mask.dim()
            )));
        }

        Ok(Self {
            red,
            nir,
            scene_classification,
            data_mask,
        })
    }

    /// (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        self.red.dim()
    }

    pub fn red(&self) -> &ReflectanceBand {
        &self.red
    }

    pub fn nir(&self) -> &ReflectanceBand {
        &self.nir
    }

    /// Sentinel-2 L2A scene classification (SCL) codes
    pub fn scene_classification(&self) -> &ClassBand {
        &self.scene_classification
    }

    /// 1 = valid sample, 0 = no data
    pub fn data_mask(&self) -> &ClassBand {
        &self.data_mask
    }
}

/// Imagery provider: catalog search plus band retrieval.
///
/// Both calls are blocking and network-bound. Implementations must be usable
/// from several worker threads at once.
pub trait SceneProvider: Sync {
    /// Scenes intersecting `bbox` during `interval`, in catalog order, at most `limit`
    fn search(
        &self,
        bbox: &BoundingBox,
        interval: &TimeInterval,
        limit: usize,
    ) -> NdviResult<Vec<SceneDescriptor>>;

    /// Bands of the acquisition on `scene_date` resampled to `grid` over `bbox`
    fn fetch(&self, scene_date: NaiveDate, bbox: &BoundingBox, grid: GridSize) -> NdviResult<SceneBands>;
}

impl<P: SceneProvider + ?Sized> SceneProvider for &P {
    fn search(
        &self,
        bbox: &BoundingBox,
        interval: &TimeInterval,
        limit: usize,
    ) -> NdviResult<Vec<SceneDescriptor>> {
        (**self).search(bbox, interval, limit)
    }

    fn fetch(&self, scene_date: NaiveDate, bbox: &BoundingBox, grid: GridSize) -> NdviResult<SceneBands> {
        (**self).fetch(scene_date, bbox, grid)
    }
}

/// Shared cancellation flag for an in-flight run
///
/// Checked before each catalog search and before each scene fetch. A blocking
/// provider call that has already started is not interrupted; it ends when it
/// completes or hits the provider's request timeout
/// (`ProviderConfig::request_timeout_secs` for [`SentinelHubProvider`]).
///
/// [`SentinelHubProvider`]: crate::io::sentinel_hub::SentinelHubProvider
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
