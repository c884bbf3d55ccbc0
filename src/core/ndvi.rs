use ndarray::{Array2, Zip};

use crate::core::cloud_mask::{is_cloud_class, VALID_DATA};
use crate::io::provider::SceneBands;

/// Value written to masked or indeterminate cells
pub const NDVI_NODATA: f32 = -999.0;

/// Masked NDVI raster on the scene's pixel grid
#[derive(Debug, Clone)]
pub struct NdviRaster {
    data: Array2<f32>,
}

impl NdviRaster {
    pub fn from_array(data: Array2<f32>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn is_nodata(value: f32) -> bool {
        value == NDVI_NODATA || !value.is_finite()
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| !Self::is_nodata(v)).count()
    }

    /// Arithmetic mean over valid cells, `None` when every cell is masked
    pub fn mean(&self) -> Option<f64> {
        let (sum, count) = self
            .data
            .iter()
            .filter(|&&v| !Self::is_nodata(v))
            .fold((0.0f64, 0usize), |(sum, count), &v| (sum + v as f64, count + 1));

        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }
}

/// `(NIR - RED) / (NIR + RED)` for one sample; `None` for masked or
/// indeterminate samples
pub fn ndvi_value(red: f32, nir: f32, scene_class: u8, data_mask: u8) -> Option<f32> {
    if data_mask != VALID_DATA || is_cloud_class(scene_class) {
        return None;
    }

    let value = (nir - red) / (nir + red);
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

/// Compute the masked NDVI raster of a scene.
///
/// Cloud masking is repeated per pixel: a scene can pass the polygon-wide
/// threshold and still hold local cloud.
pub fn compute_ndvi(bands: &SceneBands) -> NdviRaster {
    let (rows, cols) = bands.dim();
    log::debug!("Computing NDVI over {}x{} pixels", rows, cols);

    let zip = Zip::from(bands.red())
        .and(bands.nir())
        .and(bands.scene_classification())
        .and(bands.data_mask());
    let kernel = |&red: &f32, &nir: &f32, &scl: &u8, &mask: &u8| {
        ndvi_value(red, nir, scl, mask).unwrap_or(NDVI_NODATA)
    };

    #[cfg(feature = "parallel")]
    let data = zip.par_map_collect(kernel);
    #[cfg(not(feature = "parallel"))]
    let data = zip.map_collect(kernel);

    NdviRaster::from_array(data)
}

/// Round to 4 decimal places for reporting
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
