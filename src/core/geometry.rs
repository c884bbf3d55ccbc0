use chrono::NaiveDate;
use geo::{Area, Centroid, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::types::{GridSize, ValidationError};

/// Kilometres per degree of longitude at the equator
pub const KM_PER_DEG_LON_EQUATOR: f64 = 111.32;
/// Kilometres per degree of latitude
pub const KM_PER_DEG_LAT: f64 = 110.574;
/// Largest span between start and end date accepted for a single request
pub const MAX_SPAN_DAYS: i64 = 365;
/// Largest raster edge the imagery provider will produce
pub const MAX_GRID_PIXELS: usize = 2500;

/// Geographic bounding box in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Axis-aligned envelope of a polygon ring, `None` for an empty ring
    pub fn from_polygon(polygon: &[[f64; 2]]) -> Option<Self> {
        let first = polygon.first()?;
        let mut bbox = Self::new(first[0], first[1], first[0], first[1]);
        for &[lon, lat] in &polygon[1..] {
            bbox.min_lon = bbox.min_lon.min(lon);
            bbox.min_lat = bbox.min_lat.min(lat);
            bbox.max_lon = bbox.max_lon.max(lon);
            bbox.max_lat = bbox.max_lat.max(lat);
        }
        Some(bbox)
    }

    /// `[west, south, east, north]`, the order used by STAC and the Process API
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }

    /// South-west / north-east corners as `[[lat, lon], [lat, lon]]`
    pub fn corner_bounds(&self) -> [[f64; 2]; 2] {
        [[self.min_lat, self.min_lon], [self.max_lat, self.max_lon]]
    }

    pub fn center_lat(&self) -> f64 {
        (self.min_lat + self.max_lat) / 2.0
    }

    /// Approximate extent in metres (width, height) on a flat local plane
    pub fn extent_m(&self) -> (f64, f64) {
        let km_per_deg_lon = KM_PER_DEG_LON_EQUATOR * self.center_lat().to_radians().cos();
        let width = (self.max_lon - self.min_lon) * km_per_deg_lon * 1000.0;
        let height = (self.max_lat - self.min_lat) * KM_PER_DEG_LAT * 1000.0;
        (width, height)
    }

    /// Pixel grid covering the box at `resolution_m` metres per pixel
    pub fn grid_size(&self, resolution_m: f64) -> GridSize {
        let (width_m, height_m) = self.extent_m();
        let to_pixels = |metres: f64| -> usize {
            let pixels = (metres / resolution_m).round();
            if pixels.is_finite() && pixels >= 1.0 {
                (pixels as usize).min(MAX_GRID_PIXELS)
            } else {
                1
            }
        };

        GridSize {
            width: to_pixels(width_m),
            height: to_pixels(height_m),
        }
    }
}

/// Approximate polygon area in km².
///
/// Vertices are projected onto a flat plane scaled at the centroid latitude,
/// which is only meaningful for small extents away from the poles. Returns
/// 0.0 for degenerate rings instead of failing.
pub fn polygon_area_sqkm(polygon: &[[f64; 2]]) -> f64 {
    if distinct_vertices(polygon) < 3 {
        return 0.0;
    }

    let ring = to_geo_polygon(polygon.iter().map(|p| (p[0], p[1])));
    let centroid = match ring.centroid() {
        Some(point) => point,
        None => {
            log::error!("Could not derive a centroid for polygon with {} vertices", polygon.len());
            return 0.0;
        }
    };

    let km_per_deg_lon = KM_PER_DEG_LON_EQUATOR * centroid.y().to_radians().cos();
    let projected = to_geo_polygon(
        polygon
            .iter()
            .map(|p| (p[0] * km_per_deg_lon, p[1] * KM_PER_DEG_LAT)),
    );

    let area = projected.unsigned_area();
    if area.is_finite() {
        area
    } else {
        log::error!("Approximated polygon area is not finite");
        0.0
    }
}

/// Fails with `AreaExceeded` when the polygon is larger than `max_area_sqkm`.
/// Returns the computed area otherwise.
pub fn validate_area(polygon: &[[f64; 2]], max_area_sqkm: f64) -> Result<f64, ValidationError> {
    let area = polygon_area_sqkm(polygon);
    if area > max_area_sqkm {
        return Err(ValidationError::AreaExceeded {
            area,
            max: max_area_sqkm,
        });
    }
    Ok(area)
}

/// Fails with `SpanExceeded` when `end - start` is longer than `max_days`.
/// Returns the span in days otherwise.
pub fn validate_span(
    start: NaiveDate,
    end: NaiveDate,
    max_days: i64,
) -> Result<i64, ValidationError> {
    let days = (end - start).num_days();
    if days > max_days {
        return Err(ValidationError::SpanExceeded {
            days,
            max: max_days,
        });
    }
    Ok(days)
}

fn to_geo_polygon(coords: impl Iterator<Item = (f64, f64)>) -> Polygon<f64> {
    Polygon::new(LineString::from(coords.collect::<Vec<_>>()), vec![])
}

fn distinct_vertices(polygon: &[[f64; 2]]) -> usize {
    let mut seen: Vec<[f64; 2]> = Vec::with_capacity(polygon.len());
    for vertex in polygon {
        if !seen.contains(vertex) {
            seen.push(*vertex);
        }
    }
    seen.len()
}
