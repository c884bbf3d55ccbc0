//! PNG artifacts: color-mapped NDVI layers, the time-series chart and the legend.
//!
//! The color scale is an explicit value handed to every render call; nothing
//! here holds plotting state between calls.

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::path::Path;

use crate::core::ndvi::NdviRaster;
use crate::types::{NdviError, NdviResult, TimeSeriesPoint};

/// Lower end of the NDVI display range
pub const NDVI_DISPLAY_MIN: f64 = -0.2;
/// Upper end of the NDVI display range
pub const NDVI_DISPLAY_MAX: f64 = 1.0;

pub const CHART_WIDTH: u32 = 1000;
pub const CHART_HEIGHT: u32 = 500;
pub const LEGEND_WIDTH: u32 = 500;
pub const LEGEND_HEIGHT: u32 = 80;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const GRID_GRAY: Rgba<u8> = Rgba([200, 200, 200, 255]);
const SERIES_GREEN: Rgba<u8> = Rgba([0, 128, 0, 255]);

/// A color stop: position in [0, 1] mapped to an RGB color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub t: f64,
    pub rgb: [u8; 3],
}

impl ColorStop {
    pub const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self { t, rgb: [r, g, b] }
    }
}

/// Red -> yellow -> green diverging palette
const RD_YL_GN_STOPS: &[ColorStop] = &[
    ColorStop::new(0.0, 165, 0, 38),
    ColorStop::new(0.1, 215, 48, 39),
    ColorStop::new(0.2, 244, 109, 67),
    ColorStop::new(0.3, 253, 174, 97),
    ColorStop::new(0.4, 254, 224, 139),
    ColorStop::new(0.5, 255, 255, 191),
    ColorStop::new(0.6, 217, 239, 139),
    ColorStop::new(0.7, 166, 217, 106),
    ColorStop::new(0.8, 102, 189, 99),
    ColorStop::new(0.9, 26, 152, 80),
    ColorStop::new(1.0, 0, 104, 55),
];

/// Color stops plus the value range they are normalized over
#[derive(Debug, Clone, PartialEq)]
pub struct ColorScale {
    stops: Vec<ColorStop>,
    min: f64,
    max: f64,
}

impl ColorScale {
    pub fn new(stops: Vec<ColorStop>, min: f64, max: f64) -> NdviResult<Self> {
        if stops.len() < 2 {
            return Err(NdviError::Render("a color scale needs at least two stops".to_string()));
        }
        if !(max > min) {
            return Err(NdviError::Render(format!("invalid color range [{}, {}]", min, max)));
        }
        Ok(Self { stops, min, max })
    }

    /// The fixed NDVI scale: red-yellow-green over [-0.2, 1.0]
    pub fn ndvi() -> Self {
        Self {
            stops: RD_YL_GN_STOPS.to_vec(),
            min: NDVI_DISPLAY_MIN,
            max: NDVI_DISPLAY_MAX,
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Position of `value` within the display range, clamped to [0, 1]
    pub fn normalize(&self, value: f64) -> f64 {
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }

    pub fn color_at(&self, value: f64) -> [u8; 3] {
        self.evaluate(self.normalize(value))
    }

    /// Multi-stop linear interpolation at normalized position `t`
    pub fn evaluate(&self, t: f64) -> [u8; 3] {
        let first = self.stops[0];
        let last = self.stops[self.stops.len() - 1];
        if t <= first.t {
            return first.rgb;
        }
        if t >= last.t {
            return last.rgb;
        }

        for pair in self.stops.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if t <= hi.t {
                let span = hi.t - lo.t;
                let ratio = if span > 0.0 { (t - lo.t) / span } else { 0.0 };
                return lerp_rgb(lo.rgb, hi.rgb, ratio);
            }
        }
        last.rgb
    }
}

impl Default for ColorScale {
    fn default() -> Self {
        Self::ndvi()
    }
}

fn lerp_rgb(a: [u8; 3], b: [u8; 3], t: f64) -> [u8; 3] {
    let channel = |i: usize| (a[i] as f64 + (b[i] as f64 - a[i] as f64) * t).round() as u8;
    [channel(0), channel(1), channel(2)]
}

/// One RGBA pixel per raster cell; nodata cells are fully transparent
pub fn render_ndvi_map(raster: &NdviRaster, scale: &ColorScale) -> NdviResult<RgbaImage> {
    let (rows, cols) = raster.dim();
    if rows == 0 || cols == 0 {
        return Err(NdviError::Render("cannot render an empty NDVI raster".to_string()));
    }

    let data = raster.data();
    let image = RgbaImage::from_fn(cols as u32, rows as u32, |x, y| {
        let value = data[[y as usize, x as usize]];
        if NdviRaster::is_nodata(value) {
            TRANSPARENT
        } else {
            let [r, g, b] = scale.color_at(value as f64);
            Rgba([r, g, b, 255])
        }
    });

    Ok(image)
}

/// Line chart of the non-null points in date order.
/// `None` when no point carries a value.
pub fn render_time_series_chart(points: &[TimeSeriesPoint]) -> Option<RgbaImage> {
    let mut series: Vec<(chrono::NaiveDate, f64)> = points
        .iter()
        .filter_map(|p| p.value.map(|v| (p.date, v)))
        .filter(|(_, v)| v.is_finite())
        .collect();
    if series.is_empty() {
        return None;
    }
    series.sort_by_key(|(date, _)| *date);

    let mut image = RgbaImage::from_pixel(CHART_WIDTH, CHART_HEIGHT, WHITE);
    let (left, right, top, bottom) = (70.0f32, 30.0f32, 40.0f32, 60.0f32);
    let plot_w = CHART_WIDTH as f32 - left - right;
    let plot_h = CHART_HEIGHT as f32 - top - bottom;

    let first_day = series[0].0;
    let span_days = (series[series.len() - 1].0 - first_day).num_days() as f32;
    let x_of = |date: chrono::NaiveDate| -> f32 {
        if span_days > 0.0 {
            left + plot_w * ((date - first_day).num_days() as f32 / span_days)
        } else {
            left + plot_w / 2.0
        }
    };

    let (lo, hi) = series
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, v)| (lo.min(*v), hi.max(*v)));
    let pad = ((hi - lo) * 0.1).max(0.05);
    let (y_min, y_max) = (lo - pad, hi + pad);
    let y_of = |v: f64| -> f32 { top + plot_h * (1.0 - ((v - y_min) / (y_max - y_min)) as f32) };

    // horizontal grid with y ticks
    for i in 0..=5 {
        let y = top + plot_h * i as f32 / 5.0;
        draw_dashed_hline(&mut image, left, left + plot_w, y, GRID_GRAY);
        draw_line_segment_mut(&mut image, (left - 6.0, y), (left, y), BLACK);
    }
    // vertical grid at each observation with x ticks
    for (date, _) in &series {
        let x = x_of(*date);
        draw_dashed_vline(&mut image, x, top, top + plot_h, GRID_GRAY);
        draw_line_segment_mut(&mut image, (x, top + plot_h), (x, top + plot_h + 6.0), BLACK);
    }

    draw_hollow_rect_mut(
        &mut image,
        Rect::at(left as i32, top as i32).of_size(plot_w as u32, plot_h as u32),
        BLACK,
    );

    let coords: Vec<(f32, f32)> = series.iter().map(|(d, v)| (x_of(*d), y_of(*v))).collect();
    for pair in coords.windows(2) {
        for offset in [-1.0f32, 0.0, 1.0] {
            draw_line_segment_mut(
                &mut image,
                (pair[0].0, pair[0].1 + offset),
                (pair[1].0, pair[1].1 + offset),
                SERIES_GREEN,
            );
        }
    }
    for (x, y) in &coords {
        draw_filled_circle_mut(&mut image, (x.round() as i32, y.round() as i32), 5, SERIES_GREEN);
    }

    Some(image)
}

/// Horizontal color bar for `scale` with a tick every 0.2
pub fn render_legend(scale: &ColorScale) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(LEGEND_WIDTH, LEGEND_HEIGHT, TRANSPARENT);
    let (bar_left, bar_right, bar_top, bar_bottom) = (20u32, LEGEND_WIDTH - 20, 25u32, 55u32);
    let bar_width = (bar_right - bar_left) as f64;

    for x in bar_left..bar_right {
        let t = (x - bar_left) as f64 / (bar_width - 1.0);
        let [r, g, b] = scale.evaluate(t);
        for y in bar_top..bar_bottom {
            image.put_pixel(x, y, Rgba([r, g, b, 255]));
        }
    }
    draw_hollow_rect_mut(
        &mut image,
        Rect::at(bar_left as i32, bar_top as i32).of_size(bar_right - bar_left, bar_bottom - bar_top),
        BLACK,
    );

    let step = 0.2;
    let ticks = ((scale.max() - scale.min()) / step + 1e-9).floor() as usize;
    for k in 0..=ticks {
        let value = scale.min() + step * k as f64;
        let x = bar_left as f32 + (scale.normalize(value) * (bar_width - 1.0)) as f32;
        draw_line_segment_mut(
            &mut image,
            (x, bar_bottom as f32),
            (x, bar_bottom as f32 + 7.0),
            BLACK,
        );
    }

    image
}

/// Encode `image` as PNG at `path`
pub fn save_png(image: &RgbaImage, path: &Path) -> NdviResult<()> {
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| NdviError::Render(format!("Failed to write {}: {}", path.display(), e)))
}

fn draw_dashed_hline(image: &mut RgbaImage, x0: f32, x1: f32, y: f32, color: Rgba<u8>) {
    let mut x = x0;
    while x < x1 {
        draw_line_segment_mut(image, (x, y), ((x + 6.0).min(x1), y), color);
        x += 10.0;
    }
}

fn draw_dashed_vline(image: &mut RgbaImage, x: f32, y0: f32, y1: f32, color: Rgba<u8>) {
    let mut y = y0;
    while y < y1 {
        draw_line_segment_mut(image, (x, y), (x, (y + 6.0).min(y1)), color);
        y += 10.0;
    }
}
