//! Decoding of the four-band Process API TIFF into [`SceneBands`]
//!
//! Sample order per pixel is `[B04, B08, SCL, dataMask]`, all FLOAT32.

use ndarray::Array2;
use std::io::Cursor;
use tiff::decoder::{Decoder, DecodingResult, Limits};

use crate::io::provider::SceneBands;
use crate::types::{NdviError, NdviResult};

/// Samples per pixel in the requested output
pub const BAND_COUNT: usize = 4;

/// Decode a TIFF held in memory
pub fn decode_scene_tiff(bytes: &[u8]) -> NdviResult<SceneBands> {
    let mut decoder = Decoder::new(Cursor::new(bytes))
        .map_err(|e| NdviError::Decode(format!("TIFF decode error: {}", e)))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| NdviError::Decode(format!("Cannot read dimensions: {}", e)))?;

    let samples: Vec<f32> = match decoder
        .read_image()
        .map_err(|e| NdviError::Decode(format!("Cannot read image data: {}", e)))?
    {
        DecodingResult::F32(buf) => buf,
        DecodingResult::F64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f32::from).collect(),
        _ => {
            return Err(NdviError::Decode(
                "Unsupported TIFF sample format".to_string(),
            ))
        }
    };

    deinterleave(&samples, height as usize, width as usize)
}

/// Split pixel-interleaved samples into the four band arrays
pub fn deinterleave(samples: &[f32], rows: usize, cols: usize) -> NdviResult<SceneBands> {
    let expected = rows * cols * BAND_COUNT;
    if samples.len() != expected {
        return Err(NdviError::Decode(format!(
            "Expected {} samples for {}x{}x{}, got {}",
            expected,
            rows,
            cols,
            BAND_COUNT,
            samples.len()
        )));
    }

    let mut red = Array2::zeros((rows, cols));
    let mut nir = Array2::zeros((rows, cols));
    let mut scl = Array2::zeros((rows, cols));
    let mut mask = Array2::zeros((rows, cols));

    for (idx, pixel) in samples.chunks_exact(BAND_COUNT).enumerate() {
        let at = (idx / cols, idx % cols);
        red[at] = pixel[0];
        nir[at] = pixel[1];
        scl[at] = class_code(pixel[2]);
        mask[at] = class_code(pixel[3]);
    }

    log::debug!("Decoded scene bands: {} x {}", rows, cols);
    SceneBands::new(red, nir, scl, mask)
}

// NaN and out-of-range values become class 0 (no data).
fn class_code(value: f32) -> u8 {
    if value.is_finite() && (0.0..=255.0).contains(&value) {
        value.round() as u8
    } else {
        0
    }
}

/// Decode through GDAL, for TIFF variants the pure decoder rejects
#[cfg(feature = "gdal")]
pub fn decode_scene_tiff_gdal(bytes: &[u8]) -> NdviResult<SceneBands> {
    use std::io::Write;

    let mut temp_file = tempfile::Builder::new().suffix(".tif").tempfile()?;
    temp_file.write_all(bytes)?;
    temp_file.flush()?;

    let dataset = gdal::Dataset::open(temp_file.path())?;
    let (width, height) = dataset.raster_size();
    let band_count = dataset.raster_count() as usize;
    if band_count != BAND_COUNT {
        return Err(NdviError::Decode(format!(
            "Expected {} bands, got {}",
            BAND_COUNT, band_count
        )));
    }

    let mut bands = Vec::with_capacity(BAND_COUNT);
    for index in 1..=BAND_COUNT {
        let band = dataset.rasterband(index as isize)?;
        let buffer = band.read_as::<f32>((0, 0), (width, height), (width, height), None)?;
        bands.push(buffer.data);
    }

    let mut samples = Vec::with_capacity(width * height * BAND_COUNT);
    for idx in 0..width * height {
        for band in &bands {
            samples.push(band[idx]);
        }
    }
    deinterleave(&samples, height, width)
}
