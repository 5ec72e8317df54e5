//! Soft mask cleanup.
//!
//! The mask predictor emits a probability map. Cleanup shifts it by
//! `threshold - 0.5`, so values above the threshold saturate to opaque,
//! and clamps the rest to a floor that keeps edges from going fully
//! transparent:
//!
//! `alpha = clamp(mask / 255 + (threshold - 0.5), min_floor, 1) * 255`

use image::imageops::{self, FilterType};
use image::GrayImage;

/// Resize a model-resolution mask to a crop's pixel dimensions.
#[must_use]
pub fn resize_mask(mask: &GrayImage, width: u32, height: u32) -> GrayImage {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    if mask.width() == 0 || mask.height() == 0 {
        return GrayImage::new(width, height);
    }
    imageops::resize(mask, width, height, FilterType::CatmullRom)
}

/// Soft-threshold a mask into an alpha channel.
///
/// With `threshold == None` the mask is returned unchanged. Otherwise every
/// output value is at least `min_floor * 255` (rounded up). The bias is
/// added, so a higher `threshold` makes every pixel at least as opaque.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clean_mask(mask: &GrayImage, threshold: Option<f32>, min_floor: f32) -> GrayImage {
    let Some(threshold) = threshold else {
        return mask.clone();
    };

    let floor = if min_floor.is_nan() {
        0.0
    } else {
        min_floor.clamp(0.0, 1.0)
    };
    let floor_value = (floor * 255.0).ceil() as u8;
    let bias = threshold - 0.5;

    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let a = (v as f32 / 255.0 + bias).clamp(floor, 1.0);
        *out = ((a * 255.0).round() as u8).max(floor_value);
    }

    let mut cleaned = mask.clone();
    for px in cleaned.pixels_mut() {
        px[0] = lut[px[0] as usize];
    }
    cleaned
}
