//! Relative box to pixel crop.

use image::imageops;
use image::RgbImage;

use crate::detection::RelativeBox;

/// Integer crop rectangle inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    /// Left column.
    pub x: u32,
    /// Top row.
    pub y: u32,
    /// Width in pixels, at least 1 for non-empty images.
    pub width: u32,
    /// Height in pixels, at least 1 for non-empty images.
    pub height: u32,
}

/// Scale a relative box by the image size and clamp it to the image bounds.
///
/// Coordinates are rounded to the nearest pixel. A degenerate box still
/// yields a 1-pixel region so the crop is never empty.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn pixel_rect(rbox: RelativeBox, width: u32, height: u32) -> PixelRect {
    let scale = |v: f32, size: u32| -> u32 {
        let px = (v * size as f32).round();
        if px.is_nan() {
            0
        } else {
            px.clamp(0.0, size as f32) as u32
        }
    };

    let x1 = scale(rbox.x1, width).min(width.saturating_sub(1));
    let y1 = scale(rbox.y1, height).min(height.saturating_sub(1));
    let x2 = scale(rbox.x2, width).max(x1 + 1).min(width);
    let y2 = scale(rbox.y2, height).max(y1 + 1).min(height);

    PixelRect {
        x: x1,
        y: y1,
        width: x2.saturating_sub(x1),
        height: y2.saturating_sub(y1),
    }
}

/// Extract the region covered by `rbox` from `image`.
///
/// The box is measured against the image's own dimensions, not the model
/// shape.
#[must_use]
pub fn crop(image: &RgbImage, rbox: RelativeBox) -> RgbImage {
    let r = pixel_rect(rbox, image.width(), image.height());
    imageops::crop_imm(image, r.x, r.y, r.width, r.height).to_image()
}
