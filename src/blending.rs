//! Edge-softening composite of a crop over a blurred copy of itself.
//!
//! The final image blends the sharp crop over its Gaussian-blurred copy:
//! `out = mask * sharp + (1 - mask) * blurred`
//!
//! The blend mask is the resized model mask, not the cleaned alpha. The
//! cleaned alpha only travels with the RGBA cutout.

use image::imageops;
use image::{GrayImage, Rgb, RgbImage, Rgba, RgbaImage};

use crate::mask::resize_mask;

/// Output of [`composite`].
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    /// The crop with the cleaned alpha mask as its alpha channel.
    pub cutout: RgbaImage,
    /// The crop blended over its blurred copy, fully opaque.
    pub image: RgbImage,
}

/// Attach `alpha` to a copy of `rgb`, resizing it to the image if needed.
#[must_use]
pub fn attach_alpha(rgb: &RgbImage, alpha: &GrayImage) -> RgbaImage {
    let alpha = resize_mask(alpha, rgb.width(), rgb.height());
    RgbaImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let Rgb([r, g, b]) = *rgb.get_pixel(x, y);
        Rgba([r, g, b, alpha.get_pixel(x, y)[0]])
    })
}

/// Blend `sharp` over `background` with a per-pixel mask.
///
/// All three images must share the same dimensions.
#[must_use]
pub fn blend_with_mask(sharp: &RgbImage, background: &RgbImage, mask: &GrayImage) -> RgbImage {
    debug_assert_eq!(sharp.dimensions(), background.dimensions());
    debug_assert_eq!(sharp.dimensions(), mask.dimensions());

    let mut out = background.clone();
    for ((px, s), m) in out.pixels_mut().zip(sharp.pixels()).zip(mask.pixels()) {
        let m = u32::from(m[0]);
        let inv = 255 - m;
        for ch in 0..3 {
            let v = u32::from(s[ch]) * m + u32::from(px[ch]) * inv;
            #[allow(clippy::cast_possible_truncation)]
            {
                px[ch] = ((v + 127) / 255) as u8;
            }
        }
    }
    out
}

/// Soften the edges of a cropped item.
///
/// `alpha` is the cleaned mask and `blend_mask` the raw model mask; both are
/// resized to the crop before use. A non-positive `blur_radius` uses the
/// crop itself as the background. The output always has the crop's
/// dimensions.
#[must_use]
pub fn composite(
    cropped: &RgbImage,
    alpha: &GrayImage,
    blend_mask: &GrayImage,
    blur_radius: f32,
) -> Composite {
    let (w, h) = cropped.dimensions();
    let cutout = attach_alpha(cropped, alpha);

    // Flattening the cutout drops its alpha and gives back the crop.
    let sharp = cropped;
    let blurred = if blur_radius > 0.0 && w > 0 && h > 0 {
        imageops::blur(sharp, blur_radius)
    } else {
        sharp.clone()
    };

    let blend_mask = resize_mask(blend_mask, w, h);
    let image = blend_with_mask(sharp, &blurred, &blend_mask);

    Composite { cutout, image }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn checkerboard(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgb([240, 200, 30])
            } else {
                Rgb([10, 40, 90])
            }
        })
    }

    #[test]
    fn output_keeps_crop_dimensions_for_any_radius() {
        let crop = checkerboard(37, 23);
        let mask = GrayImage::from_pixel(384, 384, Luma([128]));
        for radius in [0.0, 0.5, 3.0, 20.0] {
            let out = composite(&crop, &mask, &mask, radius);
            assert_eq!(out.image.dimensions(), (37, 23));
            assert_eq!(out.cutout.dimensions(), (37, 23));
        }
    }

    #[test]
    fn opaque_mask_keeps_the_sharp_crop() {
        let crop = checkerboard(16, 16);
        let mask = GrayImage::from_pixel(16, 16, Luma([255]));
        let out = composite(&crop, &mask, &mask, 5.0);
        assert_eq!(out.image, crop);
    }

    #[test]
    fn empty_mask_yields_the_blurred_crop() {
        let crop = checkerboard(16, 16);
        let mask = GrayImage::new(16, 16);
        let out = composite(&crop, &mask, &mask, 5.0);
        assert_eq!(out.image, imageops::blur(&crop, 5.0));
        assert_ne!(out.image, crop);
    }

    #[test]
    fn zero_radius_leaves_image_untouched() {
        let crop = checkerboard(8, 8);
        let mask = GrayImage::from_pixel(8, 8, Luma([90]));
        let out = composite(&crop, &mask, &mask, 0.0);
        assert_eq!(out.image, crop);
    }

    #[test]
    fn cutout_carries_cleaned_alpha_not_blend_mask() {
        let crop = checkerboard(8, 8);
        let alpha = GrayImage::from_pixel(8, 8, Luma([200]));
        let blend = GrayImage::from_pixel(8, 8, Luma([255]));
        let out = composite(&crop, &alpha, &blend, 2.0);
        assert!(out.cutout.pixels().all(|p| p[3] == 200));
        assert_eq!(out.image, crop);
    }

    #[test]
    fn half_mask_averages_sharp_and_background() {
        let sharp = RgbImage::from_pixel(2, 2, Rgb([200, 100, 0]));
        let background = RgbImage::from_pixel(2, 2, Rgb([0, 100, 200]));
        let mask = GrayImage::from_pixel(2, 2, Luma([128]));
        let out = blend_with_mask(&sharp, &background, &mask);
        assert_eq!(out.get_pixel(0, 0), &Rgb([100, 100, 100]));
    }

    #[test]
    fn attach_alpha_resizes_to_image() {
        let rgb = RgbImage::from_pixel(10, 6, Rgb([1, 2, 3]));
        let alpha = GrayImage::from_pixel(384, 384, Luma([77]));
        let rgba = attach_alpha(&rgb, &alpha);
        assert_eq!(rgba.dimensions(), (10, 6));
        let Rgba([r, g, b, a]) = *rgba.get_pixel(4, 4);
        assert_eq!((r, g, b), (1, 2, 3));
        assert!((76..=78).contains(&a), "alpha {a}");
    }
}
