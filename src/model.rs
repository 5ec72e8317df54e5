//! Model capabilities consumed by the pipeline.
//!
//! The detector and the mask predictor are external collaborators. The
//! pipeline only needs two batch calls: boxes with scores per image, and a
//! soft mask with a score per image. Both run under an explicit
//! [`ComputeScope`] handed in by the caller.

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use log::warn;

use crate::config::ModelShape;
use crate::detection::Detection;
use crate::error::Result;

/// Per-channel mean used to normalize model inputs (RGB order).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation used to normalize model inputs (RGB order).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Execution context for inference calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeScope {
    /// Standard CPU execution.
    #[default]
    Cpu,
    /// An accelerator (GPU or NPU) owned by the model runtime.
    Accelerated,
}

impl ComputeScope {
    /// Pick a scope from the caller's preference and what the runtime offers.
    ///
    /// Falls back to [`ComputeScope::Cpu`] with a warning when an accelerator
    /// was requested but is not available.
    #[must_use]
    pub fn select(prefer_accelerator: bool, accelerator_available: bool) -> Self {
        match (prefer_accelerator, accelerator_available) {
            (true, true) => Self::Accelerated,
            (true, false) => {
                warn!("accelerator requested but unavailable, using CPU");
                Self::Cpu
            }
            (false, _) => Self::Cpu,
        }
    }
}

/// A normalized CHW float tensor at the model's fixed input shape.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    /// Tensor width in pixels.
    pub width: u32,
    /// Tensor height in pixels.
    pub height: u32,
    /// Planar RGB data, `3 * width * height` values.
    pub data: Vec<f32>,
}

impl NormalizedTensor {
    /// Value at channel `c`, pixel `(x, y)`.
    #[must_use]
    pub fn at(&self, c: usize, x: u32, y: u32) -> f32 {
        let plane = (self.width * self.height) as usize;
        self.data[c * plane + (y * self.width + x) as usize]
    }
}

/// Resize an image to the model shape and normalize it channel by channel.
///
/// Pixels are scaled to `[0, 1]`, then shifted by [`IMAGENET_MEAN`] and
/// divided by [`IMAGENET_STD`].
#[must_use]
pub fn to_tensor(image: &RgbImage, shape: ModelShape) -> NormalizedTensor {
    let resized = if image.dimensions() == (shape.width, shape.height) {
        image.clone()
    } else if image.width() == 0 || image.height() == 0 {
        RgbImage::new(shape.width, shape.height)
    } else {
        imageops::resize(image, shape.width, shape.height, FilterType::Triangle)
    };

    let plane = (shape.width * shape.height) as usize;
    let mut data = vec![0.0_f32; 3 * plane];
    for (i, px) in resized.pixels().enumerate() {
        for c in 0..3 {
            let v = f32::from(px[c]) / 255.0;
            data[c * plane + i] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    NormalizedTensor {
        width: shape.width,
        height: shape.height,
        data,
    }
}

/// Per-image output of the mask predictor.
#[derive(Debug, Clone, PartialEq)]
pub enum Segmentation {
    /// The model produced a soft mask for this image.
    Found {
        /// Soft mask at the model's output resolution, values in `[0, 255]`.
        mask: GrayImage,
        /// Confidence of the top instance.
        score: f32,
    },
    /// The model produced nothing usable for this image.
    Absent,
}

impl Segmentation {
    /// Returns `true` for [`Segmentation::Absent`].
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Box detector capability.
///
/// Implementations return exactly one [`Detection`] per input tensor, in
/// input order, with boxes in the tensor's pixel space and scores sorted
/// descending.
pub trait DetectionModel {
    /// Run the detector over a batch.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Inference`] when the model cannot run.
    fn detect(&self, batch: &[NormalizedTensor], scope: ComputeScope) -> Result<Vec<Detection>>;
}

/// Mask predictor capability.
///
/// Implementations return one [`Segmentation`] per input tensor, in input
/// order, using [`Segmentation::Absent`] for images where the model found
/// nothing.
pub trait SegmentationModel {
    /// Run the mask predictor over a batch.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Inference`] when the model cannot run.
    fn segment(&self, batch: &[NormalizedTensor], scope: ComputeScope)
        -> Result<Vec<Segmentation>>;
}

impl<T: DetectionModel + ?Sized> DetectionModel for &T {
    fn detect(&self, batch: &[NormalizedTensor], scope: ComputeScope) -> Result<Vec<Detection>> {
        (**self).detect(batch, scope)
    }
}

impl<T: SegmentationModel + ?Sized> SegmentationModel for &T {
    fn segment(
        &self,
        batch: &[NormalizedTensor],
        scope: ComputeScope,
    ) -> Result<Vec<Segmentation>> {
        (**self).segment(batch, scope)
    }
}
