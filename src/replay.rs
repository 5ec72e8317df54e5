//! Model capabilities backed by precomputed outputs.
//!
//! Useful for running the post-processing on outputs recorded elsewhere.
//! Each image `ring.jpg` may carry sidecar files next to it:
//!
//! - `ring.boxes.txt`: one `x1 y1 x2 y2 score` line per candidate, in model
//!   input pixels, highest score first
//! - `ring.mask.png`: the soft mask (any color type, read as luma)
//! - `ring.mask.txt`: the mask score
//!
//! A missing boxes file means no detection; a missing mask means absent
//! segmentation.

use std::path::{Path, PathBuf};

use image::GrayImage;

use crate::detection::{Detection, ScoredBox};
use crate::error::{Error, Result};
use crate::model::{
    ComputeScope, DetectionModel, NormalizedTensor, Segmentation, SegmentationModel,
};

/// Detector that returns recorded detections in batch order.
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    detections: Vec<Detection>,
}

impl ReplayDetector {
    /// Replay `detections`, one per image.
    #[must_use]
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl DetectionModel for ReplayDetector {
    fn detect(&self, batch: &[NormalizedTensor], _: ComputeScope) -> Result<Vec<Detection>> {
        check_len("detection", batch.len(), self.detections.len())?;
        Ok(self.detections.clone())
    }
}

/// Mask predictor that returns recorded masks in batch order.
///
/// The pipeline only sends crops of detected images, so the recorded list
/// must skip images without a detection.
#[derive(Debug, Clone, Default)]
pub struct ReplaySegmenter {
    segmentations: Vec<Segmentation>,
}

impl ReplaySegmenter {
    /// Replay `segmentations`, one per crop.
    #[must_use]
    pub fn new(segmentations: Vec<Segmentation>) -> Self {
        Self { segmentations }
    }
}

impl SegmentationModel for ReplaySegmenter {
    fn segment(
        &self,
        batch: &[NormalizedTensor],
        _: ComputeScope,
    ) -> Result<Vec<Segmentation>> {
        check_len("segmentation", batch.len(), self.segmentations.len())?;
        Ok(self.segmentations.clone())
    }
}

fn check_len(stage: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::BatchMismatch {
            stage,
            expected,
            actual,
        })
    }
}

/// Parse `x1 y1 x2 y2 score` lines into a detection.
///
/// Blank lines and lines starting with `#` are ignored.
///
/// # Errors
///
/// Returns [`Error::Replay`] naming the first malformed line.
pub fn parse_detections(text: &str) -> Result<Detection> {
    let mut boxes = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values = line
            .split_whitespace()
            .map(str::parse::<f32>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Replay(format!("line {}: {e}", lineno + 1)))?;
        let [x1, y1, x2, y2, score] = values[..] else {
            return Err(Error::Replay(format!(
                "line {}: expected 5 values, got {}",
                lineno + 1,
                values.len()
            )));
        };
        boxes.push(ScoredBox {
            bbox: [x1, y1, x2, y2],
            score,
        });
    }
    Ok(Detection { boxes })
}

/// Recorded model outputs for one image.
#[derive(Debug, Clone)]
pub struct Sidecars {
    /// Recorded detection, empty if no boxes file exists.
    pub detection: Detection,
    /// Recorded mask, absent if no mask file exists.
    pub segmentation: Segmentation,
}

impl Sidecars {
    /// Read the sidecar files that belong to `image_path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Replay`] for malformed text files, or the I/O and
    /// decode errors of files that exist but cannot be read.
    pub fn load(image_path: &Path) -> Result<Self> {
        let boxes_path = sidecar(image_path, "boxes.txt");
        let detection = if boxes_path.is_file() {
            parse_detections(&std::fs::read_to_string(&boxes_path)?)?
        } else {
            Detection::default()
        };

        let mask_path = sidecar(image_path, "mask.png");
        let segmentation = if mask_path.is_file() {
            let mask: GrayImage = image::open(&mask_path)?.to_luma8();
            let score_path = sidecar(image_path, "mask.txt");
            let score = if score_path.is_file() {
                let text = std::fs::read_to_string(&score_path)?;
                text.trim().parse::<f32>().map_err(|e| {
                    Error::Replay(format!("{}: {e}", score_path.display()))
                })?
            } else {
                1.0
            };
            Segmentation::Found { mask, score }
        } else {
            Segmentation::Absent
        };

        Ok(Self {
            detection,
            segmentation,
        })
    }
}

/// `dir/ring.jpg` + `boxes.txt` -> `dir/ring.boxes.txt`.
fn sidecar(image_path: &Path, suffix: &str) -> PathBuf {
    let stem = image_path.file_stem().unwrap_or_default().to_string_lossy();
    image_path.with_file_name(format!("{stem}.{suffix}"))
}
