//! Box aggregation over raw detector output.
//!
//! The detector returns many overlapping candidates per image. Aggregation
//! keeps the leading candidates that clear the threshold ladder, merges them
//! into their union box and expresses it relative to the model's input shape:
//! 1. **Count** candidates above the ladder cutoff (fallback: 1)
//! 2. **Merge** the first `n` boxes into one union box
//! 3. **Normalize** by the model shape, then pad by the margin

use crate::config::ModelShape;

/// Descending score cutoffs walked when counting candidates.
pub const DEFAULT_THRESHOLD_LADDER: [f32; 4] = [0.8, 0.7, 0.6, 0.5];

/// One candidate box with its confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredBox {
    /// `[x_min, y_min, x_max, y_max]` in model input pixels.
    pub bbox: [f32; 4],
    /// Confidence in `[0, 1]`.
    pub score: f32,
}

/// Detector output for a single image, ordered by descending score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    /// Candidate boxes as produced by the model.
    pub boxes: Vec<ScoredBox>,
}

impl Detection {
    /// Build a detection from `(bbox, score)` pairs.
    #[must_use]
    pub fn from_pairs(pairs: impl IntoIterator<Item = ([f32; 4], f32)>) -> Self {
        Self {
            boxes: pairs
                .into_iter()
                .map(|(bbox, score)| ScoredBox { bbox, score })
                .collect(),
        }
    }

    /// Returns `true` when the detector produced no candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Score of the first candidate, if any.
    #[must_use]
    pub fn top_score(&self) -> Option<f32> {
        self.boxes.first().map(|b| b.score)
    }
}

/// Crop region as fractions of image width and height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeBox {
    /// Left edge.
    pub x1: f32,
    /// Top edge.
    pub y1: f32,
    /// Right edge.
    pub x2: f32,
    /// Bottom edge.
    pub y2: f32,
}

impl RelativeBox {
    /// The whole image.
    pub const FULL: Self = Self {
        x1: 0.0,
        y1: 0.0,
        x2: 1.0,
        y2: 1.0,
    };

    /// Divide a model-space box by the model's input shape.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_model_box(bbox: [f32; 4], shape: ModelShape) -> Self {
        let w = shape.width as f32;
        let h = shape.height as f32;
        Self {
            x1: bbox[0] / w,
            y1: bbox[1] / h,
            x2: bbox[2] / w,
            y2: bbox[3] / h,
        }
    }

    /// Grow the box by `margin` on every side, clamped to `[0, 1]`.
    ///
    /// A non-positive margin leaves the box untouched, including any
    /// coordinates outside the unit square.
    #[must_use]
    pub fn with_margin(self, margin: f32) -> Self {
        if margin <= 0.0 {
            return self;
        }
        Self {
            x1: (self.x1 - margin).max(0.0),
            y1: (self.y1 - margin).max(0.0),
            x2: (self.x2 + margin).min(1.0),
            y2: (self.y2 + margin).min(1.0),
        }
    }
}

/// How the threshold ladder is walked when counting candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LadderMode {
    /// Every step counts scores above the ladder's highest value.
    #[default]
    TopStepOnly,
    /// Each step counts scores above its own value.
    Relaxing,
}

/// Result of aggregating one image's detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatedBox {
    /// Merged region, relative to the image.
    pub rbox: RelativeBox,
    /// Score of the first candidate, regardless of how many were merged.
    pub confidence: f32,
    /// Number of candidates merged into `rbox`.
    pub merged: usize,
}

/// Merges per-image candidates into a single relative crop region.
#[derive(Debug, Clone)]
pub struct BoxAggregator {
    shape: ModelShape,
    ladder: Vec<f32>,
    mode: LadderMode,
}

impl BoxAggregator {
    /// Aggregator for boxes produced at `shape`, using the default ladder.
    #[must_use]
    pub fn new(shape: ModelShape) -> Self {
        Self {
            shape,
            ladder: DEFAULT_THRESHOLD_LADDER.to_vec(),
            mode: LadderMode::default(),
        }
    }

    /// Replace the threshold ladder and the way it is walked.
    #[must_use]
    pub fn with_ladder(mut self, ladder: Vec<f32>, mode: LadderMode) -> Self {
        self.ladder = ladder;
        self.mode = mode;
        self
    }

    /// Number of leading candidates to merge for these scores.
    ///
    /// Never less than 1, even when no score clears any step.
    #[must_use]
    pub fn candidate_count(&self, scores: &[f32]) -> usize {
        let top = self
            .ladder
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);

        let mut count = 0;
        for &step in &self.ladder {
            // TopStepOnly keeps the historical cutoff: the count does not
            // depend on `step`.
            let cutoff = match self.mode {
                LadderMode::TopStepOnly => top,
                LadderMode::Relaxing => step,
            };
            count = scores.iter().filter(|&&s| s > cutoff).count();
            if count > 0 {
                break;
            }
        }
        count.max(1)
    }

    /// Merge one image's candidates into a padded relative box.
    ///
    /// Returns `None` when the detection holds no candidates.
    #[must_use]
    pub fn aggregate(&self, detection: &Detection, margin: f32) -> Option<AggregatedBox> {
        let confidence = detection.top_score()?;

        let scores: Vec<f32> = detection.boxes.iter().map(|b| b.score).collect();
        let n = self.candidate_count(&scores).min(detection.boxes.len());
        let merged = union_box(&detection.boxes[..n]);

        Some(AggregatedBox {
            rbox: RelativeBox::from_model_box(merged, self.shape).with_margin(margin),
            confidence,
            merged: n,
        })
    }
}

/// Union bounding box of a non-empty set of candidates.
fn union_box(boxes: &[ScoredBox]) -> [f32; 4] {
    boxes.iter().fold(
        [
            f32::INFINITY,
            f32::INFINITY,
            f32::NEG_INFINITY,
            f32::NEG_INFINITY,
        ],
        |acc, b| {
            [
                acc[0].min(b.bbox[0]),
                acc[1].min(b.bbox[1]),
                acc[2].max(b.bbox[2]),
                acc[3].max(b.bbox[3]),
            ]
        },
    )
}
