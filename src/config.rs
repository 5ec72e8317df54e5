//! Pipeline configuration.

use crate::detection::{LadderMode, DEFAULT_THRESHOLD_LADDER};
use crate::error::{Error, Result};
use crate::model::ComputeScope;

/// Fixed input resolution of both models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelShape {
    /// Input width in pixels.
    pub width: u32,
    /// Input height in pixels.
    pub height: u32,
}

impl Default for ModelShape {
    fn default() -> Self {
        Self {
            width: 384,
            height: 384,
        }
    }
}

/// Options controlling box aggregation, mask cleanup, compositing and gating.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Input shape shared by the detector and the mask predictor.
    pub model_shape: ModelShape,
    /// Relative margin added around the merged box (0.05 = 5% of each side).
    pub box_margin: f32,
    /// Detection confidence below which the crop is hidden when gating.
    pub threshold_detect: f32,
    /// Segmentation confidence below which the composite is hidden when gating.
    pub threshold_segmentation: f32,
    /// Soft-threshold applied to the mask; `None` keeps the raw mask.
    pub mask_clean_threshold: Option<f32>,
    /// Lowest alpha a cleaned mask may reach, as a fraction of 255.
    pub mask_min_floor: f32,
    /// Gaussian blur sigma for the background copy.
    pub gaussian_blur_radius: f32,
    /// Keep low-confidence crops and composites instead of dropping them.
    pub show_bad_results: bool,
    /// Descending score thresholds tried when picking boxes to merge.
    pub threshold_ladder: Vec<f32>,
    /// How the ladder is walked.
    pub ladder_mode: LadderMode,
    /// Execution context passed to every inference call.
    pub compute_scope: ComputeScope,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_shape: ModelShape::default(),
            box_margin: 0.05,
            threshold_detect: 0.98,
            threshold_segmentation: 0.99,
            mask_clean_threshold: Some(0.9),
            mask_min_floor: 0.1,
            gaussian_blur_radius: 20.0,
            show_bad_results: true,
            threshold_ladder: DEFAULT_THRESHOLD_LADDER.to_vec(),
            ladder_mode: LadderMode::default(),
            compute_scope: ComputeScope::default(),
        }
    }
}

impl PipelineConfig {
    /// Whether low-confidence fields are suppressed from results.
    #[must_use]
    pub fn gating_enabled(&self) -> bool {
        !self.show_bad_results
    }

    /// Check that every value is within its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.model_shape.width == 0 || self.model_shape.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "model shape must be non-zero, got {}x{}",
                self.model_shape.width, self.model_shape.height
            )));
        }

        let unit_fields = [
            ("box_margin", self.box_margin),
            ("threshold_detect", self.threshold_detect),
            ("threshold_segmentation", self.threshold_segmentation),
            ("mask_min_floor", self.mask_min_floor),
        ];
        for (name, value) in unit_fields {
            check_unit(name, value)?;
        }
        if let Some(t) = self.mask_clean_threshold {
            check_unit("mask_clean_threshold", t)?;
        }
        for &step in &self.threshold_ladder {
            check_unit("threshold_ladder", step)?;
        }

        if !self.gaussian_blur_radius.is_finite() || self.gaussian_blur_radius < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "gaussian_blur_radius must be finite and >= 0, got {}",
                self.gaussian_blur_radius
            )));
        }

        Ok(())
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )))
    }
}
