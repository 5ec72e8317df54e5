//! Batch orchestration: detect, crop, segment, clean, composite, gate.

use std::time::Instant;

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use log::{debug, warn};

use crate::blending;
use crate::config::PipelineConfig;
use crate::crop;
use crate::detection::{AggregatedBox, BoxAggregator};
use crate::error::{Error, Result};
use crate::io::{self, ImageSource};
use crate::mask;
use crate::model::{to_tensor, DetectionModel, Segmentation, SegmentationModel};

/// Everything the pipeline produced for one input image.
///
/// Absent fields mean "no result for this image": no detection, no mask,
/// or a value suppressed by quality gating. Confidences are never gated.
#[derive(Debug, Clone)]
pub struct ItemResult {
    /// The input image as supplied by the caller.
    pub original_image: DynamicImage,
    /// Crop around the merged detection box.
    pub cropped_image: Option<RgbImage>,
    /// Score of the top detection; `None` when the detector found nothing.
    pub detection_confidence: Option<f32>,
    /// Cleaned alpha mask at the crop's resolution.
    pub mask: Option<GrayImage>,
    /// Score of the top mask instance.
    pub segmentation_confidence: Option<f32>,
    /// Crop blended over its blurred copy.
    pub final_image: Option<RgbImage>,
    /// Crop with the cleaned mask as its alpha channel.
    pub cutout: Option<RgbaImage>,
}

impl ItemResult {
    fn empty(original_image: DynamicImage) -> Self {
        Self {
            original_image,
            cropped_image: None,
            detection_confidence: None,
            mask: None,
            segmentation_confidence: None,
            final_image: None,
            cutout: None,
        }
    }

    /// Whether the detector produced at least one box for this image.
    #[must_use]
    pub fn has_detection(&self) -> bool {
        self.detection_confidence.is_some()
    }

    /// Whether the mask predictor produced a mask for this image.
    #[must_use]
    pub fn has_segmentation(&self) -> bool {
        self.segmentation_confidence.is_some()
    }
}

/// Runs both models over a batch and post-processes their output.
///
/// Create once with the two capabilities and reuse for many batches. No
/// state is carried from one call to the next.
pub struct CutoutPipeline<D, S> {
    detector: D,
    segmenter: S,
    aggregator: BoxAggregator,
    config: PipelineConfig,
}

impl<D: DetectionModel, S: SegmentationModel> CutoutPipeline<D, S> {
    /// Build a pipeline around a detector and a mask predictor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` fails validation.
    pub fn new(detector: D, segmenter: S, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let aggregator = BoxAggregator::new(config.model_shape)
            .with_ladder(config.threshold_ladder.clone(), config.ladder_mode);
        Ok(Self {
            detector,
            segmenter,
            aggregator,
            config,
        })
    }

    /// The configuration this pipeline runs with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Decode every source, then process them as one batch.
    ///
    /// Decoding is fail-fast: the first source that cannot be decoded aborts
    /// the call before any model runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ingestion`] for an undecodable source, or any error
    /// from [`CutoutPipeline::process`].
    pub fn process_sources(&self, sources: Vec<ImageSource>) -> Result<Vec<ItemResult>> {
        let images = io::load_images(sources)?;
        self.process(images)
    }

    /// Process a batch, returning one result per image in input order.
    ///
    /// An image without detections or without a mask degrades to absent
    /// fields; it never aborts the rest of the batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inference`] or [`Error::BatchMismatch`] when the
    /// detector fails for the whole batch.
    pub fn process(&self, images: Vec<DynamicImage>) -> Result<Vec<ItemResult>> {
        let cfg = &self.config;
        let batch_started = Instant::now();

        let rgb: Vec<RgbImage> = images.iter().map(DynamicImage::to_rgb8).collect();
        let mut results: Vec<ItemResult> = images.into_iter().map(ItemResult::empty).collect();
        if rgb.is_empty() {
            return Ok(results);
        }

        let boxes = self.detect(&rgb)?;

        let mut crops: Vec<Option<RgbImage>> = Vec::with_capacity(rgb.len());
        for (index, (image, agg)) in rgb.iter().zip(&boxes).enumerate() {
            let Some(agg) = agg else {
                warn!("{}", Error::NoDetection { index });
                crops.push(None);
                continue;
            };
            debug!(
                "image #{index}: merged {} boxes, confidence {:.3}, box ({:.3}, {:.3}, {:.3}, {:.3})",
                agg.merged, agg.confidence, agg.rbox.x1, agg.rbox.y1, agg.rbox.x2, agg.rbox.y2
            );
            results[index].detection_confidence = Some(agg.confidence);
            crops.push(Some(crop::crop(image, agg.rbox)));
        }

        let segmentations = self.segment(&crops);

        for (index, (item, (crop, seg))) in results
            .iter_mut()
            .zip(crops.into_iter().zip(segmentations))
            .enumerate()
        {
            let Some(crop) = crop else {
                continue;
            };

            match seg {
                Segmentation::Found { mask: raw, score } => {
                    let resized = mask::resize_mask(&raw, crop.width(), crop.height());
                    let alpha = mask::clean_mask(
                        &resized,
                        cfg.mask_clean_threshold,
                        cfg.mask_min_floor,
                    );
                    let composite =
                        blending::composite(&crop, &alpha, &resized, cfg.gaussian_blur_radius);

                    item.segmentation_confidence = Some(score);
                    item.mask = Some(alpha);
                    item.final_image = Some(composite.image);
                    item.cutout = Some(composite.cutout);
                }
                Segmentation::Absent => {
                    warn!("image #{index}: no segmentation output");
                }
            }
            item.cropped_image = Some(crop);

            if cfg.gating_enabled() {
                self.gate(index, item);
            }
        }

        debug!(
            "processed batch of {} in {:.2?}",
            results.len(),
            batch_started.elapsed()
        );
        Ok(results)
    }

    /// Run the detector and aggregate each image's boxes.
    fn detect(&self, images: &[RgbImage]) -> Result<Vec<Option<AggregatedBox>>> {
        let cfg = &self.config;
        let started = Instant::now();

        let tensors: Vec<_> = images
            .iter()
            .map(|img| to_tensor(img, cfg.model_shape))
            .collect();
        let detections = self.detector.detect(&tensors, cfg.compute_scope)?;
        if detections.len() != images.len() {
            return Err(Error::BatchMismatch {
                stage: "detection",
                expected: images.len(),
                actual: detections.len(),
            });
        }
        debug!(
            "detection over {} images took {:.2?}",
            images.len(),
            started.elapsed()
        );

        Ok(detections
            .iter()
            .map(|d| self.aggregator.aggregate(d, cfg.box_margin))
            .collect())
    }

    /// Run the mask predictor over every available crop.
    ///
    /// Returns one entry per crop slot; slots without a crop and images the
    /// model could not handle are [`Segmentation::Absent`].
    fn segment(&self, crops: &[Option<RgbImage>]) -> Vec<Segmentation> {
        let cfg = &self.config;
        let mut out = vec![Segmentation::Absent; crops.len()];

        let present: Vec<(usize, &RgbImage)> = crops
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i, c)))
            .collect();
        if present.is_empty() {
            return out;
        }

        let started = Instant::now();
        let tensors: Vec<_> = present
            .iter()
            .map(|(_, c)| to_tensor(c, cfg.model_shape))
            .collect();

        let segs = match self.segmenter.segment(&tensors, cfg.compute_scope) {
            Ok(segs) => segs,
            Err(e) => {
                warn!("{e}; marking {} images without mask", present.len());
                return out;
            }
        };
        if segs.len() != present.len() {
            warn!(
                "{}",
                Error::BatchMismatch {
                    stage: "segmentation",
                    expected: present.len(),
                    actual: segs.len(),
                }
            );
        }
        debug!(
            "segmentation over {} crops took {:.2?}",
            present.len(),
            started.elapsed()
        );

        for ((slot, _), seg) in present.iter().zip(segs) {
            out[*slot] = seg;
        }
        out
    }

    /// Drop fields whose confidence is below the configured thresholds.
    fn gate(&self, index: usize, item: &mut ItemResult) {
        let cfg = &self.config;
        if item
            .detection_confidence
            .is_some_and(|c| c < cfg.threshold_detect)
        {
            debug!("image #{index}: crop hidden by detection threshold");
            item.cropped_image = None;
        }
        if item
            .segmentation_confidence
            .is_some_and(|c| c < cfg.threshold_segmentation)
        {
            debug!("image #{index}: composite hidden by segmentation threshold");
            item.final_image = None;
            item.cutout = None;
        }
    }
}
