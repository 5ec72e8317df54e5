//! Turn box-detector and mask-predictor output into soft-edged jewelry cutouts.
//!
//! Two models run over a batch of photos: a detector that proposes boxes
//! with scores, and a mask predictor that runs on the resulting crops. This
//! crate does everything around them: it merges boxes into one crop region
//! per photo, crops, cleans the predicted mask into an alpha channel and
//! blends the crop over a blurred copy of itself so the background fades
//! out around the item.
//!
//! # Quick Start
//!
//! ```no_run
//! use jewelry_cutout::{CutoutPipeline, ImageSource, PipelineConfig};
//! use jewelry_cutout::replay::{ReplayDetector, ReplaySegmenter};
//! # let (detections, masks) = (Vec::new(), Vec::new());
//!
//! let pipeline = CutoutPipeline::new(
//!     ReplayDetector::new(detections),
//!     ReplaySegmenter::new(masks),
//!     PipelineConfig::default(),
//! )
//! .expect("valid config");
//! let results = pipeline
//!     .process_sources(vec![ImageSource::from(std::path::Path::new("ring.jpg"))])
//!     .unwrap();
//! for item in &results {
//!     println!("detection {:?}, mask {:?}", item.detection_confidence, item.segmentation_confidence);
//! }
//! ```
//!
//! # Models
//!
//! Real models plug in through [`DetectionModel`] and [`SegmentationModel`].
//! Both receive normalized tensors at [`ModelShape`] (384x384 by default)
//! and the [`ComputeScope`] chosen by the caller.

#![deny(missing_docs)]

pub mod blending;
pub mod config;
pub mod crop;
pub mod detection;
mod engine;
pub mod error;
pub mod io;
pub mod mask;
pub mod model;
pub mod replay;

pub use config::{ModelShape, PipelineConfig};
pub use detection::{BoxAggregator, Detection, LadderMode, RelativeBox, ScoredBox};
pub use engine::{CutoutPipeline, ItemResult};
pub use error::{Error, Result};
pub use io::{load_images, save_results, ImageSource};
pub use model::{ComputeScope, DetectionModel, NormalizedTensor, Segmentation, SegmentationModel};
