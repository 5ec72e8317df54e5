use std::cell::RefCell;

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use jewelry_cutout::{
    save_results, ComputeScope, CutoutPipeline, Detection, DetectionModel, Error, ImageSource,
    NormalizedTensor, PipelineConfig, Result, Segmentation, SegmentationModel,
};

/// Returns a preset detection per image and records the scope it ran under.
struct ScriptedDetector {
    detections: Vec<Detection>,
    scopes: RefCell<Vec<ComputeScope>>,
}

impl ScriptedDetector {
    fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            scopes: RefCell::new(Vec::new()),
        }
    }
}

impl DetectionModel for ScriptedDetector {
    fn detect(&self, batch: &[NormalizedTensor], scope: ComputeScope) -> Result<Vec<Detection>> {
        self.scopes.borrow_mut().push(scope);
        assert_eq!(batch.len(), self.detections.len());
        Ok(self.detections.clone())
    }
}

/// Finds a mask for crops whose top-left pixel is bright, nothing otherwise.
struct BrightnessSegmenter {
    score: f32,
}

impl SegmentationModel for BrightnessSegmenter {
    fn segment(&self, batch: &[NormalizedTensor], _: ComputeScope) -> Result<Vec<Segmentation>> {
        Ok(batch
            .iter()
            .map(|t| {
                if t.at(0, 0, 0) > 0.0 {
                    Segmentation::Found {
                        mask: centered_mask(t.width, t.height),
                        score: self.score,
                    }
                } else {
                    Segmentation::Absent
                }
            })
            .collect())
    }
}

struct FailingSegmenter;

impl SegmentationModel for FailingSegmenter {
    fn segment(&self, _: &[NormalizedTensor], _: ComputeScope) -> Result<Vec<Segmentation>> {
        Err(Error::Inference {
            stage: "segmentation",
            message: "out of memory".to_string(),
        })
    }
}

struct FailingDetector;

impl DetectionModel for FailingDetector {
    fn detect(&self, _: &[NormalizedTensor], _: ComputeScope) -> Result<Vec<Detection>> {
        Err(Error::Inference {
            stage: "detection",
            message: "model not loaded".to_string(),
        })
    }
}

fn centered_mask(w: u32, h: u32) -> GrayImage {
    GrayImage::from_fn(w, h, |x, y| {
        let inside = x > w / 4 && x < 3 * w / 4 && y > h / 4 && y < 3 * h / 4;
        Luma([if inside { 255 } else { 0 }])
    })
}

fn photo(width: u32, height: u32, value: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value, value, value])))
}

fn found(score: f32) -> Detection {
    Detection::from_pairs([
        ([100.0, 80.0, 200.0, 220.0], score),
        ([120.0, 60.0, 260.0, 200.0], score - 0.01),
        ([0.0, 0.0, 384.0, 384.0], 0.1),
    ])
}

fn config() -> PipelineConfig {
    PipelineConfig {
        gaussian_blur_radius: 3.0,
        ..PipelineConfig::default()
    }
}

#[test]
fn batch_order_is_preserved_with_absent_segmentations() {
    let sizes = [(300, 200), (640, 480), (200, 200), (120, 400), (500, 100)];
    let values = [250, 10, 240, 5, 230];
    let images: Vec<_> = sizes
        .iter()
        .zip(values)
        .map(|(&(w, h), v)| photo(w, h, v))
        .collect();

    let pipeline = CutoutPipeline::new(
        ScriptedDetector::new(vec![found(0.99); 5]),
        BrightnessSegmenter { score: 0.995 },
        config(),
    )
    .unwrap();
    let out = pipeline.process(images).unwrap();

    assert_eq!(out.len(), 5);
    for (i, item) in out.iter().enumerate() {
        assert_eq!(
            (item.original_image.width(), item.original_image.height()),
            sizes[i]
        );
        assert!(item.cropped_image.is_some(), "image #{i} should be cropped");
        let bright = values[i] > 128;
        assert_eq!(item.has_segmentation(), bright, "image #{i}");
        assert_eq!(item.final_image.is_some(), bright, "image #{i}");
        assert_eq!(item.mask.is_some(), bright, "image #{i}");
    }
}

#[test]
fn merged_box_spans_both_leading_candidates() {
    let pipeline = CutoutPipeline::new(
        ScriptedDetector::new(vec![found(0.99)]),
        BrightnessSegmenter { score: 0.995 },
        PipelineConfig {
            box_margin: 0.0,
            ..config()
        },
    )
    .unwrap();
    let out = pipeline.process(vec![photo(384, 384, 200)]).unwrap();

    // union of the two boxes above 0.8: x 100..260, y 60..220
    let crop = out[0].cropped_image.as_ref().unwrap();
    assert_eq!(crop.dimensions(), (160, 160));
    assert_eq!(out[0].detection_confidence, Some(0.99));
}

#[test]
fn gating_keeps_confidences_and_originals() {
    let cfg = PipelineConfig {
        show_bad_results: false,
        ..config()
    };
    let pipeline = CutoutPipeline::new(
        ScriptedDetector::new(vec![found(0.5)]),
        BrightnessSegmenter { score: 0.9 },
        cfg,
    )
    .unwrap();
    let out = pipeline.process(vec![photo(300, 300, 220)]).unwrap();

    let item = &out[0];
    assert!(item.cropped_image.is_none());
    assert!(item.final_image.is_none());
    assert_eq!(item.detection_confidence, Some(0.5));
    assert_eq!(item.segmentation_confidence, Some(0.9));
    assert_eq!(item.original_image.width(), 300);
}

#[test]
fn show_bad_results_keeps_low_confidence_fields() {
    let pipeline = CutoutPipeline::new(
        ScriptedDetector::new(vec![found(0.5)]),
        BrightnessSegmenter { score: 0.9 },
        config(),
    )
    .unwrap();
    let out = pipeline.process(vec![photo(300, 300, 220)]).unwrap();
    assert!(out[0].cropped_image.is_some());
    assert!(out[0].final_image.is_some());
}

#[test]
fn segmentation_failure_degrades_every_item() {
    let pipeline = CutoutPipeline::new(
        ScriptedDetector::new(vec![found(0.99), found(0.99)]),
        FailingSegmenter,
        config(),
    )
    .unwrap();
    let out = pipeline
        .process(vec![photo(100, 100, 200), photo(50, 80, 200)])
        .unwrap();
    assert_eq!(out.len(), 2);
    for item in &out {
        assert!(item.cropped_image.is_some());
        assert!(item.mask.is_none());
        assert!(item.segmentation_confidence.is_none());
        assert!(item.final_image.is_none());
    }
}

#[test]
fn detection_failure_aborts_the_batch() {
    let pipeline = CutoutPipeline::new(
        FailingDetector,
        BrightnessSegmenter { score: 0.995 },
        config(),
    )
    .unwrap();
    let err = pipeline.process(vec![photo(10, 10, 0)]).unwrap_err();
    assert!(matches!(err, Error::Inference { stage: "detection", .. }));
}

#[test]
fn compute_scope_reaches_the_models() {
    let detector = ScriptedDetector::new(vec![found(0.99)]);
    let cfg = PipelineConfig {
        compute_scope: ComputeScope::Accelerated,
        ..config()
    };
    let pipeline =
        CutoutPipeline::new(&detector, BrightnessSegmenter { score: 0.995 }, cfg).unwrap();
    pipeline.process(vec![photo(64, 64, 200)]).unwrap();
    assert_eq!(*detector.scopes.borrow(), vec![ComputeScope::Accelerated]);
}

#[test]
fn process_sources_fails_fast_on_bad_input() {
    let pipeline = CutoutPipeline::new(
        ScriptedDetector::new(vec![found(0.99); 2]),
        BrightnessSegmenter { score: 0.995 },
        config(),
    )
    .unwrap();
    let err = pipeline
        .process_sources(vec![
            ImageSource::from(photo(20, 20, 200)),
            ImageSource::from(vec![0u8, 1, 2, 3]),
        ])
        .unwrap_err();
    assert!(matches!(err, Error::Ingestion { index: 1, .. }));
}

#[test]
fn save_results_writes_numbered_files() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");

    let pipeline = CutoutPipeline::new(
        ScriptedDetector::new(vec![found(0.99), Detection::default(), found(0.99)]),
        BrightnessSegmenter { score: 0.995 },
        config(),
    )
    .unwrap();
    let results = pipeline
        .process(vec![
            photo(120, 120, 200),
            photo(120, 120, 200),
            photo(120, 120, 10),
        ])
        .unwrap();

    let written = save_results(&results, &out_dir).unwrap();
    let names: Vec<String> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "cropped_image_1.png",
            "image_segmented_1.png",
            "image_cutout_1.png",
            "cropped_image_3.png",
        ]
    );
    for path in &written {
        assert!(path.is_file());
    }

    let reloaded = image::open(out_dir.join("image_segmented_1.png")).unwrap();
    let crop = results[0].cropped_image.as_ref().unwrap();
    assert_eq!((reloaded.width(), reloaded.height()), crop.dimensions());
}
