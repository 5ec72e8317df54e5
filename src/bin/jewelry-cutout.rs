use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use log::{error, LevelFilter};
use rayon::prelude::*;

use jewelry_cutout::io::{is_supported_image, save_results_numbered};
use jewelry_cutout::replay::{ReplayDetector, ReplaySegmenter, Sidecars};
use jewelry_cutout::{
    CutoutPipeline, ImageSource, ItemResult, LadderMode, ModelShape, PipelineConfig, Result,
};

/// First image number, the batch's paths, and what the pipeline made of them.
type BatchOutcome<'a> = (usize, &'a [PathBuf], Result<Vec<ItemResult>>);

#[derive(Parser)]
#[command(
    name = "jewelry-cutout",
    about = "Crop and soft-matte jewelry from recorded detector and mask outputs",
    version,
    after_help = "Each image <name>.<ext> is paired with sidecar files next to it:\n  \
                  <name>.boxes.txt  one `x1 y1 x2 y2 score` line per box (model pixels)\n  \
                  <name>.mask.png   soft mask from the mask predictor\n  \
                  <name>.mask.txt   mask score (default 1.0)"
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input image file or directory
    input: String,

    /// Output directory for crops and composites
    #[arg(short, long)]
    output: PathBuf,

    /// Relative margin added around the merged box
    #[arg(long, default_value = "0.05")]
    margin: f32,

    /// Detection confidence below which crops are hidden
    #[arg(long, default_value = "0.98")]
    threshold_detect: f32,

    /// Mask confidence below which composites are hidden
    #[arg(long, default_value = "0.99")]
    threshold_segmentation: f32,

    /// Mask soft-threshold (0.0-1.0)
    #[arg(long, default_value = "0.9")]
    mask_threshold: f32,

    /// Keep the raw mask as alpha
    #[arg(long)]
    no_mask_clean: bool,

    /// Lowest alpha of a cleaned mask (0.0-1.0)
    #[arg(long, default_value = "0.1")]
    min_floor: f32,

    /// Gaussian blur sigma for the background
    #[arg(long, default_value = "20")]
    blur: f32,

    /// Drop crops and composites below the confidence thresholds
    #[arg(long)]
    hide_bad_results: bool,

    /// Square model input size the boxes were produced at
    #[arg(long, default_value = "384")]
    model_size: u32,

    /// Images per pipeline batch
    #[arg(long, default_value = "4")]
    batch_size: usize,

    /// Lower the box cutoff step by step instead of using the top step only
    #[arg(long)]
    relaxing_ladder: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            model_shape: ModelShape {
                width: self.model_size,
                height: self.model_size,
            },
            box_margin: self.margin,
            threshold_detect: self.threshold_detect,
            threshold_segmentation: self.threshold_segmentation,
            mask_clean_threshold: (!self.no_mask_clean).then_some(self.mask_threshold),
            mask_min_floor: self.min_floor,
            gaussian_blur_radius: self.blur,
            show_bad_results: !self.hide_bad_results,
            ladder_mode: if self.relaxing_ladder {
                LadderMode::Relaxing
            } else {
                LadderMode::TopStepOnly
            },
            ..PipelineConfig::default()
        }
    }

    fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.log_level().as_str()),
    )
    .init();

    if cli.batch_size == 0 {
        eprintln!("Error: Batch size must be at least 1");
        process::exit(1);
    }

    let config = cli.config();
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    let input_path = Path::new(&cli.input);
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {}", cli.input);
        process::exit(1);
    }

    let images = match collect_images(input_path) {
        Ok(images) => images,
        Err(e) => {
            eprintln!("Error: Failed to read directory: {e}");
            process::exit(1);
        }
    };

    let batches: Vec<(usize, &[PathBuf])> = images
        .chunks(cli.batch_size)
        .enumerate()
        .map(|(i, chunk)| (i * cli.batch_size, chunk))
        .collect();

    let outcomes: Vec<BatchOutcome<'_>> = batches
        .par_iter()
        .map(|&(first, paths)| (first, paths, run_batch(paths, &config, &cli.output, first)))
        .collect();

    let mut ok_count = 0u32;
    let mut partial_count = 0u32;
    let mut fail_count = 0u32;

    for (first, paths, outcome) in &outcomes {
        match outcome {
            Ok(results) => {
                for (offset, (path, item)) in paths.iter().zip(results).enumerate() {
                    if print_item(first + offset + 1, path, item, cli.quiet) {
                        ok_count += 1;
                    } else {
                        partial_count += 1;
                    }
                }
            }
            Err(e) => {
                error!("batch starting at image {} failed: {e}", first + 1);
                for path in *paths {
                    eprintln!("[FAIL] {}: {e}", file_name(path));
                }
                #[allow(clippy::cast_possible_truncation)]
                {
                    fail_count += paths.len() as u32;
                }
            }
        }
    }

    if images.len() > 1 && !cli.quiet {
        eprintln!();
        eprint!("[Summary] Complete: {ok_count}");
        if partial_count > 0 {
            eprint!(", Partial: {partial_count}");
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", images.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

/// A single file, or every supported image in a directory sorted by name.
fn collect_images(input: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !input.is_dir() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut images: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_ok_and(|ft| ft.is_file()))
        .map(|e| e.path())
        .filter(|p| is_supported_image(p))
        .collect();
    images.sort();
    Ok(images)
}

fn run_batch(
    paths: &[PathBuf],
    config: &PipelineConfig,
    output: &Path,
    first: usize,
) -> Result<Vec<ItemResult>> {
    let mut detections = Vec::with_capacity(paths.len());
    let mut masks = Vec::new();
    for path in paths {
        let sidecars = Sidecars::load(path)?;
        if !sidecars.detection.is_empty() {
            masks.push(sidecars.segmentation);
        }
        detections.push(sidecars.detection);
    }

    let pipeline = CutoutPipeline::new(
        ReplayDetector::new(detections),
        ReplaySegmenter::new(masks),
        config.clone(),
    )?;
    let sources = paths.iter().map(|p| ImageSource::from(p.as_path())).collect();
    let results = pipeline.process_sources(sources)?;
    save_results_numbered(&results, output, first + 1)?;
    Ok(results)
}

/// Print one status line; returns `true` when both crop and composite exist.
fn print_item(n: usize, path: &Path, item: &ItemResult, quiet: bool) -> bool {
    let name = file_name(path);
    let complete = item.cropped_image.is_some() && item.final_image.is_some();
    if quiet {
        return complete;
    }

    let pct = |c: Option<f32>| c.map_or_else(|| "-".to_string(), |c| format!("{:.0}%", c * 100.0));
    let scores = format!(
        "detection {}, mask {}",
        pct(item.detection_confidence),
        pct(item.segmentation_confidence)
    );

    if !item.has_detection() {
        eprintln!("[SKIP] #{n} {name}: no detection");
    } else if complete {
        eprintln!("[OK] #{n} {name} ({scores})");
    } else if !item.has_segmentation() {
        eprintln!("[PART] #{n} {name}: no mask ({scores})");
    } else {
        eprintln!("[PART] #{n} {name}: below threshold ({scores})");
    }
    complete
}

fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}
