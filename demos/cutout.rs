//! Run the post-processing on one image with recorded model outputs.
//!
//! Usage:
//! ```sh
//! cargo run --example cutout -- ring.jpg out/
//! ```
//!
//! Expects `ring.boxes.txt` (and optionally `ring.mask.png`) next to the image.

use std::env;
use std::path::Path;
use std::process;

use jewelry_cutout::replay::{ReplayDetector, ReplaySegmenter, Sidecars};
use jewelry_cutout::{save_results, CutoutPipeline, ImageSource, PipelineConfig};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <image> <output_dir>", args[0]);
        process::exit(1);
    }

    let input = Path::new(&args[1]);
    let output = Path::new(&args[2]);

    let sidecars = Sidecars::load(input).expect("failed to read sidecar files");
    let pipeline = CutoutPipeline::new(
        ReplayDetector::new(vec![sidecars.detection]),
        ReplaySegmenter::new(vec![sidecars.segmentation]),
        PipelineConfig::default(),
    )
    .expect("default config is valid");

    match pipeline.process_sources(vec![ImageSource::from(input)]) {
        Ok(results) => {
            let item = &results[0];
            println!(
                "detection {:?}, segmentation {:?}",
                item.detection_confidence, item.segmentation_confidence
            );
            match save_results(&results, output) {
                Ok(paths) => println!("Wrote {} files", paths.len()),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
