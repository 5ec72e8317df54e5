//! Image ingestion and result persistence.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::info;

use crate::engine::ItemResult;
use crate::error::{Error, Result};

/// One input image, in any of the accepted forms.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// A file on disk, format guessed from its content.
    Path(PathBuf),
    /// An encoded image held in memory.
    Bytes(Vec<u8>),
    /// An already decoded image.
    Image(DynamicImage),
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<DynamicImage> for ImageSource {
    fn from(image: DynamicImage) -> Self {
        Self::Image(image)
    }
}

impl ImageSource {
    /// Decode this source into an image.
    ///
    /// # Errors
    ///
    /// Returns the decoder's error when the file cannot be read or the
    /// bytes are not a supported image.
    pub fn decode(self) -> std::result::Result<DynamicImage, image::ImageError> {
        match self {
            Self::Path(path) => image::ImageReader::open(&path)?
                .with_guessed_format()?
                .decode(),
            Self::Bytes(bytes) => image::load_from_memory(&bytes),
            Self::Image(image) => Ok(image),
        }
    }
}

/// Decode every source in order.
///
/// Stops at the first source that fails, so a batch is either fully loaded
/// or not processed at all.
///
/// # Errors
///
/// Returns [`Error::Ingestion`] carrying the index of the failing source.
pub fn load_images(sources: Vec<ImageSource>) -> Result<Vec<DynamicImage>> {
    sources
        .into_iter()
        .enumerate()
        .map(|(index, src)| src.decode().map_err(|source| Error::Ingestion { index, source }))
        .collect()
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Write every present crop, composite and cutout of `results` into `dir`.
///
/// Files are numbered from 1 in batch order: `cropped_image_{n}.png`,
/// `image_segmented_{n}.png` and `image_cutout_{n}.png`. The directory is
/// created if missing. Returns the paths written, in order.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory cannot be created, or
/// [`Error::Persistence`] for the first file that cannot be written.
pub fn save_results(results: &[ItemResult], dir: &Path) -> Result<Vec<PathBuf>> {
    save_results_numbered(results, dir, 1)
}

/// Like [`save_results`], numbering files from `first` instead of 1.
///
/// Lets several batches share one output directory.
///
/// # Errors
///
/// Same as [`save_results`].
pub fn save_results_numbered(
    results: &[ItemResult],
    dir: &Path,
    first: usize,
) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }

    let mut written = Vec::new();
    for (i, item) in results.iter().enumerate() {
        let n = first + i;
        if let Some(crop) = &item.cropped_image {
            written.push(write_png(crop, dir.join(format!("cropped_image_{n}.png")))?);
        }
        if let Some(image) = &item.final_image {
            written.push(write_png(image, dir.join(format!("image_segmented_{n}.png")))?);
        }
        if let Some(cutout) = &item.cutout {
            written.push(write_png(cutout, dir.join(format!("image_cutout_{n}.png")))?);
        }
    }

    info!("saved {} files to {}", written.len(), dir.display());
    Ok(written)
}

fn write_png<P>(img: &image::ImageBuffer<P, Vec<u8>>, path: PathBuf) -> Result<PathBuf>
where
    P: image::PixelWithColorType<Subpixel = u8>,
{
    match img.save_with_format(&path, image::ImageFormat::Png) {
        Ok(()) => Ok(path),
        Err(source) => Err(Error::Persistence { path, source }),
    }
}
