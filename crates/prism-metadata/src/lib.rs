pub mod exif;

use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use image::ImageReader;
use tracing::{debug, info};

use prism_core::source::SourceImage;

pub use crate::exif::ExifData;

/// Decode an image file into a source with its EXIF orientation applied
/// as metadata. Files without EXIF are treated as upright.
pub fn open_source(path: &Path) -> Result<SourceImage> {
    let image = ImageReader::open(path)
        .with_context(|| format!("open {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("detect format of {}", path.display()))?
        .decode()
        .with_context(|| format!("decode {}", path.display()))?;

    let exif = ExifData::from_file(path)
        .inspect_err(|e| debug!(path = %path.display(), "no EXIF: {e:#}"))
        .unwrap_or_default();

    info!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        orientation = ?exif.orientation(),
        capture = exif.capture_summary().as_deref().unwrap_or("unknown"),
        "opened source image"
    );
    SourceImage::from_dynamic(&image, exif.orientation())
}

/// In-memory variant of [`open_source`].
pub fn decode_source(bytes: &[u8]) -> Result<SourceImage> {
    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("detect image format")?
        .decode()
        .context("decode image")?;

    let exif = ExifData::from_bytes(bytes)
        .inspect_err(|e| debug!("no EXIF: {e:#}"))
        .unwrap_or_default();

    SourceImage::from_dynamic(&image, exif.orientation())
}
