use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::image_buf::ImageBuf;

/// Encoding used when a rendered image leaves the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum ExportFormat {
    Jpeg { quality: u8 },
    Png,
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::Jpeg { quality: 92 }
    }
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "jpg",
            Self::Png => "png",
        }
    }
}

/// Encode linear pixels as 8-bit sRGB in `format`.
pub fn encode(buf: &ImageBuf, format: ExportFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    match format {
        ExportFormat::Jpeg { quality } => {
            let rgb = buf
                .to_rgb_image()
                .context("failed to create image from buffer")?;
            let quality = quality.clamp(1, 100);
            JpegEncoder::new_with_quality(&mut bytes, quality)
                .encode_image(&rgb)
                .context("encode JPEG")?;
        }
        ExportFormat::Png => {
            let rgba = buf
                .to_rgba_image()
                .context("failed to create image from buffer")?;
            DynamicImage::ImageRgba8(rgba)
                .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
                .context("encode PNG")?;
        }
    }

    debug!(
        width = buf.width,
        height = buf.height,
        size = bytes.len(),
        ?format,
        "encoded export"
    );
    Ok(bytes)
}

/// Encode and write to `path`.
pub fn write(buf: &ImageBuf, format: ExportFormat, path: &Path) -> Result<()> {
    let bytes = encode(buf, format)?;
    std::fs::write(path, bytes).with_context(|| format!("write export to {}", path.display()))
}
