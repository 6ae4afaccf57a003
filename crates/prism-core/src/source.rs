use image::DynamicImage;
use tracing::debug;

use crate::image_buf::ImageBuf;
use crate::orientation::Orientation;

/// A photo handed to the pipeline by the presentation layer.
///
/// Holds the pixels exactly as stored plus their orientation tag. The
/// upright copy is computed once on construction; every filter works on it
/// so mirrored or rotated captures render identically.
#[derive(Debug)]
pub struct SourceImage {
    stored: ImageBuf,
    orientation: Orientation,
    upright: ImageBuf,
    content_hash: String,
}

impl SourceImage {
    pub fn new(stored: ImageBuf, orientation: Orientation) -> Self {
        let upright = orientation.normalize(&stored);
        let content_hash = content_hash(&stored, orientation);
        debug!(
            width = stored.width,
            height = stored.height,
            ?orientation,
            hash = &content_hash[..12],
            "source image"
        );
        Self {
            stored,
            orientation,
            upright,
            content_hash,
        }
    }

    pub fn from_dynamic(image: &DynamicImage, orientation: Orientation) -> anyhow::Result<Self> {
        let rgba = image.to_rgba8();
        let buf = ImageBuf::from_rgba8_srgb(rgba.width(), rgba.height(), rgba.as_raw())?;
        Ok(Self::new(buf, orientation))
    }

    /// Pixels as stored, before orientation normalization.
    pub fn stored(&self) -> &ImageBuf {
        &self.stored
    }

    /// Upright pixels.
    pub fn upright(&self) -> &ImageBuf {
        &self.upright
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Upright width.
    pub fn width(&self) -> u32 {
        self.upright.width
    }

    /// Upright height.
    pub fn height(&self) -> u32 {
        self.upright.height
    }

    /// blake3 hex digest of the stored pixels and orientation.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Map an upright result back into this source's stored layout.
    pub fn restore_orientation(&self, upright: &ImageBuf) -> ImageBuf {
        self.orientation.denormalize(upright)
    }
}

fn content_hash(buf: &ImageBuf, orientation: Orientation) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&buf.width.to_le_bytes());
    hasher.update(&buf.height.to_le_bytes());
    hasher.update(&orientation.to_exif().to_le_bytes());
    hasher.update(bytemuck::cast_slice(&buf.data));
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(width: u32, height: u32) -> ImageBuf {
        let data = (0..width * height * 3).map(|i| (i % 7) as f32 / 7.0).collect();
        ImageBuf::from_data(width, height, data).unwrap()
    }

    #[test]
    fn upright_dimensions_follow_orientation() {
        let source = SourceImage::new(sample(4, 2), Orientation::Right);
        assert_eq!((source.width(), source.height()), (2, 4));
        assert_eq!(source.stored().width, 4);
    }

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        let a = SourceImage::new(sample(3, 3), Orientation::Up);
        let b = SourceImage::new(sample(3, 3), Orientation::Up);
        assert_eq!(a.content_hash(), b.content_hash());

        let rotated = SourceImage::new(sample(3, 3), Orientation::Down);
        assert_ne!(a.content_hash(), rotated.content_hash());

        let mut other = sample(3, 3);
        other.data[0] = 0.9;
        assert_ne!(a.content_hash(), SourceImage::new(other, Orientation::Up).content_hash());
    }

    #[test]
    fn restore_orientation_returns_stored_layout() {
        let source = SourceImage::new(sample(5, 2), Orientation::LeftMirrored);
        assert_eq!(&source.restore_orientation(source.upright()), source.stored());
    }

    #[test]
    fn from_dynamic_converts_to_linear() {
        let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]));
        let source = SourceImage::from_dynamic(&DynamicImage::ImageRgba8(img), Orientation::Up)
            .unwrap();
        assert!((source.upright().data[0] - 1.0).abs() < 1e-6);
        assert_eq!(source.upright().data[1], 0.0);
    }
}
