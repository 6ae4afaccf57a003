use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Seek};
use std::path::Path;

use anyhow::{Context, Result};
use exif::{In, Tag};
use serde::{Deserialize, Serialize};

use prism_core::orientation::Orientation;

/// Capture metadata relevant to editing: how the pixels are stored and
/// where they came from.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExifData {
    pub orientation: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens: Option<String>,
    pub iso: Option<u32>,
    pub date_taken: Option<String>,
}

impl ExifData {
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        Self::from_reader(&mut BufReader::new(file))
            .with_context(|| format!("read EXIF from {}", path.display()))
    }

    /// Read from an in-memory container (JPEG, TIFF, PNG, HEIF, WebP).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(&mut Cursor::new(bytes))
    }

    fn from_reader<R: BufRead + Seek>(reader: &mut R) -> Result<Self> {
        let exif = exif::Reader::new()
            .read_from_container(reader)
            .context("parse EXIF container")?;

        Ok(Self {
            orientation: get_u32(&exif, Tag::Orientation),
            width: get_u32(&exif, Tag::PixelXDimension)
                .or_else(|| get_u32(&exif, Tag::ImageWidth)),
            height: get_u32(&exif, Tag::PixelYDimension)
                .or_else(|| get_u32(&exif, Tag::ImageLength)),
            camera_make: get_string(&exif, Tag::Make),
            camera_model: get_string(&exif, Tag::Model),
            lens: get_string(&exif, Tag::LensModel),
            iso: get_u32(&exif, Tag::PhotographicSensitivity),
            date_taken: get_string(&exif, Tag::DateTimeOriginal),
        })
    }

    /// Stored-pixel orientation; absent or invalid tags mean upright.
    pub fn orientation(&self) -> Orientation {
        self.orientation.map(Orientation::from_exif).unwrap_or_default()
    }

    /// "Make Model" when the camera is known.
    pub fn camera(&self) -> Option<String> {
        match (&self.camera_make, &self.camera_model) {
            (Some(make), Some(model)) if model.starts_with(make.as_str()) => Some(model.clone()),
            (Some(make), Some(model)) => Some(format!("{make} {model}")),
            (Some(only), None) | (None, Some(only)) => Some(only.clone()),
            (None, None) => None,
        }
    }

    /// Camera, lens, ISO and capture time joined for display, skipping
    /// whatever is missing.
    pub fn capture_summary(&self) -> Option<String> {
        let parts: Vec<String> = [
            self.camera(),
            self.lens.clone(),
            self.iso.map(|iso| format!("ISO {iso}")),
            self.date_taken.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

fn get_string(exif: &exif::Exif, tag: Tag) -> Option<String> {
    exif.get_field(tag, In::PRIMARY)
        .map(|f| f.display_value().to_string().trim_matches(['"', ' ']).to_string())
        .filter(|s| !s.is_empty())
}

fn get_u32(exif: &exif::Exif, tag: Tag) -> Option<u32> {
    exif.get_field(tag, In::PRIMARY).and_then(|f| match f.value {
        exif::Value::Short(ref v) => v.first().map(|&x| x as u32),
        exif::Value::Long(ref v) => v.first().copied(),
        _ => f.display_value().to_string().trim().parse().ok(),
    })
}
