use serde::{Deserialize, Serialize};

use crate::image_buf::ImageBuf;

/// How stored pixels must be transformed to appear upright.
///
/// Variant names follow camera-roll conventions; the EXIF tag value of each
/// is noted alongside.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// 1
    #[default]
    Up,
    /// 3: rotated 180°.
    Down,
    /// 8: display needs a 90° counter-clockwise turn.
    Left,
    /// 6: display needs a 90° clockwise turn.
    Right,
    /// 2
    UpMirrored,
    /// 4
    DownMirrored,
    /// 5
    LeftMirrored,
    /// 7
    RightMirrored,
}

impl Orientation {
    /// Map an EXIF orientation tag. Unknown values are treated as upright.
    pub fn from_exif(value: u32) -> Self {
        match value {
            2 => Self::UpMirrored,
            3 => Self::Down,
            4 => Self::DownMirrored,
            5 => Self::LeftMirrored,
            6 => Self::Right,
            7 => Self::RightMirrored,
            8 => Self::Left,
            _ => Self::Up,
        }
    }

    pub fn to_exif(self) -> u32 {
        match self {
            Self::Up => 1,
            Self::UpMirrored => 2,
            Self::Down => 3,
            Self::DownMirrored => 4,
            Self::LeftMirrored => 5,
            Self::Right => 6,
            Self::RightMirrored => 7,
            Self::Left => 8,
        }
    }

    /// True when normalizing swaps width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(
            self,
            Self::Left | Self::Right | Self::LeftMirrored | Self::RightMirrored
        )
    }

    /// Transform stored pixels into upright pixels.
    pub fn normalize(self, buf: &ImageBuf) -> ImageBuf {
        match self {
            Self::Up => buf.clone(),
            Self::Down => buf.rotate180(),
            Self::Left => buf.rotate270(),
            Self::Right => buf.rotate90(),
            Self::UpMirrored => buf.flip_horizontal(),
            Self::DownMirrored => buf.flip_vertical(),
            Self::LeftMirrored => buf.transpose(),
            Self::RightMirrored => buf.transverse(),
        }
    }

    /// Inverse of [`normalize`](Self::normalize): upright pixels back into
    /// the stored layout for this orientation.
    pub fn denormalize(self, buf: &ImageBuf) -> ImageBuf {
        match self {
            Self::Left => buf.rotate90(),
            Self::Right => buf.rotate270(),
            // Every other transform is its own inverse.
            other => other.normalize(buf),
        }
    }
}
