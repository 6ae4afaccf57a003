use std::sync::LazyLock;

use image::{RgbImage, RgbaImage};

/// Linear f32 RGB image buffer.
///
/// All pixel data is stored as interleaved RGBRGBRGB... in linear light.
/// Kernels may push values above 1.0; conversion to 8-bit clamps.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBuf {
    pub width: u32,
    pub height: u32,
    /// Flat pixel data: [R, G, B, R, G, B, ...] in linear f32.
    pub data: Vec<f32>,
}

impl ImageBuf {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; (width * height * 3) as usize],
        }
    }

    pub fn from_data(width: u32, height: u32, data: Vec<f32>) -> anyhow::Result<Self> {
        let expected = (width * height * 3) as usize;
        anyhow::ensure!(
            data.len() == expected,
            "expected {expected} floats for {width}x{height} RGB, got {}",
            data.len()
        );
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build from 8-bit sRGB-encoded RGBA bytes (alpha is dropped).
    pub fn from_rgba8_srgb(width: u32, height: u32, rgba: &[u8]) -> anyhow::Result<Self> {
        let expected = (width * height * 4) as usize;
        anyhow::ensure!(
            rgba.len() == expected,
            "expected {expected} bytes for {width}x{height} RGBA, got {}",
            rgba.len()
        );
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for pixel in rgba.chunks_exact(4) {
            data.push(SRGB_TO_LINEAR[pixel[0] as usize]);
            data.push(SRGB_TO_LINEAR[pixel[1] as usize]);
            data.push(SRGB_TO_LINEAR[pixel[2] as usize]);
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Convert to RGBA f32 with alpha = 1.0.
    pub fn to_rgba_f32(&self) -> Vec<f32> {
        let mut rgba = Vec::with_capacity(self.pixel_count() * 4);
        for pixel in self.data.chunks_exact(3) {
            rgba.push(pixel[0]);
            rgba.push(pixel[1]);
            rgba.push(pixel[2]);
            rgba.push(1.0);
        }
        rgba
    }

    /// Convert to RGBA u8 with sRGB gamma for display and GPU upload.
    pub fn to_rgba_u8_srgb(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixel_count() * 4);
        for pixel in self.data.chunks_exact(3) {
            out.push(linear_to_srgb_u8(pixel[0]));
            out.push(linear_to_srgb_u8(pixel[1]));
            out.push(linear_to_srgb_u8(pixel[2]));
            out.push(255);
        }
        out
    }

    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.to_rgba_u8_srgb())
    }

    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        let bytes = self.data.iter().map(|&v| linear_to_srgb_u8(v)).collect();
        RgbImage::from_raw(self.width, self.height, bytes)
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// Downsample so the longest edge fits within `max_edge` pixels.
    /// Uses box averaging for clean downscaling. Returns a copy if already small enough.
    pub fn downsample(&self, max_edge: u32) -> Self {
        let longest = self.width.max(self.height);
        if longest <= max_edge {
            return self.clone();
        }

        let scale = max_edge as f32 / longest as f32;
        let new_w = (self.width as f32 * scale).round().max(1.0) as u32;
        let new_h = (self.height as f32 * scale).round().max(1.0) as u32;

        let mut data = Vec::with_capacity((new_w * new_h * 3) as usize);

        for dst_y in 0..new_h {
            for dst_x in 0..new_w {
                let src_x0 = (dst_x as f32 / scale) as u32;
                let src_y0 = (dst_y as f32 / scale) as u32;
                let src_x1 = (((dst_x + 1) as f32 / scale).ceil() as u32).min(self.width);
                let src_y1 = (((dst_y + 1) as f32 / scale).ceil() as u32).min(self.height);

                let mut sum = [0.0_f32; 3];
                let mut count = 0u32;

                for sy in src_y0..src_y1 {
                    for sx in src_x0..src_x1 {
                        let idx = ((sy * self.width + sx) * 3) as usize;
                        sum[0] += self.data[idx];
                        sum[1] += self.data[idx + 1];
                        sum[2] += self.data[idx + 2];
                        count += 1;
                    }
                }

                let inv = if count > 0 { 1.0 / count as f32 } else { 0.0 };
                data.extend_from_slice(&[sum[0] * inv, sum[1] * inv, sum[2] * inv]);
            }
        }

        Self {
            width: new_w,
            height: new_h,
            data,
        }
    }

    // Geometric transforms
    //
    // Each transform is a pure pixel remap. `map` receives destination
    // coordinates and returns the source pixel to copy.

    fn remap(&self, swap_axes: bool, map: impl Fn(u32, u32) -> (u32, u32)) -> Self {
        let (dst_w, dst_h) = if swap_axes {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        };

        let mut data = Vec::with_capacity(self.data.len());
        for dy in 0..dst_h {
            for dx in 0..dst_w {
                let (sx, sy) = map(dx, dy);
                let idx = ((sy * self.width + sx) * 3) as usize;
                data.extend_from_slice(&self.data[idx..idx + 3]);
            }
        }

        Self {
            width: dst_w,
            height: dst_h,
            data,
        }
    }

    /// Rotate 90° clockwise.
    pub fn rotate90(&self) -> Self {
        let h = self.height;
        self.remap(true, |dx, dy| (dy, h - 1 - dx))
    }

    pub fn rotate180(&self) -> Self {
        let (w, h) = (self.width, self.height);
        self.remap(false, |dx, dy| (w - 1 - dx, h - 1 - dy))
    }

    /// Rotate 270° clockwise (90° counter-clockwise).
    pub fn rotate270(&self) -> Self {
        let w = self.width;
        self.remap(true, |dx, dy| (w - 1 - dy, dx))
    }

    pub fn flip_horizontal(&self) -> Self {
        let w = self.width;
        self.remap(false, |dx, dy| (w - 1 - dx, dy))
    }

    pub fn flip_vertical(&self) -> Self {
        let h = self.height;
        self.remap(false, |dx, dy| (dx, h - 1 - dy))
    }

    /// Mirror across the main diagonal.
    pub fn transpose(&self) -> Self {
        self.remap(true, |dx, dy| (dy, dx))
    }

    /// Mirror across the anti-diagonal.
    pub fn transverse(&self) -> Self {
        let (w, h) = (self.width, self.height);
        self.remap(true, |dx, dy| (w - 1 - dy, h - 1 - dx))
    }
}

const SRGB_LUT_SIZE: usize = 4096;

static SRGB_LUT: LazyLock<[u8; SRGB_LUT_SIZE]> = LazyLock::new(|| {
    let mut lut = [0u8; SRGB_LUT_SIZE];
    for (i, entry) in lut.iter_mut().enumerate() {
        let v = i as f32 / (SRGB_LUT_SIZE - 1) as f32;
        *entry = (crate::color::linear_to_srgb(v) * 255.0 + 0.5) as u8;
    }
    lut
});

static SRGB_TO_LINEAR: LazyLock<[f32; 256]> = LazyLock::new(|| {
    let mut lut = [0.0_f32; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = crate::color::srgb_to_linear(i as f32 / 255.0);
    }
    lut
});

fn linear_to_srgb_u8(v: f32) -> u8 {
    let v = v.clamp(0.0, 1.0);
    let idx = (v * (SRGB_LUT_SIZE - 1) as f32) as usize;
    SRGB_LUT[idx]
}
