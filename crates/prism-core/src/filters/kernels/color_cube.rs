use std::sync::LazyLock;

use crate::color::{lerp, linear_to_srgb, srgb_to_linear};
use crate::image_buf::ImageBuf;

const CUBE_SIZE: usize = 17;

/// 3D lookup table over sRGB-encoded RGB, R varying fastest.
pub struct ColorCube {
    size: usize,
    data: Vec<[f32; 3]>,
}

/// The built-in film look: teal shadows, warm highlights, gentle S-curve.
static FILM_CUBE: LazyLock<ColorCube> = LazyLock::new(|| ColorCube::generate(CUBE_SIZE, film_look));

impl ColorCube {
    pub fn identity(size: usize) -> Self {
        Self::generate(size, |rgb| rgb)
    }

    /// Sample `f` on a `size`³ grid. Sizes below 2 are raised to 2, the
    /// smallest grid that can interpolate.
    pub fn generate(size: usize, f: impl Fn([f32; 3]) -> [f32; 3]) -> Self {
        let size = size.max(2);
        let step = 1.0 / (size - 1) as f32;
        let mut data = Vec::with_capacity(size * size * size);
        for b in 0..size {
            for g in 0..size {
                for r in 0..size {
                    data.push(f([r as f32 * step, g as f32 * step, b as f32 * step]));
                }
            }
        }
        Self { size, data }
    }

    fn at(&self, r: usize, g: usize, b: usize) -> [f32; 3] {
        self.data[(b * self.size + g) * self.size + r]
    }

    /// Trilinear lookup; inputs are clamped to the cube.
    pub fn lookup(&self, rgb: [f32; 3]) -> [f32; 3] {
        let n = (self.size - 1) as f32;
        let scaled = rgb.map(|v| v.clamp(0.0, 1.0) * n);
        let base = scaled.map(|v| (v.floor() as usize).min(self.size - 2));
        let frac = [
            scaled[0] - base[0] as f32,
            scaled[1] - base[1] as f32,
            scaled[2] - base[2] as f32,
        ];
        let [r0, g0, b0] = base;

        let mut out = [0.0_f32; 3];
        for (c, slot) in out.iter_mut().enumerate() {
            let c00 = lerp(self.at(r0, g0, b0)[c], self.at(r0 + 1, g0, b0)[c], frac[0]);
            let c10 = lerp(self.at(r0, g0 + 1, b0)[c], self.at(r0 + 1, g0 + 1, b0)[c], frac[0]);
            let c01 = lerp(self.at(r0, g0, b0 + 1)[c], self.at(r0 + 1, g0, b0 + 1)[c], frac[0]);
            let c11 = lerp(
                self.at(r0, g0 + 1, b0 + 1)[c],
                self.at(r0 + 1, g0 + 1, b0 + 1)[c],
                frac[0],
            );
            let c0 = lerp(c00, c10, frac[1]);
            let c1 = lerp(c01, c11, frac[1]);
            *slot = lerp(c0, c1, frac[2]);
        }
        out
    }
}

fn film_look(rgb: [f32; 3]) -> [f32; 3] {
    let luma = 0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2];
    let shadow = (1.0 - luma).powi(2);
    let highlight = luma * luma;
    let toned = [
        rgb[0] - 0.04 * shadow + 0.05 * highlight,
        rgb[1] + 0.01 * shadow + 0.01 * highlight,
        rgb[2] + 0.05 * shadow - 0.05 * highlight,
    ];
    toned.map(|v| {
        let v = v.clamp(0.0, 1.0);
        // Gentle S-curve anchored at 0 and 1.
        v + 0.15 * v * (1.0 - v) * (2.0 * v - 1.0)
    })
}

/// Blend the film cube over the image by `amount` in [0, 1].
pub fn apply(mut input: ImageBuf, amount: f32) -> ImageBuf {
    if amount <= 0.0 {
        return input;
    }
    let amount = amount.min(1.0);
    let cube = &*FILM_CUBE;

    for pixel in input.data.chunks_exact_mut(3) {
        let encoded = [pixel[0], pixel[1], pixel[2]].map(|v| linear_to_srgb(v.clamp(0.0, 1.0)));
        let graded = cube.lookup(encoded);
        for c in 0..3 {
            pixel[c] = lerp(pixel[c], srgb_to_linear(graded[c]), amount);
        }
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_cube_is_passthrough() {
        let cube = ColorCube::identity(9);
        for rgb in [[0.0, 0.0, 0.0], [0.25, 0.5, 0.75], [1.0, 1.0, 1.0], [0.33, 0.9, 0.1]] {
            let out = cube.lookup(rgb);
            for c in 0..3 {
                assert!((out[c] - rgb[c]).abs() < 1e-5, "{rgb:?} -> {out:?}");
            }
        }
    }

    #[test]
    fn lookup_hits_grid_points_exactly() {
        let cube = ColorCube::generate(5, |[r, g, b]| [b, g, r]);
        let out = cube.lookup([0.25, 0.5, 1.0]);
        assert!((out[0] - 1.0).abs() < 1e-6);
        assert!((out[2] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        let cube = ColorCube::identity(5);
        assert_eq!(cube.lookup([-1.0, 2.0, 0.5])[0], 0.0);
        assert!((cube.lookup([-1.0, 2.0, 0.5])[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_sizes_still_interpolate() {
        for size in [0, 1] {
            let cube = ColorCube::identity(size);
            assert_eq!(cube.size, 2);
            let out = cube.lookup([0.25, 0.5, 1.0]);
            assert!((out[0] - 0.25).abs() < 1e-6, "size {size}: {out:?}");
            assert!((out[2] - 1.0).abs() < 1e-6, "size {size}: {out:?}");
        }
    }

    #[test]
    fn film_look_keeps_endpoints() {
        let black = film_look([0.0; 3]);
        let white = film_look([1.0; 3]);
        assert!(black.iter().all(|v| *v >= 0.0 && *v < 0.06));
        assert!(white.iter().all(|v| *v > 0.94 && *v <= 1.0));
    }

    #[test]
    fn full_amount_changes_midtones() {
        let buf = ImageBuf::from_data(1, 1, vec![0.1, 0.2, 0.3]).unwrap();
        let out = apply(buf.clone(), 1.0);
        assert_ne!(out, buf);
        assert!(out.data.iter().all(|v| v.is_finite() && *v >= 0.0));
    }
}
