/// Inverse sRGB EOTF (IEC 61966-2-1): linear light [0,1] -> perceptual sRGB [0,1].
pub fn linear_to_srgb(x: f32) -> f32 {
    if x <= 0.0031308 {
        12.92 * x
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    }
}

/// sRGB EOTF (IEC 61966-2-1): perceptual sRGB [0,1] -> linear light [0,1].
pub fn srgb_to_linear(x: f32) -> f32 {
    if x <= 0.04045 {
        x / 12.92
    } else {
        ((x + 0.055) / 1.055).powf(2.4)
    }
}

/// Rec. 709 relative luminance of a linear RGB triple.
#[inline]
pub fn luminance(r: f32, g: f32, b: f32) -> f32 {
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Hermite smoothstep on [edge0, edge1].
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srgb_roundtrip() {
        for i in 0..=100 {
            let x = i as f32 / 100.0;
            let rt = srgb_to_linear(linear_to_srgb(x));
            assert!((rt - x).abs() < 1e-5, "roundtrip failed at {x}: got {rt}");
        }
    }

    #[test]
    fn srgb_endpoints() {
        assert!(linear_to_srgb(0.0).abs() < 1e-7);
        assert!((linear_to_srgb(1.0) - 1.0).abs() < 1e-6);
        assert!(srgb_to_linear(0.0).abs() < 1e-7);
        assert!((srgb_to_linear(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn luminance_of_white_is_one() {
        assert!((luminance(1.0, 1.0, 1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn smoothstep_clamps() {
        assert_eq!(smoothstep(0.2, 0.8, 0.0), 0.0);
        assert_eq!(smoothstep(0.2, 0.8, 1.0), 1.0);
        assert!((smoothstep(0.0, 1.0, 0.5) - 0.5).abs() < 1e-6);
    }
}
