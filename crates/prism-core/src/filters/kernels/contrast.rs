use crate::color::{linear_to_srgb, srgb_to_linear};
use crate::image_buf::ImageBuf;

/// Perceptual midpoint the contrast curve pivots around.
const PIVOT: f32 = 0.5;

/// Linear contrast around mid-gray in sRGB-encoded space.
///
/// `amount` in [-100, 100]; -100 collapses everything to the pivot.
pub fn apply(mut input: ImageBuf, amount: f32) -> ImageBuf {
    if amount == 0.0 {
        return input;
    }

    let slope = 1.0 + amount / 100.0;
    for v in &mut input.data {
        let encoded = linear_to_srgb(v.clamp(0.0, 1.0));
        let stretched = ((encoded - PIVOT) * slope + PIVOT).clamp(0.0, 1.0);
        *v = srgb_to_linear(stretched);
    }
    input
}
