use crate::image_buf::ImageBuf;

/// Scale linear light by `2^ev`.
pub fn apply(mut input: ImageBuf, ev: f32) -> ImageBuf {
    if ev == 0.0 {
        return input;
    }

    let multiplier = 2.0_f32.powf(ev);
    for v in &mut input.data {
        *v *= multiplier;
    }
    input
}
