use crate::color::luminance;
use crate::image_buf::ImageBuf;

/// Scale each pixel's deviation from its luminance. -100 is grayscale,
/// +100 doubles the deviation.
pub fn apply(mut input: ImageBuf, amount: f32) -> ImageBuf {
    if amount == 0.0 {
        return input;
    }

    let blend = 1.0 + amount / 100.0;
    for pixel in input.data.chunks_exact_mut(3) {
        let y = luminance(pixel[0], pixel[1], pixel[2]);
        pixel[0] = (y + blend * (pixel[0] - y)).max(0.0);
        pixel[1] = (y + blend * (pixel[1] - y)).max(0.0);
        pixel[2] = (y + blend * (pixel[2] - y)).max(0.0);
    }
    input
}
