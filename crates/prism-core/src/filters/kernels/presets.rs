use crate::color::{lerp, linear_to_srgb, luminance, smoothstep, srgb_to_linear};
use crate::filters::Preset;
use crate::image_buf::ImageBuf;

/// Apply a look preset, blended with the original by `amount` in [0, 1].
///
/// Looks are defined on sRGB-encoded values so their curves match what
/// the eye sees; blending happens in linear light.
pub fn apply(preset: Preset, mut input: ImageBuf, amount: f32) -> ImageBuf {
    if amount <= 0.0 {
        return input;
    }
    let amount = amount.min(1.0);
    let look = look_fn(preset);

    for pixel in input.data.chunks_exact_mut(3) {
        let linear = [pixel[0], pixel[1], pixel[2]];
        let encoded = linear.map(|v| linear_to_srgb(v.clamp(0.0, 1.0)));
        let graded = look(encoded, luminance(linear[0], linear[1], linear[2]));
        for c in 0..3 {
            let target = srgb_to_linear(graded[c].clamp(0.0, 1.0));
            pixel[c] = lerp(linear[c], target, amount);
        }
    }
    input
}

/// A look maps sRGB-encoded RGB plus linear luminance to sRGB-encoded RGB.
type Look = fn([f32; 3], f32) -> [f32; 3];

fn look_fn(preset: Preset) -> Look {
    match preset {
        Preset::Mono => mono,
        Preset::Noir => noir,
        Preset::Tonal => tonal,
        Preset::Chrome => chrome,
        Preset::Instant => instant,
        Preset::Process => process,
        Preset::Transfer => transfer,
    }
}

fn mono(_rgb: [f32; 3], y: f32) -> [f32; 3] {
    [linear_to_srgb(y.clamp(0.0, 1.0)); 3]
}

/// High-contrast black and white.
fn noir(_rgb: [f32; 3], y: f32) -> [f32; 3] {
    let v = smoothstep(0.08, 0.92, linear_to_srgb(y.clamp(0.0, 1.0)));
    [v; 3]
}

/// Flat black and white with lifted shadows and soft highlights.
fn tonal(_rgb: [f32; 3], y: f32) -> [f32; 3] {
    let v = 0.08 + 0.84 * linear_to_srgb(y.clamp(0.0, 1.0));
    [v; 3]
}

/// Punchy color: extra saturation and contrast.
fn chrome(rgb: [f32; 3], _y: f32) -> [f32; 3] {
    let mean = (rgb[0] + rgb[1] + rgb[2]) / 3.0;
    rgb.map(|c| {
        let saturated = mean + (c - mean) * 1.3;
        (saturated - 0.5) * 1.12 + 0.5
    })
}

/// Warm, faded instant-film print.
fn instant(rgb: [f32; 3], _y: f32) -> [f32; 3] {
    [
        rgb[0] * 0.92 + 0.07,
        rgb[1] * 0.90 + 0.06,
        rgb[2] * 0.78 + 0.08,
    ]
}

/// Cool cross-processed look with lifted blue shadows.
fn process(rgb: [f32; 3], _y: f32) -> [f32; 3] {
    let toned = [rgb[0] * 0.90 + 0.02, rgb[1] * 0.98 + 0.03, rgb[2] * 0.86 + 0.12];
    toned.map(|c| (c - 0.5) * 1.08 + 0.5)
}

/// Vintage warm transfer with a sepia bias.
fn transfer(rgb: [f32; 3], _y: f32) -> [f32; 3] {
    let sepia = [
        0.393 * rgb[0] + 0.769 * rgb[1] + 0.189 * rgb[2],
        0.349 * rgb[0] + 0.686 * rgb[1] + 0.168 * rgb[2],
        0.272 * rgb[0] + 0.534 * rgb[1] + 0.131 * rgb[2],
    ];
    [
        lerp(rgb[0], sepia[0], 0.35) + 0.02,
        lerp(rgb[1], sepia[1], 0.35) + 0.01,
        lerp(rgb[2], sepia[2], 0.35) - 0.02,
    ]
}
