use crate::image_buf::ImageBuf;

/// Reference illuminant in Kelvin. A scene temperature equal to this and a
/// zero tint leave pixels untouched.
pub const NEUTRAL_TEMPERATURE: f32 = 5500.0;

const MIN_TEMPERATURE: f64 = 1667.0;
const MAX_TEMPERATURE: f64 = 25000.0;

type Mat3 = [[f64; 3]; 3];

// sRGB (D65) <-> XYZ, IEC 61966-2-1.
const SRGB_TO_XYZ: Mat3 = [
    [0.4123907993, 0.3575843394, 0.1804807884],
    [0.2126390059, 0.7151686788, 0.0721923154],
    [0.0193308187, 0.1191947798, 0.9505321522],
];
const XYZ_TO_SRGB: Mat3 = [
    [3.2409699419, -1.5373831776, -0.4986107603],
    [-0.9692436363, 1.8759675015, 0.0415550574],
    [0.0556300797, -0.2039769589, 1.0569715142],
];

// Bradford cone response and its inverse.
const BRADFORD: Mat3 = [
    [0.8951, 0.2664, -0.1614],
    [-0.7502, 1.7135, 0.0367],
    [0.0389, -0.0685, 1.0296],
];
const BRADFORD_INV: Mat3 = [
    [0.9869929, -0.1470543, 0.1599627],
    [0.4323053, 0.5183603, 0.0492912],
    [-0.0085287, 0.0400428, 0.9684867],
];

/// Adapt from a scene lit at `temperature` (shifted by `tint`) to the
/// neutral reference. Warmer scene temperatures warm the image.
pub fn apply(mut input: ImageBuf, temperature: f32, tint: f32) -> ImageBuf {
    let m = adaptation_matrix(temperature, tint);
    if is_identity(&m) {
        return input;
    }

    for pixel in input.data.chunks_exact_mut(3) {
        let (r, g, b) = (pixel[0], pixel[1], pixel[2]);
        pixel[0] = (m[0][0] * r + m[0][1] * g + m[0][2] * b).max(0.0);
        pixel[1] = (m[1][0] * r + m[1][1] * g + m[1][2] * b).max(0.0);
        pixel[2] = (m[2][0] * r + m[2][1] * g + m[2][2] * b).max(0.0);
    }
    input
}

/// Linear-sRGB 3x3 that maps the scene white to the reference white.
///
/// XYZ_to_sRGB * Bradford(scene -> reference) * sRGB_to_XYZ
pub fn adaptation_matrix(temperature: f32, tint: f32) -> [[f32; 3]; 3] {
    let temperature = (temperature as f64).clamp(MIN_TEMPERATURE, MAX_TEMPERATURE);
    let scene = white_point(temperature, tint as f64);
    let reference = white_point(NEUTRAL_TEMPERATURE as f64, 0.0);

    let cat = bradford(scene, reference);
    let m = mul(&XYZ_TO_SRGB, &mul(&cat, &SRGB_TO_XYZ));
    m.map(|row| row.map(|v| v as f32))
}

fn is_identity(m: &[[f32; 3]; 3]) -> bool {
    (0..3).all(|r| (0..3).all(|c| (m[r][c] - if r == c { 1.0 } else { 0.0 }).abs() < 1e-6))
}

/// XYZ (Y = 1) of a Planckian illuminant, pushed off the locus by `tint`.
fn white_point(temperature: f64, tint: f64) -> [f64; 3] {
    let (mut x, mut y) = planckian_xy(temperature);

    if tint.abs() > 1e-6 {
        // Step perpendicular to the locus in CIE 1960 UCS, where isotherms
        // are normal to it. Positive tint moves toward magenta.
        let (u, v) = xy_to_uv(x, y);
        let (u_lo, v_lo) = planckian_uv((temperature - 50.0).max(MIN_TEMPERATURE));
        let (u_hi, v_hi) = planckian_uv((temperature + 50.0).min(MAX_TEMPERATURE));
        let (du, dv) = (u_hi - u_lo, v_hi - v_lo);
        let len = du.hypot(dv);
        // ±150 tint spans ±0.05 Duv.
        let duv = tint / 3000.0;
        (x, y) = uv_to_xy(u + dv / len * duv, v - du / len * duv);
    }

    [x / y, 1.0, (1.0 - x - y) / y]
}

/// Planckian locus in CIE xy, cubic fit from Kim et al. (2002).
fn planckian_xy(t: f64) -> (f64, f64) {
    let (t1, t2, t3) = (1e3 / t, 1e6 / (t * t), 1e9 / (t * t * t));

    let x = if t <= 4000.0 {
        -0.2661239 * t3 - 0.2343589 * t2 + 0.8776956 * t1 + 0.179910
    } else {
        -3.0258469 * t3 + 2.1070379 * t2 + 0.2226347 * t1 + 0.240390
    };

    let (x2, x3) = (x * x, x * x * x);
    let y = if t <= 2222.0 {
        -1.1063814 * x3 - 1.34811020 * x2 + 2.18555832 * x - 0.20219683
    } else if t <= 4000.0 {
        -0.9549476 * x3 - 1.37418593 * x2 + 2.09137015 * x - 0.16748867
    } else {
        3.0817580 * x3 - 5.87338670 * x2 + 3.75112997 * x - 0.37001483
    };

    (x, y)
}

fn planckian_uv(t: f64) -> (f64, f64) {
    let (x, y) = planckian_xy(t);
    xy_to_uv(x, y)
}

fn xy_to_uv(x: f64, y: f64) -> (f64, f64) {
    let d = -2.0 * x + 12.0 * y + 3.0;
    (4.0 * x / d, 6.0 * y / d)
}

fn uv_to_xy(u: f64, v: f64) -> (f64, f64) {
    let d = 2.0 * u - 8.0 * v + 4.0;
    (3.0 * u / d, 2.0 * v / d)
}

/// Bradford chromatic adaptation: M_A^-1 * diag(dst / src) * M_A.
fn bradford(src: [f64; 3], dst: [f64; 3]) -> Mat3 {
    let src_lms = mul_vec(&BRADFORD, src);
    let dst_lms = mul_vec(&BRADFORD, dst);

    let mut scale = [[0.0; 3]; 3];
    for i in 0..3 {
        scale[i][i] = dst_lms[i] / src_lms[i];
    }
    mul(&BRADFORD_INV, &mul(&scale, &BRADFORD))
}

fn mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (r, row) in out.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[r][k] * b[k][c]).sum();
        }
    }
    out
}

fn mul_vec(m: &Mat3, v: [f64; 3]) -> [f64; 3] {
    m.map(|row| row[0] * v[0] + row[1] * v[1] + row[2] * v[2])
}
