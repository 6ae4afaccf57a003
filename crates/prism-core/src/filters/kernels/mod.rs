//! CPU kernels. Each takes upright linear pixels by value and returns the
//! filtered buffer; callers short-circuit neutral parameters.

pub mod color_cube;
pub mod contrast;
pub mod exposure;
pub mod presets;
pub mod saturation;
pub mod white_balance;
