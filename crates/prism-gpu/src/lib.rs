pub mod context;
pub mod pipeline;
pub mod quad;
pub mod shader;
pub mod texture;

pub use context::{GpuContext, GpuPreference};
pub use pipeline::{RenderContext, Viewport};
