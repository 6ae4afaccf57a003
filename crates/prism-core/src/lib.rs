pub mod color;
pub mod edit;
pub mod error;
pub mod export;
pub mod filters;
pub mod history;
pub mod image_buf;
pub mod orientation;
pub mod source;

pub use edit::{AppliedFilter, EditRecipe, EditState};
pub use error::{HistoryError, PipelineError};
pub use filters::{FilterCatalog, FilterDescriptor, FilterParams, ShaderRenderer};
pub use history::{EditStack, Identified};
pub use image_buf::ImageBuf;
pub use orientation::Orientation;
pub use source::SourceImage;
