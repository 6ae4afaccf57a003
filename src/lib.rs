pub mod config;
pub mod coordinator;
pub mod engine;
pub mod logging;
pub mod session;

pub use config::SessionConfig;
pub use coordinator::ProcessingCoordinator;
pub use engine::{CancelToken, FilterEngine, FilteredImages};
pub use session::{EditingSession, SessionError};
