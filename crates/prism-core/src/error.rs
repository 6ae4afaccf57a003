use thiserror::Error;

use crate::filters::ParamKind;

/// Failures of the filter pipeline.
///
/// `UnknownFilter`, `ParameterMismatch` and `ResourceCreationFailed` are
/// local to one filter and never abort a batch. `DeviceUnavailable` aborts
/// session construction.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    #[error("filter {filter} expects {expected:?} parameters")]
    ParameterMismatch { filter: String, expected: ParamKind },

    #[error("GPU resource creation failed: {0}")]
    ResourceCreationFailed(String),

    #[error("no GPU device available: {0}")]
    DeviceUnavailable(String),

    #[error("shader pipeline for {filter} failed to compile: {reason}")]
    ShaderCompilationFailed { filter: String, reason: String },
}

/// Failures of the edit history.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("state is identical to the current state")]
    EmptyOperation,
}
