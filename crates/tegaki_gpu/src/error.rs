//! GPU error types

use thiserror::Error;

/// Errors from the compute path
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    AdapterNotFound,

    #[error("Adapter {0} does not support compute shaders")]
    ComputeUnsupported(String),

    #[error("Failed to request GPU device: {0}")]
    Device(String),

    #[error("Shader {label} failed to compile: {message}")]
    ShaderCompile { label: &'static str, message: String },

    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    #[error("Validation error during {stage}: {message}")]
    Validation { stage: &'static str, message: String },

    #[error("Readback failed: {0}")]
    Readback(String),

    #[error("Field region {width}x{height} exceeds the {max} texel limit")]
    TooLarge { width: u32, height: u32, max: u32 },

    #[error("Cancelled")]
    Cancelled,
}

impl GpuError {
    /// Whether this failure means the compute path is unusable for the
    /// stroke (as opposed to the stroke having been cancelled)
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, GpuError::Cancelled)
    }
}

/// Result type for GPU operations
pub type Result<T> = std::result::Result<T, GpuError>;
