//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// The Vulkan loader could not be found or initialized.
    #[error("Vulkan loader unavailable: {0}")]
    LoaderUnavailable(String),

    /// No suitable GPU found.
    #[error("No suitable GPU found: {0}")]
    NoSuitableDevice(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// A SPIR-V module could not be read.
    #[error("Shader load failed: {0}")]
    ShaderLoad(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// A resource or frame slot was used from the wrong state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A fence did not signal within its bound.
    #[error("Timed out: {0}")]
    Timeout(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

impl From<GpuError> for gpumtv_core::Error {
    fn from(error: GpuError) -> Self {
        match error {
            GpuError::Timeout(what) => Self::SynchronizationTimeout(what),
            GpuError::AllocationFailed(_)
            | GpuError::ShaderLoad(_)
            | GpuError::PipelineCreation(_)
            | GpuError::Vulkan(
                vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            ) => Self::ResourceCreation(error.to_string()),
            other => Self::Gpu(other.to_string()),
        }
    }
}
