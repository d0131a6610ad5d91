//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
///
/// Every variant is fatal for the frame loop: nothing in the renderer retries.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Descriptor pool has no room left for the requested set
    #[error("Descriptor pool exhausted: {0}")]
    DescriptorPoolExhausted(String),

    /// Operation called in the wrong lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO error (shader files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

impl From<RhiError> for baldwin_core::Error {
    fn from(err: RhiError) -> Self {
        baldwin_core::Error::Render(err.to_string())
    }
}
