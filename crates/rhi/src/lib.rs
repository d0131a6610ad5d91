//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a thin abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, physical device and logical device creation
//! - The [`gpu::GpuDevice`] boundary the renderer records through
//! - Image layout transitions and image copies
//! - Descriptor layouts and a fixed-capacity descriptor allocator
//! - Graphics and compute pipeline construction
//! - Swapchain negotiation

mod error;

pub mod barrier;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod gpu;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod shader;
pub mod swapchain;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
pub use gpu_allocator::MemoryLocation;
