//! Frame loop and draw protocol.
//!
//! This crate drives the GPU once a device exists:
//! - Frame slots and their fences ([`frame`])
//! - Swapchain images and the offscreen draw target ([`swapchain`])
//! - The per-frame command stream ([`renderer`])
//! - The immediate-mode UI overlay ([`overlay`])
//! - Backend selection and Vulkan bootstrap ([`backend`])
//!
//! Everything except [`backend`] is generic over
//! [`GpuDevice`](baldwin_rhi::gpu::GpuDevice).

pub mod backend;
pub mod frame;
pub mod overlay;
pub mod renderer;
pub mod swapchain;

pub use backend::{Backend, RenderBackend, VulkanBackend};
pub use frame::{FrameData, FrameRing};
pub use overlay::{ImguiOverlay, Overlay, OverlayShaders};
pub use renderer::{Renderer, RendererDesc, RendererState, ShaderSet};
pub use swapchain::{AllocatedImage, Swapchain};
