//! The device capability boundary.
//!
//! Everything above the RHI talks to the GPU through [`GpuDevice`]. The trait
//! speaks raw `ash::vk` handles, which are plain `Copy` values, so components
//! can store them freely and teardown closures can capture them by value.
//!
//! Two implementations exist:
//! - [`crate::device::Device`], the Vulkan logical device;
//! - [`crate::testing::RecordingDevice`], a test double that logs every call
//!   (behind the `test-utils` feature).
//!
//! # Example
//!
//! ```no_run
//! use baldwin_rhi::gpu::GpuDevice;
//! use baldwin_rhi::{vk, RhiResult};
//!
//! fn make_sync<D: GpuDevice>(device: &D) -> RhiResult<(vk::Fence, vk::Semaphore)> {
//!     let fence = device.create_fence(true)?;
//!     let semaphore = device.create_semaphore()?;
//!     Ok((fence, semaphore))
//! }
//! ```

use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::barrier::ImageBarrier;
use crate::descriptor::DescriptorBinding;
use crate::error::RhiResult;
use crate::pipeline::GraphicsPipelineDesc;
use crate::rendering::RenderingInfo;

/// A semaphore paired with the pipeline stage it is waited on or signaled at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreStage {
    pub semaphore: vk::Semaphore,
    pub stage: vk::PipelineStageFlags2,
}

impl SemaphoreStage {
    pub fn new(semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        Self { semaphore, stage }
    }
}

/// One synchronization2 queue submission of a single command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub command_buffer: vk::CommandBuffer,
    pub wait: Option<SemaphoreStage>,
    pub signal: Option<SemaphoreStage>,
    /// Fence signaled on completion, or `vk::Fence::null()`.
    pub fence: vk::Fence,
}

/// Swapchain creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub surface: vk::SurfaceKHR,
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub usage: vk::ImageUsageFlags,
}

/// A created swapchain and its presentable images.
///
/// The format and extent are what the platform actually granted, which may
/// differ from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainImages {
    pub handle: vk::SwapchainKHR,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
}

/// 2D image creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDesc {
    pub name: String,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub usage: vk::ImageUsageFlags,
    pub location: MemoryLocation,
}

/// Buffer creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub name: String,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
}

/// GPU operations used by the renderer.
///
/// Creation methods return `RhiResult`. Destruction and command recording are
/// infallible at the API level: invalid handles are undefined device-side
/// behavior, as with the underlying Vulkan calls.
pub trait GpuDevice {
    // ========================================================================
    // Queue and synchronization
    // ========================================================================

    /// Queue family index of the graphics (and present) queue.
    fn graphics_queue_family(&self) -> u32;

    /// Blocks until every queue is idle.
    fn wait_idle(&self) -> RhiResult<()>;

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);

    /// Waits for `fence` for at most `timeout_ns`.
    ///
    /// # Errors
    ///
    /// A timeout is reported as `RhiError::VulkanError(vk::Result::TIMEOUT)`.
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> RhiResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> RhiResult<()>;

    fn create_semaphore(&self) -> RhiResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    fn queue_submit(&self, submission: &Submission) -> RhiResult<()>;

    // ========================================================================
    // Command pools and buffers
    // ========================================================================

    /// Creates a resettable command pool on the graphics queue family.
    fn create_command_pool(&self) -> RhiResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> RhiResult<vk::CommandBuffer>;
    fn free_command_buffer(&self, pool: vk::CommandPool, cmd: vk::CommandBuffer);

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()>;
    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> RhiResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()>;

    // ========================================================================
    // Command recording
    // ========================================================================

    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier);
    fn cmd_clear_color_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
    );
    /// Blits the `extent` region at the origin of `src` onto the same region of
    /// `dst`. Formats may differ.
    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        dst: vk::Image,
        extent: vk::Extent2D,
    );
    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        image: vk::Image,
        extent: vk::Extent2D,
    );
    fn cmd_bind_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );
    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    );
    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    fn cmd_dispatch(&self, cmd: vk::CommandBuffer, x: u32, y: u32, z: u32);
    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, info: &RenderingInfo);
    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer);
    /// Sets a viewport covering `extent` with depth range 0..1.
    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, extent: vk::Extent2D);
    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D);
    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    );
    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    );

    // ========================================================================
    // Swapchain
    // ========================================================================

    fn create_swapchain(&self, desc: &SwapchainDesc) -> RhiResult<SwapchainImages>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);

    /// Acquires the next presentable image index.
    ///
    /// # Errors
    ///
    /// Any result other than `SUCCESS`, including `SUBOPTIMAL_KHR`, is an error.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> RhiResult<u32>;

    /// Presents `image_index` on the graphics queue after `wait` signals.
    ///
    /// # Errors
    ///
    /// Any result other than `SUCCESS`, including `SUBOPTIMAL_KHR`, is an error.
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RhiResult<()>;

    // ========================================================================
    // Images, buffers and samplers
    // ========================================================================

    fn create_image(&self, desc: &ImageDesc) -> RhiResult<vk::Image>;
    /// Destroys the image and frees its memory.
    fn destroy_image(&self, image: vk::Image);
    /// Creates a 2D color view over mip 0, layer 0.
    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> RhiResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_buffer(&self, desc: &BufferDesc) -> RhiResult<vk::Buffer>;
    /// Copies `data` into a host-visible buffer at `offset`.
    fn write_buffer(&self, buffer: vk::Buffer, offset: u64, data: &[u8]) -> RhiResult<()>;
    fn destroy_buffer(&self, buffer: vk::Buffer);

    fn create_sampler(&self, filter: vk::Filter) -> RhiResult<vk::Sampler>;
    fn destroy_sampler(&self, sampler: vk::Sampler);

    // ========================================================================
    // Descriptors
    // ========================================================================

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
        stages: vk::ShaderStageFlags,
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> RhiResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> RhiResult<vk::DescriptorPool>;
    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> RhiResult<()>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> RhiResult<vk::DescriptorSet>;

    /// Writes one image descriptor. `sampler` may be null for storage images.
    fn write_image_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    );

    // ========================================================================
    // Shaders and pipelines
    // ========================================================================

    fn create_shader_module(&self, code: &[u32]) -> RhiResult<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);

    /// Creates a graphics pipeline for dynamic rendering.
    ///
    /// Callers must have validated that shaders and layout are set.
    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> RhiResult<vk::Pipeline>;
    fn create_compute_pipeline(
        &self,
        module: vk::ShaderModule,
        layout: vk::PipelineLayout,
    ) -> RhiResult<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);
}
