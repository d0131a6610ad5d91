//! A [`GpuDevice`] that records calls instead of talking to a GPU.
//!
//! Every call is appended to an ordered log of [`Call`] values so tests can
//! assert on the exact command stream a component produced. Handles are
//! unique non-null values from a counter.
//!
//! Fences are simulated: a submitted fence is pending until waited on, at
//! which point the "GPU" completes it. [`RecordingDevice::stall_gpu`] makes
//! pending fences time out instead. Waiting on a fence that was reset and
//! never submitted also times out, as it would hang on real hardware.
//!
//! Enabled for downstream crates with the `test-utils` feature.

use std::collections::HashMap;
use std::sync::Mutex;

use ash::vk;
use ash::vk::Handle;

use crate::barrier::ImageBarrier;
use crate::descriptor::DescriptorBinding;
use crate::error::{RhiError, RhiResult};
use crate::gpu::{BufferDesc, GpuDevice, ImageDesc, Submission, SwapchainDesc, SwapchainImages};
use crate::pipeline::GraphicsPipelineDesc;
use crate::rendering::RenderingInfo;

/// Handle values start here, above anything tests build with `from_raw`.
const FIRST_HANDLE: u64 = 0x1000;

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    WaitIdle,
    CreateFence { fence: vk::Fence, signaled: bool },
    DestroyFence { fence: vk::Fence },
    WaitForFence { fence: vk::Fence, timeout_ns: u64 },
    ResetFence { fence: vk::Fence },
    CreateSemaphore { semaphore: vk::Semaphore },
    DestroySemaphore { semaphore: vk::Semaphore },
    Submit(Submission),

    CreateCommandPool { pool: vk::CommandPool },
    DestroyCommandPool { pool: vk::CommandPool },
    AllocateCommandBuffer { pool: vk::CommandPool, cmd: vk::CommandBuffer },
    FreeCommandBuffer { pool: vk::CommandPool, cmd: vk::CommandBuffer },
    ResetCommandBuffer { cmd: vk::CommandBuffer },
    BeginCommandBuffer { cmd: vk::CommandBuffer, flags: vk::CommandBufferUsageFlags },
    EndCommandBuffer { cmd: vk::CommandBuffer },

    ImageBarrier(ImageBarrier),
    ClearColorImage { image: vk::Image, layout: vk::ImageLayout, color: [f32; 4] },
    BlitImage { src: vk::Image, dst: vk::Image, extent: vk::Extent2D },
    CopyBufferToImage { buffer: vk::Buffer, image: vk::Image, extent: vk::Extent2D },
    BindPipeline { bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline },
    BindDescriptorSet {
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    },
    PushConstants {
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    Dispatch { x: u32, y: u32, z: u32 },
    BeginRendering(RenderingInfo),
    EndRendering,
    SetViewport { extent: vk::Extent2D },
    SetScissor { x: i32, y: i32, width: u32, height: u32 },
    BindVertexBuffer { buffer: vk::Buffer },
    BindIndexBuffer { buffer: vk::Buffer, index_type: vk::IndexType },
    Draw { vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32 },
    DrawIndexed { index_count: u32, first_index: u32, vertex_offset: i32 },

    CreateSwapchain { swapchain: vk::SwapchainKHR, desc: SwapchainDesc },
    DestroySwapchain { swapchain: vk::SwapchainKHR },
    AcquireNextImage { swapchain: vk::SwapchainKHR, timeout_ns: u64, signal: vk::Semaphore },
    QueuePresent { swapchain: vk::SwapchainKHR, image_index: u32, wait: vk::Semaphore },

    CreateImage { image: vk::Image, desc: ImageDesc },
    DestroyImage { image: vk::Image },
    CreateImageView { view: vk::ImageView, image: vk::Image, format: vk::Format },
    DestroyImageView { view: vk::ImageView },
    CreateBuffer { buffer: vk::Buffer, desc: BufferDesc },
    WriteBuffer { buffer: vk::Buffer, offset: u64, len: usize },
    DestroyBuffer { buffer: vk::Buffer },
    CreateSampler { sampler: vk::Sampler },
    DestroySampler { sampler: vk::Sampler },

    CreateDescriptorSetLayout {
        layout: vk::DescriptorSetLayout,
        bindings: Vec<DescriptorBinding>,
        stages: vk::ShaderStageFlags,
    },
    DestroyDescriptorSetLayout { layout: vk::DescriptorSetLayout },
    CreateDescriptorPool {
        pool: vk::DescriptorPool,
        max_sets: u32,
        flags: vk::DescriptorPoolCreateFlags,
    },
    ResetDescriptorPool { pool: vk::DescriptorPool },
    DestroyDescriptorPool { pool: vk::DescriptorPool },
    AllocateDescriptorSet {
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        set: vk::DescriptorSet,
    },
    WriteImageDescriptor {
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    },

    CreateShaderModule { module: vk::ShaderModule, words: usize },
    DestroyShaderModule { module: vk::ShaderModule },
    CreatePipelineLayout {
        layout: vk::PipelineLayout,
        set_layouts: Vec<vk::DescriptorSetLayout>,
    },
    DestroyPipelineLayout { layout: vk::PipelineLayout },
    CreateGraphicsPipeline { desc: GraphicsPipelineDesc },
    CreateComputePipeline { module: vk::ShaderModule, layout: vk::PipelineLayout },
    DestroyPipeline { pipeline: vk::Pipeline },
}

impl Call {
    /// Whether this call records into a command buffer.
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            Call::ImageBarrier(_)
                | Call::ClearColorImage { .. }
                | Call::BlitImage { .. }
                | Call::CopyBufferToImage { .. }
                | Call::BindPipeline { .. }
                | Call::BindDescriptorSet { .. }
                | Call::PushConstants { .. }
                | Call::Dispatch { .. }
                | Call::BeginRendering(_)
                | Call::EndRendering
                | Call::SetViewport { .. }
                | Call::SetScissor { .. }
                | Call::BindVertexBuffer { .. }
                | Call::BindIndexBuffer { .. }
                | Call::Draw { .. }
                | Call::DrawIndexed { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Pending,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    next_handle: u64,
    fences: HashMap<vk::Fence, FenceState>,
    gpu_stalled: bool,
    acquire_failure: Option<vk::Result>,
    present_failure: Option<vk::Result>,
    pipeline_failure: bool,
    swapchain_image_count: usize,
    granted_extent: Option<vk::Extent2D>,
    next_image: HashMap<vk::SwapchainKHR, (usize, usize)>,
}

impl State {
    fn handle<H: Handle>(&mut self) -> H {
        let raw = self.next_handle;
        self.next_handle += 1;
        H::from_raw(raw)
    }
}

/// Recording test double for [`GpuDevice`].
#[derive(Debug)]
pub struct RecordingDevice {
    state: Mutex<State>,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_handle: FIRST_HANDLE,
                swapchain_image_count: 3,
                ..Default::default()
            }),
        }
    }

    /// Snapshot of every call so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Forgets recorded calls. Handles and fence states are kept.
    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn contains(&self, call: &Call) -> bool {
        self.state.lock().unwrap().calls.contains(call)
    }

    /// Position of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.state.lock().unwrap().calls.iter().position(pred)
    }

    /// Every image barrier recorded so far.
    pub fn barriers(&self) -> Vec<ImageBarrier> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::ImageBarrier(barrier) => Some(*barrier),
                _ => None,
            })
            .collect()
    }

    /// Every queue submission recorded so far.
    pub fn submissions(&self) -> Vec<Submission> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Submit(submission) => Some(*submission),
                _ => None,
            })
            .collect()
    }

    /// Makes waits on pending fences time out, as if the GPU hung.
    pub fn stall_gpu(&self, stalled: bool) {
        self.state.lock().unwrap().gpu_stalled = stalled;
    }

    /// The next `acquire_next_image` fails with `result`.
    pub fn fail_next_acquire(&self, result: vk::Result) {
        self.state.lock().unwrap().acquire_failure = Some(result);
    }

    /// The next `queue_present` fails with `result`.
    pub fn fail_next_present(&self, result: vk::Result) {
        self.state.lock().unwrap().present_failure = Some(result);
    }

    /// Pipeline creation fails until turned off again.
    pub fn fail_pipelines(&self, fail: bool) {
        self.state.lock().unwrap().pipeline_failure = fail;
    }

    /// Number of images new swapchains hand out.
    pub fn set_swapchain_image_count(&self, count: usize) {
        self.state.lock().unwrap().swapchain_image_count = count;
    }

    /// Makes new swapchains use `extent` instead of the requested size.
    pub fn grant_extent(&self, extent: vk::Extent2D) {
        self.state.lock().unwrap().granted_extent = Some(extent);
    }

    /// Whether `fence` is currently signaled.
    pub fn fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state.lock().unwrap().fences.get(&fence) == Some(&FenceState::Signaled)
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn create<H: Handle + Copy>(&self, call: impl FnOnce(H) -> Call) -> H {
        let mut state = self.state.lock().unwrap();
        let handle = state.handle();
        state.calls.push(call(handle));
        handle
    }
}

impl GpuDevice for RecordingDevice {
    fn graphics_queue_family(&self) -> u32 {
        0
    }

    fn wait_idle(&self) -> RhiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::WaitIdle);
        if !state.gpu_stalled {
            for fence in state.fences.values_mut() {
                if *fence == FenceState::Pending {
                    *fence = FenceState::Signaled;
                }
            }
        }
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence> {
        let mut state = self.state.lock().unwrap();
        let fence: vk::Fence = state.handle();
        let initial = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        state.fences.insert(fence, initial);
        state.calls.push(Call::CreateFence { fence, signaled });
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock().unwrap();
        state.fences.remove(&fence);
        state.calls.push(Call::DestroyFence { fence });
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> RhiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::WaitForFence { fence, timeout_ns });

        let stalled = state.gpu_stalled;
        match state.fences.get_mut(&fence) {
            Some(FenceState::Signaled) => Ok(()),
            Some(pending @ FenceState::Pending) if !stalled => {
                *pending = FenceState::Signaled;
                Ok(())
            }
            Some(_) => Err(RhiError::VulkanError(vk::Result::TIMEOUT)),
            None => Err(RhiError::InvalidState(format!("unknown fence {:?}", fence))),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> RhiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ResetFence { fence });
        match state.fences.get_mut(&fence) {
            Some(fence_state) => {
                *fence_state = FenceState::Unsignaled;
                Ok(())
            }
            None => Err(RhiError::InvalidState(format!("unknown fence {:?}", fence))),
        }
    }

    fn create_semaphore(&self) -> RhiResult<vk::Semaphore> {
        Ok(self.create(|semaphore| Call::CreateSemaphore { semaphore }))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.record(Call::DestroySemaphore { semaphore });
    }

    fn queue_submit(&self, submission: &Submission) -> RhiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Submit(*submission));
        if submission.fence != vk::Fence::null() {
            match state.fences.get_mut(&submission.fence) {
                Some(fence) if *fence == FenceState::Unsignaled => *fence = FenceState::Pending,
                Some(_) => {
                    return Err(RhiError::InvalidState(
                        "submitted with a fence that is not unsignaled".to_string(),
                    ));
                }
                None => {
                    return Err(RhiError::InvalidState(format!(
                        "unknown fence {:?}",
                        submission.fence
                    )));
                }
            }
        }
        Ok(())
    }

    fn create_command_pool(&self) -> RhiResult<vk::CommandPool> {
        Ok(self.create(|pool| Call::CreateCommandPool { pool }))
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.record(Call::DestroyCommandPool { pool });
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> RhiResult<vk::CommandBuffer> {
        Ok(self.create(|cmd| Call::AllocateCommandBuffer { pool, cmd }))
    }

    fn free_command_buffer(&self, pool: vk::CommandPool, cmd: vk::CommandBuffer) {
        self.record(Call::FreeCommandBuffer { pool, cmd });
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        self.record(Call::ResetCommandBuffer { cmd });
        Ok(())
    }

    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> RhiResult<()> {
        self.record(Call::BeginCommandBuffer { cmd, flags });
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        self.record(Call::EndCommandBuffer { cmd });
        Ok(())
    }

    fn cmd_image_barrier(&self, _cmd: vk::CommandBuffer, barrier: &ImageBarrier) {
        self.record(Call::ImageBarrier(*barrier));
    }

    fn cmd_clear_color_image(
        &self,
        _cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
    ) {
        self.record(Call::ClearColorImage {
            image,
            layout,
            color,
        });
    }

    fn cmd_blit_image(
        &self,
        _cmd: vk::CommandBuffer,
        src: vk::Image,
        dst: vk::Image,
        extent: vk::Extent2D,
    ) {
        self.record(Call::BlitImage { src, dst, extent });
    }

    fn cmd_copy_buffer_to_image(
        &self,
        _cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        image: vk::Image,
        extent: vk::Extent2D,
    ) {
        self.record(Call::CopyBufferToImage {
            buffer,
            image,
            extent,
        });
    }

    fn cmd_bind_pipeline(
        &self,
        _cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        self.record(Call::BindPipeline {
            bind_point,
            pipeline,
        });
    }

    fn cmd_bind_descriptor_set(
        &self,
        _cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        self.record(Call::BindDescriptorSet {
            bind_point,
            layout,
            set,
        });
    }

    fn cmd_push_constants(
        &self,
        _cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.record(Call::PushConstants {
            layout,
            stages,
            offset,
            data: data.to_vec(),
        });
    }

    fn cmd_dispatch(&self, _cmd: vk::CommandBuffer, x: u32, y: u32, z: u32) {
        self.record(Call::Dispatch { x, y, z });
    }

    fn cmd_begin_rendering(&self, _cmd: vk::CommandBuffer, info: &RenderingInfo) {
        self.record(Call::BeginRendering(*info));
    }

    fn cmd_end_rendering(&self, _cmd: vk::CommandBuffer) {
        self.record(Call::EndRendering);
    }

    fn cmd_set_viewport(&self, _cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        self.record(Call::SetViewport { extent });
    }

    fn cmd_set_scissor(&self, _cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.record(Call::SetScissor {
            x: scissor.offset.x,
            y: scissor.offset.y,
            width: scissor.extent.width,
            height: scissor.extent.height,
        });
    }

    fn cmd_bind_vertex_buffer(&self, _cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.record(Call::BindVertexBuffer { buffer });
    }

    fn cmd_bind_index_buffer(
        &self,
        _cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    ) {
        self.record(Call::BindIndexBuffer { buffer, index_type });
    }

    fn cmd_draw(
        &self,
        _cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.record(Call::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn cmd_draw_indexed(
        &self,
        _cmd: vk::CommandBuffer,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) {
        self.record(Call::DrawIndexed {
            index_count,
            first_index,
            vertex_offset,
        });
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> RhiResult<SwapchainImages> {
        let mut state = self.state.lock().unwrap();
        let swapchain: vk::SwapchainKHR = state.handle();
        let count = state.swapchain_image_count;
        let images: Vec<vk::Image> = (0..count).map(|_| state.handle()).collect();
        let extent = state.granted_extent.unwrap_or(vk::Extent2D {
            width: desc.width,
            height: desc.height,
        });
        state.next_image.insert(swapchain, (0, count));
        state.calls.push(Call::CreateSwapchain {
            swapchain,
            desc: *desc,
        });

        Ok(SwapchainImages {
            handle: swapchain,
            format: desc.format,
            extent,
            images,
        })
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.lock().unwrap();
        state.next_image.remove(&swapchain);
        state.calls.push(Call::DestroySwapchain { swapchain });
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> RhiResult<u32> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::AcquireNextImage {
            swapchain,
            timeout_ns,
            signal,
        });

        if let Some(result) = state.acquire_failure.take() {
            return Err(RhiError::VulkanError(result));
        }

        let (next, count) = state.next_image.get_mut(&swapchain).ok_or_else(|| {
            RhiError::InvalidState(format!("unknown swapchain {:?}", swapchain))
        })?;
        let index = *next;
        *next = (*next + 1) % *count;
        Ok(index as u32)
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RhiResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::QueuePresent {
            swapchain,
            image_index,
            wait,
        });

        match state.present_failure.take() {
            Some(result) => Err(RhiError::VulkanError(result)),
            None => Ok(()),
        }
    }

    fn create_image(&self, desc: &ImageDesc) -> RhiResult<vk::Image> {
        Ok(self.create(|image| Call::CreateImage {
            image,
            desc: desc.clone(),
        }))
    }

    fn destroy_image(&self, image: vk::Image) {
        self.record(Call::DestroyImage { image });
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> RhiResult<vk::ImageView> {
        Ok(self.create(|view| Call::CreateImageView {
            view,
            image,
            format,
        }))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.record(Call::DestroyImageView { view });
    }

    fn create_buffer(&self, desc: &BufferDesc) -> RhiResult<vk::Buffer> {
        Ok(self.create(|buffer| Call::CreateBuffer {
            buffer,
            desc: desc.clone(),
        }))
    }

    fn write_buffer(&self, buffer: vk::Buffer, offset: u64, data: &[u8]) -> RhiResult<()> {
        self.record(Call::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.record(Call::DestroyBuffer { buffer });
    }

    fn create_sampler(&self, _filter: vk::Filter) -> RhiResult<vk::Sampler> {
        Ok(self.create(|sampler| Call::CreateSampler { sampler }))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.record(Call::DestroySampler { sampler });
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
        stages: vk::ShaderStageFlags,
        _flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> RhiResult<vk::DescriptorSetLayout> {
        Ok(self.create(|layout| Call::CreateDescriptorSetLayout {
            layout,
            bindings: bindings.to_vec(),
            stages,
        }))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.record(Call::DestroyDescriptorSetLayout { layout });
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        _sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> RhiResult<vk::DescriptorPool> {
        Ok(self.create(|pool| Call::CreateDescriptorPool {
            pool,
            max_sets,
            flags,
        }))
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> RhiResult<()> {
        self.record(Call::ResetDescriptorPool { pool });
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.record(Call::DestroyDescriptorPool { pool });
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> RhiResult<vk::DescriptorSet> {
        Ok(self.create(|set| Call::AllocateDescriptorSet { pool, layout, set }))
    }

    fn write_image_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        view: vk::ImageView,
        _sampler: vk::Sampler,
        layout: vk::ImageLayout,
    ) {
        self.record(Call::WriteImageDescriptor {
            set,
            binding,
            ty,
            view,
            layout,
        });
    }

    fn create_shader_module(&self, code: &[u32]) -> RhiResult<vk::ShaderModule> {
        Ok(self.create(|module| Call::CreateShaderModule {
            module,
            words: code.len(),
        }))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.record(Call::DestroyShaderModule { module });
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        _push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<vk::PipelineLayout> {
        Ok(self.create(|layout| Call::CreatePipelineLayout {
            layout,
            set_layouts: set_layouts.to_vec(),
        }))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.record(Call::DestroyPipelineLayout { layout });
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> RhiResult<vk::Pipeline> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateGraphicsPipeline { desc: desc.clone() });
        if state.pipeline_failure {
            return Err(RhiError::VulkanError(vk::Result::ERROR_UNKNOWN));
        }
        Ok(state.handle())
    }

    fn create_compute_pipeline(
        &self,
        module: vk::ShaderModule,
        layout: vk::PipelineLayout,
    ) -> RhiResult<vk::Pipeline> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateComputePipeline { module, layout });
        if state.pipeline_failure {
            return Err(RhiError::VulkanError(vk::Result::ERROR_UNKNOWN));
        }
        Ok(state.handle())
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.record(Call::DestroyPipeline { pipeline });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique_and_non_null() {
        let device = RecordingDevice::new();
        let a = device.create_semaphore().unwrap();
        let b = device.create_semaphore().unwrap();
        assert_ne!(a, b);
        assert_ne!(a, vk::Semaphore::null());
    }

    #[test]
    fn test_submitted_fence_completes_on_wait() {
        let device = RecordingDevice::new();
        let fence = device.create_fence(true).unwrap();
        device.wait_for_fence(fence, 1).unwrap();
        device.reset_fence(fence).unwrap();
        assert!(!device.fence_signaled(fence));

        device
            .queue_submit(&Submission {
                command_buffer: vk::CommandBuffer::null(),
                wait: None,
                signal: None,
                fence,
            })
            .unwrap();
        device.wait_for_fence(fence, 1).unwrap();
        assert!(device.fence_signaled(fence));
    }

    #[test]
    fn test_reset_fence_never_submitted_times_out() {
        let device = RecordingDevice::new();
        let fence = device.create_fence(true).unwrap();
        device.reset_fence(fence).unwrap();
        assert!(matches!(
            device.wait_for_fence(fence, 1),
            Err(RhiError::VulkanError(vk::Result::TIMEOUT))
        ));
    }

    #[test]
    fn test_stalled_gpu_times_out_pending_fence() {
        let device = RecordingDevice::new();
        let fence = device.create_fence(false).unwrap();
        device
            .queue_submit(&Submission {
                command_buffer: vk::CommandBuffer::null(),
                wait: None,
                signal: None,
                fence,
            })
            .unwrap();

        device.stall_gpu(true);
        assert!(device.wait_for_fence(fence, 1).is_err());

        device.stall_gpu(false);
        assert!(device.wait_for_fence(fence, 1).is_ok());
    }

    #[test]
    fn test_acquire_cycles_images_and_injects_failure() {
        let device = RecordingDevice::new();
        device.set_swapchain_image_count(2);
        let swapchain = device
            .create_swapchain(&SwapchainDesc {
                surface: vk::SurfaceKHR::null(),
                width: 64,
                height: 32,
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                present_mode: vk::PresentModeKHR::FIFO,
                usage: vk::ImageUsageFlags::TRANSFER_DST,
            })
            .unwrap();
        assert_eq!(swapchain.images.len(), 2);
        assert_eq!(swapchain.extent, vk::Extent2D { width: 64, height: 32 });

        let semaphore = device.create_semaphore().unwrap();
        let indices: Vec<u32> = (0..3)
            .map(|_| device.acquire_next_image(swapchain.handle, 1, semaphore).unwrap())
            .collect();
        assert_eq!(indices, vec![0, 1, 0]);

        device.fail_next_acquire(vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert!(device.acquire_next_image(swapchain.handle, 1, semaphore).is_err());
        assert!(device.acquire_next_image(swapchain.handle, 1, semaphore).is_ok());
    }
}
