//! Vulkan logical device and queue management.
//!
//! This module handles VkDevice creation, queue retrieval, and gpu-allocator
//! initialization, and implements [`GpuDevice`] on top of them.
//!
//! # Overview
//!
//! The [`Device`] struct provides a safe abstraction over the Vulkan logical device,
//! including:
//! - Logical device creation with the swapchain extension and 1.2/1.3 features
//! - A single graphics queue that also presents
//! - Memory allocation via gpu-allocator, with allocations tracked per handle
//!
//! # Example
//!
//! ```no_run
//! use baldwin_rhi::instance::Instance;
//! use baldwin_rhi::physical_device::select_physical_device;
//! use baldwin_rhi::device::Device;
//! use ash::vk;
//!
//! let instance = Instance::new(false, &[]).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let physical_device_info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("No suitable GPU found");
//!
//! let device = Device::new(&instance, &physical_device_info)
//!     .expect("Failed to create logical device");
//!
//! let graphics_queue = device.graphics_queue();
//! ```

use std::collections::HashMap;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use tracing::{debug, error, info};

use crate::barrier::ImageBarrier;
use crate::descriptor::DescriptorBinding;
use crate::error::{RhiError, RhiResult};
use crate::gpu::{BufferDesc, GpuDevice, ImageDesc, Submission, SwapchainDesc, SwapchainImages};
use crate::instance::Instance;
use crate::physical_device::PhysicalDeviceInfo;
use crate::pipeline::{self, GraphicsPipelineDesc};
use crate::rendering::RenderingInfo;
use crate::swapchain;

/// Required device extensions.
///
/// Dynamic rendering and synchronization2 are core in 1.3 and enabled as features.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Vulkan logical device wrapper.
///
/// This struct manages the lifetime of the Vulkan logical device and its associated
/// resources including the queue, the extension loaders and the memory allocator.
///
/// # Thread Safety
///
/// The [`Device`] is designed to be shared across threads using `Arc`. The internal
/// allocator and the allocation tables are protected by a `Mutex`.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// GPU memory allocator. Dropped by hand before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// Memory backing images created through [`GpuDevice::create_image`].
    image_allocations: Mutex<HashMap<vk::Image, Allocation>>,
    /// Memory backing buffers created through [`GpuDevice::create_buffer`].
    buffer_allocations: Mutex<HashMap<vk::Buffer, Allocation>>,
    /// Graphics queue handle, also used for presentation.
    graphics_queue: vk::Queue,
    /// Queue family of the graphics queue.
    graphics_family: u32,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
}

impl Device {
    /// Creates a new logical device.
    ///
    /// This function creates a Vulkan logical device with:
    /// - The swapchain extension
    /// - Vulkan 1.2 features (descriptor indexing, buffer device address)
    /// - Vulkan 1.3 features (dynamic rendering, synchronization2)
    ///
    /// It also initializes the gpu-allocator for memory management.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance
    /// * `physical_device_info` - Information about the selected physical device
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Device creation fails
    /// - Allocator initialization fails
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> Result<Arc<Self>, RhiError> {
        let graphics_family = physical_device_info.graphics_family;
        let queue_priorities = [1.0f32];

        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(graphics_family)
            .queue_priorities(&queue_priorities)];

        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default()
            .descriptor_indexing(true)
            .buffer_device_address(true);

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let extension_names: Vec<*const i8> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        debug!("Graphics queue retrieved from family {}", graphics_family);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        })?;

        info!("GPU memory allocator initialized");

        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), &device);

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            image_allocations: Mutex::new(HashMap::new()),
            buffer_allocations: Mutex::new(HashMap::new()),
            graphics_queue,
            graphics_family,
            surface_loader,
            swapchain_loader,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    fn allocate_memory(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> RhiResult<Allocation> {
        let mut allocator = self.allocator.lock().unwrap();
        let allocation = allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        Ok(allocation)
    }

    fn free_memory(&self, allocation: Allocation) {
        let mut allocator = self.allocator.lock().unwrap();
        if let Err(e) = allocator.free(allocation) {
            error!("Failed to free allocation: {:?}", e);
        }
    }
}

/// Color subresource covering mip 0, layer 0.
fn color_layers() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1)
}

impl GpuDevice for Device {
    // ========================================================================
    // Queue and synchronization
    // ========================================================================

    fn graphics_queue_family(&self) -> u32 {
        self.graphics_family
    }

    fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        Ok(unsafe { self.device.create_fence(&create_info, None)? })
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> RhiResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns)? };
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> RhiResult<()> {
        unsafe { self.device.reset_fences(&[fence])? };
        Ok(())
    }

    fn create_semaphore(&self) -> RhiResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::default();
        Ok(unsafe { self.device.create_semaphore(&create_info, None)? })
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn queue_submit(&self, submission: &Submission) -> RhiResult<()> {
        let semaphore_info = |s: &crate::gpu::SemaphoreStage| {
            vk::SemaphoreSubmitInfo::default()
                .semaphore(s.semaphore)
                .stage_mask(s.stage)
                .device_index(0)
                .value(1)
        };

        let waits: Vec<_> = submission.wait.iter().map(semaphore_info).collect();
        let signals: Vec<_> = submission.signal.iter().map(semaphore_info).collect();
        let command_buffers = [vk::CommandBufferSubmitInfo::default()
            .command_buffer(submission.command_buffer)
            .device_mask(0)];

        let submit_info = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&waits)
            .command_buffer_infos(&command_buffers)
            .signal_semaphore_infos(&signals);

        unsafe {
            self.device
                .queue_submit2(self.graphics_queue, &[submit_info], submission.fence)?
        };
        Ok(())
    }

    // ========================================================================
    // Command pools and buffers
    // ========================================================================

    fn create_command_pool(&self) -> RhiResult<vk::CommandPool> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.graphics_family);
        Ok(unsafe { self.device.create_command_pool(&create_info, None)? })
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) };
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> RhiResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info)? };
        buffers
            .into_iter()
            .next()
            .ok_or(RhiError::VulkanError(vk::Result::ERROR_UNKNOWN))
    }

    fn free_command_buffer(&self, pool: vk::CommandPool, cmd: vk::CommandBuffer) {
        unsafe { self.device.free_command_buffers(pool, &[cmd]) };
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?
        };
        Ok(())
    }

    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
        unsafe { self.device.begin_command_buffer(cmd, &begin_info)? };
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        unsafe { self.device.end_command_buffer(cmd)? };
        Ok(())
    }

    // ========================================================================
    // Command recording
    // ========================================================================

    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier) {
        let barriers = [barrier.to_vk()];
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { self.device.cmd_pipeline_barrier2(cmd, &dependency_info) };
    }

    fn cmd_clear_color_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
    ) {
        let clear_value = vk::ClearColorValue { float32: color };
        let range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .level_count(vk::REMAINING_MIP_LEVELS)
            .layer_count(vk::REMAINING_ARRAY_LAYERS);
        unsafe {
            self.device
                .cmd_clear_color_image(cmd, image, layout, &clear_value, &[range])
        };
    }

    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        dst: vk::Image,
        extent: vk::Extent2D,
    ) {
        let corner = vk::Offset3D {
            x: extent.width as i32,
            y: extent.height as i32,
            z: 1,
        };
        let regions = [vk::ImageBlit2::default()
            .src_subresource(color_layers())
            .src_offsets([vk::Offset3D::default(), corner])
            .dst_subresource(color_layers())
            .dst_offsets([vk::Offset3D::default(), corner])];

        let blit_info = vk::BlitImageInfo2::default()
            .src_image(src)
            .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .dst_image(dst)
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .filter(vk::Filter::LINEAR)
            .regions(&regions);

        unsafe { self.device.cmd_blit_image2(cmd, &blit_info) };
    }

    fn cmd_copy_buffer_to_image(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        image: vk::Image,
        extent: vk::Extent2D,
    ) {
        let region = vk::BufferImageCopy::default()
            .image_subresource(color_layers())
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });

        unsafe {
            self.device.cmd_copy_buffer_to_image(
                cmd,
                buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };
    }

    fn cmd_bind_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        unsafe { self.device.cmd_bind_pipeline(cmd, bind_point, pipeline) };
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.device
                .cmd_bind_descriptor_sets(cmd, bind_point, layout, 0, &[set], &[])
        };
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device
                .cmd_push_constants(cmd, layout, stages, offset, data)
        };
    }

    fn cmd_dispatch(&self, cmd: vk::CommandBuffer, x: u32, y: u32, z: u32) {
        unsafe { self.device.cmd_dispatch(cmd, x, y, z) };
    }

    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, info: &RenderingInfo) {
        let color_attachments = [info.color.to_rendering_attachment_info()];
        let rendering_info = vk::RenderingInfo::default()
            .render_area(info.render_area())
            .layer_count(1)
            .color_attachments(&color_attachments);

        unsafe { self.device.cmd_begin_rendering(cmd, &rendering_info) };
    }

    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_rendering(cmd) };
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe { self.device.cmd_set_viewport(cmd, 0, &[viewport]) };
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(cmd, 0, &[scissor]) };
    }

    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe { self.device.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0]) };
    }

    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    ) {
        unsafe { self.device.cmd_bind_index_buffer(cmd, buffer, 0, index_type) };
    }

    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw(
                cmd,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            )
        };
    }

    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        first_index: u32,
        vertex_offset: i32,
    ) {
        unsafe {
            self.device
                .cmd_draw_indexed(cmd, index_count, 1, first_index, vertex_offset, 0)
        };
    }

    // ========================================================================
    // Swapchain
    // ========================================================================

    fn create_swapchain(&self, desc: &SwapchainDesc) -> RhiResult<SwapchainImages> {
        swapchain::create_swapchain(
            &self.swapchain_loader,
            &self.surface_loader,
            self.physical_device,
            desc,
        )
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> RhiResult<u32> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                swapchain,
                timeout_ns,
                signal,
                vk::Fence::null(),
            )?
        };

        if suboptimal {
            return Err(RhiError::VulkanError(vk::Result::SUBOPTIMAL_KHR));
        }
        Ok(index)
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RhiResult<()> {
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait];

        let present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .image_indices(&image_indices)
            .wait_semaphores(&wait_semaphores);

        let suboptimal = unsafe {
            self.swapchain_loader
                .queue_present(self.graphics_queue, &present_info)?
        };

        if suboptimal {
            return Err(RhiError::VulkanError(vk::Result::SUBOPTIMAL_KHR));
        }
        Ok(())
    }

    // ========================================================================
    // Images, buffers and samplers
    // ========================================================================

    fn create_image(&self, desc: &ImageDesc) -> RhiResult<vk::Image> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(desc.extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&create_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match self.allocate_memory(&desc.name, requirements, desc.location, false)
        {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())?
        };

        debug!(
            "Created image '{}' ({}x{}, {:?})",
            desc.name, desc.extent.width, desc.extent.height, desc.format
        );

        self.image_allocations
            .lock()
            .unwrap()
            .insert(image, allocation);
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) };
        let allocation = self.image_allocations.lock().unwrap().remove(&image);
        if let Some(allocation) = allocation {
            self.free_memory(allocation);
        }
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> RhiResult<vk::ImageView> {
        let subresource_range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1);

        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(subresource_range);

        Ok(unsafe { self.device.create_image_view(&create_info, None)? })
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn create_buffer(&self, desc: &BufferDesc) -> RhiResult<vk::Buffer> {
        let create_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&create_info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = match self.allocate_memory(&desc.name, requirements, desc.location, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?
        };

        debug!("Created buffer '{}' ({} bytes)", desc.name, desc.size);

        self.buffer_allocations
            .lock()
            .unwrap()
            .insert(buffer, allocation);
        Ok(buffer)
    }

    fn write_buffer(&self, buffer: vk::Buffer, offset: u64, data: &[u8]) -> RhiResult<()> {
        let mut allocations = self.buffer_allocations.lock().unwrap();
        let allocation = allocations.get_mut(&buffer).ok_or_else(|| {
            RhiError::InvalidState(format!("buffer {:?} has no allocation", buffer))
        })?;

        let mapped = allocation.mapped_slice_mut().ok_or_else(|| {
            RhiError::InvalidState("buffer memory is not host visible".to_string())
        })?;

        let start = offset as usize;
        let end = start + data.len();
        if end > mapped.len() {
            return Err(RhiError::InvalidState(format!(
                "write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                mapped.len()
            )));
        }

        mapped[start..end].copy_from_slice(data);
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) };
        let allocation = self.buffer_allocations.lock().unwrap().remove(&buffer);
        if let Some(allocation) = allocation {
            self.free_memory(allocation);
        }
    }

    fn create_sampler(&self, filter: vk::Filter) -> RhiResult<vk::Sampler> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(vk::LOD_CLAMP_NONE);

        Ok(unsafe { self.device.create_sampler(&create_info, None)? })
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) };
    }

    // ========================================================================
    // Descriptors
    // ========================================================================

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
        stages: vk::ShaderStageFlags,
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> RhiResult<vk::DescriptorSetLayout> {
        let vk_bindings: Vec<_> = bindings.iter().map(|b| b.to_vk(stages)).collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&vk_bindings)
            .flags(flags);

        Ok(unsafe {
            self.device
                .create_descriptor_set_layout(&create_info, None)?
        })
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> RhiResult<vk::DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(sizes)
            .flags(flags);

        Ok(unsafe { self.device.create_descriptor_pool(&create_info, None)? })
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> RhiResult<()> {
        unsafe {
            self.device
                .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())?
        };
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) };
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> RhiResult<vk::DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info)? };
        sets.into_iter()
            .next()
            .ok_or(RhiError::VulkanError(vk::Result::ERROR_UNKNOWN))
    }

    fn write_image_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    ) {
        let image_infos = [vk::DescriptorImageInfo::default()
            .sampler(sampler)
            .image_view(view)
            .image_layout(layout)];

        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(ty)
            .image_info(&image_infos);

        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
    }

    // ========================================================================
    // Shaders and pipelines
    // ========================================================================

    fn create_shader_module(&self, code: &[u32]) -> RhiResult<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { self.device.create_shader_module(&create_info, None) }
            .map_err(|e| RhiError::ShaderError(format!("Failed to create shader module: {}", e)))?;
        Ok(module)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) };
    }

    fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<vk::PipelineLayout> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        Ok(unsafe { self.device.create_pipeline_layout(&create_info, None)? })
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) };
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> RhiResult<vk::Pipeline> {
        pipeline::create_graphics_pipeline(&self.device, desc)
    }

    fn create_compute_pipeline(
        &self,
        module: vk::ShaderModule,
        layout: vk::PipelineLayout,
    ) -> RhiResult<vk::Pipeline> {
        pipeline::create_compute_pipeline(&self.device, module, layout)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) };
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            // Wait for all operations to complete before cleanup
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            let leaked_images = self.image_allocations.get_mut().map_or(0, |m| m.len());
            let leaked_buffers = self.buffer_allocations.get_mut().map_or(0, |m| m.len());
            if leaked_images + leaked_buffers > 0 {
                error!(
                    "Device dropped with {} image(s) and {} buffer(s) still allocated",
                    leaked_images, leaked_buffers
                );
            }

            // The allocator frees its memory blocks through the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: Device is Send+Sync because:
// - ash::Device and the extension loaders are Send+Sync
// - vk::PhysicalDevice and vk::Queue are Copy types (handles)
// - Allocator and allocation tables are protected by Mutex
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
