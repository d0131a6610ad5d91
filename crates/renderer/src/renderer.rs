//! Renderer orchestration.
//!
//! [`Renderer`] owns the swapchain, the frame ring, the descriptors and the
//! two pipelines, and records one frame per [`Renderer::run`] call.
//!
//! # Lifecycle
//!
//! `Uninitialized → Initialized → Running → CleanedUp`
//!
//! Every object created during [`Renderer::init`] registers its destruction
//! on a teardown queue at creation time. [`Renderer::cleanup`] waits for the
//! device, destroys the overlay, flushes the frame slot queues in slot order
//! and finally flushes the global queue, so objects are released in reverse
//! creation order.
//!
//! # Frame protocol
//!
//! A frame draws into an HDR offscreen image and copies it onto the acquired
//! swapchain image:
//!
//! 1. Wait for and reset the slot fence, acquire an image
//! 2. Clear the draw image, then run the gradient compute shader over it
//! 3. Draw the triangle on top with dynamic rendering
//! 4. Copy the draw image to the swapchain image, draw the overlay there
//! 5. Submit and present
//!
//! Any failure is fatal: there is no swapchain recreation.

use std::cell::{Ref, RefCell};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use baldwin_core::DeletionQueue;
use baldwin_platform::InputState;
use baldwin_rhi::barrier::{copy_image_to_image, image_barrier, transition_image};
use baldwin_rhi::command::CommandBuffer;
use baldwin_rhi::descriptor::{
    DescriptorAllocator, DescriptorLayoutBuilder, PoolSizeRatio, write_storage_image,
};
use baldwin_rhi::gpu::{GpuDevice, SemaphoreStage, Submission};
use baldwin_rhi::pipeline::{
    ComputePipelineBuilder, CullMode, FrontFace, GraphicsPipelineBuilder, PolygonMode,
    PrimitiveTopology,
};
use baldwin_rhi::rendering::{ColorAttachment, RenderingInfo};
use baldwin_rhi::shader::load_spirv;
use baldwin_rhi::{RhiError, RhiResult};
use tracing::{debug, error, info};

use crate::frame::FrameRing;
use crate::overlay::Overlay;
use crate::swapchain::Swapchain;

/// How long `acquire_next_image` may block.
pub const ACQUIRE_TIMEOUT_NS: u64 = 1_000_000;

/// Local size of the gradient compute shader in x and y.
const WORKGROUP_SIZE: u32 = 16;

/// Sets the global descriptor pool can hand out.
const DESCRIPTOR_POOL_SETS: u32 = 10;

/// Renderer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Uninitialized,
    Initialized,
    Running,
    CleanedUp,
}

/// SPIR-V for the renderer's own pipelines.
#[derive(Debug, Clone, Default)]
pub struct ShaderSet {
    pub gradient: Vec<u32>,
    pub triangle_vert: Vec<u32>,
    pub triangle_frag: Vec<u32>,
}

impl ShaderSet {
    /// Reads `gradient.comp.spv`, `triangle.vert.spv` and `triangle.frag.spv`
    /// from `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a file is missing or is not valid SPIR-V.
    pub fn load(dir: &Path) -> RhiResult<Self> {
        Ok(Self {
            gradient: load_spirv(&dir.join("gradient.comp.spv"))?,
            triangle_vert: load_spirv(&dir.join("triangle.vert.spv"))?,
            triangle_frag: load_spirv(&dir.join("triangle.frag.spv"))?,
        })
    }
}

/// Everything [`Renderer::init`] needs from outside.
#[derive(Debug, Clone)]
pub struct RendererDesc {
    /// Surface to present to. The caller keeps it alive until cleanup.
    pub surface: vk::SurfaceKHR,
    pub width: u32,
    pub height: u32,
    /// Number of frame slots.
    pub overlap: usize,
    pub shaders: ShaderSet,
}

/// Clear color for `frame`: blue pulses with a period of 240π frames.
pub fn clear_color(frame: u64) -> [f32; 4] {
    let flash = 0.5 + 0.5 * (frame as f64 / 120.0).sin();
    [0.0, 0.0, flash as f32, 1.0]
}

/// Workgroup counts covering `extent` with 16x16 groups.
pub fn dispatch_groups(extent: vk::Extent2D) -> (u32, u32) {
    (
        extent.width.div_ceil(WORKGROUP_SIZE),
        extent.height.div_ceil(WORKGROUP_SIZE),
    )
}

/// The frame loop orchestrator.
pub struct Renderer<D: GpuDevice + 'static> {
    device: Arc<D>,
    desc: RendererDesc,
    state: RendererState,

    swapchain: Option<Swapchain>,
    frames: Option<FrameRing<D>>,

    descriptor_allocator: Option<Rc<RefCell<DescriptorAllocator>>>,
    draw_image_layout: vk::DescriptorSetLayout,
    draw_image_descriptors: vk::DescriptorSet,

    gradient_pipeline_layout: vk::PipelineLayout,
    gradient_pipeline: vk::Pipeline,
    triangle_pipeline_layout: vk::PipelineLayout,
    triangle_pipeline: vk::Pipeline,

    overlay: Option<Box<dyn Overlay<D>>>,

    /// Global teardown, flushed after every frame slot's queue.
    deletion_queue: DeletionQueue,
}

impl<D: GpuDevice + 'static> Renderer<D> {
    /// Creates an uninitialized renderer. Nothing touches the device until
    /// [`init`](Self::init).
    pub fn new(device: Arc<D>, desc: RendererDesc, overlay: Option<Box<dyn Overlay<D>>>) -> Self {
        Self {
            device,
            desc,
            state: RendererState::Uninitialized,
            swapchain: None,
            frames: None,
            descriptor_allocator: None,
            draw_image_layout: vk::DescriptorSetLayout::null(),
            draw_image_descriptors: vk::DescriptorSet::null(),
            gradient_pipeline_layout: vk::PipelineLayout::null(),
            gradient_pipeline: vk::Pipeline::null(),
            triangle_pipeline_layout: vk::PipelineLayout::null(),
            triangle_pipeline: vk::Pipeline::null(),
            overlay,
            deletion_queue: DeletionQueue::new("global"),
        }
    }

    /// Creates every GPU object the frame loop needs.
    ///
    /// Creation order: swapchain and draw image, frame ring, descriptors,
    /// gradient pipeline, triangle pipeline, overlay.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidState`] unless the renderer is
    /// uninitialized. On any creation failure, everything created so far is
    /// torn down, the renderer ends up `CleanedUp` and the error is returned.
    pub fn init(&mut self) -> RhiResult<()> {
        if self.state != RendererState::Uninitialized {
            return Err(RhiError::InvalidState(format!(
                "init called on a renderer that is {:?}",
                self.state
            )));
        }

        info!(
            "Initializing renderer ({}x{}, {} frame slot(s))",
            self.desc.width, self.desc.height, self.desc.overlap
        );

        if let Err(e) = self.init_resources() {
            error!("Renderer initialization failed: {}", e);
            if let Err(cleanup_err) = self.cleanup() {
                error!("Cleanup after failed init also failed: {}", cleanup_err);
            }
            return Err(e);
        }

        self.state = RendererState::Initialized;
        info!("Renderer initialized");
        Ok(())
    }

    fn init_resources(&mut self) -> RhiResult<()> {
        let swapchain = Swapchain::new(
            &self.device,
            self.desc.surface,
            self.desc.width,
            self.desc.height,
            &mut self.deletion_queue,
        )?;
        let draw_view = swapchain.draw_image().view;
        let draw_format = swapchain.draw_image().format;
        let color_format = swapchain.format();
        self.swapchain = Some(swapchain);

        self.frames = Some(FrameRing::new(&self.device, self.desc.overlap)?);

        self.init_descriptors(draw_view)?;
        self.init_background_pipeline()?;
        self.init_triangle_pipeline(draw_format)?;

        if let Some(overlay) = self.overlay.as_mut() {
            overlay.init(self.device.as_ref(), color_format, self.desc.overlap)?;
        }

        Ok(())
    }

    fn init_descriptors(&mut self, draw_view: vk::ImageView) -> RhiResult<()> {
        let device = self.device.as_ref();

        let allocator = DescriptorAllocator::init_pool(
            device,
            DESCRIPTOR_POOL_SETS,
            &[PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0)],
        )?;
        let allocator = Rc::new(RefCell::new(allocator));

        let layout = match DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .build(
                device,
                vk::ShaderStageFlags::COMPUTE,
                vk::DescriptorSetLayoutCreateFlags::empty(),
            ) {
            Ok(layout) => layout,
            Err(e) => {
                allocator.borrow_mut().destroy_pool(device);
                return Err(e);
            }
        };
        self.draw_image_layout = layout.handle();
        {
            let device = Arc::clone(&self.device);
            let allocator = Rc::clone(&allocator);
            let handle = layout.handle();
            self.deletion_queue.push(move || {
                allocator.borrow_mut().destroy_pool(device.as_ref());
                device.destroy_descriptor_set_layout(handle);
            });
        }

        let set = allocator.borrow_mut().allocate(device, &layout)?;
        write_storage_image(device, set, 0, draw_view);
        self.draw_image_descriptors = set;
        self.descriptor_allocator = Some(allocator);

        debug!("Draw image descriptors ready");
        Ok(())
    }

    fn init_background_pipeline(&mut self) -> RhiResult<()> {
        let device = self.device.as_ref();

        let layout = device.create_pipeline_layout(&[self.draw_image_layout], &[])?;
        let built = device
            .create_shader_module(&self.desc.shaders.gradient)
            .and_then(|module| {
                let pipeline = ComputePipelineBuilder::new()
                    .set_shader(module)
                    .set_layout(layout)
                    .build(device);
                device.destroy_shader_module(module);
                pipeline
            });
        let pipeline = match built {
            Ok(pipeline) => pipeline,
            Err(e) => {
                device.destroy_pipeline_layout(layout);
                return Err(e);
            }
        };

        self.gradient_pipeline_layout = layout;
        self.gradient_pipeline = pipeline;
        self.register_pipeline(layout, pipeline);

        debug!("Gradient pipeline ready");
        Ok(())
    }

    fn init_triangle_pipeline(&mut self, color_format: vk::Format) -> RhiResult<()> {
        let device = self.device.as_ref();
        let shaders = &self.desc.shaders;

        let layout = device.create_pipeline_layout(&[], &[])?;
        let built = device
            .create_shader_module(&shaders.triangle_vert)
            .and_then(|vertex| {
                let fragment = match device.create_shader_module(&shaders.triangle_frag) {
                    Ok(module) => module,
                    Err(e) => {
                        device.destroy_shader_module(vertex);
                        return Err(e);
                    }
                };

                let pipeline = GraphicsPipelineBuilder::new()
                    .set_layout(layout)
                    .set_shaders(vertex, fragment)
                    .set_input_topology(PrimitiveTopology::TriangleList)
                    .set_polygon_mode(PolygonMode::Fill)
                    .set_cull_mode(CullMode::None, FrontFace::Clockwise)
                    .disable_multisampling()
                    .disable_blending()
                    .disable_depth_test()
                    .set_color_attachment_format(color_format)
                    .set_depth_format(vk::Format::UNDEFINED)
                    .build(device);

                device.destroy_shader_module(fragment);
                device.destroy_shader_module(vertex);
                pipeline
            });
        let pipeline = match built {
            Ok(pipeline) => pipeline,
            Err(e) => {
                device.destroy_pipeline_layout(layout);
                return Err(e);
            }
        };

        self.triangle_pipeline_layout = layout;
        self.triangle_pipeline = pipeline;
        self.register_pipeline(layout, pipeline);

        debug!("Triangle pipeline ready");
        Ok(())
    }

    fn register_pipeline(&mut self, layout: vk::PipelineLayout, pipeline: vk::Pipeline) {
        let device = Arc::clone(&self.device);
        self.deletion_queue.push(move || {
            device.destroy_pipeline_layout(layout);
            device.destroy_pipeline(pipeline);
        });
    }

    // =========================================================================
    // Frame loop
    // =========================================================================

    /// Hands input and frame time to the overlay, if there is one.
    pub fn new_frame(&mut self, input: &InputState, delta: Duration) {
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.new_frame(input, delta);
        }
    }

    /// Draws frame number `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidState`] unless the renderer is initialized
    /// or running. Any device failure during the frame is returned as is and
    /// is fatal.
    pub fn run(&mut self, frame: u64) -> RhiResult<()> {
        match self.state {
            RendererState::Initialized | RendererState::Running => {}
            state => {
                return Err(RhiError::InvalidState(format!(
                    "run called on a renderer that is {:?}",
                    state
                )));
            }
        }

        self.state = RendererState::Running;
        self.draw(frame)
    }

    fn draw(&mut self, frame: u64) -> RhiResult<()> {
        let device = self.device.as_ref();
        let (Some(swapchain), Some(frames)) = (&self.swapchain, &self.frames) else {
            return Err(RhiError::InvalidState(
                "renderer has no swapchain or frame ring".to_string(),
            ));
        };

        let slot_index = frames.slot_index(frame);
        let slot = frames.begin(frame)?;

        let image_index = device.acquire_next_image(
            swapchain.handle(),
            ACQUIRE_TIMEOUT_NS,
            slot.swapchain_semaphore,
        )?;

        let cmd = CommandBuffer::new(device, slot.command_buffer);
        cmd.reset()?;
        cmd.begin()?;

        let draw_image = swapchain.draw_image();
        let draw_extent = swapchain.draw_extent();
        let swapchain_image = swapchain.image(image_index);

        // Background: clear, then the gradient compute pass
        transition_image(
            device,
            cmd.handle(),
            draw_image.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
        );
        cmd.clear_color_image(draw_image.image, vk::ImageLayout::GENERAL, clear_color(frame));
        image_barrier(device, cmd.handle(), draw_image.image, vk::ImageLayout::GENERAL);

        cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, self.gradient_pipeline);
        cmd.bind_descriptor_set(
            vk::PipelineBindPoint::COMPUTE,
            self.gradient_pipeline_layout,
            self.draw_image_descriptors,
        );
        let (groups_x, groups_y) = dispatch_groups(draw_extent);
        cmd.dispatch(groups_x, groups_y, 1);

        // Geometry
        transition_image(
            device,
            cmd.handle(),
            draw_image.image,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        cmd.begin_rendering(&RenderingInfo::new(
            draw_extent,
            ColorAttachment::new(draw_image.view).load(),
        ));
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.triangle_pipeline);
        cmd.set_viewport(draw_extent);
        cmd.set_scissor(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: draw_extent,
        });
        cmd.draw(3, 1, 0, 0);
        cmd.end_rendering();

        // Copy to the swapchain image
        transition_image(
            device,
            cmd.handle(),
            draw_image.image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        transition_image(
            device,
            cmd.handle(),
            swapchain_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        copy_image_to_image(
            device,
            cmd.handle(),
            draw_image.image,
            swapchain_image,
            draw_extent,
            swapchain.extent(),
        );
        transition_image(
            device,
            cmd.handle(),
            swapchain_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::GENERAL,
        );

        if let Some(overlay) = self.overlay.as_mut() {
            overlay.record(
                device,
                cmd.handle(),
                slot_index,
                swapchain.image_view(image_index),
                swapchain.extent(),
            )?;
        }

        transition_image(
            device,
            cmd.handle(),
            swapchain_image,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        cmd.end()?;

        device.queue_submit(&Submission {
            command_buffer: cmd.handle(),
            wait: Some(SemaphoreStage::new(
                slot.swapchain_semaphore,
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            )),
            signal: Some(SemaphoreStage::new(
                slot.render_semaphore,
                vk::PipelineStageFlags2::ALL_COMMANDS,
            )),
            fence: slot.render_fence,
        })?;

        device.queue_present(swapchain.handle(), image_index, slot.render_semaphore)
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Releases every GPU object the renderer created.
    ///
    /// Waits for the device, destroys the overlay, flushes each frame slot's
    /// queue in slot order, then flushes the global queue. Teardown continues
    /// even when the wait fails. Does nothing once cleaned up.
    ///
    /// # Errors
    ///
    /// Returns the wait-idle error after teardown has finished.
    pub fn cleanup(&mut self) -> RhiResult<()> {
        if self.state == RendererState::CleanedUp {
            return Ok(());
        }

        info!("Cleaning up renderer");

        let idle = self.device.wait_idle();
        if let Err(e) = &idle {
            error!("Device wait idle failed during cleanup: {}", e);
        }

        if let Some(overlay) = self.overlay.as_mut() {
            overlay.destroy(self.device.as_ref());
        }
        if let Some(frames) = self.frames.as_mut() {
            frames.flush_all();
        }
        self.deletion_queue.flush();

        self.frames = None;
        self.swapchain = None;
        self.descriptor_allocator = None;
        self.draw_image_layout = vk::DescriptorSetLayout::null();
        self.draw_image_descriptors = vk::DescriptorSet::null();
        self.gradient_pipeline_layout = vk::PipelineLayout::null();
        self.gradient_pipeline = vk::Pipeline::null();
        self.triangle_pipeline_layout = vk::PipelineLayout::null();
        self.triangle_pipeline = vk::Pipeline::null();
        self.state = RendererState::CleanedUp;

        info!("Renderer cleaned up");
        idle
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn state(&self) -> RendererState {
        self.state
    }

    #[inline]
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    #[inline]
    pub fn swapchain(&self) -> Option<&Swapchain> {
        self.swapchain.as_ref()
    }

    #[inline]
    pub fn frames(&self) -> Option<&FrameRing<D>> {
        self.frames.as_ref()
    }

    /// Extent of the offscreen draw image.
    pub fn draw_extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.as_ref().map(Swapchain::draw_extent)
    }

    pub fn descriptor_allocator(&self) -> Option<Ref<'_, DescriptorAllocator>> {
        self.descriptor_allocator.as_ref().map(|a| a.borrow())
    }

    #[inline]
    pub fn gradient_pipeline(&self) -> vk::Pipeline {
        self.gradient_pipeline
    }

    #[inline]
    pub fn triangle_pipeline(&self) -> vk::Pipeline {
        self.triangle_pipeline
    }
}

impl<D: GpuDevice + 'static> Drop for Renderer<D> {
    fn drop(&mut self) {
        if self.state == RendererState::CleanedUp {
            return;
        }
        if let Err(e) = self.cleanup() {
            error!("Renderer cleanup during drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_color_pulses_blue() {
        assert_eq!(clear_color(0), [0.0, 0.0, 0.5, 1.0]);

        for frame in [1, 60, 377, 1_000_000] {
            let [r, g, b, a] = clear_color(frame);
            assert_eq!((r, g, a), (0.0, 0.0, 1.0));
            assert!((0.0..=1.0).contains(&b));
        }

        // sin(pi/2) peaks at frame 120 * pi / 2
        let peak = clear_color(188)[2];
        assert!(peak > 0.99);
    }

    #[test]
    fn test_dispatch_groups_round_up() {
        let groups = dispatch_groups(vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!(groups, (50, 38));

        let groups = dispatch_groups(vk::Extent2D {
            width: 16,
            height: 1,
        });
        assert_eq!(groups, (1, 1));
    }
}
