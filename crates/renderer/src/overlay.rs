//! Immediate-mode UI overlay.
//!
//! The renderer draws an [`Overlay`] last, directly onto the acquired
//! swapchain image while it sits in `GENERAL` layout. [`ImguiOverlay`] is the
//! Dear ImGui implementation: it owns an `imgui::Context`, uploads the font
//! atlas once, and streams vertex and index data into per-slot host-visible
//! buffers every frame.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use baldwin_renderer::overlay::{ImguiOverlay, OverlayShaders};
//!
//! # fn example() -> Result<(), baldwin_rhi::RhiError> {
//! let shaders = OverlayShaders::load(Path::new("shaders"))?;
//! let overlay = ImguiOverlay::new(shaders);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use ash::vk;
use baldwin_platform::{InputState, MouseButton};
use baldwin_rhi::command::CommandBuffer;
use baldwin_rhi::descriptor::DescriptorLayoutBuilder;
use baldwin_rhi::gpu::{BufferDesc, GpuDevice, Submission};
use baldwin_rhi::pipeline::{
    CullMode, FrontFace, GraphicsPipelineBuilder, PolygonMode, PrimitiveTopology,
    VertexAttribute, VertexBinding,
};
use baldwin_rhi::rendering::{ColorAttachment, RenderingInfo};
use baldwin_rhi::shader::load_spirv;
use baldwin_rhi::{MemoryLocation, RhiError, RhiResult};
use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use tracing::{debug, info, warn};

use crate::frame::FENCE_TIMEOUT_NS;
use crate::swapchain::AllocatedImage;

/// Descriptors of each type in the overlay's pool.
const POOL_DESCRIPTORS_PER_TYPE: u32 = 1000;

/// Sets the overlay's pool can hand out.
const POOL_MAX_SETS: u32 = 1000;

/// Descriptor types the overlay pool reserves room for.
const POOL_DESCRIPTOR_TYPES: [vk::DescriptorType; 11] = [
    vk::DescriptorType::SAMPLER,
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::SAMPLED_IMAGE,
    vk::DescriptorType::STORAGE_IMAGE,
    vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
    vk::DescriptorType::STORAGE_TEXEL_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::STORAGE_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
    vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
    vk::DescriptorType::INPUT_ATTACHMENT,
];

/// Texture id of the font atlas; it is the only texture the overlay binds.
const FONT_TEXTURE_ID: usize = 0;

const FONT_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Smallest vertex or index buffer the overlay allocates, in bytes.
const MIN_BUFFER_SIZE: u64 = 4096;

/// Shortest frame time handed to imgui, which rejects zero.
const MIN_DELTA: Duration = Duration::from_micros(100);

/// A UI layer drawn on top of the finished frame.
///
/// Implementations record into the frame's command buffer; they never submit.
pub trait Overlay<D: GpuDevice> {
    /// Creates GPU resources. `color_format` is the swapchain format and
    /// `overlap` the number of frame slots.
    fn init(&mut self, device: &D, color_format: vk::Format, overlap: usize) -> RhiResult<()>;

    /// Feeds input and elapsed time for the next frame.
    fn new_frame(&mut self, input: &InputState, delta: Duration);

    /// Builds the UI and records its draw into `cmd`.
    ///
    /// `target_view` is in `GENERAL` layout. `slot` is the frame slot index,
    /// whose previous submission is known to be complete.
    fn record(
        &mut self,
        device: &D,
        cmd: vk::CommandBuffer,
        slot: usize,
        target_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> RhiResult<()>;

    /// Releases GPU resources. Safe to call more than once, or before `init`.
    fn destroy(&mut self, device: &D);
}

/// SPIR-V for the overlay pipeline.
#[derive(Debug, Clone, Default)]
pub struct OverlayShaders {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl OverlayShaders {
    /// Reads `imgui.vert.spv` and `imgui.frag.spv` from `dir`.
    pub fn load(dir: &Path) -> RhiResult<Self> {
        Ok(Self {
            vertex: load_spirv(&dir.join("imgui.vert.spv"))?,
            fragment: load_spirv(&dir.join("imgui.frag.spv"))?,
        })
    }
}

/// Vertex layout shared with `imgui.vert`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
struct OverlayVertex {
    pos: [f32; 2],
    uv: [f32; 2],
    col: [u8; 4],
}

impl From<&imgui::DrawVert> for OverlayVertex {
    fn from(vertex: &imgui::DrawVert) -> Self {
        Self {
            pos: vertex.pos,
            uv: vertex.uv,
            col: vertex.col,
        }
    }
}

impl OverlayVertex {
    fn binding() -> VertexBinding {
        VertexBinding {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    fn attributes() -> [VertexAttribute; 3] {
        [
            VertexAttribute {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 0,
            },
            VertexAttribute {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 8,
            },
            VertexAttribute {
                location: 2,
                binding: 0,
                format: vk::Format::R8G8B8A8_UNORM,
                offset: 16,
            },
        ]
    }
}

/// Maps imgui display coordinates to clip space.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
struct OverlayPushConstants {
    scale: Vec2,
    translate: Vec2,
}

impl OverlayPushConstants {
    fn for_display(display_pos: [f32; 2], display_size: [f32; 2]) -> Self {
        let scale = Vec2::new(2.0 / display_size[0], 2.0 / display_size[1]);
        let translate = Vec2::splat(-1.0) - Vec2::from(display_pos) * scale;
        Self { scale, translate }
    }
}

/// Per-slot geometry buffers. They only ever grow.
#[derive(Debug, Default)]
struct OverlayMesh {
    vertex_buffer: vk::Buffer,
    vertex_capacity: u64,
    index_buffer: vk::Buffer,
    index_capacity: u64,
}

impl OverlayMesh {
    fn destroy<D: GpuDevice + ?Sized>(&mut self, device: &D) {
        if self.vertex_buffer != vk::Buffer::null() {
            device.destroy_buffer(self.vertex_buffer);
        }
        if self.index_buffer != vk::Buffer::null() {
            device.destroy_buffer(self.index_buffer);
        }
        *self = Self::default();
    }
}

/// Everything the overlay created on the device. Null handles were never
/// created and are skipped on destroy.
#[derive(Debug, Default)]
struct OverlayResources {
    descriptor_pool: vk::DescriptorPool,
    set_layout: vk::DescriptorSetLayout,
    font_image: Option<AllocatedImage>,
    font_sampler: vk::Sampler,
    font_set: vk::DescriptorSet,
    pipeline_layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    meshes: Vec<OverlayMesh>,
}

impl OverlayResources {
    fn destroy<D: GpuDevice + ?Sized>(&mut self, device: &D) {
        for mesh in &mut self.meshes {
            mesh.destroy(device);
        }
        if self.pipeline != vk::Pipeline::null() {
            device.destroy_pipeline(self.pipeline);
        }
        if self.pipeline_layout != vk::PipelineLayout::null() {
            device.destroy_pipeline_layout(self.pipeline_layout);
        }
        if self.font_sampler != vk::Sampler::null() {
            device.destroy_sampler(self.font_sampler);
        }
        if let Some(font_image) = self.font_image.take() {
            font_image.destroy(device);
        }
        if self.set_layout != vk::DescriptorSetLayout::null() {
            device.destroy_descriptor_set_layout(self.set_layout);
        }
        // Frees the font set with it
        if self.descriptor_pool != vk::DescriptorPool::null() {
            device.destroy_descriptor_pool(self.descriptor_pool);
        }
        *self = Self::default();
    }
}

/// Dear ImGui overlay showing a "Settings" window.
pub struct ImguiOverlay {
    context: imgui::Context,
    shaders: OverlayShaders,
    resources: Option<OverlayResources>,
}

impl ImguiOverlay {
    /// Creates the imgui context with the dark style and no `.ini` file.
    ///
    /// Only one imgui context may exist at a time.
    pub fn new(shaders: OverlayShaders) -> Self {
        let mut context = imgui::Context::create();
        context.set_ini_filename(None);
        context.style_mut().use_dark_colors();

        Self {
            context,
            shaders,
            resources: None,
        }
    }

    /// Whether GPU resources exist.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.resources.is_some()
    }

    fn create_resources<D: GpuDevice + ?Sized>(
        &mut self,
        device: &D,
        res: &mut OverlayResources,
        color_format: vk::Format,
        overlap: usize,
    ) -> RhiResult<()> {
        res.descriptor_pool = device.create_descriptor_pool(
            POOL_MAX_SETS,
            &overlay_pool_sizes(),
            vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
        )?;

        let set_layout = DescriptorLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .build(
                device,
                vk::ShaderStageFlags::FRAGMENT,
                vk::DescriptorSetLayoutCreateFlags::empty(),
            )?;
        res.set_layout = set_layout.handle();

        // Font atlas
        let fonts = self.context.fonts();
        let atlas = fonts.build_rgba32_texture();
        let font_extent = vk::Extent2D {
            width: atlas.width,
            height: atlas.height,
        };
        let font_image = AllocatedImage::new(
            device,
            "imgui_font_atlas",
            FONT_FORMAT,
            font_extent,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        )?;
        res.font_image = Some(font_image);
        upload_font_atlas(device, &font_image, atlas.data)?;
        fonts.tex_id = imgui::TextureId::new(FONT_TEXTURE_ID);

        res.font_sampler = device.create_sampler(vk::Filter::LINEAR)?;
        res.font_set = device.allocate_descriptor_set(res.descriptor_pool, res.set_layout)?;
        device.write_image_descriptor(
            res.font_set,
            0,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            font_image.view,
            res.font_sampler,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );

        let push_constants = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(std::mem::size_of::<OverlayPushConstants>() as u32);
        res.pipeline_layout =
            device.create_pipeline_layout(&[res.set_layout], &[push_constants])?;

        res.pipeline = build_pipeline(device, &self.shaders, res.pipeline_layout, color_format)?;

        res.meshes = (0..overlap).map(|_| OverlayMesh::default()).collect();

        info!(
            "Overlay initialized: font atlas {}x{}, {} slot(s)",
            font_extent.width, font_extent.height, overlap
        );
        Ok(())
    }
}

impl<D: GpuDevice> Overlay<D> for ImguiOverlay {
    fn init(&mut self, device: &D, color_format: vk::Format, overlap: usize) -> RhiResult<()> {
        if self.resources.is_some() {
            return Err(RhiError::InvalidState(
                "overlay is already initialized".to_string(),
            ));
        }

        let mut res = OverlayResources::default();
        match self.create_resources(device, &mut res, color_format, overlap) {
            Ok(()) => {
                self.resources = Some(res);
                Ok(())
            }
            Err(e) => {
                res.destroy(device);
                Err(e)
            }
        }
    }

    fn new_frame(&mut self, input: &InputState, delta: Duration) {
        let io = self.context.io_mut();

        let (x, y) = input.mouse_position();
        io.add_mouse_pos_event([x, y]);
        for (button, imgui_button) in [
            (MouseButton::Left, imgui::MouseButton::Left),
            (MouseButton::Right, imgui::MouseButton::Right),
            (MouseButton::Middle, imgui::MouseButton::Middle),
        ] {
            io.add_mouse_button_event(imgui_button, input.is_mouse_pressed(button));
        }
        let (scroll_x, scroll_y) = input.scroll_delta();
        if scroll_x != 0.0 || scroll_y != 0.0 {
            io.add_mouse_wheel_event([scroll_x, scroll_y]);
        }

        io.update_delta_time(delta.max(MIN_DELTA));
    }

    fn record(
        &mut self,
        device: &D,
        cmd: vk::CommandBuffer,
        slot: usize,
        target_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> RhiResult<()> {
        let Self {
            context, resources, ..
        } = self;
        let res = resources.as_mut().ok_or_else(|| {
            RhiError::InvalidState("overlay recorded before init".to_string())
        })?;
        let mesh = res.meshes.get_mut(slot).ok_or_else(|| {
            RhiError::InvalidState(format!("overlay has no frame slot {}", slot))
        })?;

        context.io_mut().display_size = [extent.width as f32, extent.height as f32];

        let ui = context.new_frame();
        ui.window("Settings")
            .size([300.0, 100.0], imgui::Condition::FirstUseEver)
            .build(|| {
                ui.text(format!("{:.1} FPS", ui.io().framerate));
            });

        let draw_data = context.render();
        if draw_data.total_vtx_count == 0 || draw_data.total_idx_count == 0 {
            return Ok(());
        }

        // Upload
        let mut vertices: Vec<OverlayVertex> =
            Vec::with_capacity(draw_data.total_vtx_count as usize);
        let mut indices: Vec<imgui::DrawIdx> =
            Vec::with_capacity(draw_data.total_idx_count as usize);
        for list in draw_data.draw_lists() {
            vertices.extend(list.vtx_buffer().iter().map(OverlayVertex::from));
            indices.extend_from_slice(list.idx_buffer());
        }
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&indices);

        ensure_buffer(
            device,
            &mut mesh.vertex_buffer,
            &mut mesh.vertex_capacity,
            vertex_bytes.len() as u64,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "imgui_vertices",
        )?;
        ensure_buffer(
            device,
            &mut mesh.index_buffer,
            &mut mesh.index_capacity,
            index_bytes.len() as u64,
            vk::BufferUsageFlags::INDEX_BUFFER,
            "imgui_indices",
        )?;
        device.write_buffer(mesh.vertex_buffer, 0, vertex_bytes)?;
        device.write_buffer(mesh.index_buffer, 0, index_bytes)?;

        // Draw
        let cmd = CommandBuffer::new(device, cmd);
        let color = ColorAttachment::new(target_view)
            .with_layout(vk::ImageLayout::GENERAL)
            .load();
        cmd.begin_rendering(&RenderingInfo::new(extent, color));

        let bind_state = |cmd: &CommandBuffer<'_, D>| {
            cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, res.pipeline);
            cmd.bind_descriptor_set(
                vk::PipelineBindPoint::GRAPHICS,
                res.pipeline_layout,
                res.font_set,
            );
            cmd.bind_vertex_buffer(mesh.vertex_buffer);
            cmd.bind_index_buffer(mesh.index_buffer, vk::IndexType::UINT16);
            cmd.set_viewport(extent);
            cmd.push_constants(
                res.pipeline_layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                &OverlayPushConstants::for_display(draw_data.display_pos, draw_data.display_size),
            );
        };
        bind_state(&cmd);

        let mut index_base = 0u32;
        let mut vertex_base = 0i32;
        for list in draw_data.draw_lists() {
            for command in list.commands() {
                match command {
                    imgui::DrawCmd::Elements {
                        count,
                        cmd_params:
                            imgui::DrawCmdParams {
                                clip_rect,
                                vtx_offset,
                                idx_offset,
                                ..
                            },
                    } => {
                        let Some(scissor) = clip_scissor(
                            clip_rect,
                            draw_data.display_pos,
                            draw_data.framebuffer_scale,
                            extent,
                        ) else {
                            continue;
                        };
                        cmd.set_scissor(scissor);
                        cmd.draw_indexed(
                            count as u32,
                            index_base + idx_offset as u32,
                            vertex_base + vtx_offset as i32,
                        );
                    }
                    imgui::DrawCmd::ResetRenderState => bind_state(&cmd),
                    imgui::DrawCmd::RawCallback { .. } => {
                        warn!("Ignoring imgui raw callback");
                    }
                }
            }
            index_base += list.idx_buffer().len() as u32;
            vertex_base += list.vtx_buffer().len() as i32;
        }

        cmd.end_rendering();
        Ok(())
    }

    fn destroy(&mut self, device: &D) {
        if let Some(mut res) = self.resources.take() {
            res.destroy(device);
            debug!("Overlay resources destroyed");
        }
    }
}

/// 1000 descriptors of every type.
fn overlay_pool_sizes() -> Vec<vk::DescriptorPoolSize> {
    POOL_DESCRIPTOR_TYPES
        .iter()
        .map(|&ty| {
            vk::DescriptorPoolSize::default()
                .ty(ty)
                .descriptor_count(POOL_DESCRIPTORS_PER_TYPE)
        })
        .collect()
}

/// Capacity allocated for `needed` bytes: the next power of two, at least
/// [`MIN_BUFFER_SIZE`].
fn buffer_capacity(needed: u64) -> u64 {
    needed.next_power_of_two().max(MIN_BUFFER_SIZE)
}

/// Replaces `buffer` with a larger one when `needed` exceeds `capacity`.
fn ensure_buffer<D: GpuDevice + ?Sized>(
    device: &D,
    buffer: &mut vk::Buffer,
    capacity: &mut u64,
    needed: u64,
    usage: vk::BufferUsageFlags,
    name: &str,
) -> RhiResult<()> {
    if needed <= *capacity {
        return Ok(());
    }

    if *buffer != vk::Buffer::null() {
        device.destroy_buffer(*buffer);
        *buffer = vk::Buffer::null();
        *capacity = 0;
    }

    let size = buffer_capacity(needed);
    *buffer = device.create_buffer(&BufferDesc {
        name: name.to_string(),
        size,
        usage,
        location: MemoryLocation::CpuToGpu,
    })?;
    *capacity = size;
    debug!("Grew {} to {} bytes", name, size);
    Ok(())
}

/// Converts an imgui clip rectangle into a framebuffer scissor clamped to
/// `extent`. Returns `None` when nothing is visible.
fn clip_scissor(
    clip_rect: [f32; 4],
    clip_offset: [f32; 2],
    clip_scale: [f32; 2],
    extent: vk::Extent2D,
) -> Option<vk::Rect2D> {
    let min_x = ((clip_rect[0] - clip_offset[0]) * clip_scale[0]).max(0.0);
    let min_y = ((clip_rect[1] - clip_offset[1]) * clip_scale[1]).max(0.0);
    let max_x = ((clip_rect[2] - clip_offset[0]) * clip_scale[0]).min(extent.width as f32);
    let max_y = ((clip_rect[3] - clip_offset[1]) * clip_scale[1]).min(extent.height as f32);

    if max_x <= min_x || max_y <= min_y {
        return None;
    }

    Some(vk::Rect2D {
        offset: vk::Offset2D {
            x: min_x as i32,
            y: min_y as i32,
        },
        extent: vk::Extent2D {
            width: (max_x - min_x) as u32,
            height: (max_y - min_y) as u32,
        },
    })
}

fn build_pipeline<D: GpuDevice + ?Sized>(
    device: &D,
    shaders: &OverlayShaders,
    layout: vk::PipelineLayout,
    color_format: vk::Format,
) -> RhiResult<vk::Pipeline> {
    let vertex = device.create_shader_module(&shaders.vertex)?;
    let fragment = match device.create_shader_module(&shaders.fragment) {
        Ok(module) => module,
        Err(e) => {
            device.destroy_shader_module(vertex);
            return Err(e);
        }
    };

    let pipeline = GraphicsPipelineBuilder::new()
        .set_layout(layout)
        .set_shaders(vertex, fragment)
        .set_vertex_input(&[OverlayVertex::binding()], &OverlayVertex::attributes())
        .set_input_topology(PrimitiveTopology::TriangleList)
        .set_polygon_mode(PolygonMode::Fill)
        .set_cull_mode(CullMode::None, FrontFace::CounterClockwise)
        .disable_multisampling()
        .enable_blending_alpha()
        .disable_depth_test()
        .set_color_attachment_format(color_format)
        .set_depth_format(vk::Format::UNDEFINED)
        .build(device);

    device.destroy_shader_module(fragment);
    device.destroy_shader_module(vertex);
    pipeline
}

/// Copies the font atlas into `image` and leaves it shader-readable.
fn upload_font_atlas<D: GpuDevice + ?Sized>(
    device: &D,
    image: &AllocatedImage,
    pixels: &[u8],
) -> RhiResult<()> {
    let staging = device.create_buffer(&BufferDesc {
        name: "imgui_font_staging".to_string(),
        size: pixels.len() as u64,
        usage: vk::BufferUsageFlags::TRANSFER_SRC,
        location: MemoryLocation::CpuToGpu,
    })?;

    let result = device.write_buffer(staging, 0, pixels).and_then(|()| {
        immediate_submit(device, |cmd| {
            let extent = image.extent_2d();
            baldwin_rhi::barrier::transition_image(
                device,
                cmd.handle(),
                image.image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            cmd.copy_buffer_to_image(staging, image.image, extent);
            baldwin_rhi::barrier::transition_image(
                device,
                cmd.handle(),
                image.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        })
    });

    device.destroy_buffer(staging);
    result
}

/// Records `record` into a throwaway command buffer, submits it and waits.
fn immediate_submit<D: GpuDevice + ?Sized>(
    device: &D,
    record: impl FnOnce(&CommandBuffer<'_, D>),
) -> RhiResult<()> {
    let pool = device.create_command_pool()?;
    let fence = match device.create_fence(false) {
        Ok(fence) => fence,
        Err(e) => {
            device.destroy_command_pool(pool);
            return Err(e);
        }
    };

    let result = device.allocate_command_buffer(pool).and_then(|handle| {
        let cmd = CommandBuffer::new(device, handle);
        cmd.begin()?;
        record(&cmd);
        cmd.end()?;
        device.queue_submit(&Submission {
            command_buffer: handle,
            wait: None,
            signal: None,
            fence,
        })?;
        device.wait_for_fence(fence, FENCE_TIMEOUT_NS)
    });

    device.destroy_fence(fence);
    device.destroy_command_pool(pool);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use baldwin_rhi::testing::{Call, RecordingDevice};

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    #[test]
    fn test_vertex_layout_matches_imgui() {
        assert_eq!(
            std::mem::size_of::<OverlayVertex>(),
            std::mem::size_of::<imgui::DrawVert>()
        );
        assert_eq!(OverlayVertex::binding().stride, 20);
        let offsets: Vec<u32> = OverlayVertex::attributes().iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16]);
    }

    #[test]
    fn test_pool_holds_thousand_of_each_type() {
        let sizes = overlay_pool_sizes();
        assert_eq!(sizes.len(), 11);
        assert!(sizes.iter().all(|s| s.descriptor_count == 1000));
    }

    #[test]
    fn test_push_constants_map_display_to_clip_space() {
        let pc = OverlayPushConstants::for_display([0.0, 0.0], [800.0, 600.0]);
        let corner = |p: Vec2| p * pc.scale + pc.translate;
        assert_eq!(corner(Vec2::ZERO), Vec2::new(-1.0, -1.0));
        assert_eq!(corner(Vec2::new(800.0, 600.0)), Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_clip_scissor_clamps_to_extent() {
        let scissor = clip_scissor([-10.0, 20.0, 900.0, 100.0], [0.0, 0.0], [1.0, 1.0], EXTENT)
            .unwrap();
        assert_eq!((scissor.offset.x, scissor.offset.y), (0, 20));
        assert_eq!((scissor.extent.width, scissor.extent.height), (800, 80));
    }

    #[test]
    fn test_clip_scissor_skips_empty_rect() {
        assert!(clip_scissor([10.0, 10.0, 10.0, 50.0], [0.0, 0.0], [1.0, 1.0], EXTENT).is_none());
        assert!(
            clip_scissor([900.0, 10.0, 950.0, 50.0], [0.0, 0.0], [1.0, 1.0], EXTENT).is_none()
        );
    }

    #[test]
    fn test_buffer_capacity_grows_by_powers_of_two() {
        assert_eq!(buffer_capacity(1), MIN_BUFFER_SIZE);
        assert_eq!(buffer_capacity(5000), 8192);
        assert_eq!(buffer_capacity(8192), 8192);
    }

    #[test]
    fn test_ensure_buffer_replaces_only_when_too_small() {
        let device = RecordingDevice::new();
        let mut buffer = vk::Buffer::null();
        let mut capacity = 0;
        let usage = vk::BufferUsageFlags::VERTEX_BUFFER;

        ensure_buffer(&device, &mut buffer, &mut capacity, 100, usage, "v").unwrap();
        let first = buffer;
        ensure_buffer(&device, &mut buffer, &mut capacity, 4096, usage, "v").unwrap();
        assert_eq!(buffer, first);

        ensure_buffer(&device, &mut buffer, &mut capacity, 4097, usage, "v").unwrap();
        assert_ne!(buffer, first);
        assert_eq!(capacity, 8192);
        assert!(device.contains(&Call::DestroyBuffer { buffer: first }));
        assert_eq!(device.count(|c| matches!(c, Call::CreateBuffer { .. })), 2);
    }

    #[test]
    fn test_immediate_submit_waits_and_releases() {
        let device = RecordingDevice::new();
        immediate_submit(&device, |cmd| cmd.dispatch(1, 1, 1)).unwrap();

        let calls = device.calls();
        let submit_at = calls.iter().position(|c| matches!(c, Call::Submit(_))).unwrap();
        let wait_at = calls
            .iter()
            .position(|c| matches!(c, Call::WaitForFence { .. }))
            .unwrap();
        assert!(submit_at < wait_at);
        assert!(calls.contains(&Call::Dispatch { x: 1, y: 1, z: 1 }));
        assert_eq!(device.count(|c| matches!(c, Call::DestroyFence { .. })), 1);
        assert_eq!(device.count(|c| matches!(c, Call::DestroyCommandPool { .. })), 1);
    }
}
