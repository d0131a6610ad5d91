//! Graphics and compute pipeline assembly.
//!
//! # Overview
//!
//! - [`GraphicsPipelineDesc`] is the plain-data description of a graphics
//!   pipeline. Viewport and scissor are always dynamic.
//! - [`GraphicsPipelineBuilder`] mutates a description through setters and
//!   creates the pipeline for dynamic rendering.
//! - [`ComputePipelineBuilder`] is the single-stage counterpart.
//!
//! Pipelines do not destroy themselves. Whoever builds one registers
//! `destroy_pipeline` with a deletion queue, alongside the layout it binds.
//!
//! # Example
//!
//! ```no_run
//! use baldwin_rhi::gpu::GpuDevice;
//! use baldwin_rhi::pipeline::{CullMode, FrontFace, GraphicsPipelineBuilder, PolygonMode, PrimitiveTopology};
//! use baldwin_rhi::{vk, RhiResult};
//!
//! fn triangle<D: GpuDevice>(
//!     device: &D,
//!     vert: vk::ShaderModule,
//!     frag: vk::ShaderModule,
//!     layout: vk::PipelineLayout,
//! ) -> RhiResult<vk::Pipeline> {
//!     let mut builder = GraphicsPipelineBuilder::new();
//!     builder
//!         .set_layout(layout)
//!         .set_shaders(vert, frag)
//!         .set_input_topology(PrimitiveTopology::TriangleList)
//!         .set_polygon_mode(PolygonMode::Fill)
//!         .set_cull_mode(CullMode::None, FrontFace::Clockwise)
//!         .disable_multisampling()
//!         .disable_blending()
//!         .disable_depth_test()
//!         .set_color_attachment_format(vk::Format::R16G16B16A16_SFLOAT)
//!         .set_depth_format(vk::Format::UNDEFINED);
//!     builder.build(device)
//! }
//! ```

use ash::vk;
use tracing::debug;

use crate::error::{RhiError, RhiResult};
use crate::gpu::GpuDevice;

/// Shader entry point used by every stage.
pub(crate) const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Primitive topology for input assembly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

impl PrimitiveTopology {
    /// Converts to Vulkan primitive topology.
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
        }
    }
}

/// Polygon rasterization mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

impl PolygonMode {
    /// Converts to Vulkan polygon mode.
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
            PolygonMode::Point => vk::PolygonMode::POINT,
        }
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
    FrontAndBack,
}

impl CullMode {
    /// Converts to Vulkan cull mode flags.
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
            CullMode::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
        }
    }
}

/// Front face winding order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    /// Converts to Vulkan front face.
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Depth comparison operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    #[default]
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

impl CompareOp {
    /// Converts to Vulkan compare op.
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::Equal => vk::CompareOp::EQUAL,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
            CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Blend factor for color blending.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

impl BlendFactor {
    /// Converts to Vulkan blend factor.
    pub fn to_vk(self) -> vk::BlendFactor {
        match self {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        }
    }
}

/// Blend operation for color blending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

impl BlendOp {
    /// Converts to Vulkan blend op.
    pub fn to_vk(self) -> vk::BlendOp {
        match self {
            BlendOp::Add => vk::BlendOp::ADD,
            BlendOp::Subtract => vk::BlendOp::SUBTRACT,
            BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
            BlendOp::Min => vk::BlendOp::MIN,
            BlendOp::Max => vk::BlendOp::MAX,
        }
    }
}

/// Color blend attachment configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_blend_factor: BlendFactor,
    pub dst_color_blend_factor: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_blend_factor: BlendFactor,
    pub dst_alpha_blend_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub color_write_mask: vk::ColorComponentFlags,
}

impl Default for ColorBlendAttachment {
    /// Blending off, all channels written.
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_blend_factor: BlendFactor::One,
            dst_color_blend_factor: BlendFactor::Zero,
            color_blend_op: BlendOp::Add,
            src_alpha_blend_factor: BlendFactor::One,
            dst_alpha_blend_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }
}

impl ColorBlendAttachment {
    /// Standard alpha blending: `src * src_alpha + dst * (1 - src_alpha)`.
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_color_blend_factor: BlendFactor::SrcAlpha,
            dst_color_blend_factor: BlendFactor::OneMinusSrcAlpha,
            color_blend_op: BlendOp::Add,
            src_alpha_blend_factor: BlendFactor::One,
            dst_alpha_blend_factor: BlendFactor::Zero,
            alpha_blend_op: BlendOp::Add,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }

    /// Converts to Vulkan pipeline color blend attachment state.
    pub fn to_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: self.blend_enable.into(),
            src_color_blend_factor: self.src_color_blend_factor.to_vk(),
            dst_color_blend_factor: self.dst_color_blend_factor.to_vk(),
            color_blend_op: self.color_blend_op.to_vk(),
            src_alpha_blend_factor: self.src_alpha_blend_factor.to_vk(),
            dst_alpha_blend_factor: self.dst_alpha_blend_factor.to_vk(),
            alpha_blend_op: self.alpha_blend_op.to_vk(),
            color_write_mask: self.color_write_mask,
        }
    }
}

/// A vertex buffer binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: vk::VertexInputRate,
}

impl VertexBinding {
    pub fn to_vk(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(self.binding)
            .stride(self.stride)
            .input_rate(self.input_rate)
    }
}

/// A vertex attribute read from a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: vk::Format,
    pub offset: u32,
}

impl VertexAttribute {
    pub fn to_vk(&self) -> vk::VertexInputAttributeDescription {
        vk::VertexInputAttributeDescription::default()
            .location(self.location)
            .binding(self.binding)
            .format(self.format)
            .offset(self.offset)
    }
}

/// Everything needed to create a graphics pipeline for dynamic rendering.
///
/// `Default` is the cleared state: no shaders or layout, triangle list, fill,
/// no culling, counter-clockwise front faces, one sample, blending off, depth
/// test off, no attachment formats, dynamic viewport and scissor.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphicsPipelineDesc {
    pub vertex_shader: Option<vk::ShaderModule>,
    pub fragment_shader: Option<vk::ShaderModule>,
    pub layout: Option<vk::PipelineLayout>,

    pub vertex_bindings: Vec<VertexBinding>,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub topology: PrimitiveTopology,

    pub polygon_mode: PolygonMode,
    pub line_width: f32,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,

    pub rasterization_samples: vk::SampleCountFlags,
    pub sample_shading_enable: bool,
    pub min_sample_shading: f32,

    pub color_blend: ColorBlendAttachment,

    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: CompareOp,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,

    pub color_attachment_format: vk::Format,
    pub depth_attachment_format: vk::Format,

    pub dynamic_states: Vec<vk::DynamicState>,
}

impl Default for GraphicsPipelineDesc {
    fn default() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            layout: None,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: PrimitiveTopology::TriangleList,
            polygon_mode: PolygonMode::Fill,
            line_width: 1.0,
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            sample_shading_enable: false,
            min_sample_shading: 1.0,
            color_blend: ColorBlendAttachment::default(),
            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: CompareOp::Never,
            min_depth_bounds: 0.0,
            max_depth_bounds: 1.0,
            color_attachment_format: vk::Format::UNDEFINED,
            depth_attachment_format: vk::Format::UNDEFINED,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }
}

/// Mutable builder for graphics pipelines.
///
/// Setters take `&mut self` so one builder can be configured, built, cleared
/// and reused.
#[derive(Clone, Debug, Default)]
pub struct GraphicsPipelineBuilder {
    desc: GraphicsPipelineDesc,
}

impl GraphicsPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The description accumulated so far.
    #[inline]
    pub fn desc(&self) -> &GraphicsPipelineDesc {
        &self.desc
    }

    /// Resets every field to the cleared state.
    pub fn clear(&mut self) -> &mut Self {
        self.desc = GraphicsPipelineDesc::default();
        self
    }

    pub fn set_layout(&mut self, layout: vk::PipelineLayout) -> &mut Self {
        self.desc.layout = Some(layout);
        self
    }

    pub fn set_shaders(&mut self, vertex: vk::ShaderModule, fragment: vk::ShaderModule) -> &mut Self {
        self.desc.vertex_shader = Some(vertex);
        self.desc.fragment_shader = Some(fragment);
        self
    }

    pub fn set_input_topology(&mut self, topology: PrimitiveTopology) -> &mut Self {
        self.desc.topology = topology;
        self
    }

    pub fn set_polygon_mode(&mut self, mode: PolygonMode) -> &mut Self {
        self.desc.polygon_mode = mode;
        self.desc.line_width = 1.0;
        self
    }

    pub fn set_cull_mode(&mut self, mode: CullMode, front_face: FrontFace) -> &mut Self {
        self.desc.cull_mode = mode;
        self.desc.front_face = front_face;
        self
    }

    /// One sample per pixel, no sample shading.
    pub fn disable_multisampling(&mut self) -> &mut Self {
        self.desc.rasterization_samples = vk::SampleCountFlags::TYPE_1;
        self.desc.sample_shading_enable = false;
        self.desc.min_sample_shading = 1.0;
        self
    }

    pub fn disable_blending(&mut self) -> &mut Self {
        self.desc.color_blend = ColorBlendAttachment::default();
        self
    }

    pub fn enable_blending_alpha(&mut self) -> &mut Self {
        self.desc.color_blend = ColorBlendAttachment::alpha_blend();
        self
    }

    pub fn set_vertex_input(
        &mut self,
        bindings: &[VertexBinding],
        attributes: &[VertexAttribute],
    ) -> &mut Self {
        self.desc.vertex_bindings = bindings.to_vec();
        self.desc.vertex_attributes = attributes.to_vec();
        self
    }

    pub fn set_color_attachment_format(&mut self, format: vk::Format) -> &mut Self {
        self.desc.color_attachment_format = format;
        self
    }

    pub fn set_depth_format(&mut self, format: vk::Format) -> &mut Self {
        self.desc.depth_attachment_format = format;
        self
    }

    /// Depth test and write off, compare `NEVER`, bounds `0..1`.
    pub fn disable_depth_test(&mut self) -> &mut Self {
        self.desc.depth_test_enable = false;
        self.desc.depth_write_enable = false;
        self.desc.depth_compare_op = CompareOp::Never;
        self.desc.min_depth_bounds = 0.0;
        self.desc.max_depth_bounds = 1.0;
        self
    }

    /// Creates the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if either shader or the layout is
    /// unset, without touching the device. Device rejection is also an error.
    pub fn build<D: GpuDevice + ?Sized>(&self, device: &D) -> RhiResult<vk::Pipeline> {
        if self.desc.vertex_shader.is_none() || self.desc.fragment_shader.is_none() {
            return Err(RhiError::PipelineError(
                "vertex and fragment shaders are required".to_string(),
            ));
        }
        if self.desc.layout.is_none() {
            return Err(RhiError::PipelineError(
                "pipeline layout is required".to_string(),
            ));
        }

        let pipeline = device.create_graphics_pipeline(&self.desc)?;
        debug!(
            "Created graphics pipeline ({:?}, color {:?})",
            self.desc.topology, self.desc.color_attachment_format
        );
        Ok(pipeline)
    }
}

/// Builder for single-stage compute pipelines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ComputePipelineBuilder {
    shader: Option<vk::ShaderModule>,
    layout: Option<vk::PipelineLayout>,
}

impl ComputePipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_shader(&mut self, module: vk::ShaderModule) -> &mut Self {
        self.shader = Some(module);
        self
    }

    pub fn set_layout(&mut self, layout: vk::PipelineLayout) -> &mut Self {
        self.layout = Some(layout);
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    /// Creates the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if the shader or layout is unset.
    pub fn build<D: GpuDevice + ?Sized>(&self, device: &D) -> RhiResult<vk::Pipeline> {
        let (Some(shader), Some(layout)) = (self.shader, self.layout) else {
            return Err(RhiError::PipelineError(
                "compute pipeline needs a shader and a layout".to_string(),
            ));
        };

        let pipeline = device.create_compute_pipeline(shader, layout)?;
        debug!("Created compute pipeline");
        Ok(pipeline)
    }
}

/// Creates a graphics pipeline from a validated description.
pub(crate) fn create_graphics_pipeline(
    device: &ash::Device,
    desc: &GraphicsPipelineDesc,
) -> RhiResult<vk::Pipeline> {
    let (Some(vertex), Some(fragment), Some(layout)) =
        (desc.vertex_shader, desc.fragment_shader, desc.layout)
    else {
        return Err(RhiError::PipelineError(
            "incomplete graphics pipeline description".to_string(),
        ));
    };

    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex)
            .name(ENTRY_POINT),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment)
            .name(ENTRY_POINT),
    ];

    let bindings: Vec<_> = desc.vertex_bindings.iter().map(VertexBinding::to_vk).collect();
    let attributes: Vec<_> = desc
        .vertex_attributes
        .iter()
        .map(VertexAttribute::to_vk)
        .collect();
    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(desc.topology.to_vk())
        .primitive_restart_enable(false);

    // Viewport and scissor are dynamic, only the counts are baked in
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(desc.polygon_mode.to_vk())
        .line_width(desc.line_width)
        .cull_mode(desc.cull_mode.to_vk())
        .front_face(desc.front_face.to_vk());

    let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(desc.rasterization_samples)
        .sample_shading_enable(desc.sample_shading_enable)
        .min_sample_shading(desc.min_sample_shading)
        .alpha_to_coverage_enable(false)
        .alpha_to_one_enable(false);

    let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(desc.depth_test_enable)
        .depth_write_enable(desc.depth_write_enable)
        .depth_compare_op(desc.depth_compare_op.to_vk())
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false)
        .min_depth_bounds(desc.min_depth_bounds)
        .max_depth_bounds(desc.max_depth_bounds);

    let color_blend_attachments = [desc.color_blend.to_vk()];
    let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .logic_op(vk::LogicOp::COPY)
        .attachments(&color_blend_attachments);

    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&desc.dynamic_states);

    let color_formats = [desc.color_attachment_format];
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats)
        .depth_attachment_format(desc.depth_attachment_format);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly_state)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization_state)
        .multisample_state(&multisample_state)
        .depth_stencil_state(&depth_stencil_state)
        .color_blend_state(&color_blend_state)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .push_next(&mut rendering_info);

    let pipelines = unsafe {
        device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
            .map_err(|(_, err)| RhiError::VulkanError(err))?
    };

    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))
}

/// Creates a compute pipeline with entry point `main`.
pub(crate) fn create_compute_pipeline(
    device: &ash::Device,
    module: vk::ShaderModule,
    layout: vk::PipelineLayout,
) -> RhiResult<vk::Pipeline> {
    let stage = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(module)
        .name(ENTRY_POINT);

    let create_info = vk::ComputePipelineCreateInfo::default()
        .stage(stage)
        .layout(layout);

    let pipelines = unsafe {
        device
            .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
            .map_err(|(_, err)| RhiError::VulkanError(err))?
    };

    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::PipelineError("driver returned no pipeline".to_string()))
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::testing::{Call, RecordingDevice};

    fn configure_triangle(builder: &mut GraphicsPipelineBuilder) {
        builder
            .set_layout(vk::PipelineLayout::from_raw(40))
            .set_shaders(vk::ShaderModule::from_raw(41), vk::ShaderModule::from_raw(42))
            .set_input_topology(PrimitiveTopology::TriangleList)
            .set_polygon_mode(PolygonMode::Fill)
            .set_cull_mode(CullMode::None, FrontFace::Clockwise)
            .disable_multisampling()
            .disable_blending()
            .disable_depth_test()
            .set_color_attachment_format(vk::Format::R16G16B16A16_SFLOAT)
            .set_depth_format(vk::Format::UNDEFINED);
    }

    #[test]
    fn test_primitive_topology_to_vk() {
        assert_eq!(
            PrimitiveTopology::PointList.to_vk(),
            vk::PrimitiveTopology::POINT_LIST
        );
        assert_eq!(
            PrimitiveTopology::TriangleList.to_vk(),
            vk::PrimitiveTopology::TRIANGLE_LIST
        );
        assert_eq!(
            PrimitiveTopology::TriangleFan.to_vk(),
            vk::PrimitiveTopology::TRIANGLE_FAN
        );
    }

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
        assert_eq!(
            CullMode::FrontAndBack.to_vk(),
            vk::CullModeFlags::FRONT_AND_BACK
        );
    }

    #[test]
    fn test_front_face_to_vk() {
        assert_eq!(
            FrontFace::CounterClockwise.to_vk(),
            vk::FrontFace::COUNTER_CLOCKWISE
        );
        assert_eq!(FrontFace::Clockwise.to_vk(), vk::FrontFace::CLOCKWISE);
    }

    #[test]
    fn test_compare_op_to_vk() {
        assert_eq!(CompareOp::Never.to_vk(), vk::CompareOp::NEVER);
        assert_eq!(CompareOp::LessOrEqual.to_vk(), vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(CompareOp::Always.to_vk(), vk::CompareOp::ALWAYS);
    }

    #[test]
    fn test_color_blend_attachment_alpha_blend() {
        let attachment = ColorBlendAttachment::alpha_blend().to_vk();
        assert_eq!(attachment.blend_enable, vk::TRUE);
        assert_eq!(attachment.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            attachment.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(attachment.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_default_desc_is_cleared_state() {
        let desc = GraphicsPipelineDesc::default();
        assert!(desc.vertex_shader.is_none());
        assert!(desc.layout.is_none());
        assert_eq!(desc.cull_mode, CullMode::None);
        assert_eq!(desc.depth_compare_op, CompareOp::Never);
        assert!(!desc.color_blend.blend_enable);
        assert_eq!(
            desc.dynamic_states,
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
    }

    #[test]
    fn test_build_without_shaders_creates_nothing() {
        let device = RecordingDevice::new();
        let mut builder = GraphicsPipelineBuilder::new();
        builder.set_layout(vk::PipelineLayout::from_raw(1));

        let err = builder.build(&device).unwrap_err();

        assert!(matches!(err, RhiError::PipelineError(_)));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_build_without_layout_fails() {
        let device = RecordingDevice::new();
        let mut builder = GraphicsPipelineBuilder::new();
        builder.set_shaders(vk::ShaderModule::from_raw(1), vk::ShaderModule::from_raw(2));

        assert!(matches!(
            builder.build(&device),
            Err(RhiError::PipelineError(_))
        ));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_clear_then_rebuild_matches_fresh_builder() {
        let device = RecordingDevice::new();

        let mut fresh = GraphicsPipelineBuilder::new();
        configure_triangle(&mut fresh);

        let mut reused = GraphicsPipelineBuilder::new();
        reused
            .set_cull_mode(CullMode::Back, FrontFace::CounterClockwise)
            .enable_blending_alpha()
            .set_polygon_mode(PolygonMode::Line)
            .set_input_topology(PrimitiveTopology::LineStrip);
        reused.clear();
        configure_triangle(&mut reused);

        assert_eq!(fresh.desc(), reused.desc());

        fresh.build(&device).unwrap();
        reused.build(&device).unwrap();
        let creates: Vec<Call> = device
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::CreateGraphicsPipeline { .. }))
            .collect();
        assert_eq!(creates.len(), 2);
        assert_eq!(creates[0], creates[1]);
    }

    #[test]
    fn test_vertex_input_is_recorded() {
        let mut builder = GraphicsPipelineBuilder::new();
        let binding = VertexBinding {
            binding: 0,
            stride: 20,
            input_rate: vk::VertexInputRate::VERTEX,
        };
        let attribute = VertexAttribute {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: 0,
        };
        builder.set_vertex_input(&[binding], &[attribute]);

        assert_eq!(builder.desc().vertex_bindings, vec![binding]);
        assert_eq!(builder.desc().vertex_attributes[0].to_vk().format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_compute_builder_requires_shader_and_layout() {
        let device = RecordingDevice::new();
        let mut builder = ComputePipelineBuilder::new();
        builder.set_layout(vk::PipelineLayout::from_raw(5));
        assert!(builder.build(&device).is_err());

        builder.set_shader(vk::ShaderModule::from_raw(6));
        builder.build(&device).unwrap();

        builder.clear();
        assert_eq!(builder, ComputePipelineBuilder::default());
        assert!(builder.build(&device).is_err());
        assert_eq!(
            device.count(|c| matches!(c, Call::CreateComputePipeline { .. })),
            1
        );
    }
}
