//! Command buffer recording.
//!
//! [`CommandBuffer`] borrows a [`GpuDevice`] and a raw command buffer handle
//! and exposes the recording calls as methods. It owns nothing: the handle is
//! freed with the pool it came from.
//!
//! # Example
//!
//! ```no_run
//! use baldwin_rhi::command::CommandBuffer;
//! use baldwin_rhi::gpu::GpuDevice;
//! use baldwin_rhi::vk;
//!
//! # fn example<D: GpuDevice>(device: &D, pool: vk::CommandPool) -> Result<(), baldwin_rhi::RhiError> {
//! let handle = device.allocate_command_buffer(pool)?;
//! let cmd = CommandBuffer::new(device, handle);
//!
//! cmd.begin()?;
//! cmd.dispatch(50, 38, 1);
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use ash::vk;

use crate::error::RhiResult;
use crate::gpu::GpuDevice;
use crate::rendering::RenderingInfo;

/// A command buffer being recorded through a [`GpuDevice`].
pub struct CommandBuffer<'a, D: GpuDevice + ?Sized> {
    device: &'a D,
    buffer: vk::CommandBuffer,
}

impl<'a, D: GpuDevice + ?Sized> CommandBuffer<'a, D> {
    #[inline]
    pub fn new(device: &'a D, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    /// Returns the raw Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Returns the device commands are recorded through.
    #[inline]
    pub fn device(&self) -> &'a D {
        self.device
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Begins recording for a single submission.
    ///
    /// # Errors
    ///
    /// Returns an error if beginning fails (e.g., if already recording).
    pub fn begin(&self) -> RhiResult<()> {
        self.device
            .begin_command_buffer(self.buffer, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
    }

    /// Ends recording. The buffer is then ready for submission.
    pub fn end(&self) -> RhiResult<()> {
        self.device.end_command_buffer(self.buffer)
    }

    /// Resets the command buffer to its initial state.
    pub fn reset(&self) -> RhiResult<()> {
        self.device.reset_command_buffer(self.buffer)
    }

    // =========================================================================
    // Dynamic Rendering (Vulkan 1.3)
    // =========================================================================

    pub fn begin_rendering(&self, info: &RenderingInfo) {
        self.device.cmd_begin_rendering(self.buffer, info);
    }

    pub fn end_rendering(&self) {
        self.device.cmd_end_rendering(self.buffer);
    }

    // =========================================================================
    // Pipeline Binding
    // =========================================================================

    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.device
            .cmd_bind_pipeline(self.buffer, bind_point, pipeline);
    }

    /// Binds `set` at set index 0.
    pub fn bind_descriptor_set(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        self.device
            .cmd_bind_descriptor_set(self.buffer, bind_point, layout, set);
    }

    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        self.device.cmd_bind_vertex_buffer(self.buffer, buffer);
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer, index_type: vk::IndexType) {
        self.device
            .cmd_bind_index_buffer(self.buffer, buffer, index_type);
    }

    // =========================================================================
    // Dynamic State
    // =========================================================================

    /// Sets a viewport covering `extent`.
    pub fn set_viewport(&self, extent: vk::Extent2D) {
        self.device.cmd_set_viewport(self.buffer, extent);
    }

    pub fn set_scissor(&self, scissor: vk::Rect2D) {
        self.device.cmd_set_scissor(self.buffer, scissor);
    }

    // =========================================================================
    // Draw and Dispatch
    // =========================================================================

    pub fn draw(
        &self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.device.cmd_draw(
            self.buffer,
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        );
    }

    pub fn draw_indexed(&self, index_count: u32, first_index: u32, vertex_offset: i32) {
        self.device
            .cmd_draw_indexed(self.buffer, index_count, first_index, vertex_offset);
    }

    pub fn dispatch(&self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        self.device
            .cmd_dispatch(self.buffer, group_count_x, group_count_y, group_count_z);
    }

    // =========================================================================
    // Push Constants
    // =========================================================================

    /// Pushes a plain-old-data value at `offset`.
    pub fn push_constants<T: bytemuck::Pod>(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &T,
    ) {
        self.device.cmd_push_constants(
            self.buffer,
            layout,
            stages,
            offset,
            bytemuck::bytes_of(data),
        );
    }

    // =========================================================================
    // Transfer and Clear
    // =========================================================================

    pub fn copy_buffer_to_image(&self, buffer: vk::Buffer, image: vk::Image, extent: vk::Extent2D) {
        self.device
            .cmd_copy_buffer_to_image(self.buffer, buffer, image, extent);
    }

    /// Clears every mip and layer of a color image in `layout`.
    pub fn clear_color_image(&self, image: vk::Image, layout: vk::ImageLayout, color: [f32; 4]) {
        self.device
            .cmd_clear_color_image(self.buffer, image, layout, color);
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::testing::{Call, RecordingDevice};

    #[test]
    fn test_begin_is_one_time_submit() {
        let device = RecordingDevice::new();
        let handle = vk::CommandBuffer::from_raw(7);
        let cmd = CommandBuffer::new(&device, handle);

        cmd.begin().unwrap();
        cmd.end().unwrap();

        assert_eq!(
            device.calls(),
            vec![
                Call::BeginCommandBuffer {
                    cmd: handle,
                    flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                },
                Call::EndCommandBuffer { cmd: handle },
            ]
        );
    }

    #[test]
    fn test_push_constants_sends_value_bytes() {
        let device = RecordingDevice::new();
        let cmd = CommandBuffer::new(&device, vk::CommandBuffer::from_raw(7));
        let layout = vk::PipelineLayout::from_raw(3);

        cmd.push_constants(layout, vk::ShaderStageFlags::COMPUTE, 0, &[1.0f32, 0.5]);

        assert!(device.contains(&Call::PushConstants {
            layout,
            stages: vk::ShaderStageFlags::COMPUTE,
            offset: 0,
            data: bytemuck::bytes_of(&[1.0f32, 0.5]).to_vec(),
        }));
    }

    #[test]
    fn test_draw_records_counts() {
        let device = RecordingDevice::new();
        let cmd = CommandBuffer::new(&device, vk::CommandBuffer::from_raw(7));

        cmd.draw(3, 1, 0, 0);
        cmd.dispatch(50, 38, 1);

        assert_eq!(
            device.calls(),
            vec![
                Call::Draw {
                    vertex_count: 3,
                    instance_count: 1,
                    first_vertex: 0,
                    first_instance: 0,
                },
                Call::Dispatch { x: 50, y: 38, z: 1 },
            ]
        );
    }
}
