//! Image layout transitions and image-to-image copies.
//!
//! Transitions are coarse: every barrier synchronizes `ALL_COMMANDS` against
//! `ALL_COMMANDS`, so a barrier never has to know what ran before it.
//!
//! # Example
//!
//! ```no_run
//! use baldwin_rhi::barrier::transition_image;
//! use baldwin_rhi::gpu::GpuDevice;
//! use baldwin_rhi::vk;
//!
//! fn to_general<D: GpuDevice>(device: &D, cmd: vk::CommandBuffer, image: vk::Image) {
//!     transition_image(device, cmd, image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL);
//! }
//! ```

use ash::vk;

use crate::gpu::GpuDevice;

/// A single synchronization2 image memory barrier.
///
/// The barrier always covers every mip level and array layer of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub aspect: vk::ImageAspectFlags,
}

impl ImageBarrier {
    /// Computes the barrier that moves `image` from `current` to `new`.
    pub fn transition(image: vk::Image, current: vk::ImageLayout, new: vk::ImageLayout) -> Self {
        let aspect = if new == vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };

        Self {
            image,
            old_layout: current,
            new_layout: new,
            src_stage: vk::PipelineStageFlags2::ALL_COMMANDS,
            src_access: vk::AccessFlags2::MEMORY_WRITE,
            dst_stage: vk::PipelineStageFlags2::ALL_COMMANDS,
            dst_access: vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ,
            aspect,
        }
    }

    /// Subresource range covering all mips and layers for this barrier's aspect.
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(self.aspect)
            .base_mip_level(0)
            .level_count(vk::REMAINING_MIP_LEVELS)
            .base_array_layer(0)
            .layer_count(vk::REMAINING_ARRAY_LAYERS)
    }

    /// Converts to the Vulkan barrier structure.
    pub fn to_vk(&self) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(self.src_stage)
            .src_access_mask(self.src_access)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .image(self.image)
            .subresource_range(self.subresource_range())
    }
}

/// Records a layout transition of `image` from `current` to `new`.
pub fn transition_image<D: GpuDevice + ?Sized>(
    device: &D,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    current: vk::ImageLayout,
    new: vk::ImageLayout,
) {
    device.cmd_image_barrier(cmd, &ImageBarrier::transition(image, current, new));
}

/// Records a memory-only barrier that keeps `image` in `layout`.
pub fn image_barrier<D: GpuDevice + ?Sized>(
    device: &D,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    layout: vk::ImageLayout,
) {
    device.cmd_image_barrier(cmd, &ImageBarrier::transition(image, layout, layout));
}

/// Region copied between two images: the component-wise minimum of both extents.
pub fn copy_region(src_extent: vk::Extent2D, dst_extent: vk::Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: src_extent.width.min(dst_extent.width),
        height: src_extent.height.min(dst_extent.height),
    }
}

/// Copies the overlapping region of `src` onto `dst`.
///
/// `src` must be in `TRANSFER_SRC_OPTIMAL` and `dst` in `TRANSFER_DST_OPTIMAL`.
/// The copy is a one-region blit, which converts between formats without
/// scaling.
pub fn copy_image_to_image<D: GpuDevice + ?Sized>(
    device: &D,
    cmd: vk::CommandBuffer,
    src: vk::Image,
    dst: vk::Image,
    src_extent: vk::Extent2D,
    dst_extent: vk::Extent2D,
) {
    device.cmd_blit_image(cmd, src, dst, copy_region(src_extent, dst_extent));
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::testing::{Call, RecordingDevice};

    #[test]
    fn test_transition_uses_full_barrier() {
        let image = vk::Image::from_raw(7);
        let barrier = ImageBarrier::transition(
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
        );

        assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert_eq!(barrier.dst_stage, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert_eq!(barrier.src_access, vk::AccessFlags2::MEMORY_WRITE);
        assert_eq!(
            barrier.dst_access,
            vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ
        );
        assert_eq!(barrier.aspect, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_transition_to_depth_uses_depth_aspect() {
        let barrier = ImageBarrier::transition(
            vk::Image::from_raw(1),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );
        assert_eq!(barrier.aspect, vk::ImageAspectFlags::DEPTH);

        let range = barrier.subresource_range();
        assert_eq!(range.level_count, vk::REMAINING_MIP_LEVELS);
        assert_eq!(range.layer_count, vk::REMAINING_ARRAY_LAYERS);
    }

    #[test]
    fn test_round_trip_transition_returns_to_start() {
        let device = RecordingDevice::new();
        let cmd = vk::CommandBuffer::from_raw(3);
        let image = vk::Image::from_raw(9);
        let a = vk::ImageLayout::GENERAL;
        let b = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;

        transition_image(&device, cmd, image, a, b);
        transition_image(&device, cmd, image, b, a);

        let barriers = device.barriers();
        assert_eq!(barriers.len(), 2);
        assert_eq!((barriers[0].old_layout, barriers[0].new_layout), (a, b));
        assert_eq!((barriers[1].old_layout, barriers[1].new_layout), (b, a));
        assert_eq!(barriers[1].new_layout, barriers[0].old_layout);
    }

    #[test]
    fn test_image_barrier_keeps_layout() {
        let device = RecordingDevice::new();
        let cmd = vk::CommandBuffer::from_raw(3);
        let image = vk::Image::from_raw(9);

        image_barrier(&device, cmd, image, vk::ImageLayout::GENERAL);

        let barriers = device.barriers();
        assert_eq!(barriers[0].old_layout, vk::ImageLayout::GENERAL);
        assert_eq!(barriers[0].new_layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn test_copy_uses_smaller_extent() {
        let device = RecordingDevice::new();
        let cmd = vk::CommandBuffer::from_raw(3);
        let src = vk::Image::from_raw(1);
        let dst = vk::Image::from_raw(2);

        copy_image_to_image(
            &device,
            cmd,
            src,
            dst,
            vk::Extent2D { width: 800, height: 400 },
            vk::Extent2D { width: 640, height: 480 },
        );

        assert_eq!(
            device.calls(),
            vec![Call::BlitImage {
                src,
                dst,
                extent: vk::Extent2D { width: 640, height: 400 },
            }]
        );
    }
}
