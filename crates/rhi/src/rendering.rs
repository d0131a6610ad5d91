//! Dynamic rendering helpers (Vulkan 1.3).
//!
//! Passes render without `VkRenderPass` objects: a [`RenderingInfo`] names a
//! single color attachment and the render area, and the device turns it into a
//! `vk::RenderingInfo` when recording `begin_rendering`.
//!
//! # Example
//!
//! ```no_run
//! use baldwin_rhi::rendering::{ColorAttachment, RenderingInfo};
//! use baldwin_rhi::vk;
//!
//! # fn example(draw_view: vk::ImageView) {
//! // Draw on top of what is already in the image
//! let color = ColorAttachment::new(draw_view).load();
//! let info = RenderingInfo::new(vk::Extent2D { width: 800, height: 600 }, color);
//! # }
//! ```

use ash::vk;

/// Color attachment configuration for dynamic rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub image_view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_color: [f32; 4],
}

impl ColorAttachment {
    /// Creates an attachment that clears to opaque black and stores the result.
    ///
    /// The layout defaults to `COLOR_ATTACHMENT_OPTIMAL`.
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Sets the layout the image is in while rendering.
    #[inline]
    pub fn with_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Keeps the existing contents instead of clearing.
    #[inline]
    pub fn load(mut self) -> Self {
        self.load_op = vk::AttachmentLoadOp::LOAD;
        self
    }

    /// Converts to the Vulkan attachment structure.
    #[inline]
    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            })
    }
}

impl Default for ColorAttachment {
    fn default() -> Self {
        Self::new(vk::ImageView::null())
    }
}

/// A single-attachment rendering pass over `extent`, anchored at the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderingInfo {
    pub extent: vk::Extent2D,
    pub color: ColorAttachment,
}

impl RenderingInfo {
    #[inline]
    pub fn new(extent: vk::Extent2D, color: ColorAttachment) -> Self {
        Self { extent, color }
    }

    /// Render area covering the whole extent.
    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_color_attachment_default() {
        let attachment = ColorAttachment::default();
        assert_eq!(attachment.image_view, vk::ImageView::null());
        assert_eq!(attachment.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
    }

    #[test]
    fn test_color_attachment_load_keeps_store() {
        let attachment = ColorAttachment::default()
            .with_layout(vk::ImageLayout::GENERAL)
            .load();
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn test_attachment_reaches_vulkan_struct() {
        let view = vk::ImageView::from_raw(7);
        let info = ColorAttachment::new(view).load().to_rendering_attachment_info();
        assert_eq!(info.image_view, view);
        assert_eq!(info.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(info.store_op, vk::AttachmentStoreOp::STORE);
        let color = unsafe { info.clear_value.color.float32 };
        assert_eq!(color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_render_area_covers_extent() {
        let extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        let info = RenderingInfo::new(extent, ColorAttachment::default());
        let area = info.render_area();
        assert_eq!(area.offset.x, 0);
        assert_eq!(area.offset.y, 0);
        assert_eq!(area.extent, extent);
    }
}
