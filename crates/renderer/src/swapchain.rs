//! Swapchain manager.
//!
//! This module owns the presentable images and the offscreen draw target:
//!
//! - [`Swapchain`] holds the swapchain handle, its images and one view per
//!   image, plus the [`AllocatedImage`] every frame is drawn into
//! - The draw image is HDR (`R16G16B16A16_SFLOAT`) and GPU-only; it is copied
//!   onto the acquired swapchain image at the end of each frame
//!
//! Nothing here destroys itself. [`Swapchain::new`] registers the teardown of
//! everything it creates on the caller's [`DeletionQueue`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use baldwin_core::DeletionQueue;
//! use baldwin_renderer::swapchain::Swapchain;
//! use baldwin_rhi::device::Device;
//! use baldwin_rhi::vk;
//!
//! # fn example(device: Arc<Device>, surface: vk::SurfaceKHR) -> Result<(), baldwin_rhi::RhiError> {
//! let mut deletion_queue = DeletionQueue::new("global");
//! let swapchain = Swapchain::new(&device, surface, 800, 600, &mut deletion_queue)?;
//! assert_eq!(swapchain.draw_extent(), swapchain.extent());
//!
//! deletion_queue.flush();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use baldwin_core::DeletionQueue;
use baldwin_rhi::gpu::{GpuDevice, ImageDesc, SwapchainDesc};
use baldwin_rhi::{MemoryLocation, RhiError, RhiResult};
use tracing::{debug, info};

/// Format requested for presentable images.
pub const SWAPCHAIN_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

/// Color space requested for presentable images.
pub const SWAPCHAIN_COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;

/// Format of the offscreen draw target.
pub const DRAW_IMAGE_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// An image with its memory and a single full view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent3D,
    pub format: vk::Format,
}

impl AllocatedImage {
    /// Creates a GPU-only 2D image and its view.
    ///
    /// # Errors
    ///
    /// Returns an error if image creation, allocation or view creation fails.
    /// A created image is destroyed again when its view fails.
    pub fn new<D: GpuDevice + ?Sized>(
        device: &D,
        name: &str,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidState(format!(
                "{} extent must be non-zero, got {}x{}",
                name, extent.width, extent.height
            )));
        }

        let extent = vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        };

        let image = device.create_image(&ImageDesc {
            name: name.to_string(),
            format,
            extent,
            usage,
            location: MemoryLocation::GpuOnly,
        })?;

        let view = match device.create_image_view(image, format) {
            Ok(view) => view,
            Err(e) => {
                device.destroy_image(image);
                return Err(e);
            }
        };

        debug!(
            "Created {}: {}x{} ({:?})",
            name, extent.width, extent.height, format
        );

        Ok(Self {
            image,
            view,
            extent,
            format,
        })
    }

    /// The width and height.
    #[inline]
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    /// Destroys the view, then the image and its memory.
    pub fn destroy<D: GpuDevice + ?Sized>(&self, device: &D) {
        device.destroy_image_view(self.view);
        device.destroy_image(self.image);
    }
}

/// Presentable images plus the offscreen draw target.
#[derive(Debug, Clone)]
pub struct Swapchain {
    handle: vk::SwapchainKHR,
    format: vk::Format,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    draw_image: AllocatedImage,
}

impl Swapchain {
    /// Creates the swapchain, one view per image, and the draw image.
    ///
    /// The draw image takes the extent the platform granted, which may differ
    /// from `width` x `height`.
    ///
    /// # Arguments
    ///
    /// * `device` - The device every teardown action holds on to
    /// * `surface` - The window surface
    /// * `width`, `height` - Requested size in pixels
    /// * `deletion_queue` - Receives the swapchain teardown, then the draw
    ///   image teardown
    ///
    /// # Errors
    ///
    /// Returns an error if any object fails to create. Whatever was created
    /// before the failure has already been registered on `deletion_queue`.
    pub fn new<D: GpuDevice + 'static>(
        device: &Arc<D>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        deletion_queue: &mut DeletionQueue,
    ) -> RhiResult<Self> {
        let created = device.create_swapchain(&SwapchainDesc {
            surface,
            width,
            height,
            format: SWAPCHAIN_FORMAT,
            color_space: SWAPCHAIN_COLOR_SPACE,
            present_mode: vk::PresentModeKHR::FIFO,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
        })?;

        let mut views = Vec::with_capacity(created.images.len());
        for &image in &created.images {
            match device.create_image_view(image, created.format) {
                Ok(view) => views.push(view),
                Err(e) => {
                    for &view in &views {
                        device.destroy_image_view(view);
                    }
                    device.destroy_swapchain(created.handle);
                    return Err(e);
                }
            }
        }

        {
            let device = Arc::clone(device);
            let handle = created.handle;
            let views = views.clone();
            deletion_queue.push(move || {
                for &view in &views {
                    device.destroy_image_view(view);
                }
                device.destroy_swapchain(handle);
            });
        }

        info!(
            "Swapchain created: {}x{}, {} image(s), {:?}",
            created.extent.width,
            created.extent.height,
            created.images.len(),
            created.format
        );

        let draw_image = AllocatedImage::new(
            device.as_ref(),
            "draw_image",
            DRAW_IMAGE_FORMAT,
            created.extent,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::COLOR_ATTACHMENT,
        )?;
        {
            let device = Arc::clone(device);
            deletion_queue.push(move || draw_image.destroy(device.as_ref()));
        }

        Ok(Self {
            handle: created.handle,
            format: created.format,
            extent: created.extent,
            images: created.images,
            views,
            draw_image,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// Format of the presentable images.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Extent the platform granted.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }

    #[inline]
    pub fn image_view(&self, index: u32) -> vk::ImageView {
        self.views[index as usize]
    }

    #[inline]
    pub fn draw_image(&self) -> &AllocatedImage {
        &self.draw_image
    }

    /// Extent every frame is drawn at.
    #[inline]
    pub fn draw_extent(&self) -> vk::Extent2D {
        self.draw_image.extent_2d()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baldwin_rhi::testing::{Call, RecordingDevice};

    fn create(device: &Arc<RecordingDevice>, queue: &mut DeletionQueue) -> Swapchain {
        Swapchain::new(device, vk::SurfaceKHR::null(), 800, 600, queue).unwrap()
    }

    #[test]
    fn test_requests_fifo_bgra_transfer_dst() {
        let device = Arc::new(RecordingDevice::new());
        let mut queue = DeletionQueue::new("test");
        create(&device, &mut queue);

        let desc = device
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::CreateSwapchain { desc, .. } => Some(desc),
                _ => None,
            })
            .unwrap();
        assert_eq!(desc.format, SWAPCHAIN_FORMAT);
        assert_eq!(desc.color_space, SWAPCHAIN_COLOR_SPACE);
        assert_eq!(desc.present_mode, vk::PresentModeKHR::FIFO);
        assert!(desc.usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
        assert_eq!((desc.width, desc.height), (800, 600));

        queue.flush();
    }

    #[test]
    fn test_one_view_per_image() {
        let device = Arc::new(RecordingDevice::new());
        device.set_swapchain_image_count(4);
        let mut queue = DeletionQueue::new("test");
        let swapchain = create(&device, &mut queue);

        assert_eq!(swapchain.image_count(), 4);
        for index in 0..4 {
            assert!(device.contains(&Call::CreateImageView {
                view: swapchain.image_view(index),
                image: swapchain.image(index),
                format: SWAPCHAIN_FORMAT,
            }));
        }

        queue.flush();
    }

    #[test]
    fn test_draw_image_follows_granted_extent() {
        let device = Arc::new(RecordingDevice::new());
        let granted = vk::Extent2D {
            width: 640,
            height: 480,
        };
        device.grant_extent(granted);
        let mut queue = DeletionQueue::new("test");
        let swapchain = create(&device, &mut queue);

        assert_eq!(swapchain.extent(), granted);
        assert_eq!(swapchain.draw_extent(), granted);

        let draw = swapchain.draw_image();
        assert_eq!(draw.format, DRAW_IMAGE_FORMAT);
        let desc = device
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::CreateImage { image, desc } if image == draw.image => Some(desc),
                _ => None,
            })
            .unwrap();
        assert_eq!(desc.location, MemoryLocation::GpuOnly);
        assert!(desc.usage.contains(
            vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::COLOR_ATTACHMENT
        ));

        queue.flush();
    }

    #[test]
    fn test_flush_destroys_draw_image_before_swapchain() {
        let device = Arc::new(RecordingDevice::new());
        let mut queue = DeletionQueue::new("test");
        let swapchain = create(&device, &mut queue);
        assert_eq!(queue.len(), 2);
        device.clear_calls();

        queue.flush();

        let image_at = device
            .position(|c| {
                *c == Call::DestroyImage {
                    image: swapchain.draw_image().image,
                }
            })
            .unwrap();
        let swapchain_at = device
            .position(|c| {
                *c == Call::DestroySwapchain {
                    swapchain: swapchain.handle(),
                }
            })
            .unwrap();
        assert!(image_at < swapchain_at);
        assert_eq!(
            device.count(|c| matches!(c, Call::DestroyImageView { .. })),
            swapchain.image_count() + 1
        );
    }

    #[test]
    fn test_zero_extent_image_is_rejected() {
        let device = RecordingDevice::new();
        let result = AllocatedImage::new(
            &device,
            "empty",
            DRAW_IMAGE_FORMAT,
            vk::Extent2D {
                width: 0,
                height: 600,
            },
            vk::ImageUsageFlags::STORAGE,
        );
        assert!(result.is_err());
        assert!(device.calls().is_empty());
    }
}
