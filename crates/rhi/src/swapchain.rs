//! Surface negotiation and swapchain creation.
//!
//! A [`SwapchainDesc`] is a request. [`SwapchainSettings::negotiate`] turns it
//! into what the surface supports:
//!
//! - format and color space as requested, else the surface's first format
//! - present mode as requested, else FIFO
//! - the surface's current extent when it has one, else the requested size
//!   clamped to the surface limits
//! - one image above the minimum, capped by the maximum
//!
//! Swapchain lifetime is managed above the RHI through [`GpuDevice`]
//! (`create_swapchain` / `destroy_swapchain`).
//!
//! [`GpuDevice`]: crate::gpu::GpuDevice

use ash::vk;
use tracing::{info, warn};

use crate::error::{RhiError, RhiResult};
use crate::gpu::{SwapchainDesc, SwapchainImages};

/// Marks an undefined `current_extent`: the swapchain decides the size.
const UNDEFINED_EXTENT: u32 = u32::MAX;

/// What a surface supports on a given GPU.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// # Errors
    ///
    /// Returns an error if any surface query fails.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        // SAFETY: the surface and physical device belong to the instance the
        // loader was created from.
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: loader.get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }
}

/// Swapchain parameters the surface accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainSettings {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
}

impl SwapchainSettings {
    /// Fits `desc` to `support`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] when the surface reports no
    /// format or no present mode.
    pub fn negotiate(support: &SurfaceSupport, desc: &SwapchainDesc) -> RhiResult<Self> {
        let Some(&fallback_format) = support.formats.first() else {
            return Err(RhiError::SwapchainError(
                "surface reports no formats".to_string(),
            ));
        };
        if support.present_modes.is_empty() {
            return Err(RhiError::SwapchainError(
                "surface reports no present modes".to_string(),
            ));
        }

        let surface_format = support
            .formats
            .iter()
            .copied()
            .find(|f| f.format == desc.format && f.color_space == desc.color_space)
            .unwrap_or_else(|| {
                warn!(
                    "Surface format {:?} unavailable, using {:?}",
                    desc.format, fallback_format.format
                );
                fallback_format
            });

        let present_mode = if support.present_modes.contains(&desc.present_mode) {
            desc.present_mode
        } else {
            warn!("Present mode {:?} unavailable, using FIFO", desc.present_mode);
            vk::PresentModeKHR::FIFO
        };

        let caps = &support.capabilities;
        let extent = if caps.current_extent.width != UNDEFINED_EXTENT {
            caps.current_extent
        } else {
            vk::Extent2D {
                width: desc
                    .width
                    .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: desc
                    .height
                    .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        };

        // A maximum of zero means unbounded
        let min_image_count = match caps.max_image_count {
            0 => caps.min_image_count + 1,
            max => (caps.min_image_count + 1).min(max),
        };

        Ok(Self {
            surface_format,
            present_mode,
            extent,
            min_image_count,
        })
    }
}

/// Creates a swapchain on `desc.surface` and fetches its images.
pub(crate) fn create_swapchain(
    swapchain_loader: &ash::khr::swapchain::Device,
    surface_loader: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    desc: &SwapchainDesc,
) -> RhiResult<SwapchainImages> {
    let support = SurfaceSupport::query(physical_device, desc.surface, surface_loader)?;
    let settings = SwapchainSettings::negotiate(&support, desc)?;

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(desc.surface)
        .min_image_count(settings.min_image_count)
        .image_format(settings.surface_format.format)
        .image_color_space(settings.surface_format.color_space)
        .image_extent(settings.extent)
        .image_array_layers(1)
        .image_usage(desc.usage)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(settings.present_mode)
        .clipped(true);

    // SAFETY: the surface outlives the swapchain; the caller destroys the
    // swapchain through `destroy_swapchain` before the surface goes away.
    let handle = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };
    let images = match unsafe { swapchain_loader.get_swapchain_images(handle) } {
        Ok(images) => images,
        Err(e) => {
            unsafe { swapchain_loader.destroy_swapchain(handle, None) };
            return Err(e.into());
        }
    };

    info!(
        "Negotiated swapchain: {}x{}, {:?}, {:?}, {} image(s)",
        settings.extent.width,
        settings.extent.height,
        settings.surface_format.format,
        settings.present_mode,
        images.len()
    );

    Ok(SwapchainImages {
        handle,
        format: settings.surface_format.format,
        extent: settings.extent,
        images,
    })
}
