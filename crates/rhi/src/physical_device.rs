//! Physical device (GPU) selection.
//!
//! A GPU is usable when it:
//! 1. supports Vulkan 1.3;
//! 2. has one queue family that does both graphics and presentation to the surface;
//! 3. supports dynamic rendering and synchronization2 (1.3 features);
//! 4. supports buffer device address and descriptor indexing (1.2 features).
//!
//! Among usable GPUs, discrete ones win, then the one with the most VRAM.
//!
//! # Example
//!
//! ```no_run
//! use baldwin_rhi::instance::Instance;
//! use baldwin_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! let instance = Instance::new(false, &[]).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let device_info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("Failed to select physical device");
//!
//! println!("Selected GPU: {:?}", device_info.device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Information about the selected physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family used for graphics, compute, transfer and presentation.
    pub graphics_family: u32,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        device_type_name(self.properties.device_type)
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Returns the total device local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("graphics_family", &self.graphics_family)
            .finish()
    }
}

/// Selects the most suitable physical device for rendering to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU meets the requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let selected = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface, surface_loader))
        .max_by_key(|info| rate_device(info.properties.device_type, info.device_local_memory()))
        .ok_or_else(|| {
            warn!("No suitable GPU found with required capabilities");
            RhiError::NoSuitableGpu
        })?;

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch
    );

    Ok(selected)
}

/// Returns `Some` if the device meets every requirement.
fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let device_name = unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown")
    };

    if !supports_vulkan_1_3(properties.api_version) {
        debug!(
            "GPU '{}' skipped: Vulkan 1.3 not supported (version: {}.{})",
            device_name,
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version)
        );
        return None;
    }

    let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default();
    let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default();
    let mut features = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut features_1_2)
        .push_next(&mut features_1_3);
    unsafe { instance.get_physical_device_features2(device, &mut features) };

    if features_1_3.dynamic_rendering == vk::FALSE || features_1_3.synchronization2 == vk::FALSE {
        debug!(
            "GPU '{}' skipped: dynamic rendering or synchronization2 missing",
            device_name
        );
        return None;
    }
    if features_1_2.buffer_device_address == vk::FALSE
        || features_1_2.descriptor_indexing == vk::FALSE
    {
        debug!(
            "GPU '{}' skipped: buffer device address or descriptor indexing missing",
            device_name
        );
        return None;
    }

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let graphics_family = pick_graphics_family(&families, |index| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, index, surface)
            .unwrap_or(false)
    });

    let Some(graphics_family) = graphics_family else {
        debug!(
            "GPU '{}' skipped: no queue family with graphics and present support",
            device_name
        );
        return None;
    };

    Some(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        graphics_family,
    })
}

fn supports_vulkan_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

/// First non-empty queue family with graphics support that can present.
fn pick_graphics_family(
    families: &[vk::QueueFamilyProperties],
    can_present: impl Fn(u32) -> bool,
) -> Option<u32> {
    families
        .iter()
        .enumerate()
        .filter(|(_, family)| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|(i, _)| i as u32)
        .find(|&i| can_present(i))
}

/// Higher scores indicate more desirable devices.
fn rate_device(device_type: vk::PhysicalDeviceType, device_local_memory: u64) -> u64 {
    let type_score = match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 4,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 3,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 0,
    };

    // Device type dominates, VRAM (in MB) breaks ties
    type_score * 1_000_000_000 + device_local_memory / (1024 * 1024)
}

fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties::default()
            .queue_flags(flags)
            .queue_count(count)
    }

    #[test]
    fn test_supports_vulkan_1_3() {
        assert!(supports_vulkan_1_3(vk::API_VERSION_1_3));
        assert!(supports_vulkan_1_3(vk::make_api_version(0, 1, 4, 0)));
        assert!(!supports_vulkan_1_3(vk::API_VERSION_1_2));
        assert!(!supports_vulkan_1_3(vk::API_VERSION_1_0));
    }

    #[test]
    fn test_pick_graphics_family_requires_present() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
            family(vk::QueueFlags::TRANSFER, 2),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        assert_eq!(pick_graphics_family(&families, |_| true), Some(0));
        assert_eq!(pick_graphics_family(&families, |i| i == 2), Some(2));
        assert_eq!(pick_graphics_family(&families, |i| i == 1), None);
    }

    #[test]
    fn test_pick_graphics_family_skips_empty_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        assert_eq!(pick_graphics_family(&families, |_| true), Some(1));
    }

    #[test]
    fn test_discrete_beats_integrated_with_more_memory() {
        let gib = 1024 * 1024 * 1024;
        let discrete = rate_device(vk::PhysicalDeviceType::DISCRETE_GPU, 4 * gib);
        let integrated = rate_device(vk::PhysicalDeviceType::INTEGRATED_GPU, 32 * gib);
        assert!(discrete > integrated);

        let small = rate_device(vk::PhysicalDeviceType::DISCRETE_GPU, 2 * gib);
        assert!(discrete > small);
    }

    #[test]
    fn test_device_type_name() {
        assert_eq!(
            device_type_name(vk::PhysicalDeviceType::DISCRETE_GPU),
            "Discrete GPU"
        );
        assert_eq!(device_type_name(vk::PhysicalDeviceType::OTHER), "Other");
    }
}
