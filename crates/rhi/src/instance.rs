//! Vulkan instance bootstrap.
//!
//! [`Instance`] loads the Vulkan library, creates a 1.3 instance and, when
//! validation is requested and the Khronos layer is installed, a debug
//! messenger that forwards validation output to `tracing`:
//!
//! | Vulkan severity | `tracing` level |
//! |-----------------|-----------------|
//! | ERROR           | `error!`        |
//! | WARNING         | `warn!`         |
//! | INFO            | `debug!`        |
//! | VERBOSE         | `trace!`        |
//!
//! Surface extensions come from the window system and are passed in by the
//! caller (see `baldwin_platform::Window::required_extensions`).
//!
//! # Example
//!
//! ```no_run
//! use baldwin_rhi::instance::Instance;
//!
//! # fn example() -> Result<(), baldwin_rhi::RhiError> {
//! // Headless, validated in debug builds
//! let instance = Instance::new(cfg!(debug_assertions), &[])?;
//! assert_eq!(instance.has_validation(), cfg!(debug_assertions));
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_void};

use ash::{Entry, vk};
use tracing::{debug, error, info, trace, warn};

use crate::error::RhiResult;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

const APPLICATION_NAME: &CStr = c"Baldwin Test Bed";
const ENGINE_NAME: &CStr = c"Baldwin";

/// The Vulkan library, instance and optional validation messenger.
///
/// Must outlive every surface and device created from it.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Creates a Vulkan 1.3 instance.
    ///
    /// # Arguments
    ///
    /// * `validation` - Enable the Khronos validation layer if it is installed
    /// * `surface_extensions` - Instance extensions the window system needs
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan library cannot be loaded or instance or
    /// messenger creation fails. A missing validation layer is only a warning.
    pub fn new(validation: bool, surface_extensions: &[*const c_char]) -> RhiResult<Self> {
        // SAFETY: the loaded library stays alive inside `entry`, which outlives
        // the instance.
        let entry = unsafe { Entry::load()? };

        let validation = validation && {
            let installed = validation_layer_installed(&entry)?;
            if !installed {
                warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
            }
            installed
        };

        let app_info = vk::ApplicationInfo::default()
            .application_name(APPLICATION_NAME)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);
        let extensions = instance_extensions(surface_extensions, validation);
        let layers: Vec<*const c_char> = if validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        // SAFETY: every pointer in `create_info` outlives this call.
        let instance = unsafe { entry.create_instance(&create_info, None)? };
        info!(
            "Vulkan 1.3 instance created with {} extension(s)",
            extensions.len()
        );

        let messenger = if validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            // SAFETY: the loader belongs to the instance created above.
            match unsafe { loader.create_debug_utils_messenger(&messenger_info(), None) } {
                Ok(handle) => Some((loader, handle)),
                Err(e) => {
                    // SAFETY: nothing else was created from the instance yet.
                    unsafe { instance.destroy_instance(None) };
                    return Err(e.into());
                }
            }
        } else {
            None
        };
        if messenger.is_some() {
            info!("Validation enabled");
        }

        Ok(Self {
            entry,
            instance,
            messenger,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Whether validation messages are being forwarded.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.messenger.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // SAFETY: the messenger goes before its instance, and every child
        // object has been destroyed by the owners declared after this one.
        unsafe {
            if let Some((loader, handle)) = self.messenger.take() {
                loader.destroy_debug_utils_messenger(handle, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

fn validation_layer_installed(entry: &Entry) -> RhiResult<bool> {
    // SAFETY: plain enumeration on a loaded entry.
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER)))
}

/// Surface extensions plus `VK_EXT_debug_utils` under validation, without
/// duplicates.
fn instance_extensions(surface_extensions: &[*const c_char], validation: bool) -> Vec<*const c_char> {
    let debug_utils = validation.then(|| ash::ext::debug_utils::NAME.as_ptr());

    let mut extensions: Vec<*const c_char> = Vec::with_capacity(surface_extensions.len() + 1);
    for ext in surface_extensions.iter().copied().chain(debug_utils) {
        // SAFETY: callers pass pointers to static, nul-terminated names.
        let name = unsafe { CStr::from_ptr(ext) };
        if !extensions
            .iter()
            .any(|&seen| unsafe { CStr::from_ptr(seen) } == name)
        {
            extensions.push(ext);
        }
    }
    extensions
}

fn messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(forward_to_tracing))
}

fn message_kind(ty: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if ty.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if ty.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

unsafe extern "system" fn forward_to_tracing(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ty: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    // SAFETY: the layer passes either null or valid callback data for the
    // duration of the call.
    let message = match unsafe { data.as_ref() } {
        Some(data) if !data.p_message.is_null() => unsafe { CStr::from_ptr(data.p_message) }
            .to_string_lossy(),
        _ => Cow::Borrowed("(no message)"),
    };
    let kind = message_kind(ty);

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "[{}] {}", kind, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "[{}] {}", kind, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(target: "vulkan", "[{}] {}", kind, message);
    } else {
        trace!(target: "vulkan", "[{}] {}", kind, message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(extensions: &[*const c_char]) -> Vec<&'static CStr> {
        extensions
            .iter()
            .map(|&e| unsafe { CStr::from_ptr(e) })
            .collect()
    }

    #[test]
    fn test_validation_adds_debug_utils() {
        let surface = [ash::khr::surface::NAME.as_ptr()];

        let without = instance_extensions(&surface, false);
        assert_eq!(names(&without), vec![ash::khr::surface::NAME]);

        let with = instance_extensions(&surface, true);
        assert_eq!(
            names(&with),
            vec![ash::khr::surface::NAME, ash::ext::debug_utils::NAME]
        );
    }

    #[test]
    fn test_duplicate_extensions_are_dropped() {
        let surface = [
            ash::khr::surface::NAME.as_ptr(),
            ash::khr::xlib_surface::NAME.as_ptr(),
            ash::khr::surface::NAME.as_ptr(),
        ];
        let extensions = instance_extensions(&surface, false);
        assert_eq!(
            names(&extensions),
            vec![ash::khr::surface::NAME, ash::khr::xlib_surface::NAME]
        );
    }

    #[test]
    fn test_headless_without_validation_is_empty() {
        assert!(instance_extensions(&[], false).is_empty());
    }

    #[test]
    fn test_message_kind_prefers_validation() {
        use vk::DebugUtilsMessageTypeFlagsEXT as Ty;
        assert_eq!(message_kind(Ty::VALIDATION | Ty::PERFORMANCE), "validation");
        assert_eq!(message_kind(Ty::PERFORMANCE), "performance");
        assert_eq!(message_kind(Ty::GENERAL), "general");
    }
}
