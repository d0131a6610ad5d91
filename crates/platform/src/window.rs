//! The engine window and its presentation surface.
//!
//! The window is fixed-size: the renderer never rebuilds its swapchain, so
//! resizing is disabled at creation.

use std::ffi::{CStr, c_char};

use ash::vk;
use raw_window_handle::{DisplayHandle, HasDisplayHandle, HasWindowHandle, WindowHandle};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use baldwin_core::{EngineConfig, Error, Result};

/// A presentation surface bound to a [`Window`].
///
/// Destroyed on drop. The instance it was created from must outlive it.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader for surface capability, format and present mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the handle came from `ash_window::create_surface` on the
        // instance the loader was built from, and is destroyed only here.
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
        debug!("Surface destroyed");
    }
}

/// The fixed-size engine window.
pub struct Window {
    window: WinitWindow,
}

impl Window {
    /// Opens a non-resizable window of `width` x `height` physical pixels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the platform refuses to create it.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attributes = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(false);

        let window = event_loop
            .create_window(attributes)
            .map_err(|e| Error::Window(e.to_string()))?;

        let granted = window.inner_size();
        info!(
            "Window \"{}\" opened: {}x{} (requested {}x{})",
            title, granted.width, granted.height, width, height
        );

        Ok(Self { window })
    }

    /// Opens the window described by `config`.
    pub fn from_config(event_loop: &ActiveEventLoop, config: &EngineConfig) -> Result<Self> {
        Self::new(event_loop, config.width, config.height, &config.title)
    }

    #[inline]
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Inner size in physical pixels, as granted by the platform.
    pub fn size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions needed to present to this window.
    ///
    /// The pointers reference static strings owned by `ash_window`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the display is not supported.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let extensions =
            ash_window::enumerate_required_extensions(self.display_handle()?.as_raw())
                .map_err(|e| Error::Window(format!("Unsupported display: {}", e)))?;

        // SAFETY: ash_window returns pointers to static, nul-terminated names.
        let names: Vec<&CStr> = extensions
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect();
        debug!("Surface extensions: {:?}", names);

        Ok(extensions.to_vec())
    }

    /// Creates the presentation surface for this window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the window handles are unavailable and
    /// [`Error::Render`] if Vulkan rejects the surface.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display = self.display_handle()?;
        let window = self.window_handle()?;

        // SAFETY: entry and instance are live, and both raw handles come from
        // this window. The surface is destroyed by `Surface::drop`.
        let handle = unsafe {
            ash_window::create_surface(entry, instance, display.as_raw(), window.as_raw(), None)
        }
        .map_err(|e| Error::Render(format!("Surface creation failed: {}", e)))?;

        info!("Surface created");
        Ok(Surface {
            handle,
            loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }

    fn display_handle(&self) -> Result<DisplayHandle<'_>> {
        self.window
            .display_handle()
            .map_err(|e| Error::Window(format!("No display handle: {}", e)))
    }

    fn window_handle(&self) -> Result<WindowHandle<'_>> {
        self.window
            .window_handle()
            .map_err(|e| Error::Window(format!("No window handle: {}", e)))
    }
}
