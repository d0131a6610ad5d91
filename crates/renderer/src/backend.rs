//! Rendering backend selection.
//!
//! The engine talks to a [`Backend`], a tagged union over the implemented
//! graphics APIs. Each variant implements [`RenderBackend`]. Only Vulkan
//! exists; a configuration asking for DirectX 12 gets Vulkan and a warning.

use std::sync::Arc;
use std::time::Duration;

use baldwin_core::{EngineConfig, RenderApi, Result};
use baldwin_platform::{InputState, Surface, Window};
use baldwin_rhi::RhiResult;
use baldwin_rhi::device::Device;
use baldwin_rhi::instance::Instance;
use baldwin_rhi::physical_device::select_physical_device;
use tracing::{info, warn};

use crate::overlay::{ImguiOverlay, OverlayShaders};
use crate::renderer::{Renderer, RendererDesc, ShaderSet};

/// What the engine loop needs from a backend.
pub trait RenderBackend {
    /// Creates every GPU resource.
    fn init(&mut self) -> RhiResult<()>;

    /// Feeds input and elapsed time to the UI overlay.
    fn new_frame(&mut self, input: &InputState, delta: Duration);

    /// Draws frame number `frame`.
    fn run(&mut self, frame: u64) -> RhiResult<()>;

    /// Releases every GPU resource. Does nothing when already cleaned up.
    fn cleanup(&mut self) -> RhiResult<()>;
}

/// Vulkan backend: instance, surface and device bootstrap plus the renderer.
///
/// Fields drop in declaration order, so the renderer releases its objects
/// before the device, the surface and finally the instance go away.
pub struct VulkanBackend {
    renderer: Renderer<Device>,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
}

impl VulkanBackend {
    /// Bootstraps Vulkan for `window` and prepares an uninitialized renderer.
    ///
    /// # Errors
    ///
    /// Returns an error if instance, surface or device creation fails, if no
    /// GPU is suitable, or if a shader file cannot be loaded.
    pub fn new(window: &Window, config: &EngineConfig) -> Result<Self> {
        let extensions = window.required_extensions()?;
        let instance = Instance::new(config.validation, &extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        let shaders = ShaderSet::load(&config.shader_dir)?;
        let overlay = ImguiOverlay::new(OverlayShaders::load(&config.shader_dir)?);

        let (width, height) = window.size();
        let renderer = Renderer::new(
            Arc::clone(&device),
            RendererDesc {
                surface: surface.handle(),
                width,
                height,
                overlap: config.frame_overlap(),
                shaders,
            },
            Some(Box::new(overlay)),
        );

        info!(
            "Vulkan backend ready (validation: {})",
            instance.has_validation()
        );

        Ok(Self {
            renderer,
            device,
            surface,
            instance,
        })
    }

    #[inline]
    pub fn renderer(&self) -> &Renderer<Device> {
        &self.renderer
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}

impl RenderBackend for VulkanBackend {
    fn init(&mut self) -> RhiResult<()> {
        self.renderer.init()
    }

    fn new_frame(&mut self, input: &InputState, delta: Duration) {
        self.renderer.new_frame(input, delta);
    }

    fn run(&mut self, frame: u64) -> RhiResult<()> {
        self.renderer.run(frame)
    }

    fn cleanup(&mut self) -> RhiResult<()> {
        self.renderer.cleanup()
    }
}

/// The selected backend.
pub enum Backend {
    Vulkan(VulkanBackend),
}

impl Backend {
    /// Creates the backend `config.render_api` asks for.
    ///
    /// DirectX 12 is accepted but not implemented: it falls back to Vulkan.
    pub fn create(window: &Window, config: &EngineConfig) -> Result<Self> {
        let api = resolve_api(config.render_api);
        info!("Creating {} backend", api);
        match api {
            RenderApi::Vulkan | RenderApi::DirectX12 => {
                Ok(Backend::Vulkan(VulkanBackend::new(window, config)?))
            }
        }
    }

    /// The API actually in use.
    pub fn api(&self) -> RenderApi {
        match self {
            Backend::Vulkan(_) => RenderApi::Vulkan,
        }
    }

    fn inner(&mut self) -> &mut dyn RenderBackend {
        match self {
            Backend::Vulkan(backend) => backend,
        }
    }
}

impl RenderBackend for Backend {
    fn init(&mut self) -> RhiResult<()> {
        self.inner().init()
    }

    fn new_frame(&mut self, input: &InputState, delta: Duration) {
        self.inner().new_frame(input, delta);
    }

    fn run(&mut self, frame: u64) -> RhiResult<()> {
        self.inner().run(frame)
    }

    fn cleanup(&mut self) -> RhiResult<()> {
        self.inner().cleanup()
    }
}

/// Maps a requested API to one that is implemented.
pub fn resolve_api(requested: RenderApi) -> RenderApi {
    match requested {
        RenderApi::Vulkan => RenderApi::Vulkan,
        RenderApi::DirectX12 => {
            warn!("{} backend is not implemented, falling back to Vulkan", requested);
            RenderApi::Vulkan
        }
    }
}
