//! Shared setup for renderer integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use baldwin_renderer::overlay::Overlay;
use baldwin_renderer::{Renderer, RendererDesc, ShaderSet};
use baldwin_rhi::shader::SPIRV_MAGIC;
use baldwin_rhi::testing::{Call, RecordingDevice};
use baldwin_rhi::vk;

pub const WIDTH: u32 = 800;
pub const HEIGHT: u32 = 600;

/// A module header; the recording device never parses it.
pub fn spirv() -> Vec<u32> {
    vec![SPIRV_MAGIC, 0x0001_0300, 0, 1, 0]
}

pub fn shaders() -> ShaderSet {
    ShaderSet {
        gradient: spirv(),
        triangle_vert: spirv(),
        triangle_frag: spirv(),
    }
}

pub fn desc(overlap: usize) -> RendererDesc {
    RendererDesc {
        surface: vk::SurfaceKHR::null(),
        width: WIDTH,
        height: HEIGHT,
        overlap,
        shaders: shaders(),
    }
}

/// An uninitialized renderer on a fresh recording device.
pub fn renderer(
    overlap: usize,
    overlay: Option<Box<dyn Overlay<RecordingDevice>>>,
) -> (Arc<RecordingDevice>, Renderer<RecordingDevice>) {
    let device = Arc::new(RecordingDevice::new());
    let renderer = Renderer::new(Arc::clone(&device), desc(overlap), overlay);
    (device, renderer)
}

/// An initialized renderer without overlay, with the init calls cleared.
pub fn initialized(overlap: usize) -> (Arc<RecordingDevice>, Renderer<RecordingDevice>) {
    let (device, mut renderer) = renderer(overlap, None);
    renderer.init().expect("init should succeed on a recording device");
    device.clear_calls();
    (device, renderer)
}

/// Position of the first call equal to `call`, panicking when absent.
pub fn position_of(device: &RecordingDevice, call: &Call) -> usize {
    device
        .position(|c| c == call)
        .unwrap_or_else(|| panic!("{:?} was not recorded", call))
}
