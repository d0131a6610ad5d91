//! Integration test for the Dear ImGui overlay.
//!
//! imgui allows a single live context per process, so this binary holds
//! exactly one test.

mod common;

use std::time::Duration;

use baldwin_platform::InputState;
use baldwin_renderer::swapchain::SWAPCHAIN_FORMAT;
use baldwin_renderer::{ImguiOverlay, OverlayShaders};
use baldwin_rhi::testing::Call;
use baldwin_rhi::vk;

use common::{renderer, spirv};

#[test]
fn test_overlay_draws_onto_swapchain_image() {
    let overlay = ImguiOverlay::new(OverlayShaders {
        vertex: spirv(),
        fragment: spirv(),
    });
    let (device, mut renderer) = renderer(2, Some(Box::new(overlay)));

    renderer.init().expect("init with overlay should succeed");

    // Init: a free-able pool, the font atlas uploaded once, a blended pipeline
    let free_pools = device.count(|c| {
        matches!(
            c,
            Call::CreateDescriptorPool { max_sets: 1000, flags, .. }
                if flags.contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        )
    });
    assert_eq!(free_pools, 1);
    assert_eq!(
        device.count(|c| matches!(c, Call::CopyBufferToImage { .. })),
        1
    );
    let overlay_pipeline = device
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::CreateGraphicsPipeline { desc } => Some(desc),
            _ => None,
        })
        .last()
        .unwrap();
    assert!(overlay_pipeline.color_blend.blend_enable);
    assert_eq!(overlay_pipeline.color_attachment_format, SWAPCHAIN_FORMAT);
    assert_eq!(overlay_pipeline.vertex_bindings.len(), 1);

    // Two frames, so imgui has laid the window out at least once
    let mut input = InputState::new();
    input.on_mouse_moved(10.0, 10.0);
    device.clear_calls();
    for frame in 0..2 {
        renderer.new_frame(&input, Duration::from_millis(16));
        renderer.run(frame).expect("frame with overlay should draw");
        input.begin_frame();
    }

    let swapchain = renderer.swapchain().unwrap();
    let overlay_pass = device
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::BeginRendering(info) if info.color.layout == vk::ImageLayout::GENERAL => {
                Some(info)
            }
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(overlay_pass.len(), 2, "one overlay pass per frame");
    for (frame, info) in overlay_pass.iter().enumerate() {
        assert_eq!(info.color.image_view, swapchain.image_view(frame as u32));
        assert_eq!(info.color.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(info.extent, swapchain.extent());
    }
    assert!(device.count(|c| matches!(c, Call::DrawIndexed { .. })) > 0);

    // The overlay pass sits between the copy and the present transition
    let calls = device.calls();
    let blit_at = calls
        .iter()
        .position(|c| matches!(c, Call::BlitImage { .. }))
        .unwrap();
    let overlay_at = calls
        .iter()
        .position(|c| {
            matches!(c, Call::BeginRendering(info) if info.color.layout == vk::ImageLayout::GENERAL)
        })
        .unwrap();
    let present_at = calls
        .iter()
        .position(|c| {
            matches!(c, Call::ImageBarrier(b) if b.new_layout == vk::ImageLayout::PRESENT_SRC_KHR)
        })
        .unwrap();
    assert!(blit_at < overlay_at);
    assert!(overlay_at < present_at);

    // Cleanup: overlay first, then frame slots
    device.clear_calls();
    renderer.cleanup().unwrap();

    let overlay_pool_at = device
        .position(|c| matches!(c, Call::DestroyDescriptorPool { .. }))
        .unwrap();
    let slot_pool_at = device
        .position(|c| matches!(c, Call::DestroyCommandPool { .. }))
        .unwrap();
    assert!(overlay_pool_at < slot_pool_at);
    assert_eq!(
        device.count(|c| matches!(c, Call::DestroyDescriptorPool { .. })),
        2
    );
    assert!(device.count(|c| matches!(c, Call::DestroyBuffer { .. })) >= 2);
}
