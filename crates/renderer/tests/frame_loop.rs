//! Integration tests for the per-frame command stream.

mod common;

use std::sync::Arc;

use baldwin_renderer::Renderer;
use baldwin_renderer::frame::FENCE_TIMEOUT_NS;
use baldwin_renderer::renderer::{ACQUIRE_TIMEOUT_NS, clear_color};
use baldwin_rhi::RhiError;
use baldwin_rhi::gpu::SemaphoreStage;
use baldwin_rhi::testing::{Call, RecordingDevice};
use baldwin_rhi::vk;

use common::{HEIGHT, WIDTH, desc, initialized, position_of};

#[test]
fn test_frame_barrier_sequence() {
    let (device, mut renderer) = initialized(2);
    let draw_image = renderer.swapchain().unwrap().draw_image().image;
    let swapchain_image = renderer.swapchain().unwrap().image(0);

    renderer.run(0).expect("frame 0 should draw");

    let layouts: Vec<_> = device
        .barriers()
        .into_iter()
        .map(|b| (b.image, b.old_layout, b.new_layout))
        .collect();

    use vk::ImageLayout as L;
    assert_eq!(
        layouts,
        vec![
            (draw_image, L::UNDEFINED, L::GENERAL),
            (draw_image, L::GENERAL, L::GENERAL),
            (draw_image, L::GENERAL, L::COLOR_ATTACHMENT_OPTIMAL),
            (draw_image, L::COLOR_ATTACHMENT_OPTIMAL, L::TRANSFER_SRC_OPTIMAL),
            (swapchain_image, L::UNDEFINED, L::TRANSFER_DST_OPTIMAL),
            (swapchain_image, L::TRANSFER_DST_OPTIMAL, L::GENERAL),
            (swapchain_image, L::GENERAL, L::PRESENT_SRC_KHR),
        ]
    );
}

#[test]
fn test_frame_draws_background_then_triangle() {
    let (device, mut renderer) = initialized(2);
    let draw = *renderer.swapchain().unwrap().draw_image();
    let gradient = renderer.gradient_pipeline();
    let triangle = renderer.triangle_pipeline();

    renderer.run(0).unwrap();

    let clear_at = position_of(
        &device,
        &Call::ClearColorImage {
            image: draw.image,
            layout: vk::ImageLayout::GENERAL,
            color: clear_color(0),
        },
    );
    let dispatch_at = position_of(&device, &Call::Dispatch { x: 50, y: 38, z: 1 });
    let triangle_at = position_of(
        &device,
        &Call::BindPipeline {
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            pipeline: triangle,
        },
    );
    let draw_at = position_of(
        &device,
        &Call::Draw {
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        },
    );
    assert!(clear_at < dispatch_at);
    assert!(dispatch_at < triangle_at);
    assert!(triangle_at < draw_at);

    assert!(device.contains(&Call::BindPipeline {
        bind_point: vk::PipelineBindPoint::COMPUTE,
        pipeline: gradient,
    }));

    // The triangle loads what the compute pass wrote
    let rendering = device
        .calls()
        .into_iter()
        .find_map(|c| match c {
            Call::BeginRendering(info) => Some(info),
            _ => None,
        })
        .expect("the triangle pass should begin rendering");
    assert_eq!(rendering.color.image_view, draw.view);
    assert_eq!(rendering.color.load_op, vk::AttachmentLoadOp::LOAD);
    assert_eq!(rendering.color.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(rendering.extent, draw.extent_2d());

    assert!(device.contains(&Call::SetScissor {
        x: 0,
        y: 0,
        width: WIDTH,
        height: HEIGHT,
    }));
}

#[test]
fn test_clear_color_follows_frame_number() {
    let (device, mut renderer) = initialized(2);
    let draw_image = renderer.swapchain().unwrap().draw_image().image;

    for frame in 0..4 {
        renderer.run(frame).unwrap();
    }

    let colors: Vec<_> = device
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::ClearColorImage { image, color, .. } if image == draw_image => Some(color),
            _ => None,
        })
        .collect();
    assert_eq!(colors, (0..4).map(clear_color).collect::<Vec<_>>());
}

#[test]
fn test_draw_extent_follows_granted_extent() {
    let device = Arc::new(RecordingDevice::new());
    let granted = vk::Extent2D {
        width: 1024,
        height: 768,
    };
    device.grant_extent(granted);
    let mut renderer = Renderer::new(Arc::clone(&device), desc(2), None);
    renderer.init().unwrap();

    assert_eq!(renderer.draw_extent(), Some(granted));

    renderer.run(0).unwrap();
    let swapchain = renderer.swapchain().unwrap();
    assert!(device.contains(&Call::Dispatch { x: 64, y: 48, z: 1 }));
    assert!(device.contains(&Call::BlitImage {
        src: swapchain.draw_image().image,
        dst: swapchain.image(0),
        extent: granted,
    }));
}

#[test]
fn test_submit_waits_on_acquire_and_signals_present() {
    let (device, mut renderer) = initialized(2);
    let swapchain = renderer.swapchain().unwrap().handle();
    let slot = renderer.frames().unwrap().slot(0);
    let (cmd, acquire, render, fence) = (
        slot.command_buffer,
        slot.swapchain_semaphore,
        slot.render_semaphore,
        slot.render_fence,
    );

    renderer.run(0).unwrap();

    assert!(device.contains(&Call::AcquireNextImage {
        swapchain,
        timeout_ns: ACQUIRE_TIMEOUT_NS,
        signal: acquire,
    }));

    let submissions = device.submissions();
    assert_eq!(submissions.len(), 1);
    let submission = submissions[0];
    assert_eq!(submission.command_buffer, cmd);
    assert_eq!(submission.fence, fence);
    assert_eq!(
        submission.wait,
        Some(SemaphoreStage::new(
            acquire,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
        ))
    );
    assert_eq!(
        submission.signal,
        Some(SemaphoreStage::new(
            render,
            vk::PipelineStageFlags2::ALL_COMMANDS
        ))
    );

    let submit_at = device.position(|c| matches!(c, Call::Submit(_))).unwrap();
    let present_at = position_of(
        &device,
        &Call::QueuePresent {
            swapchain,
            image_index: 0,
            wait: render,
        },
    );
    assert!(submit_at < present_at);
}

#[test]
fn test_frame_slots_are_reused_after_waiting() {
    let (device, mut renderer) = initialized(2);
    let frames = renderer.frames().unwrap();
    let first = (frames.slot(0).command_buffer, frames.slot(0).render_fence);
    let second = (frames.slot(1).command_buffer, frames.slot(1).render_fence);
    assert_ne!(first, second);

    renderer.run(0).unwrap();
    renderer.run(1).unwrap();
    let submitted: Vec<_> = device
        .submissions()
        .iter()
        .map(|s| (s.command_buffer, s.fence))
        .collect();
    assert_eq!(submitted, vec![first, second]);

    device.clear_calls();
    renderer.run(2).unwrap();

    // Frame 2 lands on slot 0 and must not record before slot 0's work is done
    let wait_at = position_of(
        &device,
        &Call::WaitForFence {
            fence: first.1,
            timeout_ns: FENCE_TIMEOUT_NS,
        },
    );
    let reset_at = position_of(&device, &Call::ResetFence { fence: first.1 });
    let begin_at = device
        .position(|c| matches!(c, Call::BeginCommandBuffer { cmd, .. } if *cmd == first.0))
        .expect("slot 0's command buffer should be re-recorded");
    assert!(wait_at < reset_at);
    assert!(reset_at < begin_at);
    assert_eq!(wait_at, 0);

    assert_eq!(device.submissions()[0].fence, first.1);
}

#[test]
fn test_present_cycles_swapchain_images() {
    let (device, mut renderer) = initialized(2);

    for frame in 0..4 {
        renderer.run(frame).unwrap();
    }

    let indices: Vec<_> = device
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::QueuePresent { image_index, .. } => Some(image_index),
            _ => None,
        })
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 0]);
}

#[test]
fn test_stalled_gpu_fails_before_recording() {
    let (device, mut renderer) = initialized(2);
    renderer.run(0).unwrap();
    renderer.run(1).unwrap();
    let fence = renderer.frames().unwrap().slot(0).render_fence;

    device.stall_gpu(true);
    device.clear_calls();

    let result = renderer.run(2);
    assert!(matches!(
        result,
        Err(RhiError::VulkanError(vk::Result::TIMEOUT))
    ));
    assert_eq!(
        device.calls(),
        vec![Call::WaitForFence {
            fence,
            timeout_ns: FENCE_TIMEOUT_NS,
        }]
    );
    assert!(!device.fence_signaled(fence));
}

#[test]
fn test_acquire_failure_is_fatal() {
    let (device, mut renderer) = initialized(2);
    device.fail_next_acquire(vk::Result::ERROR_OUT_OF_DATE_KHR);

    let result = renderer.run(0);
    assert!(matches!(
        result,
        Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DATE_KHR))
    ));
    assert_eq!(
        device.count(|c| matches!(c, Call::BeginCommandBuffer { .. } | Call::Submit(_))),
        0
    );
}

#[test]
fn test_suboptimal_present_is_fatal() {
    let (device, mut renderer) = initialized(2);
    device.fail_next_present(vk::Result::SUBOPTIMAL_KHR);

    let result = renderer.run(0);
    assert!(matches!(
        result,
        Err(RhiError::VulkanError(vk::Result::SUBOPTIMAL_KHR))
    ));
    assert_eq!(device.submissions().len(), 1);
}
