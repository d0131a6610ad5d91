//! Per-frame resources and the frame ring.
//!
//! A [`FrameRing`] owns N [`FrameData`] slots. Frame `k` always uses slot
//! `k % N`, so a slot is reused every N frames. Before a slot's command buffer
//! is touched again, [`FrameRing::begin`] waits for the fence its previous
//! submission signals.
//!
//! Each slot registers the destruction of its objects on its own
//! [`DeletionQueue`]. The queues only run during renderer cleanup.

use std::sync::Arc;

use ash::vk;
use baldwin_core::DeletionQueue;
use baldwin_rhi::{RhiError, RhiResult};
use baldwin_rhi::gpu::GpuDevice;
use tracing::{debug, info};

/// How long [`FrameRing::begin`] waits for a slot's fence.
pub const FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

/// Resources owned by one frame slot.
#[derive(Debug)]
pub struct FrameData {
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,
    /// Signaled by the swapchain when the acquired image is ready.
    pub swapchain_semaphore: vk::Semaphore,
    /// Signaled when the frame's commands finish; presentation waits on it.
    pub render_semaphore: vk::Semaphore,
    /// Signaled when the slot's submission completes. Created signaled.
    pub render_fence: vk::Fence,
    /// Destroys this slot's objects on flush.
    pub deletion_queue: DeletionQueue,
}

impl FrameData {
    /// Creates one slot and registers its teardown.
    ///
    /// The command pool and buffer are registered before the sync objects,
    /// so the sync objects are released first.
    fn new<D: GpuDevice + 'static>(device: &Arc<D>) -> RhiResult<Self> {
        let mut deletion_queue = DeletionQueue::new("frame");

        let command_pool = device.create_command_pool()?;
        let command_buffer = match device.allocate_command_buffer(command_pool) {
            Ok(cmd) => cmd,
            Err(e) => {
                device.destroy_command_pool(command_pool);
                return Err(e);
            }
        };
        {
            let device = Arc::clone(device);
            deletion_queue.push(move || {
                device.free_command_buffer(command_pool, command_buffer);
                device.destroy_command_pool(command_pool);
            });
        }

        let sync = Self::create_sync_objects(device.as_ref());
        let (swapchain_semaphore, render_semaphore, render_fence) = match sync {
            Ok(sync) => sync,
            Err(e) => {
                deletion_queue.flush();
                return Err(e);
            }
        };
        {
            let device = Arc::clone(device);
            deletion_queue.push(move || {
                device.destroy_fence(render_fence);
                device.destroy_semaphore(render_semaphore);
                device.destroy_semaphore(swapchain_semaphore);
            });
        }

        Ok(Self {
            command_pool,
            command_buffer,
            swapchain_semaphore,
            render_semaphore,
            render_fence,
            deletion_queue,
        })
    }

    fn create_sync_objects<D: GpuDevice>(
        device: &D,
    ) -> RhiResult<(vk::Semaphore, vk::Semaphore, vk::Fence)> {
        let swapchain_semaphore = device.create_semaphore()?;
        let render_semaphore = match device.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_semaphore(swapchain_semaphore);
                return Err(e);
            }
        };
        let render_fence = match device.create_fence(true) {
            Ok(fence) => fence,
            Err(e) => {
                device.destroy_semaphore(render_semaphore);
                device.destroy_semaphore(swapchain_semaphore);
                return Err(e);
            }
        };
        Ok((swapchain_semaphore, render_semaphore, render_fence))
    }
}

/// N frame slots selected by `frame % N`.
pub struct FrameRing<D: GpuDevice> {
    device: Arc<D>,
    frames: Vec<FrameData>,
}

impl<D: GpuDevice + 'static> FrameRing<D> {
    /// Creates `overlap` frame slots.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidState`] for a zero overlap, or an error if
    /// any object fails to create. Slots created so far are torn down before
    /// returning.
    pub fn new(device: &Arc<D>, overlap: usize) -> RhiResult<Self> {
        if overlap == 0 {
            return Err(RhiError::InvalidState(
                "frame overlap must be at least 1".to_string(),
            ));
        }

        let mut frames = Vec::with_capacity(overlap);
        for index in 0..overlap {
            match FrameData::new(device) {
                Ok(frame) => {
                    debug!("Created frame slot {}", index);
                    frames.push(frame);
                }
                Err(e) => {
                    for frame in &mut frames {
                        frame.deletion_queue.flush();
                    }
                    return Err(e);
                }
            }
        }

        info!("Frame ring created with {} slot(s)", overlap);

        Ok(Self {
            device: Arc::clone(device),
            frames,
        })
    }
}

impl<D: GpuDevice> FrameRing<D> {
    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Slot used by `frame`.
    #[inline]
    pub fn slot_index(&self, frame: u64) -> usize {
        (frame % self.frames.len() as u64) as usize
    }

    #[inline]
    pub fn slot(&self, frame: u64) -> &FrameData {
        &self.frames[self.slot_index(frame)]
    }

    /// Waits for the slot's previous submission, then resets its fence.
    ///
    /// # Errors
    ///
    /// A fence that does not signal within [`FENCE_TIMEOUT_NS`] is an error,
    /// and the fence is left untouched.
    pub fn begin(&self, frame: u64) -> RhiResult<&FrameData> {
        let slot = self.slot(frame);
        self.device
            .wait_for_fence(slot.render_fence, FENCE_TIMEOUT_NS)?;
        self.device.reset_fence(slot.render_fence)?;
        Ok(slot)
    }

    /// Runs every slot's teardown queue, in slot order.
    pub fn flush_all(&mut self) {
        for frame in &mut self.frames {
            frame.deletion_queue.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baldwin_rhi::testing::{Call, RecordingDevice};

    fn ring(overlap: usize) -> (Arc<RecordingDevice>, FrameRing<RecordingDevice>) {
        let device = Arc::new(RecordingDevice::new());
        let ring = FrameRing::new(&device, overlap).unwrap();
        (device, ring)
    }

    #[test]
    fn test_slot_repeats_every_overlap_frames() {
        let (_device, ring) = ring(3);
        for k in 0..10u64 {
            assert_eq!(ring.slot_index(k), ring.slot_index(k + 3));
            assert_eq!(ring.slot(k).render_fence, ring.slot(k + 3).render_fence);
        }
        assert_ne!(ring.slot(0).render_fence, ring.slot(1).render_fence);
    }

    #[test]
    fn test_zero_overlap_is_rejected() {
        let device = Arc::new(RecordingDevice::new());
        let result = FrameRing::new(&device, 0);
        assert!(matches!(result, Err(RhiError::InvalidState(_))));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_fences_start_signaled() {
        let (device, ring) = ring(2);
        assert!(device.fence_signaled(ring.slot(0).render_fence));
        assert!(device.fence_signaled(ring.slot(1).render_fence));
        assert_eq!(
            device.count(|c| matches!(c, Call::CreateFence { signaled: true, .. })),
            2
        );
    }

    #[test]
    fn test_begin_waits_then_resets() {
        let (device, ring) = ring(2);
        device.clear_calls();

        let fence = ring.begin(1).unwrap().render_fence;

        assert_eq!(
            device.calls(),
            vec![
                Call::WaitForFence {
                    fence,
                    timeout_ns: FENCE_TIMEOUT_NS
                },
                Call::ResetFence { fence },
            ]
        );
    }

    #[test]
    fn test_begin_timeout_leaves_fence_alone() {
        let (device, ring) = ring(1);
        ring.begin(0).unwrap();

        // Reset but never submitted: the wait can only time out
        device.clear_calls();
        assert!(ring.begin(0).is_err());
        assert!(!device.contains(&Call::ResetFence {
            fence: ring.slot(0).render_fence
        }));
    }

    #[test]
    fn test_flush_releases_sync_objects_before_pool() {
        let (device, mut ring) = ring(1);
        let slot = ring.slot(0);
        let (pool, fence) = (slot.command_pool, slot.render_fence);
        device.clear_calls();

        ring.flush_all();

        let fence_at = device
            .position(|c| *c == Call::DestroyFence { fence })
            .unwrap();
        let pool_at = device
            .position(|c| *c == Call::DestroyCommandPool { pool })
            .unwrap();
        assert!(fence_at < pool_at);
        assert_eq!(device.count(|c| matches!(c, Call::DestroySemaphore { .. })), 2);

        device.clear_calls();
        ring.flush_all();
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_flush_runs_slots_in_order() {
        let (device, mut ring) = ring(2);
        let first = ring.slot(0).command_pool;
        let second = ring.slot(1).command_pool;

        ring.flush_all();

        let first_at = device
            .position(|c| *c == Call::DestroyCommandPool { pool: first })
            .unwrap();
        let second_at = device
            .position(|c| *c == Call::DestroyCommandPool { pool: second })
            .unwrap();
        assert!(first_at < second_at);
    }
}
