//! Descriptor set management for shader resource binding.
//!
//! This module provides:
//! - [`DescriptorLayoutBuilder`] to accumulate bindings into a [`DescriptorLayout`]
//! - [`DescriptorAllocator`], a fixed-capacity pool sized by a ratio table
//! - [`write_storage_image`] to point a storage-image binding at a view
//!
//! # Example
//!
//! ```no_run
//! use baldwin_rhi::descriptor::{DescriptorAllocator, DescriptorLayoutBuilder, PoolSizeRatio};
//! use baldwin_rhi::gpu::GpuDevice;
//! use baldwin_rhi::{vk, RhiResult};
//!
//! fn storage_image_set<D: GpuDevice>(device: &D, view: vk::ImageView) -> RhiResult<vk::DescriptorSet> {
//!     let mut allocator = DescriptorAllocator::init_pool(
//!         device,
//!         10,
//!         &[PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0)],
//!     )?;
//!
//!     let mut builder = DescriptorLayoutBuilder::new();
//!     builder.add_binding(0, vk::DescriptorType::STORAGE_IMAGE);
//!     let layout = builder.build(
//!         device,
//!         vk::ShaderStageFlags::COMPUTE,
//!         vk::DescriptorSetLayoutCreateFlags::empty(),
//!     )?;
//!
//!     let set = allocator.allocate(device, &layout)?;
//!     baldwin_rhi::descriptor::write_storage_image(device, set, 0, view);
//!     Ok(set)
//! }
//! ```

use ash::vk;
use tracing::debug;

use crate::error::{RhiError, RhiResult};
use crate::gpu::GpuDevice;

/// One binding slot of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub count: u32,
}

impl DescriptorBinding {
    /// Converts to the Vulkan binding, visible to `stages`.
    pub fn to_vk(&self, stages: vk::ShaderStageFlags) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(self.binding)
            .descriptor_type(self.ty)
            .descriptor_count(self.count)
            .stage_flags(stages)
    }
}

/// Accumulates bindings for a descriptor set layout.
///
/// The builder can be reused after [`clear`](Self::clear).
#[derive(Debug, Clone, Default)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<DescriptorBinding>,
}

impl DescriptorLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single-descriptor binding.
    pub fn add_binding(&mut self, binding: u32, ty: vk::DescriptorType) -> &mut Self {
        self.add_binding_array(binding, ty, 1)
    }

    /// Adds a binding holding `count` descriptors.
    pub fn add_binding_array(
        &mut self,
        binding: u32,
        ty: vk::DescriptorType,
        count: u32,
    ) -> &mut Self {
        self.bindings.push(DescriptorBinding { binding, ty, count });
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.bindings.clear();
        self
    }

    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    /// Creates the layout. Every binding is visible to `stages`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the layout.
    pub fn build<D: GpuDevice + ?Sized>(
        &self,
        device: &D,
        stages: vk::ShaderStageFlags,
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> RhiResult<DescriptorLayout> {
        let handle = device.create_descriptor_set_layout(&self.bindings, stages, flags)?;
        debug!(
            "Created descriptor set layout with {} binding(s)",
            self.bindings.len()
        );

        Ok(DescriptorLayout {
            handle,
            bindings: self.bindings.clone(),
        })
    }
}

/// An immutable descriptor set layout together with its binding schema.
///
/// The layout does not destroy itself; its owner registers the destruction
/// with a deletion queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorLayout {
    handle: vk::DescriptorSetLayout,
    bindings: Vec<DescriptorBinding>,
}

impl DescriptorLayout {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    #[inline]
    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    /// Total descriptors of type `ty` one set of this layout consumes.
    pub fn descriptor_count(&self, ty: vk::DescriptorType) -> u32 {
        self.bindings
            .iter()
            .filter(|b| b.ty == ty)
            .map(|b| b.count)
            .sum()
    }
}

/// Share of a pool reserved for one descriptor type, as a multiple of `max_sets`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSizeRatio {
    pub ty: vk::DescriptorType,
    pub ratio: f64,
}

impl PoolSizeRatio {
    pub fn new(ty: vk::DescriptorType, ratio: f64) -> Self {
        Self { ty, ratio }
    }
}

/// Absorbs the representation error of decimal ratios such as `0.29`.
const RATIO_EPSILON: f64 = 1e-9;

/// Converts a ratio table into pool sizes: `floor(ratio * max_sets)` per type.
///
/// Entries for the same type are merged and empty entries are dropped.
pub fn pool_sizes(max_sets: u32, ratios: &[PoolSizeRatio]) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::with_capacity(ratios.len());

    for ratio in ratios {
        let count = (ratio.ratio * f64::from(max_sets) + RATIO_EPSILON).floor() as u32;
        if count == 0 {
            continue;
        }
        match sizes.iter_mut().find(|s| s.ty == ratio.ty) {
            Some(size) => size.descriptor_count += count,
            None => sizes.push(
                vk::DescriptorPoolSize::default()
                    .ty(ratio.ty)
                    .descriptor_count(count),
            ),
        }
    }

    sizes
}

/// A single descriptor pool that tracks its remaining capacity.
///
/// Requests that would exceed the pool are rejected with
/// [`RhiError::DescriptorPoolExhausted`] without reaching the device.
#[derive(Debug)]
pub struct DescriptorAllocator {
    pool: vk::DescriptorPool,
    max_sets: u32,
    capacity: Vec<vk::DescriptorPoolSize>,
    remaining: Vec<vk::DescriptorPoolSize>,
    remaining_sets: u32,
}

impl DescriptorAllocator {
    /// Creates the pool.
    ///
    /// # Arguments
    ///
    /// * `device` - The device to create the pool on
    /// * `max_sets` - Maximum number of sets the pool can hand out
    /// * `ratios` - Descriptors per type, relative to `max_sets`
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn init_pool<D: GpuDevice + ?Sized>(
        device: &D,
        max_sets: u32,
        ratios: &[PoolSizeRatio],
    ) -> RhiResult<Self> {
        let capacity = pool_sizes(max_sets, ratios);
        let pool = device.create_descriptor_pool(
            max_sets,
            &capacity,
            vk::DescriptorPoolCreateFlags::empty(),
        )?;

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            capacity.len()
        );

        Ok(Self {
            pool,
            max_sets,
            remaining: capacity.clone(),
            capacity,
            remaining_sets: max_sets,
        })
    }

    /// Allocates one set with `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DescriptorPoolExhausted`] when the pool cannot hold
    /// another set of this layout, and [`RhiError::InvalidState`] after
    /// [`destroy_pool`](Self::destroy_pool).
    pub fn allocate<D: GpuDevice + ?Sized>(
        &mut self,
        device: &D,
        layout: &DescriptorLayout,
    ) -> RhiResult<vk::DescriptorSet> {
        if self.pool == vk::DescriptorPool::null() {
            return Err(RhiError::InvalidState(
                "descriptor pool has been destroyed".to_string(),
            ));
        }
        if self.remaining_sets == 0 {
            return Err(RhiError::DescriptorPoolExhausted(format!(
                "all {} sets are in use",
                self.max_sets
            )));
        }

        for binding in layout.bindings() {
            let needed = layout.descriptor_count(binding.ty);
            let left = self
                .remaining
                .iter()
                .find(|s| s.ty == binding.ty)
                .map_or(0, |s| s.descriptor_count);
            if needed > left {
                return Err(RhiError::DescriptorPoolExhausted(format!(
                    "{:?}: need {}, {} left",
                    binding.ty, needed, left
                )));
            }
        }

        let set = device.allocate_descriptor_set(self.pool, layout.handle())?;

        self.remaining_sets -= 1;
        for size in &mut self.remaining {
            size.descriptor_count -= layout.descriptor_count(size.ty);
        }

        Ok(set)
    }

    /// Returns every set to the pool. Previously allocated sets become invalid.
    pub fn clear_descriptors<D: GpuDevice + ?Sized>(&mut self, device: &D) -> RhiResult<()> {
        device.reset_descriptor_pool(self.pool)?;
        self.remaining = self.capacity.clone();
        self.remaining_sets = self.max_sets;
        Ok(())
    }

    /// Destroys the pool and, with it, every set allocated from it.
    pub fn destroy_pool<D: GpuDevice + ?Sized>(&mut self, device: &D) {
        if self.pool == vk::DescriptorPool::null() {
            return;
        }
        device.destroy_descriptor_pool(self.pool);
        self.pool = vk::DescriptorPool::null();
        self.remaining.clear();
        self.remaining_sets = 0;
        debug!("Destroyed descriptor pool");
    }

    #[inline]
    pub fn pool(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn remaining_sets(&self) -> u32 {
        self.remaining_sets
    }

    /// Descriptors of type `ty` still available.
    pub fn remaining(&self, ty: vk::DescriptorType) -> u32 {
        self.remaining
            .iter()
            .find(|s| s.ty == ty)
            .map_or(0, |s| s.descriptor_count)
    }
}

/// Points a storage-image binding at `view`, in layout `GENERAL`.
pub fn write_storage_image<D: GpuDevice + ?Sized>(
    device: &D,
    set: vk::DescriptorSet,
    binding: u32,
    view: vk::ImageView,
) {
    device.write_image_descriptor(
        set,
        binding,
        vk::DescriptorType::STORAGE_IMAGE,
        view,
        vk::Sampler::null(),
        vk::ImageLayout::GENERAL,
    );
}
