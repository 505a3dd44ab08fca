//! Descriptor layouts, pools and set updates.
//!
//! Each frame slot owns one set with the same layout, so the pool is sized
//! from the layout bindings times the slot count.

use crate::error::{GpuError, Result};
use ash::vk;

/// Builder for a single descriptor set layout.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl<'a> DescriptorSetLayoutBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, binding: u32, ty: vk::DescriptorType, stages: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(stages),
        );
        self
    }

    /// Add a uniform buffer visible to `stages`.
    #[must_use]
    pub fn uniform_buffer(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.push(binding, vk::DescriptorType::UNIFORM_BUFFER, stages)
    }

    /// Add a storage image visible to `stages`.
    #[must_use]
    pub fn storage_image(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.push(binding, vk::DescriptorType::STORAGE_IMAGE, stages)
    }

    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'a>] {
        &self.bindings
    }

    /// Pool sizes for `set_count` sets of this layout, one entry per
    /// descriptor type.
    pub fn pool_sizes(&self, set_count: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for binding in &self.bindings {
            let count = binding.descriptor_count * set_count;
            if let Some(size) = sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
                size.descriptor_count += count;
            } else {
                sizes.push(vk::DescriptorPoolSize {
                    ty: binding.descriptor_type,
                    descriptor_count: count,
                });
            }
        }
        sizes
    }

    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(&self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);
        Ok(device.create_descriptor_set_layout(&info, None)?)
    }
}

/// Pool the frame slots draw their sets from.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a pool holding up to `max_sets` sets.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        Ok(Self {
            pool: device.create_descriptor_pool(&info, None)?,
        })
    }

    /// A pool owning nothing; destroying it is a no-op.
    pub const fn null() -> Self {
        Self {
            pool: vk::DescriptorPool::null(),
        }
    }

    /// Allocate one set with `layout`.
    ///
    /// # Safety
    /// The device and layout must be valid.
    pub unsafe fn allocate_one(
        &self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet> {
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        device
            .allocate_descriptor_sets(&info)?
            .first()
            .copied()
            .ok_or_else(|| GpuError::InvalidState("descriptor pool returned no set".to_string()))
    }

    /// Destroy the pool; its sets go with it.
    ///
    /// # Safety
    /// The device must be valid and no set may be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
    }
}

/// Batched writes to one descriptor set, applied in a single update.
#[derive(Default)]
pub struct DescriptorWrites {
    buffers: Vec<(u32, vk::DescriptorBufferInfo)>,
    images: Vec<(u32, vk::DescriptorImageInfo)>,
}

impl DescriptorWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the first `range` bytes of `buffer` as a uniform buffer.
    #[must_use]
    pub fn uniform_buffer(mut self, binding: u32, buffer: vk::Buffer, range: u64) -> Self {
        let info = vk::DescriptorBufferInfo::default()
            .buffer(buffer)
            .offset(0)
            .range(range);
        self.buffers.push((binding, info));
        self
    }

    /// Bind `view` as a storage image in `GENERAL` layout.
    #[must_use]
    pub fn storage_image(mut self, binding: u32, view: vk::ImageView) -> Self {
        let info = vk::DescriptorImageInfo::default()
            .image_view(view)
            .image_layout(vk::ImageLayout::GENERAL);
        self.images.push((binding, info));
        self
    }

    pub fn len(&self) -> usize {
        self.buffers.len() + self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write everything into `set`.
    ///
    /// # Safety
    /// The device, set and every referenced handle must be valid, and the
    /// set must not be in use by a pending command buffer.
    pub unsafe fn apply(&self, device: &ash::Device, set: vk::DescriptorSet) {
        let buffer_writes = self.buffers.iter().map(|(binding, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(*binding)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(std::slice::from_ref(info))
        });
        let image_writes = self.images.iter().map(|(binding, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(*binding)
                .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                .image_info(std::slice::from_ref(info))
        });
        let writes: Vec<vk::WriteDescriptorSet> = buffer_writes.chain(image_writes).collect();
        device.update_descriptor_sets(&writes, &[]);
    }
}
