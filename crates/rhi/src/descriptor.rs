//! Descriptor set layouts, pools and set updates.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Owned `VkDescriptorSetLayout`.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub fn new(device: Arc<Device>, bindings: &[vk::DescriptorSetLayoutBinding]) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, device.callbacks())
                .map_err(RhiError::vk("vkCreateDescriptorSetLayout"))?
        };
        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, self.device.callbacks());
        }
    }
}

/// Owned `VkDescriptorPool`. Sets allocated from it are released with it.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe {
            device
                .handle()
                .create_descriptor_pool(&create_info, device.callbacks())
                .map_err(RhiError::vk("vkCreateDescriptorPool"))?
        };
        debug!(max_sets, "Created descriptor pool");

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Allocate one set per entry of `layouts`.
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        unsafe {
            self.device
                .handle()
                .allocate_descriptor_sets(&alloc_info)
                .map_err(RhiError::vk("vkAllocateDescriptorSets"))
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, self.device.callbacks());
        }
    }
}

/// Layout binding of `count` descriptors of `ty`, visible to `stages`.
pub fn binding(
    binding: u32,
    ty: vk::DescriptorType,
    stages: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(ty)
        .descriptor_count(1)
        .stage_flags(stages)
}

/// Pool sizes for `sets` sets, each holding `per_set` descriptors of `ty`.
pub fn pool_size(ty: vk::DescriptorType, sets: u32, per_set: u32) -> vk::DescriptorPoolSize {
    vk::DescriptorPoolSize::default()
        .ty(ty)
        .descriptor_count(sets * per_set)
}

/// Write a uniform buffer at `binding` of `set`.
pub fn write_uniform_buffer(
    device: &Device,
    set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    range: vk::DeviceSize,
) {
    let info = [vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(0)
        .range(range)];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(&info);
    unsafe { device.handle().update_descriptor_sets(&[write], &[]) };
}

/// Write consecutive combined image samplers starting at binding 0 of `set`.
pub fn write_combined_image_samplers(
    device: &Device,
    set: vk::DescriptorSet,
    images: &[vk::DescriptorImageInfo],
) {
    let writes: Vec<vk::WriteDescriptorSet> = images
        .iter()
        .enumerate()
        .map(|(binding, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(binding as u32)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(std::slice::from_ref(info))
        })
        .collect();
    unsafe { device.handle().update_descriptor_sets(&writes, &[]) };
}
