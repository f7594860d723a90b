//! GPU buffers backed by gpu-allocator.
//!
//! Host-visible buffers (uniform, staging) stay persistently mapped for their
//! whole lifetime. Device-local buffers (vertex, index) are filled through a
//! staging buffer and the immediate command buffer; see
//! [`Buffer::device_local_with_data`].

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::command::CommandBufferSet;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer preset: usage flags plus memory location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    /// Per-frame shader uniforms, rewritten every frame from the CPU.
    Uniform,
    /// Upload source for device-local resources.
    Staging,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => MemoryLocation::GpuOnly,
            BufferUsage::Uniform | BufferUsage::Staging => MemoryLocation::CpuToGpu,
        }
    }

    #[inline]
    pub fn is_host_visible(self) -> bool {
        self.memory_location() != MemoryLocation::GpuOnly
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex buffer",
            BufferUsage::Index => "index buffer",
            BufferUsage::Uniform => "uniform buffer",
            BufferUsage::Staging => "staging buffer",
        }
    }
}

/// `VkBuffer` plus its allocation.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Create an uninitialized buffer of `size` bytes.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        Self::create(device, usage, size).map_err(RhiError::creating(usage.name()))
    }

    fn create(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::ResourceUnavailable {
                what: usage.name(),
                reason: "zero-sized buffer".into(),
            });
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .handle()
                .create_buffer(&buffer_info, device.callbacks())
                .map_err(RhiError::vk("vkCreateBuffer"))?
        };
        // Owns the handle from here on, so early returns release it.
        let mut this = Self {
            device,
            buffer,
            allocation: None,
            size,
            usage,
        };

        let requirements = unsafe {
            this.device
                .handle()
                .get_buffer_memory_requirements(buffer)
        };
        let allocation =
            this.device
                .allocator()
                .allocate(usage.name(), requirements, usage.memory_location(), true)?;

        let bound = unsafe {
            this.device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        this.allocation = Some(allocation);
        bound.map_err(RhiError::vk("vkBindBufferMemory"))?;

        debug!("Created {}: {} bytes", usage.name(), size);
        Ok(this)
    }

    /// Create a host-visible buffer initialized with `data`.
    pub fn with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write(0, data)?;
        Ok(buffer)
    }

    /// Create a device-local buffer and upload `data` through a staging
    /// buffer. Blocks until the copy has completed.
    pub fn device_local_with_data(
        device: Arc<Device>,
        commands: &mut CommandBufferSet,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let staging = Self::with_data(device.clone(), BufferUsage::Staging, data)?;
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        commands.immediately(|cmd| cmd.copy_buffer(staging.handle(), buffer.handle(), buffer.size))?;
        Ok(buffer)
    }

    /// Write `data` at `offset` into a mapped buffer.
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::ResourceUnavailable {
                what: self.usage.name(),
                reason: format!(
                    "write of {} bytes at offset {} exceeds size {}",
                    data.len(),
                    offset,
                    self.size
                ),
            });
        }

        let mapped = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| RhiError::ResourceUnavailable {
                what: self.usage.name(),
                reason: "memory is not host visible".into(),
            })?;

        // SAFETY: the range was bounds checked above and the mapping covers the
        // whole allocation.
        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    /// Write a plain-data value at offset zero.
    pub fn write_pod<T: bytemuck::Pod>(&self, value: &T) -> RhiResult<()> {
        self.write(0, bytemuck::bytes_of(value))
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_buffer(self.buffer, self.device.callbacks());
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.allocator().free(allocation);
        }
        debug!("Destroyed {}", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_flags() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn geometry_is_device_local_and_uniforms_are_mapped() {
        assert_eq!(BufferUsage::Vertex.memory_location(), MemoryLocation::GpuOnly);
        assert_eq!(BufferUsage::Index.memory_location(), MemoryLocation::GpuOnly);
        assert!(BufferUsage::Uniform.is_host_visible());
        assert!(BufferUsage::Staging.is_host_visible());
        assert!(!BufferUsage::Vertex.is_host_visible());
    }

    #[test]
    fn buffer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Buffer>();
    }
}
