//! Device-local images with a single view.
//!
//! Used for the depth buffer, the multisampled color target and sampled
//! textures. Memory comes from the device's [`GpuAllocator`](crate::allocator::GpuAllocator).

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::physical_device::has_stencil;

/// Parameters for [`Image::new`].
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub name: &'static str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub samples: vk::SampleCountFlags,
    pub mip_levels: u32,
}

impl ImageDesc {
    /// Depth (and stencil, if the format has one) attachment.
    pub fn depth(extent: vk::Extent2D, format: vk::Format, samples: vk::SampleCountFlags) -> Self {
        let mut aspect = vk::ImageAspectFlags::DEPTH;
        if has_stencil(format) {
            aspect |= vk::ImageAspectFlags::STENCIL;
        }
        Self {
            name: "depth buffer",
            extent,
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect,
            samples,
            mip_levels: 1,
        }
    }

    /// Transient multisampled color target resolved into the swapchain.
    pub fn msaa_color(
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> Self {
        Self {
            name: "msaa color target",
            extent,
            format,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            aspect: vk::ImageAspectFlags::COLOR,
            samples,
            mip_levels: 1,
        }
    }

    /// Sampled texture that is filled by transfers and blits.
    pub fn sampled(extent: vk::Extent2D, format: vk::Format, mip_levels: u32) -> Self {
        Self {
            name: "texture",
            extent,
            format,
            usage: vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC,
            aspect: vk::ImageAspectFlags::COLOR,
            samples: vk::SampleCountFlags::TYPE_1,
            mip_levels,
        }
    }
}

/// Number of mip levels for a full chain down to 1×1.
pub fn mip_levels_for(extent: vk::Extent2D) -> u32 {
    32 - extent.width.max(extent.height).max(1).leading_zeros()
}

/// 2D image, its memory and one view covering every mip level.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    desc: ImageDesc,
}

impl Image {
    pub fn new(device: Arc<Device>, desc: ImageDesc) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::ResourceUnavailable {
                what: desc.name,
                reason: "zero-sized extent".into(),
            });
        }
        Self::create(device, desc).map_err(RhiError::creating(desc.name))
    }

    fn create(device: Arc<Device>, desc: ImageDesc) -> RhiResult<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .samples(desc.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe {
            device
                .handle()
                .create_image(&image_info, device.callbacks())
                .map_err(RhiError::vk("vkCreateImage"))?
        };

        // From here on `this` owns the image, so early returns clean up.
        let mut this = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: None,
            desc,
        };

        let requirements = unsafe { this.device.handle().get_image_memory_requirements(image) };
        let allocation =
            this.device
                .allocator()
                .allocate(desc.name, requirements, MemoryLocation::GpuOnly, false)?;
        unsafe {
            this.device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(RhiError::vk("vkBindImageMemory"))?;
        }
        this.allocation = Some(allocation);

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(this.subresource_range());
        this.view = unsafe {
            this.device
                .handle()
                .create_image_view(&view_info, this.device.callbacks())
                .map_err(RhiError::vk("vkCreateImageView"))?
        };

        debug!(
            name = desc.name,
            "Created image {}x{} {:?} ({:?}, {} mips)",
            desc.extent.width,
            desc.extent.height,
            desc.format,
            desc.samples,
            desc.mip_levels
        );
        Ok(this)
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.desc.samples
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.desc.aspect
    }

    /// Range covering every mip level of the image's aspect.
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(self.desc.aspect)
            .base_mip_level(0)
            .level_count(self.desc.mip_levels)
            .base_array_layer(0)
            .layer_count(1)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device
                    .handle()
                    .destroy_image_view(self.view, self.device.callbacks());
            }
            self.device
                .handle()
                .destroy_image(self.image, self.device.callbacks());
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.allocator().free(allocation);
        }
        debug!(name = self.desc.name, "Destroyed image");
    }
}

/// Sampler with linear filtering and repeat addressing.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// `max_anisotropy` is ignored unless the device enabled anisotropic filtering.
    pub fn new(device: Arc<Device>, mip_levels: u32, max_anisotropy: f32) -> RhiResult<Self> {
        let anisotropy = device.enabled_features().sampler_anisotropy;
        let limit = device
            .capabilities()
            .properties
            .limits
            .max_sampler_anisotropy;

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy {
                max_anisotropy.min(limit)
            } else {
                1.0
            })
            .min_lod(0.0)
            .max_lod(mip_levels as f32)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK);

        let sampler = unsafe {
            device
                .handle()
                .create_sampler(&create_info, device.callbacks())
                .map_err(RhiError::vk("vkCreateSampler"))
                .map_err(RhiError::creating("sampler"))?
        };
        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_sampler(self.sampler, self.device.callbacks());
        }
    }
}
