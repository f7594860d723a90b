//! Sampled 2D textures uploaded from RGBA8 pixels.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandBufferSet};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc, Sampler, mip_levels_for};
use crate::physical_device::FormatSupport;

const MAX_ANISOTROPY: f32 = 16.0;

/// Image, view and sampler for one material map.
pub struct Texture {
    sampler: Sampler,
    image: Image,
}

impl Texture {
    /// Upload `pixels` (tightly packed RGBA8, row-major) and build the full
    /// mip chain.
    ///
    /// Mips are generated with linear blits; when the format cannot be
    /// blitted with linear filtering the texture has a single level.
    /// Blocks on the immediate command buffer.
    pub fn from_rgba8(
        device: Arc<Device>,
        commands: &mut CommandBufferSet,
        width: u32,
        height: u32,
        pixels: &[u8],
        srgb: bool,
    ) -> RhiResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RhiError::ResourceUnavailable {
                what: "texture",
                reason: format!(
                    "{}x{} RGBA8 needs {} bytes, got {}",
                    width,
                    height,
                    expected,
                    pixels.len()
                ),
            });
        }

        let format = if srgb {
            vk::Format::R8G8B8A8_SRGB
        } else {
            vk::Format::R8G8B8A8_UNORM
        };
        let extent = vk::Extent2D { width, height };

        let features = device.formats().optimal_tiling_features(format);
        let mip_levels = if features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR) {
            mip_levels_for(extent)
        } else {
            warn!(?format, "Linear blit unsupported, skipping mip generation");
            1
        };

        let staging = Buffer::with_data(device.clone(), BufferUsage::Staging, pixels)?;
        let image = Image::new(device.clone(), ImageDesc::sampled(extent, format, mip_levels))?;

        commands.immediately(|cmd| {
            let mut range = image.subresource_range();
            cmd.transition_image(
                image.handle(),
                range,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            cmd.copy_buffer_to_image(staging.handle(), image.handle(), extent);

            generate_mips(cmd, &image);

            // The last level was only ever written.
            range.base_mip_level = mip_levels - 1;
            range.level_count = 1;
            cmd.transition_image(
                image.handle(),
                range,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        })?;

        let sampler = Sampler::new(device, mip_levels, MAX_ANISOTROPY)?;
        debug!(width, height, mip_levels, ?format, "Texture uploaded");

        Ok(Self { sampler, image })
    }

    /// 1×1 texture of a constant color; stands in for missing material maps.
    pub fn solid(
        device: Arc<Device>,
        commands: &mut CommandBufferSet,
        rgba: [u8; 4],
        srgb: bool,
    ) -> RhiResult<Self> {
        Self::from_rgba8(device, commands, 1, 1, &rgba, srgb)
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo::default()
            .sampler(self.sampler())
            .image_view(self.view())
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }
}

/// Blit each level from the one above it. Every level except the last ends in
/// `SHADER_READ_ONLY_OPTIMAL`; the last stays in `TRANSFER_DST_OPTIMAL`.
fn generate_mips(cmd: &CommandBuffer, image: &Image) {
    let mut range = image.subresource_range();
    range.level_count = 1;

    for level in 1..image.mip_levels() {
        range.base_mip_level = level - 1;
        cmd.transition_image(
            image.handle(),
            range,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        cmd.blit_image(image.handle(), &mip_blit(image.extent(), level));
        cmd.transition_image(
            image.handle(),
            range,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    }
}

/// Extent of mip `level`, never smaller than 1×1.
pub fn mip_extent(base: vk::Extent2D, level: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: (base.width >> level).max(1),
        height: (base.height >> level).max(1),
    }
}

/// Blit region from `level - 1` to `level`.
fn mip_blit(base: vk::Extent2D, level: u32) -> vk::ImageBlit {
    let corner = |extent: vk::Extent2D| vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    };
    let layers = |mip_level| {
        vk::ImageSubresourceLayers::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .mip_level(mip_level)
            .layer_count(1)
    };

    vk::ImageBlit::default()
        .src_offsets([vk::Offset3D::default(), corner(mip_extent(base, level - 1))])
        .src_subresource(layers(level - 1))
        .dst_offsets([vk::Offset3D::default(), corner(mip_extent(base, level))])
        .dst_subresource(layers(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_extents_halve_and_saturate() {
        let base = vk::Extent2D {
            width: 256,
            height: 64,
        };
        assert_eq!(mip_extent(base, 0), base);
        assert_eq!(
            mip_extent(base, 3),
            vk::Extent2D {
                width: 32,
                height: 8
            }
        );
        assert_eq!(
            mip_extent(base, 8),
            vk::Extent2D {
                width: 1,
                height: 1
            }
        );
        assert_eq!(mip_levels_for(base), 9);
    }

    #[test]
    fn blit_reads_previous_level() {
        let base = vk::Extent2D {
            width: 16,
            height: 16,
        };
        let blit = mip_blit(base, 2);
        assert_eq!(blit.src_subresource.mip_level, 1);
        assert_eq!(blit.dst_subresource.mip_level, 2);
        assert_eq!(blit.src_offsets[1].x, 8);
        assert_eq!(blit.dst_offsets[1].x, 4);
        assert_eq!(blit.dst_offsets[1].z, 1);
    }
}
