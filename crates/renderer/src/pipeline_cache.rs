//! Descriptor layouts, descriptor sets and material pipelines.
//!
//! Layout shared by every mesh pipeline:
//!
//! | Set | Binding | Contents                                  | Stages            |
//! |-----|---------|-------------------------------------------|-------------------|
//! | 0   | 0       | [`FrameUbo`](crate::ubo::FrameUbo)        | vertex, fragment  |
//! | 1   | 0..5    | base color, metallic-roughness, normal, occlusion, emissive | fragment |
//!
//! plus one push-constant range holding [`DrawConstants`].
//!
//! Set 0 exists once per frame slot. Pipelines are created on first use for
//! each [`PipelineKey`] and live until [`invalidate_pipelines`] or drop.
//!
//! [`invalidate_pipelines`]: DescriptorAndPipelineCache::invalidate_pipelines

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use vkpbr_resources::AlphaMode;
use vkpbr_rhi::buffer::Buffer;
use vkpbr_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, binding, pool_size, write_combined_image_samplers,
    write_uniform_buffer,
};
use vkpbr_rhi::device::Device;
use vkpbr_rhi::pipeline::{BlendMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use vkpbr_rhi::shader::{Shader, ShaderStage};
use vkpbr_rhi::vertex::Vertex;
use vkpbr_rhi::{RhiError, RhiResult, vk};

use crate::frame::FrameSlotIndex;
use crate::ubo::{DrawConstants, FrameUbo};

/// Number of texture bindings in the material set.
pub const MATERIAL_TEXTURES: usize = 5;

/// Fraction of samples shaded individually when sample shading is enabled.
const MIN_SAMPLE_SHADING: f32 = 0.25;

/// What distinguishes one material pipeline from another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineKey {
    pub alpha_mode: AlphaMode,
    pub double_sided: bool,
}

impl PipelineKey {
    fn cull_mode(self) -> vk::CullModeFlags {
        if self.double_sided {
            vk::CullModeFlags::NONE
        } else {
            vk::CullModeFlags::BACK
        }
    }

    fn blend(self) -> BlendMode {
        match self.alpha_mode {
            AlphaMode::Blend => BlendMode::AlphaBlend,
            AlphaMode::Opaque | AlphaMode::Mask => BlendMode::Opaque,
        }
    }

    /// Blended surfaces test against depth but do not occlude each other.
    fn depth_write(self) -> bool {
        self.alpha_mode != AlphaMode::Blend
    }
}

/// Attachment formats and sample count every pipeline renders with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTargetFormats {
    pub color: vk::Format,
    pub depth: vk::Format,
    pub samples: vk::SampleCountFlags,
}

/// SPIR-V locations of the mesh shaders.
#[derive(Clone, Copy, Debug)]
pub struct ShaderPaths<'a> {
    pub vertex: &'a Path,
    pub fragment: &'a Path,
}

pub struct DescriptorAndPipelineCache {
    pipelines: HashMap<PipelineKey, Pipeline>,
    pipeline_layout: PipelineLayout,
    frame_sets: Vec<vk::DescriptorSet>,
    pool: DescriptorPool,
    material_layout: DescriptorSetLayout,
    frame_layout: DescriptorSetLayout,
    vertex_shader: Shader,
    fragment_shader: Shader,
    targets: RenderTargetFormats,
    sample_shading: bool,
    device: Arc<Device>,
}

impl DescriptorAndPipelineCache {
    /// Create layouts and a pool sized for `frame_slots` per-frame sets and
    /// `material_count` material sets.
    pub fn new(
        device: Arc<Device>,
        shaders: ShaderPaths<'_>,
        targets: RenderTargetFormats,
        frame_slots: u32,
        material_count: u32,
    ) -> RhiResult<Self> {
        let vertex_shader =
            Shader::from_spirv_file(device.clone(), shaders.vertex, ShaderStage::Vertex)?;
        let fragment_shader =
            Shader::from_spirv_file(device.clone(), shaders.fragment, ShaderStage::Fragment)?;

        let frame_layout = DescriptorSetLayout::new(
            device.clone(),
            &[binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )],
        )?;
        let material_bindings: Vec<_> = (0..MATERIAL_TEXTURES as u32)
            .map(|b| {
                binding(
                    b,
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    vk::ShaderStageFlags::FRAGMENT,
                )
            })
            .collect();
        let material_layout = DescriptorSetLayout::new(device.clone(), &material_bindings)?;

        let pool = DescriptorPool::new(
            device.clone(),
            frame_slots + material_count,
            &pool_sizes(frame_slots, material_count),
        )?;
        let frame_sets = pool.allocate(&vec![frame_layout.handle(); frame_slots as usize])?;

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(DrawConstants::SIZE);
        let pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[frame_layout.handle(), material_layout.handle()],
            &[push_range],
        )?;

        let sample_shading = device.enabled_features().sample_rate_shading;
        info!(
            "Descriptor cache ready: {} frame set(s), room for {} material set(s)",
            frame_slots, material_count
        );

        Ok(Self {
            pipelines: HashMap::new(),
            pipeline_layout,
            frame_sets,
            pool,
            material_layout,
            frame_layout,
            vertex_shader,
            fragment_shader,
            targets,
            sample_shading,
            device,
        })
    }

    /// Point the frame set of `slot` at `buffer`.
    pub fn bind_frame_uniforms(&self, slot: FrameSlotIndex, buffer: &Buffer) -> RhiResult<()> {
        let set = self.frame_set(slot)?;
        write_uniform_buffer(
            &self.device,
            set,
            0,
            buffer.handle(),
            FrameUbo::SIZE as vk::DeviceSize,
        );
        Ok(())
    }

    pub fn frame_set(&self, slot: FrameSlotIndex) -> RhiResult<vk::DescriptorSet> {
        self.frame_sets
            .get(slot.as_usize())
            .copied()
            .ok_or_else(|| RhiError::ResourceUnavailable {
                what: "frame descriptor set",
                reason: format!("{slot} out of {}", self.frame_sets.len()),
            })
    }

    /// Allocate and fill one material set.
    pub fn allocate_material_set(
        &self,
        textures: &[vk::DescriptorImageInfo; MATERIAL_TEXTURES],
    ) -> RhiResult<vk::DescriptorSet> {
        let set = self
            .pool
            .allocate(&[self.material_layout.handle()])?
            .pop()
            .ok_or_else(|| RhiError::ResourceUnavailable {
                what: "material descriptor set",
                reason: format!("pool of {} sets exhausted", self.pool.max_sets()),
            })?;
        write_combined_image_samplers(&self.device, set, textures);
        Ok(set)
    }

    /// Pipeline for `key`, created on first request.
    pub fn pipeline(&mut self, key: PipelineKey) -> RhiResult<vk::Pipeline> {
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline.handle());
        }

        let mut builder = GraphicsPipelineBuilder::new()
            .shaders(&self.vertex_shader, &self.fragment_shader)
            .vertex_input(
                Vertex::binding_description(),
                &Vertex::attribute_descriptions(),
            )
            .cull_mode(key.cull_mode())
            .blend(key.blend())
            .depth_write(key.depth_write())
            .samples(self.targets.samples)
            .color_format(self.targets.color)
            .depth_format(self.targets.depth);
        if self.sample_shading && self.targets.samples != vk::SampleCountFlags::TYPE_1 {
            builder = builder.sample_shading(MIN_SAMPLE_SHADING);
        }

        let pipeline = builder.build(self.device.clone(), &self.pipeline_layout)?;
        debug!(?key, "Created material pipeline");
        let handle = pipeline.handle();
        self.pipelines.insert(key, pipeline);
        Ok(handle)
    }

    /// Drop every pipeline; they are rebuilt lazily.
    pub fn invalidate_pipelines(&mut self) {
        if !self.pipelines.is_empty() {
            debug!("Invalidating {} pipeline(s)", self.pipelines.len());
        }
        self.pipelines.clear();
    }

    /// Switch attachment formats, invalidating pipelines if they changed.
    /// The caller guarantees no submitted work uses the old pipelines.
    pub fn set_targets(&mut self, targets: RenderTargetFormats) {
        if targets != self.targets {
            info!(?targets, "Render target formats changed");
            self.targets = targets;
            self.invalidate_pipelines();
        }
    }

    #[inline]
    pub fn targets(&self) -> RenderTargetFormats {
        self.targets
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout.handle()
    }

    #[inline]
    pub fn frame_layout(&self) -> vk::DescriptorSetLayout {
        self.frame_layout.handle()
    }
}

fn pool_sizes(frame_slots: u32, material_count: u32) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes = vec![pool_size(vk::DescriptorType::UNIFORM_BUFFER, frame_slots, 1)];
    if material_count > 0 {
        sizes.push(pool_size(
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            material_count,
            MATERIAL_TEXTURES as u32,
        ));
    }
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(alpha_mode: AlphaMode, double_sided: bool) -> PipelineKey {
        PipelineKey {
            alpha_mode,
            double_sided,
        }
    }

    #[test]
    fn double_sided_disables_culling() {
        assert_eq!(key(AlphaMode::Opaque, true).cull_mode(), vk::CullModeFlags::NONE);
        assert_eq!(key(AlphaMode::Opaque, false).cull_mode(), vk::CullModeFlags::BACK);
    }

    #[test]
    fn only_blend_enables_blending_and_skips_depth_write() {
        for mode in [AlphaMode::Opaque, AlphaMode::Mask] {
            assert_eq!(key(mode, false).blend(), BlendMode::Opaque);
            assert!(key(mode, false).depth_write());
        }
        assert_eq!(key(AlphaMode::Blend, false).blend(), BlendMode::AlphaBlend);
        assert!(!key(AlphaMode::Blend, false).depth_write());
    }

    #[test]
    fn keys_order_by_draw_pass() {
        let mut keys = vec![
            key(AlphaMode::Blend, false),
            key(AlphaMode::Opaque, true),
            key(AlphaMode::Mask, false),
            key(AlphaMode::Opaque, false),
        ];
        keys.sort();
        let modes: Vec<_> = keys.iter().map(|k| k.alpha_mode).collect();
        assert_eq!(
            modes,
            [AlphaMode::Opaque, AlphaMode::Opaque, AlphaMode::Mask, AlphaMode::Blend]
        );
    }

    #[test]
    fn pool_sizes_cover_every_set() {
        let sizes = pool_sizes(2, 3);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 2);
        assert_eq!(sizes[1].descriptor_count, 15);
    }

    #[test]
    fn no_sampler_pool_without_materials() {
        assert_eq!(pool_sizes(2, 0).len(), 1);
    }
}
