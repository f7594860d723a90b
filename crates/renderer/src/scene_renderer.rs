//! glTF scene drawing: the [`SceneRecorder`] the frame loop calls into.
//!
//! Geometry of every mesh is packed into one vertex and one index buffer.
//! Each material gets a descriptor set with five textures, falling back to
//! 1×1 textures for maps the material does not provide. Per-frame uniforms
//! live in one host-visible buffer per frame slot, so writing slot `i` never
//! touches memory a pending submission of another slot may read.
//!
//! Draws are issued opaque, then alpha-masked, then alpha-blended, each
//! group in declaration order. Blended meshes are not depth sorted.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};
use vkpbr_resources::{Material, Model, TextureRef};
use vkpbr_rhi::buffer::{Buffer, BufferUsage};
use vkpbr_rhi::command::{CommandBuffer, CommandBufferSet};
use vkpbr_rhi::device::Device;
use vkpbr_rhi::image::{Image, ImageDesc};
use vkpbr_rhi::physical_device::has_stencil;
use vkpbr_rhi::rendering::{ColorTarget, DepthTarget, RenderTargets};
use vkpbr_rhi::swapchain::{SwapImageIndex, Swapchain};
use vkpbr_rhi::texture::Texture;
use vkpbr_rhi::vertex::Vertex;
use vkpbr_rhi::{RhiError, RhiResult, vk};
use vkpbr_scene::SceneView;

use crate::frame::{FrameSlotIndex, SceneRecorder};
use crate::pipeline_cache::{
    DescriptorAndPipelineCache, MATERIAL_TEXTURES, PipelineKey, RenderTargetFormats, ShaderPaths,
};
use crate::ubo::{DrawConstants, FrameUbo};
use crate::vulkan_backend::VulkanBackend;

const CLEAR_COLOR: [f32; 4] = [0.02, 0.02, 0.03, 1.0];

const WHITE: [u8; 4] = [255, 255, 255, 255];
/// Tangent-space +Z.
const FLAT_NORMAL: [u8; 4] = [128, 128, 255, 255];

const PUSH_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw());

/// Range of the shared index buffer drawn with one material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct DrawItem {
    first_index: u32,
    index_count: u32,
    vertex_offset: i32,
    material: usize,
}

struct GpuMaterial {
    key: PipelineKey,
    descriptor_set: vk::DescriptorSet,
    material: Material,
}

struct Geometry {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
}

/// CPU-side packing of a model's meshes.
#[derive(Debug, Default)]
struct PackedGeometry {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    draws: Vec<DrawItem>,
}

impl PackedGeometry {
    fn pack(model: &Model) -> Self {
        let mut packed = Self::default();
        for mesh in &model.meshes {
            let first_index = packed.indices.len() as u32;
            let vertex_offset = packed.vertices.len() as i32;
            packed.vertices.extend(
                (0..mesh.vertex_count()).map(|i| {
                    Vertex::new(mesh.positions[i], mesh.normals[i], mesh.tex_coords[i], mesh.tangents[i])
                }),
            );
            packed.indices.extend_from_slice(&mesh.indices);
            packed.draws.push(DrawItem {
                first_index,
                index_count: mesh.indices.len() as u32,
                vertex_offset,
                material: mesh.material,
            });
        }
        packed
    }
}

/// Opaque, then mask, then blend; declaration order within each group.
fn draw_order(draws: &[DrawItem], keys: &[PipelineKey]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..draws.len()).collect();
    order.sort_by_key(|&i| keys[draws[i].material].alpha_mode);
    order
}

/// Textures uploaded for a model, deduplicated per (image, color space).
struct TextureSet {
    textures: Vec<Texture>,
    by_image: HashMap<(usize, bool), usize>,
    white_srgb: usize,
    white_linear: usize,
    flat_normal: usize,
}

impl TextureSet {
    fn new(device: &Arc<Device>, commands: &mut CommandBufferSet) -> RhiResult<Self> {
        let textures = vec![
            Texture::solid(device.clone(), commands, WHITE, true)?,
            Texture::solid(device.clone(), commands, WHITE, false)?,
            Texture::solid(device.clone(), commands, FLAT_NORMAL, false)?,
        ];
        Ok(Self {
            textures,
            by_image: HashMap::new(),
            white_srgb: 0,
            white_linear: 1,
            flat_normal: 2,
        })
    }

    /// Texture index for `reference`, or `fallback` when absent.
    fn resolve(
        &mut self,
        device: &Arc<Device>,
        commands: &mut CommandBufferSet,
        model: &Model,
        reference: Option<TextureRef>,
        srgb: bool,
        fallback: usize,
    ) -> RhiResult<usize> {
        let Some(reference) = reference else {
            return Ok(fallback);
        };
        if let Some(&index) = self.by_image.get(&(reference.image, srgb)) {
            return Ok(index);
        }
        let Some(image) = model.images.get(reference.image) else {
            return Err(RhiError::ResourceUnavailable {
                what: "material texture",
                reason: format!("image {} not in model", reference.image),
            });
        };

        let texture = Texture::from_rgba8(
            device.clone(),
            commands,
            image.width,
            image.height,
            &image.pixels,
            srgb,
        )?;
        self.textures.push(texture);
        let index = self.textures.len() - 1;
        self.by_image.insert((reference.image, srgb), index);
        Ok(index)
    }

    fn info(&self, index: usize) -> vk::DescriptorImageInfo {
        self.textures[index].descriptor_info()
    }
}

/// Draws one glTF model with a camera and a directional light.
pub struct SceneRenderer {
    view: SceneView,
    extent: vk::Extent2D,
    order: Vec<usize>,
    draws: Vec<DrawItem>,
    materials: Vec<GpuMaterial>,
    geometry: Option<Geometry>,
    frame_uniforms: Vec<Buffer>,
    msaa_target: Option<Image>,
    textures: TextureSet,
    cache: DescriptorAndPipelineCache,
    samples: vk::SampleCountFlags,
    device: Arc<Device>,
}

impl SceneRenderer {
    /// Upload `model` and create per-slot uniforms for `frame_slots` slots.
    pub fn new(
        device: Arc<Device>,
        commands: &mut CommandBufferSet,
        swapchain: &Swapchain,
        model: Option<&Model>,
        frame_slots: u32,
        samples: vk::SampleCountFlags,
        shaders: ShaderPaths<'_>,
    ) -> RhiResult<Self> {
        let material_count = model.map_or(0, |m| m.materials.len() as u32);
        let targets = RenderTargetFormats {
            color: swapchain.format(),
            depth: swapchain.info().depth_format,
            samples,
        };
        let cache =
            DescriptorAndPipelineCache::new(device.clone(), shaders, targets, frame_slots, material_count)?;

        let frame_uniforms = (0..frame_slots)
            .map(|slot| {
                let buffer = Buffer::new(
                    device.clone(),
                    BufferUsage::Uniform,
                    FrameUbo::SIZE as vk::DeviceSize,
                )?;
                cache.bind_frame_uniforms(FrameSlotIndex::new(slot), &buffer)?;
                Ok(buffer)
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let mut textures = TextureSet::new(&device, commands)?;
        let mut materials = Vec::new();
        let mut geometry = None;
        let mut draws = Vec::new();

        if let Some(model) = model {
            for material in &model.materials {
                materials.push(upload_material(
                    &device,
                    commands,
                    &cache,
                    &mut textures,
                    model,
                    material,
                )?);
            }

            let packed = PackedGeometry::pack(model);
            if !packed.indices.is_empty() {
                geometry = Some(Geometry {
                    vertex_buffer: Buffer::device_local_with_data(
                        device.clone(),
                        commands,
                        BufferUsage::Vertex,
                        bytemuck::cast_slice(&packed.vertices),
                    )?,
                    index_buffer: Buffer::device_local_with_data(
                        device.clone(),
                        commands,
                        BufferUsage::Index,
                        bytemuck::cast_slice(&packed.indices),
                    )?,
                });
            }
            draws = packed.draws;
            info!(
                "Scene uploaded: {} vertices, {} draws, {} materials, {} textures",
                packed.vertices.len(),
                draws.len(),
                materials.len(),
                textures.textures.len()
            );
        }

        let keys: Vec<PipelineKey> = materials.iter().map(|m| m.key).collect();
        let order = draw_order(&draws, &keys);

        let extent = swapchain.extent();
        let msaa_target = create_msaa_target(&device, extent, swapchain.format(), samples)?;

        Ok(Self {
            view: SceneView::default(),
            extent,
            order,
            draws,
            materials,
            geometry,
            frame_uniforms,
            msaa_target,
            textures,
            cache,
            samples,
            device,
        })
    }

    /// Scene state used by the next recorded frame.
    pub fn set_view(&mut self, view: &SceneView) {
        self.view.clone_from(view);
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    fn write_frame_uniforms(&self, slot: FrameSlotIndex) -> RhiResult<()> {
        let mut camera = self.view.camera.clone();
        camera.set_viewport(self.extent.width, self.extent.height);
        let ubo = FrameUbo::new(&camera, &self.view.light);

        let buffer = self
            .frame_uniforms
            .get(slot.as_usize())
            .ok_or_else(|| RhiError::ResourceUnavailable {
                what: "frame uniform buffer",
                reason: format!("{slot} out of {}", self.frame_uniforms.len()),
            })?;
        buffer.write_pod(&ubo)
    }

    fn draw_meshes(&mut self, cmd: &CommandBuffer, slot: FrameSlotIndex) -> RhiResult<()> {
        let Some(geometry) = &self.geometry else {
            return Ok(());
        };
        let layout = self.cache.layout();

        cmd.bind_descriptor_sets(layout, 0, &[self.cache.frame_set(slot)?]);
        cmd.bind_vertex_buffer(geometry.vertex_buffer.handle());
        cmd.bind_index_buffer(geometry.index_buffer.handle(), vk::IndexType::UINT32);

        let mut bound_pipeline = vk::Pipeline::null();
        let mut bound_material = None;
        for &index in &self.order {
            let draw = self.draws[index];
            let material = &self.materials[draw.material];

            let pipeline = self.cache.pipeline(material.key)?;
            if pipeline != bound_pipeline {
                cmd.bind_graphics_pipeline(pipeline);
                bound_pipeline = pipeline;
            }
            if bound_material != Some(draw.material) {
                cmd.bind_descriptor_sets(layout, 1, &[material.descriptor_set]);
                bound_material = Some(draw.material);
            }

            let constants = DrawConstants::new(self.view.model_transform, &material.material);
            cmd.push_constants(layout, PUSH_STAGES, &constants);
            cmd.draw_indexed(draw.index_count, draw.first_index, draw.vertex_offset);
        }
        Ok(())
    }
}

impl SceneRecorder<VulkanBackend> for SceneRenderer {
    fn record_into(
        &mut self,
        backend: &VulkanBackend,
        cmd: &CommandBuffer,
        image: SwapImageIndex,
        slot: FrameSlotIndex,
    ) -> RhiResult<()> {
        // The slot's fence has signaled, so its uniform buffer is free.
        self.write_frame_uniforms(slot)?;

        let swapchain = backend.swapchain();
        let (Some(swap_image), Some(swap_view)) = (swapchain.image(image), swapchain.image_view(image))
        else {
            return Err(RhiError::ResourceUnavailable {
                what: "swapchain image",
                reason: format!("{image} out of {}", swapchain.image_count()),
            });
        };
        let color_range = color_subresource_range();

        cmd.discard_into_layout(swap_image, color_range, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        if let Some(msaa) = &self.msaa_target {
            cmd.discard_into_layout(
                msaa.handle(),
                msaa.subresource_range(),
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            );
        }
        if let Some(depth) = swapchain.depth() {
            cmd.discard_into_layout(
                depth.handle(),
                depth.subresource_range(),
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            );
        }

        let color = match &self.msaa_target {
            Some(msaa) => ColorTarget {
                view: msaa.view(),
                resolve: Some(swap_view),
            },
            None => ColorTarget {
                view: swap_view,
                resolve: None,
            },
        };
        let targets = RenderTargets {
            extent: self.extent,
            color,
            depth: swapchain.depth().map(|depth| DepthTarget {
                view: depth.view(),
                has_stencil: has_stencil(depth.format()),
            }),
            clear_color: CLEAR_COLOR,
        }
        .build();

        cmd.begin_rendering(&targets.info());
        cmd.set_viewport_and_scissor(self.extent);
        self.draw_meshes(cmd, slot)?;
        cmd.end_rendering();

        cmd.transition_image(
            swap_image,
            color_range,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        Ok(())
    }

    fn on_resize(&mut self, backend: &VulkanBackend, extent: vk::Extent2D) -> RhiResult<()> {
        let swapchain = backend.swapchain();
        self.cache.set_targets(RenderTargetFormats {
            color: swapchain.format(),
            depth: swapchain.info().depth_format,
            samples: self.samples,
        });

        // Old target is unused: the device was idled before recreation.
        self.msaa_target = None;
        self.msaa_target = create_msaa_target(&self.device, extent, swapchain.format(), self.samples)?;
        self.extent = extent;
        debug!("Scene targets rebuilt for {}x{}", extent.width, extent.height);
        Ok(())
    }
}

fn upload_material(
    device: &Arc<Device>,
    commands: &mut CommandBufferSet,
    cache: &DescriptorAndPipelineCache,
    textures: &mut TextureSet,
    model: &Model,
    material: &Material,
) -> RhiResult<GpuMaterial> {
    let white_srgb = textures.white_srgb;
    let white_linear = textures.white_linear;
    let flat_normal = textures.flat_normal;

    // Binding order matches the material set layout.
    let slots = [
        (material.base_color_texture, true, white_srgb),
        (material.metallic_roughness_texture, false, white_linear),
        (material.normal_texture, false, flat_normal),
        (material.occlusion_texture, false, white_linear),
        (material.emissive_texture, true, white_srgb),
    ];
    let mut infos = [vk::DescriptorImageInfo::default(); MATERIAL_TEXTURES];
    for (info, (reference, srgb, fallback)) in infos.iter_mut().zip(slots) {
        let index = textures.resolve(device, commands, model, reference, srgb, fallback)?;
        *info = textures.info(index);
    }

    Ok(GpuMaterial {
        key: PipelineKey {
            alpha_mode: material.alpha_mode,
            double_sided: material.double_sided,
        },
        descriptor_set: cache.allocate_material_set(&infos)?,
        material: material.clone(),
    })
}

fn create_msaa_target(
    device: &Arc<Device>,
    extent: vk::Extent2D,
    format: vk::Format,
    samples: vk::SampleCountFlags,
) -> RhiResult<Option<Image>> {
    if samples == vk::SampleCountFlags::TYPE_1 {
        return Ok(None);
    }
    Image::new(device.clone(), ImageDesc::msaa_color(extent, format, samples)).map(Some)
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3, Vec4};
    use vkpbr_resources::{AlphaMode, Mesh};

    fn triangle(material: usize) -> Mesh {
        Mesh {
            name: None,
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![Vec3::Z; 3],
            tex_coords: vec![Vec2::ZERO; 3],
            tangents: vec![Vec4::X; 3],
            indices: vec![0, 1, 2],
            material,
        }
    }

    fn key(alpha_mode: AlphaMode) -> PipelineKey {
        PipelineKey {
            alpha_mode,
            double_sided: false,
        }
    }

    #[test]
    fn packing_offsets_each_mesh() {
        let model = Model {
            meshes: vec![triangle(0), triangle(1)],
            ..Model::default()
        };
        let packed = PackedGeometry::pack(&model);
        assert_eq!(packed.vertices.len(), 6);
        assert_eq!(packed.indices, [0, 1, 2, 0, 1, 2]);
        assert_eq!(
            packed.draws[1],
            DrawItem {
                first_index: 3,
                index_count: 3,
                vertex_offset: 3,
                material: 1,
            }
        );
    }

    #[test]
    fn draw_order_groups_by_alpha_mode_and_keeps_declaration_order() {
        let keys = [key(AlphaMode::Blend), key(AlphaMode::Opaque), key(AlphaMode::Mask)];
        let draws: Vec<DrawItem> = [0, 1, 0, 2, 1]
            .into_iter()
            .map(|material| DrawItem {
                first_index: 0,
                index_count: 3,
                vertex_offset: 0,
                material,
            })
            .collect();
        // Blend draws 0 and 2 stay in declaration order after the others.
        assert_eq!(draw_order(&draws, &keys), [1, 4, 3, 0, 2]);
    }

    #[test]
    fn push_stages_cover_both_shaders() {
        assert_eq!(
            PUSH_STAGES,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn color_range_is_single_level() {
        let range = color_subresource_range();
        assert_eq!(range.level_count, 1);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
    }
}
