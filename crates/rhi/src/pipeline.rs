//! Pipeline layouts and graphics pipelines for dynamic rendering.
//!
//! [`GraphicsPipelineBuilder`] starts from the state every mesh pipeline
//! shares (triangle lists, dynamic viewport and scissor, depth test `LESS`)
//! and exposes the knobs that vary per material: culling, blending, depth
//! writes and multisampling.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::physical_device::has_stencil;
use crate::shader::Shader;

/// Owned `VkPipelineLayout`.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe {
            device
                .handle()
                .create_pipeline_layout(&create_info, device.callbacks())
                .map_err(RhiError::vk("vkCreatePipelineLayout"))?
        };
        debug!(
            "Created pipeline layout with {} set layout(s), {} push constant range(s)",
            set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, self.device.callbacks());
        }
    }
}

/// Owned graphics `VkPipeline`.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline(self.pipeline, self.device.callbacks());
        }
        debug!("Graphics pipeline destroyed");
    }
}

/// Color blending applied to the single color attachment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    Opaque,
    /// `src * src_alpha + dst * (1 - src_alpha)`
    AlphaBlend,
}

impl BlendMode {
    pub fn to_vk(self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        match self {
            BlendMode::Opaque => state.blend_enable(false),
            BlendMode::AlphaBlend => state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .alpha_blend_op(vk::BlendOp::ADD),
        }
    }
}

/// Builder for mesh pipelines rendered with `vkCmdBeginRendering`.
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    samples: vk::SampleCountFlags,
    min_sample_shading: Option<f32>,
    depth_write: bool,
    blend: BlendMode,
    color_format: Option<vk::Format>,
    depth_format: Option<vk::Format>,
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            samples: vk::SampleCountFlags::TYPE_1,
            min_sample_shading: None,
            depth_write: true,
            blend: BlendMode::Opaque,
            color_format: None,
            depth_format: None,
        }
    }
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shaders(mut self, vertex: &'a Shader, fragment: &'a Shader) -> Self {
        self.vertex_shader = Some(vertex);
        self.fragment_shader = Some(fragment);
        self
    }

    pub fn vertex_input(
        mut self,
        binding: vk::VertexInputBindingDescription,
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.vertex_bindings = vec![binding];
        self.vertex_attributes = attributes.to_vec();
        self
    }

    pub fn cull_mode(mut self, mode: vk::CullModeFlags) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    /// Enable per-sample shading. Requires the `sampleRateShading` feature.
    pub fn sample_shading(mut self, min_fraction: f32) -> Self {
        self.min_sample_shading = Some(min_fraction);
        self
    }

    pub fn depth_write(mut self, enable: bool) -> Self {
        self.depth_write = enable;
        self
    }

    pub fn blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn color_format(mut self, format: vk::Format) -> Self {
        self.color_format = Some(format);
        self
    }

    pub fn depth_format(mut self, format: vk::Format) -> Self {
        self.depth_format = Some(format);
        self
    }

    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let (Some(vertex_shader), Some(fragment_shader)) = (self.vertex_shader, self.fragment_shader)
        else {
            return Err(RhiError::Shader(
                "pipeline needs a vertex and a fragment shader".into(),
            ));
        };
        let color_format = self.color_format.ok_or(RhiError::ResourceUnavailable {
            what: "graphics pipeline",
            reason: "no color attachment format".into(),
        })?;

        let stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(self.samples)
            .sample_shading_enable(self.min_sample_shading.is_some())
            .min_sample_shading(self.min_sample_shading.unwrap_or(1.0));

        let has_depth = self.depth_format.is_some();
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth)
            .depth_write_enable(has_depth && self.depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
            .max_depth_bounds(1.0);

        let attachments = [self.blend.to_vk()];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats = [color_format];
        let mut rendering = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats);
        if let Some(depth_format) = self.depth_format {
            rendering = rendering.depth_attachment_format(depth_format);
            if has_stencil(depth_format) {
                rendering = rendering.stencil_attachment_format(depth_format);
            }
        }

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .push_next(&mut rendering);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(
                    vk::PipelineCache::null(),
                    std::slice::from_ref(&create_info),
                    device.callbacks(),
                )
                .map_err(|(_, result)| RhiError::vk("vkCreateGraphicsPipelines")(result))?
        };
        let pipeline = pipelines.into_iter().next().ok_or(RhiError::Vulkan {
            call: "vkCreateGraphicsPipelines",
            result: vk::Result::ERROR_UNKNOWN,
        })?;
        debug!(
            blend = ?self.blend,
            cull = ?self.cull_mode,
            samples = ?self.samples,
            "Graphics pipeline created"
        );

        Ok(Pipeline { device, pipeline })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_disables_blending() {
        let state = BlendMode::Opaque.to_vk();
        assert_eq!(state.blend_enable, vk::FALSE);
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn alpha_blend_uses_source_alpha() {
        let state = BlendMode::AlphaBlend.to_vk();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
    }

    #[test]
    fn builder_defaults() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(builder.samples, vk::SampleCountFlags::TYPE_1);
        assert!(builder.depth_write);
        assert_eq!(builder.blend, BlendMode::Opaque);
        assert!(builder.min_sample_shading.is_none());
    }

    #[test]
    fn builder_overrides() {
        let builder = GraphicsPipelineBuilder::new()
            .cull_mode(vk::CullModeFlags::NONE)
            .samples(vk::SampleCountFlags::TYPE_4)
            .sample_shading(0.25)
            .depth_write(false)
            .blend(BlendMode::AlphaBlend)
            .color_format(vk::Format::B8G8R8A8_SRGB)
            .depth_format(vk::Format::D32_SFLOAT);
        assert_eq!(builder.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(builder.min_sample_shading, Some(0.25));
        assert!(!builder.depth_write);
        assert_eq!(builder.color_format, Some(vk::Format::B8G8R8A8_SRGB));
        assert_eq!(builder.depth_format, Some(vk::Format::D32_SFLOAT));
    }
}
