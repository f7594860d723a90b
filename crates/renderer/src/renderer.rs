//! Top-level renderer: context creation, per-frame entry point, teardown.

use std::path::Path;
use std::sync::Arc;

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{error, info};
use vkpbr_core::RenderConfig;
use vkpbr_resources::Model;
use vkpbr_rhi::allocator::HostCallbacks;
use vkpbr_rhi::command::CommandBufferSet;
use vkpbr_rhi::device::{Device, DeviceFeatures};
use vkpbr_rhi::instance::Instance;
use vkpbr_rhi::physical_device::{PhysicalDeviceSelector, clamp_sample_count};
use vkpbr_rhi::surface::{Surface, required_extensions};
use vkpbr_rhi::swapchain::{Swapchain, SwapchainConfig, SwapchainInfo};
use vkpbr_rhi::{RhiResult, vk};
use vkpbr_scene::SceneView;

use crate::frame::{FrameOutcome, FrameStats, FrameSynchronizer};
use crate::pipeline_cache::ShaderPaths;
use crate::scene_renderer::SceneRenderer;
use crate::vulkan_backend::VulkanBackend;

/// Instance, surface and device, created once per process.
///
/// Every object created from the context holds an `Arc` to what it was
/// created from, so the device outlives its resources, and the instance
/// outlives both surface and device, whatever order handles are dropped in.
pub struct RenderContext {
    device: Arc<Device>,
    surface: Arc<Surface>,
    instance: Arc<Instance>,
}

impl RenderContext {
    /// # Safety
    ///
    /// `display` and `window` must be valid handles that outlive the context.
    pub unsafe fn new(
        config: &RenderConfig,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> RhiResult<Self> {
        let extensions = required_extensions(display)?;
        let instance = Arc::new(Instance::new(
            c"vkpbr",
            config.validation,
            &extensions,
            HostCallbacks::system(),
        )?);
        let surface = Arc::new(unsafe { Surface::new(instance.clone(), display, window)? });

        let capabilities = PhysicalDeviceSelector::new(&instance, Some(&*surface)).select()?;
        let device = Device::new(instance.clone(), capabilities, DeviceFeatures::all())?;

        Ok(Self {
            device,
            surface,
            instance,
        })
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn surface(&self) -> &Arc<Surface> {
        &self.surface
    }

    #[inline]
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// MSAA sample count for `config`, clamped to what the device supports.
    pub fn sample_count(&self, config: &RenderConfig) -> vk::SampleCountFlags {
        clamp_sample_count(
            config.requested_samples(),
            self.device.capabilities().max_sample_count,
        )
    }
}

/// Where the mesh shaders are loaded from.
#[derive(Clone, Copy, Debug)]
pub struct RendererAssets<'a> {
    pub model: Option<&'a Model>,
    /// Directory holding `pbr.vert.spv` and `pbr.frag.spv`.
    pub shader_dir: &'a Path,
}

/// Owns the whole GPU side of the application.
///
/// # Resource Destruction Order
///
/// `Drop` waits for the device to go idle, then fields drop in declaration
/// order: scene resources, frame slots, command buffers, swapchain, and
/// finally the context. The surface and device are released once the last
/// `Arc` to them goes, the instance after both.
pub struct Renderer {
    scene: SceneRenderer,
    frames: FrameSynchronizer<VulkanBackend>,
    context: RenderContext,
}

impl Renderer {
    /// Build every GPU object for a window of `width`×`height` pixels.
    ///
    /// # Safety
    ///
    /// `display` and `window` must be valid handles that outlive the renderer.
    pub unsafe fn new(
        config: &RenderConfig,
        display: RawDisplayHandle,
        window: RawWindowHandle,
        (width, height): (u32, u32),
        assets: RendererAssets<'_>,
    ) -> RhiResult<Self> {
        info!("Initializing Vulkan renderer ({}x{})", width, height);
        let context = unsafe { RenderContext::new(config, display, window)? };
        let device = context.device().clone();
        let samples = context.sample_count(config);
        let render_ahead = config.render_ahead;
        let extent = vk::Extent2D { width, height };

        let swapchain = Swapchain::new(
            device.clone(),
            context.surface().clone(),
            extent,
            SwapchainConfig {
                vsync: config.vsync,
                image_count: render_ahead + 1,
                depth_samples: samples,
            },
        )?;
        let mut commands = CommandBufferSet::new(device.clone(), render_ahead)?;

        let vertex = assets.shader_dir.join("pbr.vert.spv");
        let fragment = assets.shader_dir.join("pbr.frag.spv");
        let scene = SceneRenderer::new(
            device.clone(),
            &mut commands,
            &swapchain,
            assets.model,
            render_ahead,
            samples,
            ShaderPaths {
                vertex: &vertex,
                fragment: &fragment,
            },
        )?;

        let backend = VulkanBackend::new(device, swapchain, commands);
        let frames = FrameSynchronizer::new(backend, render_ahead, extent)?;
        info!(
            "Renderer ready: {} frame(s) in flight, {:?} MSAA",
            render_ahead, samples
        );

        Ok(Self {
            scene,
            frames,
            context,
        })
    }

    /// Render and present one frame of `view`.
    ///
    /// Swapchain invalidation is handled internally. Any error is fatal for
    /// the renderer.
    pub fn render(&mut self, view: &SceneView) -> RhiResult<FrameOutcome> {
        self.scene.set_view(view);
        self.frames.render_frame(&mut self.scene)
    }

    /// Schedule swapchain recreation for a new window size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.frames.request_resize(vk::Extent2D { width, height });
    }

    pub fn swapchain_info(&self) -> SwapchainInfo {
        self.frames.backend().swapchain().info()
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.frames.stats()
    }

    #[inline]
    pub fn context(&self) -> &RenderContext {
        &self.context
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Scene buffers and textures drop first and may still be in use.
        if let Err(e) = self.context.device().wait_idle() {
            error!("Device idle wait failed during renderer teardown: {}", e);
        }
        info!("Renderer shutting down after {:?}", self.frames.stats());
    }
}
