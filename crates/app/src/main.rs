//! `vkpbr`: a glTF PBR viewer.
//!
//! Drag with the left mouse button to orbit, scroll to zoom, Escape to quit.

mod cli;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use glam::{Mat4, Vec3};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use vkpbr_core::{FpsCounter, RenderConfig, Timer};
use vkpbr_platform::{InputState, KeyCode, Window};
use vkpbr_renderer::{FrameOutcome, Renderer, RendererAssets};
use vkpbr_resources::Model;
use vkpbr_rhi::RhiError;
use vkpbr_scene::{Camera, DirectionalLight, OrbitController, SceneView};

use crate::cli::Args;

struct App {
    config: RenderConfig,
    args: Args,
    model: Option<Model>,
    // Renderer before window: the surface must go before the window it targets.
    renderer: Option<Renderer>,
    window: Option<Window>,
    view: SceneView,
    orbit: OrbitController,
    input: InputState,
    timer: Timer,
    fps: FpsCounter,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(config: RenderConfig, args: Args, model: Option<Model>) -> Self {
        let mut camera = Camera::new();
        if let Some(model) = &model {
            camera.frame_bounds(model.aabb_min, model.aabb_max);
        }
        let orbit = OrbitController::from_camera(&camera);
        let view = SceneView {
            camera,
            light: DirectionalLight::new(Vec3::new(-0.4, -1.0, -0.6), Vec3::ONE, 3.0),
            model_transform: Mat4::IDENTITY,
        };

        Self {
            config,
            args,
            model,
            renderer: None,
            window: None,
            view,
            orbit,
            input: InputState::new(),
            timer: Timer::new(),
            fps: FpsCounter::new(Duration::from_secs(1)),
            fatal: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, self.config.width, self.config.height, "vkpbr")?;
        let (display, raw_window) = window.raw_handles()?;

        // SAFETY: the renderer is dropped before the window (field order and
        // `exiting`), so the handles outlive every Vulkan object using them.
        let renderer = unsafe {
            Renderer::new(
                &self.config,
                display,
                raw_window,
                window.size(),
                RendererAssets {
                    model: self.model.as_ref(),
                    shader_dir: &self.args.shaders,
                },
            )?
        };
        let info = renderer.swapchain_info();
        info!(
            "Presenting {}x{} {:?} via {:?}, {} images",
            info.extent.width, info.extent.height, info.format, info.present_mode, info.image_count
        );

        // Geometry and textures now live on the GPU.
        self.model = None;
        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        let delta = self.timer.tick();
        if let Some(fps) = self.fps.record(delta) {
            info!("{:.1} fps", fps);
        }

        self.orbit.rotate(self.input.take_drag());
        self.orbit.zoom(self.input.take_scroll());
        self.orbit.apply(&mut self.view.camera);
        self.input.end_frame();

        match renderer.render(&self.view)? {
            FrameOutcome::Presented { .. } => {}
            FrameOutcome::Skipped(reason) => tracing::trace!(?reason, "Frame skipped"),
        }
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        report_fatal(&err);
        self.fatal = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e.context("Failed to initialize renderer"));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if self.input.handle_event(&event) {
            if self.input.is_key_just_pressed(KeyCode::Escape) {
                event_loop.exit();
            }
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.resize(size.width, size.height);
                }
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.take() {
            info!(
                "Ran for {:.1?}: {:?}",
                self.timer.elapsed(),
                renderer.stats()
            );
        }
        self.window = None;
    }
}

/// Log a fatal error with the subsystem and Vulkan call that raised it.
fn report_fatal(err: &anyhow::Error) {
    match err.chain().find_map(|cause| cause.downcast_ref::<RhiError>()) {
        Some(rhi) => error!(
            subsystem = rhi.subsystem(),
            call = rhi.failing_call().unwrap_or("-"),
            "{:#}",
            err
        ),
        None => error!("{:#}", err),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    match &args.log {
        Some(directives) => vkpbr_core::init_logging_with(directives),
        None => vkpbr_core::init_logging(),
    }

    let config = args.render_config().context("Invalid configuration")?;
    info!("Starting vkpbr with {:?}", config);

    let model = match &args.model {
        Some(path) => {
            let model = Model::load(path)
                .with_context(|| format!("Failed to load model {}", path.display()))?;
            info!(
                "Loaded {}: {} meshes, {} vertices, {} triangles",
                path.display(),
                model.meshes.len(),
                model.total_vertex_count(),
                model.total_triangle_count()
            );
            Some(model)
        }
        None => {
            warn!("No --model given, rendering an empty scene");
            None
        }
    };

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, args, model);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(err) => Err(err),
        None => {
            info!("Clean shutdown");
            Ok(())
        }
    }
}
