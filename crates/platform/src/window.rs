//! Window management using winit.

use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use vkpbr_core::{Error, Result};

/// A resizable winit window that hands out raw handles for surface creation.
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
}

impl Window {
    /// Create a window with an inner size of `width`×`height` physical pixels.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        // The platform may not honor the requested size.
        let size = window.inner_size();
        tracing::info!("Window created: {}x{}", size.width, size.height);

        Ok(Self {
            window: Arc::new(window),
            width: size.width,
            height: size.height,
        })
    }

    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    pub fn id(&self) -> winit::window::WindowId {
        self.window.id()
    }

    /// Size from the last [`resize`](Self::resize). Zero while minimized.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
    /// Update the stored dimensions from a resize event.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        tracing::debug!("Window resized: {}x{}", width, height);
    }

    /// Raw display and window handles for Vulkan surface creation.
    ///
    /// The handles stay valid for as long as this window is alive.
    pub fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {e}")))?;
        let window = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {e}")))?;
        Ok((display.as_raw(), window.as_raw()))
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}
