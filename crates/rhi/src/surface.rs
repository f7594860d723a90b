//! Presentation surface.

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Instance extensions needed to create a surface on this display.
pub fn required_extensions(display: RawDisplayHandle) -> RhiResult<Vec<*const c_char>> {
    let extensions = ash_window::enumerate_required_extensions(display)
        .map_err(RhiError::vk("vkEnumerateInstanceExtensionProperties"))?;

    debug!(
        "Required surface extensions: {:?}",
        extensions
            .iter()
            // SAFETY: ash-window returns pointers to static, NUL-terminated names.
            .map(|&ext| unsafe { CStr::from_ptr(ext) })
            .collect::<Vec<_>>()
    );

    Ok(extensions.to_vec())
}

/// RAII wrapper for a `VkSurfaceKHR`.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
    instance: Arc<Instance>,
}

impl Surface {
    /// Create a surface for a native window.
    ///
    /// # Safety
    ///
    /// `display` and `window` must be valid and must outlive the surface.
    pub unsafe fn new(
        instance: Arc<Instance>,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> RhiResult<Self> {
        let handle = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.handle(),
                display,
                window,
                instance.callbacks().get(),
            )
        }
        .map_err(|e| RhiError::Surface(format!("vkCreateSurfaceKHR failed: {e}")))?;

        let loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        info!("Vulkan surface created");

        Ok(Self {
            handle,
            loader,
            instance,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }

    /// Whether `family` on `physical_device` can present to this surface.
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        family: u32,
    ) -> RhiResult<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, family, self.handle)
                .map_err(RhiError::vk("vkGetPhysicalDeviceSurfaceSupportKHR"))
        }
    }

    /// Snapshot the capabilities, formats and present modes.
    pub fn support(&self, physical_device: vk::PhysicalDevice) -> RhiResult<SurfaceSupport> {
        unsafe {
            let capabilities = self
                .loader
                .get_physical_device_surface_capabilities(physical_device, self.handle)
                .map_err(RhiError::vk("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?;
            let formats = self
                .loader
                .get_physical_device_surface_formats(physical_device, self.handle)
                .map_err(RhiError::vk("vkGetPhysicalDeviceSurfaceFormatsKHR"))?;
            let present_modes = self
                .loader
                .get_physical_device_surface_present_modes(physical_device, self.handle)
                .map_err(RhiError::vk("vkGetPhysicalDeviceSurfacePresentModesKHR"))?;

            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the swapchain built on this surface holds an Arc to it and
        // has been dropped by now.
        unsafe {
            self.loader
                .destroy_surface(self.handle, self.instance.callbacks().get());
        }
        debug!("Vulkan surface destroyed");
    }
}

// SAFETY: the surface handle is only destroyed in Drop.
unsafe impl Send for Surface {}
unsafe impl Sync for Surface {}

/// What a surface supports on a given physical device.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// A swapchain needs at least one format and one present mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}
