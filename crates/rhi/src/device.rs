//! Logical device, queues and optional feature negotiation.
//!
//! The [`Device`] is shared as `Arc<Device>` by every object created from it:
//! swapchains, command pools, buffers, pipelines and sync primitives. It is
//! therefore destroyed only after all of them, and it keeps its own
//! `Arc<Instance>` so the instance outlives it.

use std::ffi::c_char;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use crate::allocator::{GpuAllocator, HostCallbacks};
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{DeviceCapabilities, DeviceFormats};

/// Optional device features.
///
/// Used both for what the application asks for and for what was actually
/// enabled after [`negotiate_features`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceFeatures {
    pub sampler_anisotropy: bool,
    pub sample_rate_shading: bool,
    pub fill_mode_non_solid: bool,
}

impl DeviceFeatures {
    /// Everything the renderer can make use of.
    pub fn all() -> Self {
        Self {
            sampler_anisotropy: true,
            sample_rate_shading: true,
            fill_mode_non_solid: true,
        }
    }

    fn to_vk(self) -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(self.sampler_anisotropy)
            .sample_rate_shading(self.sample_rate_shading)
            .fill_mode_non_solid(self.fill_mode_non_solid)
    }
}

/// Keep only the requested features the device supports.
///
/// Unsupported requests are dropped with a warning instead of failing device
/// creation.
pub fn negotiate_features(
    requested: DeviceFeatures,
    supported: &vk::PhysicalDeviceFeatures,
) -> DeviceFeatures {
    let mut enabled = DeviceFeatures::default();
    let check = |name: &str, wanted: bool, available: vk::Bool32| -> bool {
        if wanted && available == vk::FALSE {
            warn!("Requested device feature '{name}' is not supported; disabling it");
        }
        wanted && available == vk::TRUE
    };

    enabled.sampler_anisotropy = check(
        "samplerAnisotropy",
        requested.sampler_anisotropy,
        supported.sampler_anisotropy,
    );
    enabled.sample_rate_shading = check(
        "sampleRateShading",
        requested.sample_rate_shading,
        supported.sample_rate_shading,
    );
    enabled.fill_mode_non_solid = check(
        "fillModeNonSolid",
        requested.fill_mode_non_solid,
        supported.fill_mode_non_solid,
    );
    enabled
}

/// Vulkan logical device.
pub struct Device {
    // Dropped explicitly before `device` is destroyed.
    allocator: ManuallyDrop<GpuAllocator>,
    device: ash::Device,
    capabilities: DeviceCapabilities,
    enabled_features: DeviceFeatures,
    graphics_queue: vk::Queue,
    present_queue: Option<vk::Queue>,
    instance: Arc<Instance>,
}

impl Device {
    /// Create the logical device, its queues and the memory allocator.
    pub fn new(
        instance: Arc<Instance>,
        capabilities: DeviceCapabilities,
        requested: DeviceFeatures,
    ) -> RhiResult<Arc<Self>> {
        let queue_families = capabilities.queue_families;
        let graphics_family = queue_families.graphics.ok_or(RhiError::NoSuitableDevice)?;

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();
        debug!("Creating queues for families {:?}", unique_families);

        let enabled_features = negotiate_features(requested, &capabilities.features);
        let features = enabled_features.to_vk();
        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let extension_names: Vec<*const c_char> = if capabilities.presenting {
            vec![ash::khr::swapchain::NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(
                    capabilities.physical_device,
                    &create_info,
                    instance.callbacks().get(),
                )
                .map_err(RhiError::DeviceCreation)?
        };
        info!(?enabled_features, "Logical device created");

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = queue_families
            .present
            .map(|family| unsafe { device.get_device_queue(family, 0) });

        let allocator = match GpuAllocator::new(
            instance.handle(),
            &device,
            capabilities.physical_device,
        ) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(instance.callbacks().get()) };
                return Err(e);
            }
        };

        Ok(Arc::new(Self {
            allocator: ManuallyDrop::new(allocator),
            device,
            capabilities,
            enabled_features,
            graphics_queue,
            present_queue,
            instance,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.capabilities.physical_device
    }

    #[inline]
    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    /// Features that were requested and are supported.
    #[inline]
    pub fn enabled_features(&self) -> DeviceFeatures {
        self.enabled_features
    }

    /// Host allocation callbacks for `vkCreate*`/`vkDestroy*`.
    #[inline]
    pub fn callbacks(&self) -> Option<&vk::AllocationCallbacks<'static>> {
        self.instance.callbacks().get()
    }

    #[inline]
    pub fn host_callbacks(&self) -> &HostCallbacks {
        self.instance.callbacks()
    }

    #[inline]
    pub fn allocator(&self) -> &GpuAllocator {
        &self.allocator
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Present queue; the graphics queue when the families coincide or when headless.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue.unwrap_or(self.graphics_queue)
    }

    #[inline]
    pub fn graphics_family(&self) -> u32 {
        // `new` refuses capabilities without a graphics family.
        self.capabilities.queue_families.graphics.unwrap_or_default()
    }

    /// Format feature queries for this device.
    pub fn formats(&self) -> DeviceFormats<'_> {
        DeviceFormats {
            instance: self.instance.handle(),
            physical_device: self.capabilities.physical_device,
        }
    }

    /// Block until every queue is idle.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(RhiError::vk("vkDeviceWaitIdle"))
        }
    }

    /// Block until `queue` is idle.
    pub fn queue_wait_idle(&self, queue: vk::Queue) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_wait_idle(queue)
                .map_err(RhiError::vk("vkQueueWaitIdle"))
        }
    }

    /// Submit to the graphics queue.
    ///
    /// # Safety
    ///
    /// The command buffers must be fully recorded, and `fence` must be
    /// unsignaled and not already pending.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)
                .map_err(RhiError::vk("vkQueueSubmit"))
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }
            self.allocator.report();
            // The allocator frees its memory blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(self.instance.callbacks().get());
        }
        info!("Logical device destroyed");
    }
}

// SAFETY: ash::Device is a function table plus a handle; queue access is
// serialized by the single render thread and the allocator is behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
