//! Physical device selection and capability queries.
//!
//! Selection is deterministic: devices are scanned in enumeration order and
//! the first one that meets the requirements wins. The pure helpers
//! ([`find_queue_families`], [`find_memory_type`], [`select_depth_format`],
//! [`clamp_sample_count`]) carry the decisions and are tested without a GPU.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::surface::Surface;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 5] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
    vk::Format::D16_UNORM_S8_UINT,
    vk::Format::D16_UNORM,
];

/// Queue families used by the renderer.
///
/// `graphics` and `present` may be the same family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Graphics is always required; present only when rendering to a surface.
    #[inline]
    pub fn is_complete(&self, presenting: bool) -> bool {
        self.graphics.is_some() && (!presenting || self.present.is_some())
    }

    /// Distinct families, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        if let Some(graphics) = self.graphics {
            families.push(graphics);
        }
        if let Some(present) = self.present
            && !families.contains(&present)
        {
            families.push(present);
        }
        families
    }
}

/// Pick queue families from a device's family list.
///
/// A family that can both draw and present is preferred so that a single
/// queue serves both; otherwise the first graphics family and the first
/// present family are used. `supports_present` is only consulted when
/// `presenting` is set.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    presenting: bool,
    mut supports_present: impl FnMut(u32) -> RhiResult<bool>,
) -> RhiResult<QueueFamilyIndices> {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let present = presenting && supports_present(i)?;

        if graphics && present {
            return Ok(QueueFamilyIndices {
                graphics: Some(i),
                present: Some(i),
            });
        }
        if graphics && indices.graphics.is_none() {
            indices.graphics = Some(i);
        }
        if present && indices.present.is_none() {
            indices.present = Some(i);
        }
    }

    Ok(indices)
}

/// Index of the first memory type allowed by `type_bits` that has all `flags`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    memory_properties
        .memory_types_as_slice()
        .iter()
        .enumerate()
        .find(|(i, memory_type)| {
            type_bits & (1 << i) != 0 && memory_type.property_flags.contains(flags)
        })
        .map(|(i, _)| i as u32)
}

/// Memory type indices recorded at selection time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryTypeIndices {
    pub device_local: Option<u32>,
    pub host_visible_coherent: Option<u32>,
}

impl MemoryTypeIndices {
    pub fn from_properties(memory_properties: &vk::PhysicalDeviceMemoryProperties) -> Self {
        Self {
            device_local: find_memory_type(
                memory_properties,
                u32::MAX,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            ),
            host_visible_coherent: find_memory_type(
                memory_properties,
                u32::MAX,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ),
        }
    }
}

/// Source of per-format feature support.
pub trait FormatSupport {
    fn optimal_tiling_features(&self, format: vk::Format) -> vk::FormatFeatureFlags;
}

/// Format queries against a real physical device.
pub struct DeviceFormats<'a> {
    pub instance: &'a ash::Instance,
    pub physical_device: vk::PhysicalDevice,
}

impl FormatSupport for DeviceFormats<'_> {
    fn optimal_tiling_features(&self, format: vk::Format) -> vk::FormatFeatureFlags {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
        .optimal_tiling_features
    }
}

/// First entry of [`DEPTH_FORMAT_CANDIDATES`] usable as an optimal-tiling
/// depth/stencil attachment.
pub fn select_depth_format(support: &impl FormatSupport) -> RhiResult<vk::Format> {
    DEPTH_FORMAT_CANDIDATES
        .iter()
        .copied()
        .find(|&format| {
            support
                .optimal_tiling_features(format)
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(RhiError::NoDepthFormat)
}

/// Whether a depth format has a stencil aspect.
pub fn has_stencil(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::S8_UINT
    )
}

/// Highest sample count usable for both color and depth attachments.
pub fn max_usable_sample_count(limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
    let counts = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&count| counts.contains(count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// Largest supported count not above `requested`.
pub fn clamp_sample_count(requested: u32, max: vk::SampleCountFlags) -> vk::SampleCountFlags {
    let requested = requested.clamp(1, 64).next_power_of_two().min(64);
    let clamped = requested.min(max.as_raw());
    // Both sides are single-bit masks, so the minimum is a valid count.
    vk::SampleCountFlags::from_raw(clamped)
}

/// Immutable description of the selected GPU.
#[derive(Clone)]
pub struct DeviceCapabilities {
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
    pub memory_types: MemoryTypeIndices,
    pub max_sample_count: vk::SampleCountFlags,
    /// Whether the device will present to a surface.
    pub presenting: bool,
}

impl DeviceCapabilities {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Total size of device-local heaps in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps_as_slice()
            .iter()
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for DeviceCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("DeviceCapabilities")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{major}.{minor}.{patch}"))
            .field("queue_families", &self.queue_families)
            .field("memory_types", &self.memory_types)
            .field("max_sample_count", &self.max_sample_count)
            .finish()
    }
}

/// Picks the first physical device that can render (and present, when a
/// surface is given).
pub struct PhysicalDeviceSelector<'a> {
    instance: &'a Instance,
    surface: Option<&'a Surface>,
}

impl<'a> PhysicalDeviceSelector<'a> {
    pub fn new(instance: &'a Instance, surface: Option<&'a Surface>) -> Self {
        Self { instance, surface }
    }

    /// Scan devices in enumeration order and return the first suitable one.
    pub fn select(&self) -> RhiResult<DeviceCapabilities> {
        let devices = unsafe {
            self.instance
                .handle()
                .enumerate_physical_devices()
                .map_err(RhiError::vk("vkEnumeratePhysicalDevices"))?
        };
        info!("Found {} GPU(s)", devices.len());

        for device in devices {
            if let Some(capabilities) = self.evaluate(device)? {
                let (major, minor, patch) = capabilities.api_version();
                info!(
                    "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}",
                    capabilities.device_name(),
                    capabilities.device_type_name(),
                    major,
                    minor,
                    patch
                );
                return Ok(capabilities);
            }
        }

        warn!("No GPU with the required capabilities");
        Err(RhiError::NoSuitableDevice)
    }

    fn evaluate(&self, device: vk::PhysicalDevice) -> RhiResult<Option<DeviceCapabilities>> {
        let instance = self.instance.handle();
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = properties
            .device_name_as_c_str()
            .unwrap_or(c"Unknown")
            .to_string_lossy()
            .into_owned();

        if properties.api_version < vk::API_VERSION_1_3 {
            debug!("GPU '{name}' skipped: Vulkan 1.3 not supported");
            return Ok(None);
        }

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut features_1_3);
        unsafe { instance.get_physical_device_features2(device, &mut features2) };
        let features = features2.features;
        if features_1_3.dynamic_rendering == vk::FALSE
            || features_1_3.synchronization2 == vk::FALSE
        {
            debug!("GPU '{name}' skipped: dynamic rendering or synchronization2 missing");
            return Ok(None);
        }

        let presenting = self.surface.is_some();
        if presenting && !self.supports_extension(device, ash::khr::swapchain::NAME)? {
            debug!("GPU '{name}' skipped: VK_KHR_swapchain missing");
            return Ok(None);
        }

        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let queue_families = find_queue_families(&families, presenting, |family| {
            match self.surface {
                Some(surface) => surface.supports_present(device, family),
                None => Ok(false),
            }
        })?;
        if !queue_families.is_complete(presenting) {
            debug!(
                "GPU '{name}' skipped: missing queue families (graphics={}, present={})",
                queue_families.graphics.is_some(),
                queue_families.present.is_some()
            );
            return Ok(None);
        }

        if let Some(surface) = self.surface
            && !surface.support(device)?.is_adequate()
        {
            debug!("GPU '{name}' skipped: surface has no formats or present modes");
            return Ok(None);
        }

        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

        Ok(Some(DeviceCapabilities {
            physical_device: device,
            properties,
            features,
            memory_types: MemoryTypeIndices::from_properties(&memory_properties),
            memory_properties,
            queue_families,
            max_sample_count: max_usable_sample_count(&properties.limits),
            presenting,
        }))
    }

    fn supports_extension(&self, device: vk::PhysicalDevice, name: &CStr) -> RhiResult<bool> {
        let extensions = unsafe {
            self.instance
                .handle()
                .enumerate_device_extension_properties(device)
                .map_err(RhiError::vk("vkEnumerateDeviceExtensionProperties"))?
        };
        Ok(extensions
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|ext| ext == name)))
    }
}
