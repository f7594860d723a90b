//! Swapchain manager.
//!
//! Owns the presentable images, their views and the depth buffer that matches
//! the swapchain extent. All creation decisions live in [`SwapchainPlan`],
//! which is pure and computed from a [`SurfaceSupport`] snapshot.
//!
//! Out-of-date and suboptimal results are reported as [`SwapchainStatus`],
//! never as errors. Recreation destroys the previous images, views and depth
//! buffer only after a full device idle wait, and only once the replacement
//! chain exists. A zero-area surface defers recreation instead of failing.

use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc};
use crate::physical_device::select_depth_format;
use crate::surface::{Surface, SurfaceSupport};
use crate::sync::Timeout;

/// Outcome of an acquire or present call that did not fail outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainStatus {
    Ok,
    /// Still usable, but should be recreated after this frame.
    Suboptimal,
    /// Unusable until recreated.
    OutOfDate,
}

impl SwapchainStatus {
    #[inline]
    pub fn needs_recreate(self) -> bool {
        !matches!(self, Self::Ok)
    }
}

/// Index of an image inside the swapchain, as returned by acquisition.
///
/// Distinct from the frame slot counter; the two advance independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwapImageIndex(u32);

impl SwapImageIndex {
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SwapImageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image#{}", self.0)
    }
}

/// Result of `vkAcquireNextImageKHR`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready(SwapImageIndex),
    /// Image acquired, but the swapchain no longer matches the surface exactly.
    Suboptimal(SwapImageIndex),
    /// No image; the swapchain must be recreated.
    OutOfDate,
}

impl AcquireOutcome {
    pub fn status(self) -> SwapchainStatus {
        match self {
            Self::Ready(_) => SwapchainStatus::Ok,
            Self::Suboptimal(_) => SwapchainStatus::Suboptimal,
            Self::OutOfDate => SwapchainStatus::OutOfDate,
        }
    }

    pub fn image(self) -> Option<SwapImageIndex> {
        match self {
            Self::Ready(index) | Self::Suboptimal(index) => Some(index),
            Self::OutOfDate => None,
        }
    }
}

/// Settings fixed for the lifetime of a swapchain manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainConfig {
    /// Force FIFO presentation.
    pub vsync: bool,
    /// Requested image count before clamping to surface limits.
    pub image_count: u32,
    /// Sample count of the depth buffer; must match the color target.
    pub depth_samples: vk::SampleCountFlags,
}

/// Every decision needed to create a swapchain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainPlan {
    pub extent: vk::Extent2D,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

impl SwapchainPlan {
    pub fn new(
        support: &SurfaceSupport,
        desired: vk::Extent2D,
        vsync: bool,
        requested_images: u32,
    ) -> RhiResult<Self> {
        if !support.is_adequate() {
            return Err(RhiError::Surface(
                "surface reports no formats or present modes".into(),
            ));
        }
        let capabilities = &support.capabilities;

        Ok(Self {
            extent: choose_extent(capabilities, desired),
            surface_format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes, vsync),
            image_count: choose_image_count(capabilities, requested_images),
            pre_transform: choose_pre_transform(capabilities),
            composite_alpha: choose_composite_alpha(capabilities),
        })
    }

    /// Whether the extent has a non-zero area.
    pub fn is_presentable(&self) -> bool {
        self.extent.width > 0 && self.extent.height > 0
    }
}

/// Snapshot of the current swapchain, valid until the next recreation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainInfo {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub image_count: u32,
    pub depth_format: vk::Format,
    pub depth_samples: vk::SampleCountFlags,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

/// Result of [`Swapchain::recreate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rebuild {
    Rebuilt,
    /// The surface currently has zero area (minimized). Nothing changed.
    Deferred,
}

/// A freshly created chain not yet installed.
struct Chain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth: Image,
}

/// Presentable image chain plus depth buffer.
pub struct Swapchain {
    // Extent-dependent resources first: they are released before the handle.
    depth: Option<Image>,
    image_views: Vec<vk::ImageView>,
    images: Vec<vk::Image>,
    swapchain: vk::SwapchainKHR,
    loader: ash::khr::swapchain::Device,
    plan: SwapchainPlan,
    config: SwapchainConfig,
    depth_format: vk::Format,
    surface: Arc<Surface>,
    device: Arc<Device>,
}

impl Swapchain {
    /// Create a swapchain for `surface` as close to `desired` as the surface allows.
    ///
    /// Fails with [`RhiError::NoDepthFormat`] when the device supports none of
    /// the depth format candidates.
    pub fn new(
        device: Arc<Device>,
        surface: Arc<Surface>,
        desired: vk::Extent2D,
        config: SwapchainConfig,
    ) -> RhiResult<Self> {
        let depth_format = select_depth_format(&device.formats())?;
        info!(?depth_format, "Selected depth format");

        let loader =
            ash::khr::swapchain::Device::new(device.instance().handle(), device.handle());

        let mut swapchain = Self {
            depth: None,
            image_views: Vec::new(),
            images: Vec::new(),
            swapchain: vk::SwapchainKHR::null(),
            loader,
            plan: SwapchainPlan {
                extent: desired,
                surface_format: vk::SurfaceFormatKHR::default(),
                present_mode: vk::PresentModeKHR::FIFO,
                image_count: 0,
                pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            },
            config,
            depth_format,
            surface,
            device,
        };
        let plan = swapchain.plan_for(desired)?;
        if !plan.is_presentable() {
            return Err(RhiError::Surface("surface extent is zero".into()));
        }
        let chain = swapchain.create_chain(&plan)?;
        swapchain.install(chain, plan);
        Ok(swapchain)
    }

    /// Rebuild the chain, views and depth buffer for `desired`.
    ///
    /// Waits for the device to go idle first, so nothing in flight can still
    /// reference the old images. A surface that currently reports a zero
    /// extent returns [`Rebuild::Deferred`] and leaves the existing chain
    /// untouched. On error the existing chain is also left intact.
    pub fn recreate(&mut self, desired: vk::Extent2D) -> RhiResult<Rebuild> {
        self.device.wait_idle()?;

        let plan = self.plan_for(desired)?;
        if !plan.is_presentable() {
            debug!("Surface extent is zero, deferring swapchain recreation");
            return Ok(Rebuild::Deferred);
        }
        info!(
            "Recreating swapchain for {}x{}",
            plan.extent.width, plan.extent.height
        );

        let chain = self.create_chain(&plan)?;
        self.install(chain, plan);
        Ok(Rebuild::Rebuilt)
    }

    fn plan_for(&self, desired: vk::Extent2D) -> RhiResult<SwapchainPlan> {
        let support = self.surface.support(self.device.physical_device())?;
        SwapchainPlan::new(&support, desired, self.config.vsync, self.config.image_count)
    }

    /// Create a chain for `plan`, retiring the current one.
    ///
    /// Everything created here is released again if a later step fails.
    fn create_chain(&self, plan: &SwapchainPlan) -> RhiResult<Chain> {
        let families = self.device.capabilities().queue_families;
        let graphics_family = self.device.graphics_family();
        let present_family = families.present.unwrap_or(graphics_family);
        let family_indices = [graphics_family, present_family];
        let (sharing_mode, family_indices) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, &family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.handle())
            .min_image_count(plan.image_count)
            .image_format(plan.surface_format.format)
            .image_color_space(plan.surface_format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices)
            .pre_transform(plan.pre_transform)
            .composite_alpha(plan.composite_alpha)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(self.swapchain);

        let swapchain = unsafe {
            self.loader
                .create_swapchain(&create_info, self.device.callbacks())
                .map_err(RhiError::vk("vkCreateSwapchainKHR"))?
        };

        let attachments = (|| -> RhiResult<_> {
            let images = unsafe {
                self.loader
                    .get_swapchain_images(swapchain)
                    .map_err(RhiError::vk("vkGetSwapchainImagesKHR"))?
            };
            let image_views =
                create_image_views(&self.device, &images, plan.surface_format.format)?;
            let depth = Image::new(
                self.device.clone(),
                ImageDesc::depth(plan.extent, self.depth_format, self.config.depth_samples),
            );
            match depth {
                Ok(depth) => Ok((images, image_views, depth)),
                Err(e) => {
                    destroy_image_views(&self.device, image_views);
                    Err(e)
                }
            }
        })();

        match attachments {
            Ok((images, image_views, depth)) => Ok(Chain {
                swapchain,
                images,
                image_views,
                depth,
            }),
            Err(e) => {
                unsafe { self.loader.destroy_swapchain(swapchain, self.device.callbacks()) };
                Err(e)
            }
        }
    }

    /// Replace the current chain with `chain`, destroying the old one.
    fn install(&mut self, chain: Chain, plan: SwapchainPlan) {
        self.destroy_attachments();
        if self.swapchain != vk::SwapchainKHR::null() {
            // Retired by the new chain.
            unsafe {
                self.loader
                    .destroy_swapchain(self.swapchain, self.device.callbacks())
            };
        }

        self.swapchain = chain.swapchain;
        self.images = chain.images;
        self.image_views = chain.image_views;
        self.depth = Some(chain.depth);
        self.plan = plan;

        info!(
            "Swapchain ready: {}x{}, {:?}, {:?}, {} images",
            plan.extent.width,
            plan.extent.height,
            plan.surface_format.format,
            plan.present_mode,
            self.images.len()
        );
    }

    /// Acquire the next image, signalling `semaphore` when it is ready.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        timeout: Timeout,
    ) -> RhiResult<AcquireOutcome> {
        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                timeout.as_nanos(),
                semaphore,
                vk::Fence::null(),
            )
        };
        match result {
            Ok((index, false)) => Ok(AcquireOutcome::Ready(SwapImageIndex(index))),
            Ok((index, true)) => Ok(AcquireOutcome::Suboptimal(SwapImageIndex(index))),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
                Err(RhiError::Timeout("vkAcquireNextImageKHR"))
            }
            Err(e) => Err(RhiError::vk("vkAcquireNextImageKHR")(e)),
        }
    }

    /// Queue `image` for presentation once `wait` is signaled.
    pub fn present(
        &self,
        queue: vk::Queue,
        image: SwapImageIndex,
        wait: vk::Semaphore,
    ) -> RhiResult<SwapchainStatus> {
        let swapchains = [self.swapchain];
        let image_indices = [image.get()];
        let wait_semaphores = [wait];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(SwapchainStatus::Ok),
            Ok(true) => Ok(SwapchainStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::OutOfDate),
            Err(e) => Err(RhiError::vk("vkQueuePresentKHR")(e)),
        }
    }

    pub fn info(&self) -> SwapchainInfo {
        SwapchainInfo {
            extent: self.plan.extent,
            format: self.plan.surface_format.format,
            color_space: self.plan.surface_format.color_space,
            present_mode: self.plan.present_mode,
            image_count: self.images.len() as u32,
            depth_format: self.depth_format,
            depth_samples: self.config.depth_samples,
            pre_transform: self.plan.pre_transform,
        }
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.plan.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.plan.surface_format.format
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Image handle for an acquired index.
    pub fn image(&self, index: SwapImageIndex) -> Option<vk::Image> {
        self.images.get(index.as_usize()).copied()
    }

    pub fn image_view(&self, index: SwapImageIndex) -> Option<vk::ImageView> {
        self.image_views.get(index.as_usize()).copied()
    }

    /// Depth buffer matching the current extent.
    pub fn depth(&self) -> Option<&Image> {
        self.depth.as_ref()
    }

    fn destroy_attachments(&mut self) {
        self.depth = None;
        destroy_image_views(&self.device, std::mem::take(&mut self.image_views));
        self.images.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_attachments();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.loader
                    .destroy_swapchain(self.swapchain, self.device.callbacks());
            }
            info!(
                "Swapchain destroyed (was {}x{})",
                self.plan.extent.width, self.plan.extent.height
            );
        }
    }
}

/// B8G8R8A8_SRGB, then B8G8R8A8_UNORM (both sRGB non-linear), then the first offered.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let find = |format: vk::Format| {
        formats
            .iter()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
    };

    if let Some(format) = find(vk::Format::B8G8R8A8_SRGB) {
        return format;
    }
    if let Some(format) = find(vk::Format::B8G8R8A8_UNORM) {
        warn!("Using fallback surface format B8G8R8A8_UNORM");
        return format;
    }
    let first = formats.first().copied().unwrap_or_default();
    warn!("Using first available surface format: {:?}", first.format);
    first
}

/// FIFO when vsync is requested; otherwise MAILBOX, IMMEDIATE, then FIFO.
///
/// FIFO support is mandatory, so it is always a valid fallback.
fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's current extent when it dictates one, else `desired`
/// clamped to the supported range.
fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, desired: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: desired.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: desired.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };
    debug!(
        "Extent {}x{} (requested {}x{})",
        extent.width, extent.height, desired.width, desired.height
    );
    extent
}

/// `max(min, requested)`, capped by the maximum when the surface has one.
fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let count = requested.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

fn choose_pre_transform(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if capabilities
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        capabilities.current_transform
    }
}

fn choose_composite_alpha(capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|&mode| capabilities.supported_composite_alpha.contains(mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(images.len());
    for &image in images {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );

        match unsafe {
            device
                .handle()
                .create_image_view(&create_info, device.callbacks())
        } {
            Ok(view) => views.push(view),
            Err(e) => {
                destroy_image_views(device, views);
                return Err(RhiError::creating("swapchain image view")(RhiError::vk(
                    "vkCreateImageView",
                )(e)));
            }
        }
    }
    Ok(views)
}

fn destroy_image_views(device: &Device, views: Vec<vk::ImageView>) {
    for view in views {
        unsafe { device.handle().destroy_image_view(view, device.callbacks()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn support(capabilities: vk::SurfaceCapabilitiesKHR) -> SurfaceSupport {
        SurfaceSupport {
            capabilities,
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![
                vk::PresentModeKHR::FIFO,
                vk::PresentModeKHR::MAILBOX,
                vk::PresentModeKHR::IMMEDIATE,
            ],
        }
    }

    fn free_extent_caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: min,
                height: min,
            },
            max_image_extent: vk::Extent2D {
                width: max,
                height: max,
            },
            min_image_count: 2,
            max_image_count: 0,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            ..Default::default()
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn vsync_always_selects_fifo() {
        let plan = SwapchainPlan::new(&support(free_extent_caps(1, 4096)), extent(800, 600), true, 3)
            .unwrap();
        assert_eq!(plan.present_mode, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn without_vsync_mailbox_then_immediate() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::IMMEDIATE);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE], false),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn prefers_srgb_surface_format() {
        let plan = SwapchainPlan::new(&support(free_extent_caps(1, 4096)), extent(800, 600), true, 3)
            .unwrap();
        assert_eq!(plan.surface_format.format, vk::Format::B8G8R8A8_SRGB);

        let only_rgba = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(choose_surface_format(&only_rgba).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn undersized_request_is_clamped_to_minimum() {
        let plan = SwapchainPlan::new(&support(free_extent_caps(2, 4096)), extent(1, 1), true, 3)
            .unwrap();
        assert_eq!(plan.extent, extent(2, 2));
    }

    #[test]
    fn oversized_request_is_clamped_to_maximum() {
        let plan = SwapchainPlan::new(&support(free_extent_caps(1, 2000)), extent(3000, 500), true, 3)
            .unwrap();
        assert_eq!(plan.extent, extent(2000, 500));
    }

    #[test]
    fn current_extent_wins_when_fixed() {
        let mut caps = free_extent_caps(1, 4096);
        caps.current_extent = extent(1920, 1080);
        let plan = SwapchainPlan::new(&support(caps), extent(800, 600), true, 3).unwrap();
        assert_eq!(plan.extent, extent(1920, 1080));
    }

    #[test]
    fn image_count_respects_min_and_max() {
        let mut caps = free_extent_caps(1, 4096);
        caps.min_image_count = 2;
        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps, 3), 3);
        assert_eq!(choose_image_count(&caps, 1), 2);
        assert_eq!(choose_image_count(&caps, 16), 16);

        caps.max_image_count = 3;
        assert_eq!(choose_image_count(&caps, 8), 3);
    }

    #[test]
    fn pre_transform_prefers_identity() {
        let mut caps = free_extent_caps(1, 4096);
        caps.supported_transforms =
            vk::SurfaceTransformFlagsKHR::IDENTITY | vk::SurfaceTransformFlagsKHR::ROTATE_90;
        caps.current_transform = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        assert_eq!(choose_pre_transform(&caps), vk::SurfaceTransformFlagsKHR::IDENTITY);

        caps.supported_transforms = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        assert_eq!(choose_pre_transform(&caps), vk::SurfaceTransformFlagsKHR::ROTATE_90);
    }

    #[test]
    fn composite_alpha_falls_back_to_supported_mode() {
        let mut caps = free_extent_caps(1, 4096);
        caps.supported_composite_alpha = vk::CompositeAlphaFlagsKHR::INHERIT;
        assert_eq!(choose_composite_alpha(&caps), vk::CompositeAlphaFlagsKHR::INHERIT);
    }

    #[test]
    fn plan_is_idempotent() {
        let support = support(free_extent_caps(1, 4096));
        let a = SwapchainPlan::new(&support, extent(640, 480), false, 3).unwrap();
        let b = SwapchainPlan::new(&support, extent(640, 480), false, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_extent_is_not_presentable() {
        let mut caps = free_extent_caps(0, 4096);
        caps.current_extent = extent(0, 0);
        let plan = SwapchainPlan::new(&support(caps), extent(800, 600), true, 3).unwrap();
        assert!(!plan.is_presentable());
    }

    #[test]
    fn inadequate_support_is_rejected() {
        let empty = SurfaceSupport::default();
        assert!(SwapchainPlan::new(&empty, extent(1, 1), true, 2).is_err());
    }

    #[test]
    fn acquire_outcome_status() {
        let index = SwapImageIndex::new(1);
        assert_eq!(AcquireOutcome::Ready(index).status(), SwapchainStatus::Ok);
        assert_eq!(AcquireOutcome::Suboptimal(index).image(), Some(index));
        assert_eq!(AcquireOutcome::OutOfDate.image(), None);
        assert!(AcquireOutcome::OutOfDate.status().needs_recreate());
        assert!(!SwapchainStatus::Ok.needs_recreate());
    }
}
