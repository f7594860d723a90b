//! GPU memory allocation and the host allocation callback table.
//!
//! [`HostCallbacks`] is created before anything else and handed to the
//! instance and device, which pass it to every `vkCreate*`/`vkDestroy*` call.
//! [`GpuAllocator`] sub-allocates device memory through `gpu-allocator` and is
//! owned by the logical device.

use std::sync::{Mutex, MutexGuard, PoisonError};

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use tracing::{debug, info, warn};

use crate::error::RhiResult;

/// Host-side allocation callbacks used for Vulkan object creation.
///
/// The default uses the driver's own allocator.
#[derive(Clone, Copy, Default)]
pub struct HostCallbacks {
    table: Option<vk::AllocationCallbacks<'static>>,
}

// SAFETY: Vulkan requires allocation callbacks to be callable from any thread
// that creates or destroys objects, so the table itself is shareable.
unsafe impl Send for HostCallbacks {}
unsafe impl Sync for HostCallbacks {}

impl HostCallbacks {
    /// Use the driver's default host allocator.
    pub fn system() -> Self {
        Self::default()
    }

    /// Install a custom callback table.
    ///
    /// # Safety
    ///
    /// The function pointers and `p_user_data` must stay valid, and be
    /// thread-safe, for the lifetime of every object created with them.
    pub unsafe fn from_raw(table: vk::AllocationCallbacks<'static>) -> Self {
        Self { table: Some(table) }
    }

    /// The table to pass as `p_allocator`.
    #[inline]
    pub fn get(&self) -> Option<&vk::AllocationCallbacks<'static>> {
        self.table.as_ref()
    }

    pub fn is_custom(&self) -> bool {
        self.table.is_some()
    }
}

impl std::fmt::Debug for HostCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCallbacks")
            .field("custom", &self.is_custom())
            .finish()
    }
}

/// Device memory allocator shared by every buffer and image.
pub struct GpuAllocator {
    inner: Mutex<Allocator>,
}

impl GpuAllocator {
    pub(crate) fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
    ) -> RhiResult<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;
        info!("GPU memory allocator created");

        Ok(Self {
            inner: Mutex::new(allocator),
        })
    }

    /// Lock the allocator, recovering from a poisoned lock.
    ///
    /// A panic while the lock was held cannot leave the allocator's block
    /// lists inconsistent, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Allocator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate memory satisfying `requirements`.
    pub fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> RhiResult<Allocation> {
        let allocation = self.lock().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        debug!(name, size = requirements.size, ?location, "Allocated device memory");
        Ok(allocation)
    }

    /// Return an allocation to the allocator.
    pub fn free(&self, allocation: Allocation) {
        if let Err(e) = self.lock().free(allocation) {
            tracing::error!("Failed to free allocation: {}", e);
        }
    }

    /// Log every allocation still alive. Called once at device teardown.
    pub fn report(&self) {
        let report = self.lock().generate_report();
        if report.allocations.is_empty() {
            debug!("No live device allocations");
            return;
        }
        let total: u64 = report.allocations.iter().map(|a| a.size).sum();
        warn!(
            count = report.allocations.len(),
            bytes = total,
            "Device allocations still alive"
        );
        for allocation in &report.allocations {
            warn!(name = %allocation.name, size = allocation.size, "Live allocation");
        }
    }
}
