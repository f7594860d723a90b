//! Fences, semaphores and wait timeouts.
//!
//! - [`Semaphore`] orders queue operations on the GPU (acquire → render → present).
//! - [`Fence`] lets the CPU wait for submitted work to complete.
//!
//! Both hold an `Arc<Device>` and destroy their handle on drop.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Upper bound on a blocking wait.
///
/// The render loop waits with [`Timeout::Infinite`]; a finite bound exists
/// so tests and tools can turn a hang into an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Timeout {
    #[default]
    Infinite,
    Nanos(u64),
}

impl Timeout {
    /// Value to pass to Vulkan wait calls.
    #[inline]
    pub fn as_nanos(self) -> u64 {
        match self {
            Self::Infinite => u64::MAX,
            Self::Nanos(ns) => ns,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Self::Nanos(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }
}

/// Binary semaphore, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe {
            device
                .handle()
                .create_semaphore(&create_info, device.callbacks())
                .map_err(RhiError::vk("vkCreateSemaphore"))?
        };
        debug!("Created semaphore");
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_semaphore(self.semaphore, self.device.callbacks());
        }
        debug!("Destroyed semaphore");
    }
}

/// CPU-waitable completion token.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence; `signaled` fences let the first wait return immediately.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe {
            device
                .handle()
                .create_fence(&create_info, device.callbacks())
                .map_err(RhiError::vk("vkCreateFence"))?
        };
        debug!(signaled, "Created fence");
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Block until the fence is signaled.
    ///
    /// Returns [`RhiError::Timeout`] if a finite `timeout` expires first.
    pub fn wait(&self, timeout: Timeout) -> RhiResult<()> {
        let fences = [self.fence];
        match unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout.as_nanos())
        } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RhiError::Timeout("vkWaitForFences")),
            Err(e) => Err(RhiError::vk("vkWaitForFences")(e)),
        }
    }

    /// Return the fence to the unsignaled state. It must not be pending.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .reset_fences(&fences)
                .map_err(RhiError::vk("vkResetFences"))
        }
    }

    /// Non-blocking status query.
    pub fn is_signaled(&self) -> RhiResult<bool> {
        unsafe {
            self.device
                .handle()
                .get_fence_status(self.fence)
                .map_err(RhiError::vk("vkGetFenceStatus"))
        }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_fence(self.fence, self.device.callbacks());
        }
        debug!("Destroyed fence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_timeout_is_max() {
        assert_eq!(Timeout::Infinite.as_nanos(), u64::MAX);
        assert_eq!(Timeout::default(), Timeout::Infinite);
        assert_eq!(Timeout::Nanos(5).as_nanos(), 5);
    }

    #[test]
    fn duration_converts_to_nanos() {
        assert_eq!(
            Timeout::from(Duration::from_millis(2)),
            Timeout::Nanos(2_000_000)
        );
        assert_eq!(
            Timeout::from(Duration::MAX),
            Timeout::Nanos(u64::MAX)
        );
    }

    #[test]
    fn sync_objects_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
    }
}
