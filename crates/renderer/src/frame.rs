//! Frame synchronization: frames in flight over a swapchain.
//!
//! [`FrameSynchronizer`] owns `render_ahead` [`FrameSlot`]s, each with a fence
//! (created signaled), a present-complete semaphore, a render-complete
//! semaphore and a command buffer. One call to
//! [`render_frame`](FrameSynchronizer::render_frame) runs:
//!
//! ```text
//! wait(fence[slot]) → acquire(present_complete[slot]) → reset(fence[slot])
//!   → record(cmd[slot], image, slot)
//!   → submit(wait present_complete[slot] @ COLOR_ATTACHMENT_OUTPUT,
//!            signal render_complete[slot], fence[slot])
//!   → present(image, wait render_complete[slot]) → slot = (slot + 1) % N
//! ```
//!
//! The fence wait is the only backpressure: at most `N` submissions are
//! unfinished at any time, and slot `i` is never re-recorded before its
//! previous submission completed.
//!
//! Semaphores, fences and command buffers are indexed by [`FrameSlotIndex`];
//! the target image by [`SwapImageIndex`]. The two counters are independent.
//!
//! An out-of-date acquire discards the frame before anything is recorded,
//! recreates the swapchain after a device idle wait and returns
//! [`FrameOutcome::Skipped`] without advancing the slot counter, so the same
//! slot is retried next call. Suboptimal acquires and non-`Ok` presents
//! finish the frame first and recreate afterwards. When the window or the
//! surface has zero area, recreation is deferred and frames are skipped as
//! [`SkipReason::Minimized`] until it can proceed.
//!
//! The synchronizer is generic over [`FrameBackend`] so the state machine can
//! be driven without a GPU.

use std::fmt;

use tracing::{debug, error, info, trace};
use vkpbr_rhi::swapchain::{AcquireOutcome, SwapImageIndex, SwapchainStatus};
use vkpbr_rhi::sync::Timeout;
use vkpbr_rhi::{RhiError, RhiResult, vk};

/// Index of a frame slot in `[0, render_ahead)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameSlotIndex(u32);

impl FrameSlotIndex {
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

    /// The following slot, wrapping at `count`.
    #[inline]
    pub const fn next(self, count: u32) -> Self {
        Self((self.0 + 1) % count)
    }
}

impl fmt::Display for FrameSlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// Lifecycle of one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Fence signaled; the slot's resources may be overwritten.
    Idle,
    /// Image acquired, command buffer being recorded.
    Recording,
    /// Submitted; fence pending.
    Submitted,
}

/// GPU operations the synchronizer sequences.
///
/// Implemented by the Vulkan backend and by scripted fakes in tests.
pub trait FrameBackend {
    type Fence;
    type Semaphore;
    type CommandBuffer;

    fn create_fence(&mut self, signaled: bool) -> RhiResult<Self::Fence>;
    fn create_semaphore(&mut self) -> RhiResult<Self::Semaphore>;
    /// The pre-allocated command buffer for `slot`.
    fn command_buffer(&mut self, slot: FrameSlotIndex) -> RhiResult<Self::CommandBuffer>;

    fn wait_fence(&mut self, fence: &Self::Fence, timeout: Timeout) -> RhiResult<()>;
    fn reset_fence(&mut self, fence: &Self::Fence) -> RhiResult<()>;

    fn acquire_next_image(
        &mut self,
        signal: &Self::Semaphore,
        timeout: Timeout,
    ) -> RhiResult<AcquireOutcome>;

    fn begin_commands(&mut self, cmd: &Self::CommandBuffer) -> RhiResult<()>;
    fn end_commands(&mut self, cmd: &Self::CommandBuffer) -> RhiResult<()>;

    /// Submit `cmd`, waiting on `wait` at color attachment output and
    /// signalling `signal` and `fence` on completion.
    fn submit(
        &mut self,
        cmd: &Self::CommandBuffer,
        wait: &Self::Semaphore,
        signal: &Self::Semaphore,
        fence: &Self::Fence,
    ) -> RhiResult<()>;

    fn present(&mut self, image: SwapImageIndex, wait: &Self::Semaphore) -> RhiResult<SwapchainStatus>;

    fn wait_idle(&mut self) -> RhiResult<()>;

    /// Rebuild the swapchain for `extent`; returns the extent actually used.
    /// Only called after [`wait_idle`](Self::wait_idle).
    ///
    /// Returns `None`, leaving the current swapchain in place, when the
    /// surface reports a zero extent.
    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<Option<vk::Extent2D>>;

    fn image_count(&self) -> u32;
}

/// Scene collaborator that fills each frame's command buffer.
pub trait SceneRecorder<B: FrameBackend> {
    /// Record the frame for `image` into `cmd`. Called once per frame, after
    /// the slot's fence has signaled, so per-slot memory may be rewritten.
    fn record_into(
        &mut self,
        backend: &B,
        cmd: &B::CommandBuffer,
        image: SwapImageIndex,
        slot: FrameSlotIndex,
    ) -> RhiResult<()>;

    /// Rebuild extent-dependent state after swapchain recreation.
    fn on_resize(&mut self, backend: &B, extent: vk::Extent2D) -> RhiResult<()>;
}

/// Synchronization objects and command buffer of one frame in flight.
pub struct FrameSlot<B: FrameBackend> {
    fence: B::Fence,
    present_complete: B::Semaphore,
    render_complete: B::Semaphore,
    command_buffer: B::CommandBuffer,
    state: SlotState,
}

impl<B: FrameBackend> FrameSlot<B> {
    fn new(backend: &mut B, index: FrameSlotIndex) -> RhiResult<Self> {
        Ok(Self {
            // Signaled so the first wait on every slot returns immediately.
            fence: backend.create_fence(true)?,
            present_complete: backend.create_semaphore()?,
            render_complete: backend.create_semaphore()?,
            command_buffer: backend.command_buffer(index)?,
            state: SlotState::Idle,
        })
    }

    #[inline]
    pub fn state(&self) -> SlotState {
        self.state
    }
}

/// Why a frame produced no present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The surface has zero area.
    Minimized,
    /// Acquire reported out-of-date; the swapchain was rebuilt.
    SwapchainRecreated,
}

/// Result of one [`FrameSynchronizer::render_frame`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented {
        slot: FrameSlotIndex,
        image: SwapImageIndex,
        /// The swapchain was rebuilt after presenting.
        recreated: bool,
    },
    Skipped(SkipReason),
}

/// Counters for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    pub skipped: u64,
    pub recreations: u64,
}

/// Sequences acquire, record, submit and present over `render_ahead` slots.
pub struct FrameSynchronizer<B: FrameBackend> {
    // Slots before backend: their handles must go before the device does.
    slots: Vec<FrameSlot<B>>,
    frame_index: FrameSlotIndex,
    surface_extent: vk::Extent2D,
    resize_pending: bool,
    timeout: Timeout,
    stats: FrameStats,
    backend: B,
}

impl<B: FrameBackend> FrameSynchronizer<B> {
    /// Create `render_ahead` slots. `surface_extent` is the current window size.
    pub fn new(mut backend: B, render_ahead: u32, surface_extent: vk::Extent2D) -> RhiResult<Self> {
        if render_ahead == 0 {
            return Err(RhiError::InvalidConfig(
                "render_ahead must be at least 1".into(),
            ));
        }

        let slots = (0..render_ahead)
            .map(|i| FrameSlot::new(&mut backend, FrameSlotIndex(i)))
            .collect::<RhiResult<Vec<_>>>()?;
        info!("Frame synchronizer ready with {} frames in flight", render_ahead);

        Ok(Self {
            slots,
            frame_index: FrameSlotIndex::default(),
            surface_extent,
            resize_pending: false,
            timeout: Timeout::Infinite,
            stats: FrameStats::default(),
            backend,
        })
    }

    /// Bound the fence and acquire waits. Defaults to [`Timeout::Infinite`].
    pub fn with_timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Record a new surface size; the swapchain is rebuilt at the start of the
    /// next frame.
    pub fn request_resize(&mut self, extent: vk::Extent2D) {
        if extent != self.surface_extent {
            debug!("Resize requested: {}x{}", extent.width, extent.height);
        }
        self.surface_extent = extent;
        self.resize_pending = true;
    }

    /// Run one frame through `scene`.
    ///
    /// Swapchain invalidation is handled here and never returned as an
    /// error. Any error that is returned leaves the synchronizer unusable
    /// for further frames.
    pub fn render_frame<S>(&mut self, scene: &mut S) -> RhiResult<FrameOutcome>
    where
        S: SceneRecorder<B>,
    {
        if is_zero_area(self.surface_extent) {
            return Ok(self.skip(SkipReason::Minimized));
        }
        if self.resize_pending && !self.recreate(scene)? {
            return Ok(self.skip(SkipReason::Minimized));
        }

        let index = self.frame_index;
        let slot = &mut self.slots[index.as_usize()];

        self.backend.wait_fence(&slot.fence, self.timeout)?;
        slot.state = SlotState::Idle;

        let outcome = self
            .backend
            .acquire_next_image(&slot.present_complete, self.timeout)?;
        let (image, suboptimal) = match outcome {
            AcquireOutcome::Ready(image) => (image, false),
            AcquireOutcome::Suboptimal(image) => (image, true),
            AcquireOutcome::OutOfDate => {
                debug!(%index, "Swapchain out of date at acquire, skipping frame");
                let reason = if self.recreate(scene)? {
                    SkipReason::SwapchainRecreated
                } else {
                    SkipReason::Minimized
                };
                return Ok(self.skip(reason));
            }
        };

        let image_count = self.backend.image_count();
        if image.get() >= image_count {
            return Err(RhiError::ResourceUnavailable {
                what: "swapchain image",
                reason: format!("acquired {image} but the swapchain has {image_count} images"),
            });
        }

        slot.state = SlotState::Recording;
        self.backend.begin_commands(&slot.command_buffer)?;
        scene.record_into(&self.backend, &slot.command_buffer, image, index)?;
        self.backend.end_commands(&slot.command_buffer)?;

        // Reset only once a submit is certain to follow, so a failed
        // acquire or recording never leaves an unsignalable fence behind.
        self.backend.reset_fence(&slot.fence)?;
        self.backend.submit(
            &slot.command_buffer,
            &slot.present_complete,
            &slot.render_complete,
            &slot.fence,
        )?;
        slot.state = SlotState::Submitted;
        trace!(%index, %image, "Frame submitted");

        let status = self.backend.present(image, &slot.render_complete)?;
        self.frame_index = index.next(self.slots.len() as u32);
        self.stats.presented += 1;

        let mut recreated = false;
        if suboptimal || status.needs_recreate() {
            debug!(%index, suboptimal, ?status, "Recreating swapchain after present");
            recreated = self.recreate(scene)?;
        }

        Ok(FrameOutcome::Presented {
            slot: index,
            image,
            recreated,
        })
    }

    /// Idle the device, rebuild the swapchain and notify the scene.
    ///
    /// Returns `false` when the window or the surface has zero area; the
    /// rebuild stays pending and is retried on the next frame.
    fn recreate<S>(&mut self, scene: &mut S) -> RhiResult<bool>
    where
        S: SceneRecorder<B>,
    {
        if is_zero_area(self.surface_extent) {
            self.resize_pending = true;
            return Ok(false);
        }

        self.backend.wait_idle()?;
        for slot in &mut self.slots {
            slot.state = SlotState::Idle;
        }

        let Some(extent) = self.backend.recreate_swapchain(self.surface_extent)? else {
            // The surface can report zero area before the window does.
            debug!("Surface has zero area, swapchain recreation deferred");
            self.resize_pending = true;
            return Ok(false);
        };
        scene.on_resize(&self.backend, extent)?;
        self.resize_pending = false;
        self.stats.recreations += 1;
        info!(
            "Swapchain recreated at {}x{} ({} images)",
            extent.width,
            extent.height,
            self.backend.image_count()
        );
        Ok(true)
    }

    fn skip(&mut self, reason: SkipReason) -> FrameOutcome {
        self.stats.skipped += 1;
        FrameOutcome::Skipped(reason)
    }

    /// Slot the next frame will use.
    #[inline]
    pub fn frame_index(&self) -> FrameSlotIndex {
        self.frame_index
    }

    #[inline]
    pub fn render_ahead(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn slot_state(&self, index: FrameSlotIndex) -> Option<SlotState> {
        self.slots.get(index.as_usize()).map(FrameSlot::state)
    }

    /// Slots whose submission may still be executing.
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.state == SlotState::Submitted)
            .count()
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    #[inline]
    pub fn surface_extent(&self) -> vk::Extent2D {
        self.surface_extent
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: FrameBackend> Drop for FrameSynchronizer<B> {
    fn drop(&mut self) {
        // Fences and semaphores may still be referenced by queued work.
        if let Err(e) = self.backend.wait_idle() {
            error!("Device idle wait failed before destroying frame slots: {}", e);
        }
    }
}

fn is_zero_area(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}
