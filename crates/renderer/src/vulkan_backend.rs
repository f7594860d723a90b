//! [`FrameBackend`] over the real device, swapchain and command buffers.

use std::sync::Arc;

use tracing::debug;
use vkpbr_rhi::command::{CommandBuffer, CommandBufferSet};
use vkpbr_rhi::device::Device;
use vkpbr_rhi::swapchain::{AcquireOutcome, Rebuild, SwapImageIndex, Swapchain, SwapchainStatus};
use vkpbr_rhi::sync::{Fence, Semaphore, Timeout};
use vkpbr_rhi::{RhiResult, vk};

use crate::frame::{FrameBackend, FrameSlotIndex};

/// Stage at which a submission waits for its acquired image.
const ACQUIRE_WAIT_STAGE: vk::PipelineStageFlags = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;

pub struct VulkanBackend {
    commands: CommandBufferSet,
    swapchain: Swapchain,
    device: Arc<Device>,
}

impl VulkanBackend {
    pub fn new(device: Arc<Device>, swapchain: Swapchain, commands: CommandBufferSet) -> Self {
        Self {
            commands,
            swapchain,
            device,
        }
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }
}

impl FrameBackend for VulkanBackend {
    type Fence = Fence;
    type Semaphore = Semaphore;
    type CommandBuffer = CommandBuffer;

    fn create_fence(&mut self, signaled: bool) -> RhiResult<Fence> {
        Fence::new(self.device.clone(), signaled)
    }

    fn create_semaphore(&mut self) -> RhiResult<Semaphore> {
        Semaphore::new(self.device.clone())
    }

    fn command_buffer(&mut self, slot: FrameSlotIndex) -> RhiResult<CommandBuffer> {
        self.commands.frame(slot.as_usize()).cloned()
    }

    fn wait_fence(&mut self, fence: &Fence, timeout: Timeout) -> RhiResult<()> {
        fence.wait(timeout)
    }

    fn reset_fence(&mut self, fence: &Fence) -> RhiResult<()> {
        fence.reset()
    }

    fn acquire_next_image(
        &mut self,
        signal: &Semaphore,
        timeout: Timeout,
    ) -> RhiResult<AcquireOutcome> {
        self.swapchain.acquire_next_image(signal.handle(), timeout)
    }

    fn begin_commands(&mut self, cmd: &CommandBuffer) -> RhiResult<()> {
        cmd.reset()?;
        cmd.begin()
    }

    fn end_commands(&mut self, cmd: &CommandBuffer) -> RhiResult<()> {
        cmd.end()
    }

    fn submit(
        &mut self,
        cmd: &CommandBuffer,
        wait: &Semaphore,
        signal: &Semaphore,
        fence: &Fence,
    ) -> RhiResult<()> {
        let wait_semaphores = [wait.handle()];
        let wait_stages = [ACQUIRE_WAIT_STAGE];
        let command_buffers = [cmd.handle()];
        let signal_semaphores = [signal.handle()];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the synchronizer ends recording before submit and resets
        // the fence immediately beforehand.
        unsafe {
            self.device
                .submit_graphics(std::slice::from_ref(&submit), fence.handle())
        }
    }

    fn present(&mut self, image: SwapImageIndex, wait: &Semaphore) -> RhiResult<SwapchainStatus> {
        self.swapchain
            .present(self.device.present_queue(), image, wait.handle())
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<Option<vk::Extent2D>> {
        if self.swapchain.recreate(extent)? == Rebuild::Deferred {
            return Ok(None);
        }
        let actual = self.swapchain.extent();
        debug!(
            "Swapchain extent {}x{} (requested {}x{})",
            actual.width, actual.height, extent.width, extent.height
        );
        Ok(Some(actual))
    }

    fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }
}
