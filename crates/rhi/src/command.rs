//! Command pools, command buffers and the per-frame command buffer set.
//!
//! [`CommandBufferSet`] allocates one primary buffer per frame in flight up
//! front, plus one "immediate" buffer created on first use for blocking
//! one-shot transfers at load time (staging copies, texture uploads, mip
//! generation). The immediate path waits for the graphics queue to go idle
//! and must never run inside the per-frame loop.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Owned `VkCommandPool`; buffers allocated from it are freed with it.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe {
            device
                .handle()
                .create_command_pool(&create_info, device.callbacks())
                .map_err(RhiError::vk("vkCreateCommandPool"))?
        };
        debug!("Command pool created for queue family {}", queue_family_index);

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocate `count` primary command buffers.
    pub fn allocate(&self, count: u32) -> RhiResult<Vec<CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe {
            self.device
                .handle()
                .allocate_command_buffers(&alloc_info)
                .map_err(RhiError::vk("vkAllocateCommandBuffers"))?
        };
        Ok(buffers
            .into_iter()
            .map(|buffer| CommandBuffer::from_handle(self.device.clone(), buffer))
            .collect())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_command_pool(self.pool, self.device.callbacks());
        }
        debug!("Command pool destroyed");
    }
}

/// Recording wrapper around a `VkCommandBuffer`.
///
/// Does not own the handle: it is freed when its [`CommandPool`] is destroyed.
#[derive(Clone)]
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn from_handle(device: Arc<Device>, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Begin a one-time-submit recording.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)
                .map_err(RhiError::vk("vkBeginCommandBuffer"))
        }
    }

    pub fn end(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .end_command_buffer(self.buffer)
                .map_err(RhiError::vk("vkEndCommandBuffer"))
        }
    }

    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())
                .map_err(RhiError::vk("vkResetCommandBuffer"))
        }
    }

    // Dynamic rendering

    pub fn begin_rendering(&self, rendering_info: &vk::RenderingInfo) {
        unsafe {
            self.device
                .handle()
                .cmd_begin_rendering(self.buffer, rendering_info);
        }
    }

    pub fn end_rendering(&self) {
        unsafe {
            self.device.handle().cmd_end_rendering(self.buffer);
        }
    }

    // Binding

    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_vertex_buffers(self.buffer, 0, &[buffer], &[0]);
        }
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer, index_type: vk::IndexType) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_index_buffer(self.buffer, buffer, 0, index_type);
        }
    }

    pub fn bind_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                descriptor_sets,
                &[],
            );
        }
    }

    /// Push a plain-data constant block.
    pub fn push_constants<T: bytemuck::Pod>(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &T,
    ) {
        unsafe {
            self.device.handle().cmd_push_constants(
                self.buffer,
                layout,
                stages,
                0,
                bytemuck::bytes_of(data),
            );
        }
    }

    // Dynamic state

    /// Full-extent viewport and scissor.
    pub fn set_viewport_and_scissor(&self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };
        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, std::slice::from_ref(&viewport));
            self.device
                .handle()
                .cmd_set_scissor(self.buffer, 0, std::slice::from_ref(&scissor));
        }
    }

    // Drawing

    pub fn draw_indexed(&self, index_count: u32, first_index: u32, vertex_offset: i32) {
        unsafe {
            self.device.handle().cmd_draw_indexed(
                self.buffer,
                index_count,
                1,
                first_index,
                vertex_offset,
                0,
            );
        }
    }

    // Transfer

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy::default().size(size);
        unsafe {
            self.device
                .handle()
                .cmd_copy_buffer(self.buffer, src, dst, std::slice::from_ref(&region));
        }
    }

    /// Copy tightly packed texels into mip level 0 of a color image in
    /// `TRANSFER_DST_OPTIMAL`.
    pub fn copy_buffer_to_image(&self, src: vk::Buffer, dst: vk::Image, extent: vk::Extent2D) {
        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .layer_count(1),
            )
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });
        unsafe {
            self.device.handle().cmd_copy_buffer_to_image(
                self.buffer,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
            );
        }
    }

    pub fn blit_image(&self, image: vk::Image, blit: &vk::ImageBlit) {
        unsafe {
            self.device.handle().cmd_blit_image(
                self.buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(blit),
                vk::Filter::LINEAR,
            );
        }
    }

    // Synchronization

    /// Record a layout transition using synchronization2 barriers.
    pub fn transition_image(
        &self,
        image: vk::Image,
        range: vk::ImageSubresourceRange,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        self.layout_barrier(
            image,
            range,
            (old_layout, LayoutAccess::of(old_layout)),
            (new_layout, LayoutAccess::of(new_layout)),
        );
    }

    /// Move an attachment that is reused every frame into `layout`,
    /// discarding its contents.
    ///
    /// The source scope is the attachment's own stage, so the barrier orders
    /// after the previous frame's use of the same image and after a
    /// semaphore wait at that stage.
    pub fn discard_into_layout(
        &self,
        image: vk::Image,
        range: vk::ImageSubresourceRange,
        layout: vk::ImageLayout,
    ) {
        let access = LayoutAccess::of(layout);
        self.layout_barrier(
            image,
            range,
            (vk::ImageLayout::UNDEFINED, access),
            (layout, access),
        );
    }

    fn layout_barrier(
        &self,
        image: vk::Image,
        range: vk::ImageSubresourceRange,
        (old_layout, src): (vk::ImageLayout, LayoutAccess),
        (new_layout, dst): (vk::ImageLayout, LayoutAccess),
    ) {
        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(src.stage)
            .src_access_mask(src.access)
            .dst_stage_mask(dst.stage)
            .dst_access_mask(dst.access)
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(range);
        let dependency =
            vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));
        unsafe {
            self.device
                .handle()
                .cmd_pipeline_barrier2(self.buffer, &dependency);
        }
    }
}

/// Stage and access scope associated with an image layout on either side of
/// a barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutAccess {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl LayoutAccess {
    pub fn of(layout: vk::ImageLayout) -> Self {
        let (stage, access) = match layout {
            vk::ImageLayout::UNDEFINED => {
                (vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE)
            }
            vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_WRITE,
            ),
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL => (
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_READ,
            ),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
                vk::PipelineStageFlags2::FRAGMENT_SHADER,
                vk::AccessFlags2::SHADER_SAMPLED_READ,
            ),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::COLOR_ATTACHMENT_READ
                    | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            ),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            | vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL => (
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ),
            vk::ImageLayout::PRESENT_SRC_KHR => (
                vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
                vk::AccessFlags2::NONE,
            ),
            _ => (
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
            ),
        };
        Self { stage, access }
    }
}

/// Per-frame primary command buffers plus the lazily created immediate buffer.
pub struct CommandBufferSet {
    frames: Vec<CommandBuffer>,
    immediate: Option<CommandBuffer>,
    recording_immediate: bool,
    pool: CommandPool,
}

impl CommandBufferSet {
    /// Allocate `frame_count` primary buffers on the graphics queue family.
    pub fn new(device: Arc<Device>, frame_count: u32) -> RhiResult<Self> {
        let pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let frames = pool.allocate(frame_count)?;
        info!("Allocated {} per-frame command buffers", frames.len());

        Ok(Self {
            frames,
            immediate: None,
            recording_immediate: false,
            pool,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Command buffer for frame slot `index`.
    pub fn frame(&self, index: usize) -> RhiResult<&CommandBuffer> {
        self.frames
            .get(index)
            .ok_or_else(|| RhiError::ResourceUnavailable {
                what: "frame command buffer",
                reason: format!("slot {index} out of {}", self.frames.len()),
            })
    }

    /// Begin recording the immediate buffer, creating it on first use.
    pub fn immediately_begin(&mut self) -> RhiResult<&CommandBuffer> {
        if self.recording_immediate {
            return Err(RhiError::ResourceUnavailable {
                what: "immediate command buffer",
                reason: "already recording".into(),
            });
        }

        let buffer = match self.immediate.take() {
            Some(buffer) => buffer,
            None => {
                let buffer = self.pool.allocate(1)?.pop().ok_or(RhiError::Vulkan {
                    call: "vkAllocateCommandBuffers",
                    result: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
                })?;
                debug!("Immediate command buffer created");
                buffer
            }
        };
        let buffer = &*self.immediate.insert(buffer);
        buffer.reset()?;
        buffer.begin()?;
        self.recording_immediate = true;
        Ok(buffer)
    }

    /// Submit the immediate buffer and block until the graphics queue is idle.
    pub fn immediately_end_and_submit(&mut self) -> RhiResult<()> {
        let buffer = match (&self.immediate, self.recording_immediate) {
            (Some(buffer), true) => buffer,
            _ => {
                return Err(RhiError::ResourceUnavailable {
                    what: "immediate command buffer",
                    reason: "not recording".into(),
                });
            }
        };
        self.recording_immediate = false;
        buffer.end()?;

        let device = buffer.device();
        let command_buffers = [buffer.handle()];
        let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
        unsafe { device.submit_graphics(std::slice::from_ref(&submit), vk::Fence::null())? };
        device.queue_wait_idle(device.graphics_queue())
    }

    /// Record with `record` into the immediate buffer, then submit and wait.
    pub fn immediately<F>(&mut self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        let buffer = self.immediately_begin()?;
        record(buffer);
        self.immediately_end_and_submit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn command_types_are_send_sync() {
        assert_send_sync::<CommandBuffer>();
        assert_send_sync::<CommandPool>();
        assert_send_sync::<CommandBufferSet>();
    }

    #[test]
    fn upload_transition_scopes() {
        let src = LayoutAccess::of(vk::ImageLayout::UNDEFINED);
        let dst = LayoutAccess::of(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(src.stage, vk::PipelineStageFlags2::TOP_OF_PIPE);
        assert_eq!(src.access, vk::AccessFlags2::NONE);
        assert_eq!(dst.stage, vk::PipelineStageFlags2::TRANSFER);
        assert!(dst.access.contains(vk::AccessFlags2::TRANSFER_WRITE));
    }

    #[test]
    fn present_transition_waits_for_color_output() {
        let src = LayoutAccess::of(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let dst = LayoutAccess::of(vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(src.stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert!(src.access.contains(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE));
        assert_eq!(dst.access, vk::AccessFlags2::NONE);
    }

    #[test]
    fn unknown_layouts_use_full_barrier() {
        let scope = LayoutAccess::of(vk::ImageLayout::GENERAL);
        assert_eq!(scope.stage, vk::PipelineStageFlags2::ALL_COMMANDS);
    }
}
