//! Attachment descriptions for `vkCmdBeginRendering`.
//!
//! A frame renders into one color attachment, optionally multisampled and
//! resolved into the swapchain image, plus one depth attachment. The
//! [`RenderingInfoBundle`] owns the attachment infos so the borrowed
//! `vk::RenderingInfo` cannot outlive them.

use ash::vk;

/// Color target of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorTarget {
    pub view: vk::ImageView,
    /// Single-sample view the color target is averaged into, if multisampled.
    pub resolve: Option<vk::ImageView>,
}

/// Depth target of a frame; the stencil aspect is cleared along with depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthTarget {
    pub view: vk::ImageView,
    pub has_stencil: bool,
}

/// Everything `vkCmdBeginRendering` needs for one frame.
#[derive(Clone, Copy, Debug)]
pub struct RenderTargets {
    pub extent: vk::Extent2D,
    pub color: ColorTarget,
    pub depth: Option<DepthTarget>,
    pub clear_color: [f32; 4],
}

impl RenderTargets {
    pub fn build(&self) -> RenderingInfoBundle {
        let mut color = vk::RenderingAttachmentInfo::default()
            .image_view(self.color.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            });
        color = match self.color.resolve {
            // The multisampled contents are only needed until resolved.
            Some(resolve) => color
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .resolve_mode(vk::ResolveModeFlags::AVERAGE)
                .resolve_image_view(resolve)
                .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            None => color.store_op(vk::AttachmentStoreOp::STORE),
        };

        let depth_info = |view| {
            vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                })
        };
        let depth = self.depth.map(|target| depth_info(target.view));
        let stencil = self
            .depth
            .filter(|target| target.has_stencil)
            .map(|target| depth_info(target.view));

        RenderingInfoBundle {
            color: [color],
            depth,
            stencil,
            render_area: vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: self.extent,
            },
        }
    }
}

/// Owned backing storage for a `vk::RenderingInfo`.
pub struct RenderingInfoBundle {
    color: [vk::RenderingAttachmentInfo<'static>; 1],
    depth: Option<vk::RenderingAttachmentInfo<'static>>,
    stencil: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color);
        if let Some(depth) = &self.depth {
            info = info.depth_attachment(depth);
        }
        if let Some(stencil) = &self.stencil {
            info = info.stencil_attachment(stencil);
        }
        info
    }

    #[inline]
    pub fn color_attachment(&self) -> &vk::RenderingAttachmentInfo<'static> {
        &self.color[0]
    }

    #[inline]
    pub fn depth_attachment(&self) -> Option<&vk::RenderingAttachmentInfo<'static>> {
        self.depth.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn targets(resolve: bool, has_stencil: bool) -> RenderTargets {
        RenderTargets {
            extent: vk::Extent2D {
                width: 640,
                height: 480,
            },
            color: ColorTarget {
                view: vk::ImageView::from_raw(1),
                resolve: resolve.then(|| vk::ImageView::from_raw(2)),
            },
            depth: Some(DepthTarget {
                view: vk::ImageView::from_raw(3),
                has_stencil,
            }),
            clear_color: [0.1, 0.2, 0.3, 1.0],
        }
    }

    #[test]
    fn single_sample_color_is_stored() {
        let bundle = targets(false, false).build();
        let color = bundle.color_attachment();
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.resolve_mode, vk::ResolveModeFlags::NONE);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
    }

    #[test]
    fn multisampled_color_resolves_into_target() {
        let bundle = targets(true, false).build();
        let color = bundle.color_attachment();
        assert_eq!(color.resolve_mode, vk::ResolveModeFlags::AVERAGE);
        assert_eq!(color.resolve_image_view, vk::ImageView::from_raw(2));
        assert_eq!(color.store_op, vk::AttachmentStoreOp::DONT_CARE);
    }

    #[test]
    fn stencil_follows_depth_format() {
        let with_stencil = targets(false, true).build();
        let info = with_stencil.info();
        assert!(!info.p_stencil_attachment.is_null());
        assert!(!info.p_depth_attachment.is_null());

        let without = targets(false, false).build();
        assert!(without.info().p_stencil_attachment.is_null());
        assert_eq!(without.info().render_area.extent.width, 640);
        assert_eq!(without.info().color_attachment_count, 1);
    }
}
