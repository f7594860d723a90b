//! Frame synchronization and glTF scene rendering.
//!
//! - [`frame`]: the backend-generic [`FrameSynchronizer`] that sequences
//!   acquire, record, submit and present over a fixed set of frame slots
//! - [`vulkan_backend`]: its implementation over the RHI
//! - [`pipeline_cache`]: descriptor layouts, sets and material pipelines
//! - [`scene_renderer`]: uploads a model and records each frame's draws
//! - [`renderer`]: [`RenderContext`] and the top-level [`Renderer`]

pub mod frame;
pub mod pipeline_cache;
pub mod renderer;
pub mod scene_renderer;
pub mod ubo;
pub mod vulkan_backend;

pub use frame::{
    FrameBackend, FrameOutcome, FrameSlotIndex, FrameStats, FrameSynchronizer, SceneRecorder,
    SkipReason, SlotState,
};
pub use renderer::{RenderContext, Renderer, RendererAssets};
pub use scene_renderer::SceneRenderer;
pub use vulkan_backend::VulkanBackend;
