//! Vulkan render hardware interface.
//!
//! Thin RAII wrappers over `ash` for everything the frame loop touches:
//! instance and surface, physical device selection, the logical device and
//! its allocator, the swapchain, command buffers, synchronization primitives
//! and the resources a PBR renderer binds (buffers, textures, descriptors,
//! pipelines).
//!
//! Every wrapper holds an `Arc<Device>` (and the device an `Arc<Instance>`),
//! so dependents are always destroyed before the objects they were created
//! from. Teardown order follows from ownership alone.

mod error;

pub mod allocator;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult, Severity};

pub use ash::vk;
