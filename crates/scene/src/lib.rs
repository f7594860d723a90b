//! Scene state consumed by the renderer.
//!
//! - [`Camera`] with a perspective projection and Vulkan clip conventions
//! - [`OrbitController`] for mouse-driven orbiting around a target
//! - [`DirectionalLight`]

pub mod camera;
pub mod light;

pub use camera::{Camera, OrbitController};
pub use light::DirectionalLight;

use glam::Mat4;

/// Everything the renderer reads from the scene for one frame.
#[derive(Clone, Debug, Default)]
pub struct SceneView {
    pub camera: Camera,
    pub light: DirectionalLight,
    /// Transform applied to the whole model.
    pub model_transform: Mat4,
}
