//! Uniform and push-constant layouts shared with `shaders/pbr.{vert,frag}`.
//!
//! All structures use `#[repr(C)]` with only 16-byte members, so the Rust
//! layout equals std140 for uniforms and std430 for push constants without
//! explicit padding.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use vkpbr_resources::{AlphaMode, Material};
use vkpbr_scene::{Camera, DirectionalLight};

/// Per-frame data, set 0 binding 0.
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: view-projection matrix (64 bytes)
/// - Offset 192: camera position, w unused (16 bytes)
/// - Offset 208: light direction, w unused (16 bytes)
/// - Offset 224: light radiance, w unused (16 bytes)
/// - Total size: 240 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct FrameUbo {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub camera_position: Vec4,
    pub light_direction: Vec4,
    pub light_radiance: Vec4,
}

impl FrameUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(camera: &Camera, light: &DirectionalLight) -> Self {
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        Self {
            view,
            projection,
            view_projection: projection * view,
            camera_position: camera.position.extend(1.0),
            light_direction: light.direction.extend(0.0),
            light_radiance: light.radiance().extend(0.0),
        }
    }
}

/// Per-draw constants pushed before each mesh.
///
/// # Memory Layout
///
/// - Offset 0: model matrix (64 bytes)
/// - Offset 64: base color factor (16 bytes)
/// - Offset 80: emissive factor xyz, alpha cutoff w (16 bytes)
/// - Offset 96: metallic, roughness, normal scale, occlusion strength (16 bytes)
/// - Total size: 112 bytes, inside the guaranteed 128-byte minimum
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct DrawConstants {
    pub model: Mat4,
    pub base_color: Vec4,
    /// `w` is the alpha cutoff; negative disables alpha testing.
    pub emissive_cutoff: Vec4,
    pub factors: Vec4,
}

impl DrawConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new(model: Mat4, material: &Material) -> Self {
        let cutoff = match material.alpha_mode {
            AlphaMode::Mask => material.alpha_cutoff,
            AlphaMode::Opaque | AlphaMode::Blend => -1.0,
        };
        // Opaque surfaces ignore the base color alpha.
        let base_color = match material.alpha_mode {
            AlphaMode::Opaque => material.base_color.truncate().extend(1.0),
            AlphaMode::Mask | AlphaMode::Blend => material.base_color,
        };
        Self {
            model,
            base_color,
            emissive_cutoff: material.emissive.extend(cutoff),
            factors: Vec4::new(
                material.metallic,
                material.roughness,
                material.normal_scale,
                material.occlusion_strength,
            ),
        }
    }

    pub fn emissive(&self) -> Vec3 {
        self.emissive_cutoff.truncate()
    }
}
