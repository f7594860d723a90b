//! Camera and orbit controls.

use glam::{Mat4, Vec2, Vec3};

/// Perspective camera looking from `position` towards `target`.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y: 45.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the aspect ratio from a framebuffer size. Zero sizes are ignored.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Projection matrix with Vulkan's inverted Y clip axis.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    /// Place the camera so a sphere of `radius` around `center` fills the view.
    pub fn frame_bounds(&mut self, min: Vec3, max: Vec3) {
        let center = (min + max) * 0.5;
        let radius = ((max - min).length() * 0.5).max(0.01);
        let distance = radius / (self.fov_y * 0.5).sin();

        self.target = center;
        self.position = center + Vec3::Z * distance;
        self.near = (distance - radius).max(distance * 0.001).max(0.001);
        self.far = distance + radius * 4.0;
    }
}

/// Orbits a [`Camera`] around its target using spherical coordinates.
#[derive(Clone, Debug)]
pub struct OrbitController {
    /// Rotation around the world Y axis, radians.
    pub yaw: f32,
    /// Elevation above the XZ plane, radians.
    pub pitch: f32,
    pub distance: f32,
    /// Radians per pixel of drag.
    pub rotate_speed: f32,
    /// Fraction of distance per wheel line.
    pub zoom_speed: f32,
    pub min_distance: f32,
}

impl Default for OrbitController {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            distance: 5.0,
            rotate_speed: 0.005,
            zoom_speed: 0.1,
            min_distance: 0.01,
        }
    }
}

impl OrbitController {
    const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

    /// Start orbiting from the camera's current placement.
    pub fn from_camera(camera: &Camera) -> Self {
        let offset = camera.position - camera.target;
        let distance = offset.length().max(Self::default().min_distance);
        Self {
            yaw: offset.x.atan2(offset.z),
            pitch: (offset.y / distance).clamp(-1.0, 1.0).asin(),
            distance,
            ..Self::default()
        }
    }

    /// Apply a mouse drag in pixels.
    pub fn rotate(&mut self, delta: Vec2) {
        self.yaw -= delta.x * self.rotate_speed;
        self.pitch = (self.pitch + delta.y * self.rotate_speed)
            .clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
    }

    /// Apply scroll wheel lines; positive zooms in.
    pub fn zoom(&mut self, lines: f32) {
        let factor = (1.0 - lines * self.zoom_speed).max(0.1);
        self.distance = (self.distance * factor).max(self.min_distance);
    }

    /// Write the orbit position into `camera`.
    pub fn apply(&self, camera: &mut Camera) {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        let offset = Vec3::new(sin_yaw * cos_pitch, sin_pitch, cos_yaw * cos_pitch) * self.distance;
        camera.position = camera.target + offset;
    }
}
