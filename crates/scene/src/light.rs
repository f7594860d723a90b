//! Light definitions.

use glam::Vec3;

/// A directional light (sun-like).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels, normalized.
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.4, -1.0, -0.3).normalize(),
            color: Vec3::ONE,
            intensity: 3.0,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            direction: direction.normalize_or(Vec3::NEG_Y),
            color,
            intensity,
        }
    }

    /// Color premultiplied by intensity.
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_is_normalized() {
        let light = DirectionalLight::new(Vec3::new(0.0, -4.0, 0.0), Vec3::ONE, 1.0);
        assert!((light.direction.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_direction_falls_back_downwards() {
        let light = DirectionalLight::new(Vec3::ZERO, Vec3::ONE, 1.0);
        assert_eq!(light.direction, Vec3::NEG_Y);
    }

    #[test]
    fn radiance_scales_color() {
        let light = DirectionalLight::new(Vec3::NEG_Y, Vec3::new(1.0, 0.5, 0.0), 2.0);
        assert_eq!(light.radiance(), Vec3::new(2.0, 1.0, 0.0));
    }
}
