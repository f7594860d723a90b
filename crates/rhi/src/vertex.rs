//! Interleaved mesh vertex layout shared by every PBR pipeline.

use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

/// One mesh vertex, 48 bytes, bound at binding 0.
///
/// Shader locations: 0 position, 1 normal, 2 UV, 3 tangent (w = handedness).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
    pub tangent: Vec4,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, tex_coord: Vec2, tangent: Vec4) -> Self {
        Self {
            position,
            normal,
            tex_coord,
            tangent,
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
        let attribute = |location, format, offset: usize| vk::VertexInputAttributeDescription {
            binding: 0,
            location,
            format,
            offset: offset as u32,
        };
        [
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
            attribute(2, vk::Format::R32G32_SFLOAT, offset_of!(Self, tex_coord)),
            attribute(3, vk::Format::R32G32B32A32_SFLOAT, offset_of!(Self, tangent)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 48);
        assert_eq!(Vertex::binding_description().stride, 48);
        assert_eq!(
            Vertex::binding_description().input_rate,
            vk::VertexInputRate::VERTEX
        );
    }

    #[test]
    fn attributes_follow_field_order() {
        let attrs = Vertex::attribute_descriptions();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, [0, 12, 24, 32]);

        let locations: Vec<u32> = attrs.iter().map(|a| a.location).collect();
        assert_eq!(locations, [0, 1, 2, 3]);

        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[3].format, vk::Format::R32G32B32A32_SFLOAT);
        assert!(attrs.iter().all(|a| a.binding == 0));
    }

    #[test]
    fn vertex_bytes_round_trip_through_bytemuck() {
        let vertex = Vertex::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::Y,
            Vec2::new(0.5, 0.25),
            Vec4::new(1.0, 0.0, 0.0, -1.0),
        );
        let bytes = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 48);
        assert_eq!(*bytemuck::from_bytes::<Vertex>(bytes), vertex);
    }
}
