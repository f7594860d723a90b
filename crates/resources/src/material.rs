//! PBR metallic-roughness materials.

use glam::{Vec3, Vec4};

/// How a material's alpha channel is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlphaMode {
    /// Alpha is ignored.
    #[default]
    Opaque,
    /// Fragments below the cutoff are discarded.
    Mask,
    /// Alpha blended over what is already drawn.
    Blend,
}

impl From<gltf::material::AlphaMode> for AlphaMode {
    fn from(mode: gltf::material::AlphaMode) -> Self {
        match mode {
            gltf::material::AlphaMode::Opaque => Self::Opaque,
            gltf::material::AlphaMode::Mask => Self::Mask,
            gltf::material::AlphaMode::Blend => Self::Blend,
        }
    }
}

/// Reference to an entry of [`Model::images`](crate::Model::images).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureRef {
    pub image: usize,
    /// Texture coordinate set. Only set 0 is loaded.
    pub tex_coord: u32,
}

/// PBR material properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: Option<String>,
    /// Base color (albedo), linear.
    pub base_color: Vec4,
    /// Metallic factor (0.0 = dielectric, 1.0 = metal)
    pub metallic: f32,
    /// Roughness factor (0.0 = smooth, 1.0 = rough)
    pub roughness: f32,
    pub normal_scale: f32,
    pub occlusion_strength: f32,
    pub emissive: Vec3,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,

    /// sRGB.
    pub base_color_texture: Option<TextureRef>,
    /// Linear; metalness in B, roughness in G.
    pub metallic_roughness_texture: Option<TextureRef>,
    /// Linear, tangent space.
    pub normal_texture: Option<TextureRef>,
    /// Linear, R channel.
    pub occlusion_texture: Option<TextureRef>,
    /// sRGB.
    pub emissive_texture: Option<TextureRef>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            base_color: Vec4::ONE,
            metallic: 1.0,
            roughness: 1.0,
            normal_scale: 1.0,
            occlusion_strength: 1.0,
            emissive: Vec3::ZERO,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            base_color_texture: None,
            metallic_roughness_texture: None,
            normal_texture: None,
            occlusion_texture: None,
            emissive_texture: None,
        }
    }
}

impl Material {
    pub(crate) fn from_gltf(material: &gltf::Material<'_>) -> Self {
        let pbr = material.pbr_metallic_roughness();
        let texture_ref = |texture: gltf::Texture<'_>, tex_coord: u32| TextureRef {
            image: texture.source().index(),
            tex_coord,
        };

        Self {
            name: material.name().map(str::to_owned),
            base_color: Vec4::from_array(pbr.base_color_factor()),
            metallic: pbr.metallic_factor(),
            roughness: pbr.roughness_factor(),
            normal_scale: material.normal_texture().map_or(1.0, |t| t.scale()),
            occlusion_strength: material.occlusion_texture().map_or(1.0, |t| t.strength()),
            emissive: Vec3::from_array(material.emissive_factor()),
            alpha_mode: material.alpha_mode().into(),
            alpha_cutoff: material.alpha_cutoff().unwrap_or(0.5),
            double_sided: material.double_sided(),
            base_color_texture: pbr
                .base_color_texture()
                .map(|info| texture_ref(info.texture(), info.tex_coord())),
            metallic_roughness_texture: pbr
                .metallic_roughness_texture()
                .map(|info| texture_ref(info.texture(), info.tex_coord())),
            normal_texture: material
                .normal_texture()
                .map(|t| texture_ref(t.texture(), t.tex_coord())),
            occlusion_texture: material
                .occlusion_texture()
                .map(|t| texture_ref(t.texture(), t.tex_coord())),
            emissive_texture: material
                .emissive_texture()
                .map(|info| texture_ref(info.texture(), info.tex_coord())),
        }
    }

    /// Whether this material needs the alpha-blended pass.
    pub fn is_blended(&self) -> bool {
        self.alpha_mode == AlphaMode::Blend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_gltf() {
        let material = Material::default();
        assert_eq!(material.base_color, Vec4::ONE);
        assert_eq!(material.metallic, 1.0);
        assert_eq!(material.roughness, 1.0);
        assert_eq!(material.alpha_cutoff, 0.5);
        assert_eq!(material.alpha_mode, AlphaMode::Opaque);
        assert!(!material.double_sided);
    }

    #[test]
    fn alpha_modes_order_as_drawn() {
        assert!(AlphaMode::Opaque < AlphaMode::Mask);
        assert!(AlphaMode::Mask < AlphaMode::Blend);
    }
}
