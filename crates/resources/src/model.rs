//! Model and mesh loading from glTF files.

use std::path::Path;

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use gltf::image::Format;
use image::{DynamicImage, ImageBuffer, Luma, Rgb, Rgba};
use tracing::{debug, info, warn};

use crate::error::{ResourceError, ResourceResult};
use crate::material::Material;

/// Default tangent when the source has none: +X, right-handed.
const DEFAULT_TANGENT: Vec4 = Vec4::new(1.0, 0.0, 0.0, 1.0);

/// One triangle-list primitive with its world transform applied.
///
/// All attribute vectors have the same length as `positions`.
#[derive(Debug, Default, Clone)]
pub struct Mesh {
    pub name: Option<String>,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tex_coords: Vec<Vec2>,
    pub tangents: Vec<Vec4>,
    pub indices: Vec<u32>,
    /// Index into [`Model::materials`].
    pub material: usize,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Decoded texture pixels, always tightly packed RGBA8.
#[derive(Debug, Clone)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A model containing one or more meshes.
#[derive(Debug, Default)]
pub struct Model {
    /// Meshes in declaration order.
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub images: Vec<TextureImage>,
    /// Axis-aligned bounding box minimum
    pub aabb_min: Vec3,
    /// Axis-aligned bounding box maximum
    pub aabb_max: Vec3,
}

impl Model {
    /// Load a model from a `.gltf` or `.glb` file, resolving external buffers
    /// and images relative to it.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }
        let source_name = path.display().to_string();
        info!("Loading glTF model {}", source_name);

        let (document, buffers, images) =
            gltf::import(path).map_err(|source| ResourceError::Gltf {
                source_name: source_name.clone(),
                source,
            })?;
        Self::from_document(&source_name, &document, &buffers, &images)
    }

    /// Load a self-contained model (GLB, or glTF with data URIs) from memory.
    pub fn from_slice(source_name: &str, bytes: &[u8]) -> ResourceResult<Self> {
        let (document, buffers, images) =
            gltf::import_slice(bytes).map_err(|source| ResourceError::Gltf {
                source_name: source_name.to_owned(),
                source,
            })?;
        Self::from_document(source_name, &document, &buffers, &images)
    }

    fn from_document(
        source_name: &str,
        document: &gltf::Document,
        buffers: &[gltf::buffer::Data],
        images: &[gltf::image::Data],
    ) -> ResourceResult<Self> {
        let mut loader = Loader {
            buffers,
            materials: document.materials().map(|m| Material::from_gltf(&m)).collect(),
            default_material: None,
            meshes: Vec::new(),
        };

        match document.default_scene().or_else(|| document.scenes().next()) {
            Some(scene) => {
                for node in scene.nodes() {
                    loader.visit_node(&node, Mat4::IDENTITY)?;
                }
            }
            None => {
                for mesh in document.meshes() {
                    loader.load_mesh(&mesh, Mat4::IDENTITY)?;
                }
            }
        }

        if loader.meshes.is_empty() {
            return Err(ResourceError::NoMeshes(source_name.to_owned()));
        }

        let images = images
            .iter()
            .enumerate()
            .map(|(index, data)| to_rgba8(index, data))
            .collect::<ResourceResult<Vec<_>>>()?;

        let (aabb_min, aabb_max) = bounds(&loader.meshes);
        let model = Self {
            meshes: loader.meshes,
            materials: loader.materials,
            images,
            aabb_min,
            aabb_max,
        };
        info!(
            "Loaded {}: {} meshes, {} vertices, {} triangles, {} materials, {} images",
            source_name,
            model.meshes.len(),
            model.total_vertex_count(),
            model.total_triangle_count(),
            model.materials.len(),
            model.images.len()
        );
        Ok(model)
    }

    pub fn total_vertex_count(&self) -> usize {
        self.meshes.iter().map(Mesh::vertex_count).sum()
    }

    pub fn total_triangle_count(&self) -> usize {
        self.meshes.iter().map(Mesh::triangle_count).sum()
    }

    pub fn material(&self, mesh: &Mesh) -> &Material {
        &self.materials[mesh.material]
    }
}

struct Loader<'a> {
    buffers: &'a [gltf::buffer::Data],
    materials: Vec<Material>,
    /// Appended on first use by a primitive without a material.
    default_material: Option<usize>,
    meshes: Vec<Mesh>,
}

impl Loader<'_> {
    fn visit_node(&mut self, node: &gltf::Node<'_>, parent: Mat4) -> ResourceResult<()> {
        let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
        if let Some(mesh) = node.mesh() {
            self.load_mesh(&mesh, world)?;
        }
        for child in node.children() {
            self.visit_node(&child, world)?;
        }
        Ok(())
    }

    fn load_mesh(&mut self, mesh: &gltf::Mesh<'_>, world: Mat4) -> ResourceResult<()> {
        let name = mesh.name().map(str::to_owned);
        let normal_matrix = Mat3::from_mat4(world).inverse().transpose();
        let mirrored = world.determinant() < 0.0;

        for (primitive_index, primitive) in mesh.primitives().enumerate() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                warn!(
                    "Skipping {:?} primitive {} of mesh {:?}",
                    primitive.mode(),
                    primitive_index,
                    name
                );
                continue;
            }

            let buffers = self.buffers;
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| &d.0[..]));

            let positions: Vec<Vec3> = reader
                .read_positions()
                .ok_or_else(|| ResourceError::NoPositionData {
                    mesh: name.clone().unwrap_or_default(),
                    primitive: primitive_index,
                })?
                .map(|p| world.transform_point3(Vec3::from_array(p)))
                .collect();
            let vertex_count = positions.len();

            let mut indices: Vec<u32> = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..vertex_count as u32).collect(),
            };
            indices.truncate(indices.len() - indices.len() % 3);
            if mirrored {
                for triangle in indices.chunks_exact_mut(3) {
                    triangle.swap(1, 2);
                }
            }

            let normals = match reader.read_normals() {
                Some(normals) => normals
                    .map(|n| (normal_matrix * Vec3::from_array(n)).normalize_or_zero())
                    .collect(),
                None => {
                    debug!("Mesh {:?} has no normals, generating", name);
                    generate_normals(&positions, &indices)
                }
            };
            let tex_coords = match reader.read_tex_coords(0) {
                Some(coords) => coords.into_f32().map(Vec2::from_array).collect(),
                None => vec![Vec2::ZERO; vertex_count],
            };
            let tangents = match reader.read_tangents() {
                Some(tangents) => tangents
                    .map(|t| {
                        let xyz = world.transform_vector3(Vec3::new(t[0], t[1], t[2]));
                        xyz.normalize_or(Vec3::X).extend(t[3])
                    })
                    .collect(),
                None => vec![DEFAULT_TANGENT; vertex_count],
            };

            let material = match primitive.material().index() {
                Some(index) => index,
                None => self.default_material(),
            };

            self.meshes.push(Mesh {
                name: name.clone(),
                positions,
                normals,
                tex_coords,
                tangents,
                indices,
                material,
            });
        }
        Ok(())
    }

    fn default_material(&mut self) -> usize {
        if let Some(index) = self.default_material {
            return index;
        }
        self.materials.push(Material::default());
        let index = self.materials.len() - 1;
        self.default_material = Some(index);
        index
    }
}

/// Area-weighted smooth normals.
fn generate_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals
        .into_iter()
        .map(|n| n.normalize_or(Vec3::Y))
        .collect()
}

fn bounds(meshes: &[Mesh]) -> (Vec3, Vec3) {
    let mut points = meshes.iter().flat_map(|m| m.positions.iter().copied());
    let Some(first) = points.next() else {
        return (Vec3::ZERO, Vec3::ZERO);
    };
    points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)))
}

fn to_rgba8(index: usize, data: &gltf::image::Data) -> ResourceResult<TextureImage> {
    let (width, height) = (data.width, data.height);
    let pixel_count = width as usize * height as usize;
    let size_error = |channels: usize| ResourceError::ImageSize {
        index,
        expected: pixel_count * channels,
        actual: data.pixels.len(),
    };

    let image = match data.format {
        Format::R8 => ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data.pixels.clone())
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| size_error(1))?,
        Format::R8G8 => {
            // Two-channel data is not luminance-alpha; keep R and G in place.
            if data.pixels.len() != pixel_count * 2 {
                return Err(size_error(2));
            }
            let pixels = data
                .pixels
                .chunks_exact(2)
                .flat_map(|rg| [rg[0], rg[1], 0, u8::MAX])
                .collect();
            return Ok(TextureImage {
                width,
                height,
                pixels,
            });
        }
        Format::R8G8B8 => ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, data.pixels.clone())
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| size_error(3))?,
        Format::R8G8B8A8 => {
            ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, data.pixels.clone())
                .map(DynamicImage::ImageRgba8)
                .ok_or_else(|| size_error(4))?
        }
        Format::R16 => ImageBuffer::<Luma<u16>, _>::from_raw(width, height, ne_u16(&data.pixels))
            .map(DynamicImage::ImageLuma16)
            .ok_or_else(|| size_error(2))?,
        Format::R16G16B16 => {
            ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, ne_u16(&data.pixels))
                .map(DynamicImage::ImageRgb16)
                .ok_or_else(|| size_error(6))?
        }
        Format::R16G16B16A16 => {
            ImageBuffer::<Rgba<u16>, _>::from_raw(width, height, ne_u16(&data.pixels))
                .map(DynamicImage::ImageRgba16)
                .ok_or_else(|| size_error(8))?
        }
        other => {
            return Err(ResourceError::UnsupportedImageFormat {
                index,
                format: format!("{other:?}"),
            });
        }
    };

    Ok(TextureImage {
        width,
        height,
        pixels: image.to_rgba8().into_raw(),
    })
}

fn ne_u16(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(format: Format, width: u32, height: u32, pixels: Vec<u8>) -> gltf::image::Data {
        gltf::image::Data {
            pixels,
            format,
            width,
            height,
        }
    }

    #[test]
    fn rgb_expands_to_opaque_rgba() {
        let data = image(Format::R8G8B8, 2, 1, vec![10, 20, 30, 40, 50, 60]);
        let rgba = to_rgba8(0, &data).unwrap();
        assert_eq!(rgba.pixels, [10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn grayscale_replicates_channels() {
        let data = image(Format::R8, 1, 1, vec![7]);
        assert_eq!(to_rgba8(0, &data).unwrap().pixels, [7, 7, 7, 255]);
    }

    #[test]
    fn two_channel_keeps_red_and_green() {
        let data = image(Format::R8G8, 1, 1, vec![3, 4]);
        assert_eq!(to_rgba8(0, &data).unwrap().pixels, [3, 4, 0, 255]);
    }

    #[test]
    fn sixteen_bit_takes_high_byte() {
        let mut pixels = Vec::new();
        for value in [0xFFFFu16, 0x8000, 0x0000, 0xFFFF] {
            pixels.extend_from_slice(&value.to_ne_bytes());
        }
        let rgba = to_rgba8(0, &image(Format::R16G16B16A16, 1, 1, pixels)).unwrap();
        assert_eq!(rgba.pixels, [255, 128, 0, 255]);
    }

    #[test]
    fn short_pixel_data_is_rejected() {
        let data = image(Format::R8G8B8A8, 2, 2, vec![0; 3]);
        assert!(matches!(
            to_rgba8(5, &data),
            Err(ResourceError::ImageSize { index: 5, expected: 16, actual: 3 })
        ));
    }

    #[test]
    fn float_images_are_unsupported() {
        let data = image(Format::R32G32B32FLOAT, 1, 1, vec![0; 12]);
        assert!(matches!(
            to_rgba8(0, &data),
            Err(ResourceError::UnsupportedImageFormat { .. })
        ));
    }

    #[test]
    fn generated_normals_face_counter_clockwise() {
        let positions = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let normals = generate_normals(&positions, &[0, 1, 2]);
        for n in normals {
            assert!((n - Vec3::Z).length() < 1e-6);
        }
    }

    #[test]
    fn out_of_range_indices_are_ignored() {
        let normals = generate_normals(&[Vec3::ZERO], &[0, 1, 2]);
        assert_eq!(normals, [Vec3::Y]);
    }

    #[test]
    fn bounds_cover_all_meshes() {
        let meshes = [
            Mesh {
                positions: vec![Vec3::new(-1.0, 0.0, 2.0)],
                ..Mesh::default()
            },
            Mesh {
                positions: vec![Vec3::new(3.0, -2.0, 0.0)],
                ..Mesh::default()
            },
        ];
        assert_eq!(
            bounds(&meshes),
            (Vec3::new(-1.0, -2.0, 0.0), Vec3::new(3.0, 0.0, 2.0))
        );
    }

    #[test]
    fn empty_bounds_are_zero() {
        assert_eq!(bounds(&[]), (Vec3::ZERO, Vec3::ZERO));
    }
}
