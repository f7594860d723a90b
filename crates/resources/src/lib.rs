//! glTF model ingestion.
//!
//! Loads geometry, PBR materials and texture images from `.gltf`/`.glb`
//! files into plain CPU-side data. Node transforms are baked into vertex
//! positions so a model can be drawn with a single model matrix.

mod error;

pub mod material;
pub mod model;

pub use error::{ResourceError, ResourceResult};
pub use material::{AlphaMode, Material, TextureRef};
pub use model::{Mesh, Model, TextureImage};
