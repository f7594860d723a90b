//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The glTF document or one of its buffers could not be read.
    #[error("Failed to load glTF '{source_name}': {source}")]
    Gltf {
        source_name: String,
        #[source]
        source: gltf::Error,
    },

    /// The glTF document has no triangle geometry.
    #[error("glTF '{0}' contains no triangle meshes")]
    NoMeshes(String),

    /// A mesh primitive has no position data.
    #[error("Mesh '{mesh}' primitive {primitive} has no positions")]
    NoPositionData { mesh: String, primitive: usize },

    /// An image uses a pixel format that cannot be converted to RGBA8.
    #[error("Image {index} has unsupported pixel format {format}")]
    UnsupportedImageFormat { index: usize, format: String },

    /// Decoded pixel data does not match the declared image size.
    #[error("Image {index} has {actual} bytes, expected {expected}")]
    ImageSize {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// Image conversion error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
