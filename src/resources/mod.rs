//! Resource management
//!
//! CPU-side meshes and textures, their uploaded counterparts, and the
//! content sources that produce them.

mod content;
mod mesh;
mod texture;

pub use content::*;
pub use mesh::*;
pub use texture::*;

/// Mesh registered with a [`crate::pipeline::DeferredPipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub usize);

/// Texture registered with a [`crate::pipeline::DeferredPipeline`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub usize);
