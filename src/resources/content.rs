//! Content loading
//!
//! The pipeline consumes already-loaded data. A [`ContentSource`] turns names
//! into meshes, textures and programs; loading never happens mid-frame.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{Mesh, TextureData};
use crate::shader::ShaderProgram;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("No {kind} named '{name}'")]
    NotFound { kind: &'static str, name: String },
    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContentError {
    fn not_found(kind: &'static str, name: &str) -> Self {
        ContentError::NotFound {
            kind,
            name: name.to_string(),
        }
    }
}

pub trait ContentSource {
    fn load_mesh(&self, name: &str) -> Result<Mesh, ContentError>;
    fn load_texture(&self, name: &str) -> Result<TextureData, ContentError>;
    fn load_shader_program(&self, name: &str) -> Result<ShaderProgram, ContentError>;
}

/// Procedural content that needs no files
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinContent;

impl BuiltinContent {
    pub const MESHES: [&'static str; 3] = ["sphere", "quad", "cube"];
    pub const TEXTURES: [&'static str; 2] = ["brick", "white"];
}

impl ContentSource for BuiltinContent {
    fn load_mesh(&self, name: &str) -> Result<Mesh, ContentError> {
        match name {
            "sphere" => Ok(Mesh::sphere(48, 24)),
            "quad" => Ok(Mesh::plane()),
            "cube" => Ok(Mesh::cube()),
            _ => Err(ContentError::not_found("mesh", name)),
        }
    }

    fn load_texture(&self, name: &str) -> Result<TextureData, ContentError> {
        match name {
            "brick" => Ok(TextureData::brick(128)),
            "white" => Ok(TextureData::white()),
            _ => Err(ContentError::not_found("texture", name)),
        }
    }

    fn load_shader_program(&self, name: &str) -> Result<ShaderProgram, ContentError> {
        ShaderProgram::from_label(name).ok_or_else(|| ContentError::not_found("shader program", name))
    }
}

/// Image files under a root directory, looked up as `<root>/<name>.<ext>`
///
/// Meshes and programs come from [`BuiltinContent`].
#[derive(Debug, Clone)]
pub struct DirectoryContent {
    root: PathBuf,
    builtin: BuiltinContent,
}

impl DirectoryContent {
    pub const IMAGE_EXTENSIONS: [&'static str; 5] = ["png", "jpg", "jpeg", "bmp", "tga"];

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            builtin: BuiltinContent,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn find_image(&self, name: &str) -> Option<PathBuf> {
        let direct = self.root.join(name);
        if direct.extension().is_some() && direct.is_file() {
            return Some(direct);
        }
        Self::IMAGE_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{name}.{ext}")))
            .find(|path| path.is_file())
    }
}

impl ContentSource for DirectoryContent {
    fn load_mesh(&self, name: &str) -> Result<Mesh, ContentError> {
        self.builtin.load_mesh(name)
    }

    fn load_texture(&self, name: &str) -> Result<TextureData, ContentError> {
        let path = self
            .find_image(name)
            .ok_or_else(|| ContentError::not_found("texture", name))?;
        log::info!("Loading texture '{}' from {}", name, path.display());
        TextureData::from_file(path)
    }

    fn load_shader_program(&self, name: &str) -> Result<ShaderProgram, ContentError> {
        self.builtin.load_shader_program(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names() {
        let content = BuiltinContent;
        for name in BuiltinContent::MESHES {
            assert!(content.load_mesh(name).is_ok(), "{name}");
        }
        for name in BuiltinContent::TEXTURES {
            assert!(content.load_texture(name).is_ok(), "{name}");
        }
        assert_eq!(
            content.load_shader_program("combine").unwrap(),
            ShaderProgram::Combine
        );
        assert!(matches!(
            content.load_mesh("teapot"),
            Err(ContentError::NotFound { kind: "mesh", .. })
        ));
    }

    #[test]
    fn test_directory_loads_png() {
        let dir = std::env::temp_dir().join(format!("deferred-shading-content-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]))
            .save(dir.join("tile.png"))
            .unwrap();

        let content = DirectoryContent::new(&dir);
        let texture = content.load_texture("tile").unwrap();
        assert_eq!((texture.width, texture.height), (2, 3));
        assert_eq!(texture.texel(1, 2), [10, 20, 30, 255]);
        assert!(content.load_texture("brick").is_err());
        assert!(content.load_mesh("sphere").is_ok());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
