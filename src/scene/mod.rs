//! Scene management

mod camera;
mod camera_controller;
mod light;
mod transform;

pub use camera::*;
pub use camera_controller::*;
pub use light::*;
pub use transform::*;

use glam::{Vec2, Vec3};

use crate::resources::{MeshId, TextureId};

/// An opaque object drawn into the G-buffer
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub mesh: MeshId,
    pub transform: Transform,
    /// Albedo texture, a white texel when `None`
    pub texture: Option<TextureId>,
    /// Multiplies the texture
    pub color: Vec3,
    /// Texture repeat count along u and v
    pub tiling: Vec2,
    /// Scales the specular term of every light on this object
    pub specular: f32,
}

impl SceneObject {
    pub fn new(mesh: MeshId) -> Self {
        Self {
            mesh,
            transform: Transform::default(),
            texture: None,
            color: Vec3::ONE,
            tiling: Vec2::ONE,
            specular: 1.0,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.transform.position = position;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.transform.scale = scale;
        self
    }

    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    pub fn with_tiling(mut self, tiling: Vec2) -> Self {
        self.tiling = tiling;
        self
    }

    /// Negative coefficients are clamped to zero
    pub fn with_specular(mut self, specular: f32) -> Self {
        self.specular = specular.max(0.0);
        self
    }
}

/// Everything one frame draws and lights
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub objects: Vec<SceneObject>,
    pub lights: Vec<Light>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directional light to the scene
    pub fn add_directional_light(&mut self, direction: Vec3, color: Vec3) -> usize {
        self.add_light(DirectionalLight::new(direction, color))
    }

    pub fn add_light(&mut self, light: impl Into<Light>) -> usize {
        self.lights.push(light.into());
        self.lights.len() - 1
    }

    /// Add an object to the scene, returning its index
    pub fn add_object(&mut self, object: SceneObject) -> usize {
        self.objects.push(object);
        self.objects.len() - 1
    }

    pub fn directional_lights(&self) -> impl Iterator<Item = &DirectionalLight> {
        self.lights.iter().map(|light| match light {
            Light::Directional(d) => d,
        })
    }
}
