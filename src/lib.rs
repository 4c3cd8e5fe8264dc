//! Deferred Shading - A G-buffer based renderer with additive light accumulation
//!
//! Each frame renders the scene geometry once into a set of off-screen
//! targets (albedo, normal, depth), then evaluates every light as a
//! full-screen pass that reads those targets, and finally composites albedo
//! and the accumulated light into the display.
//!
//! Two backends implement the same command interface:
//! - **wgpu**: the GPU backend used by the demo
//! - **software**: a headless CPU rasterizer that makes every intermediate
//!   buffer inspectable, used by the test suite
//!
//! # Features
//! - Multiple render target G-buffer with typestate bind/resolve tokens
//! - Phong directional lights, one additive draw per light
//! - Optional ambient term and a split-screen view of the intermediate buffers
//! - Procedural meshes and textures, or images loaded from a content directory

pub mod backend;
pub mod pipeline;
pub mod resources;
pub mod scene;
pub mod shader;
pub mod window;

use glam::{Vec3, Vec4};

pub use backend::software::SoftwareBackend;
pub use backend::wgpu_backend::WgpuBackend;
pub use pipeline::{DeferredPipeline, FramePhase, FrameStats, LightingConfig};
pub use window::Window;

/// Constant light added to every covered pixel's diffuse term
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

impl AmbientLight {
    pub fn new(color: Vec3, intensity: f32) -> Self {
        Self { color, intensity }
    }

    /// White ambient light of the given intensity
    pub fn white(intensity: f32) -> Self {
        Self::new(Vec3::ONE, intensity)
    }

    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }
}

/// Cornflower blue
pub const DEFAULT_BACKGROUND: Vec4 = Vec4::new(0.392, 0.584, 0.929, 1.0);

/// Configuration for creating a pipeline and the window it presents to
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Material coefficients shared by every light
    pub lighting: LightingConfig,
    /// Ambient term, off unless set
    pub ambient: Option<AmbientLight>,
    /// Color of pixels no geometry covers
    pub background: Vec4,
    /// Start with the intermediate buffer view enabled
    pub debug_view: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            title: "Deferred Shading".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            lighting: LightingConfig::default(),
            ambient: None,
            background: DEFAULT_BACKGROUND,
            debug_view: false,
        }
    }
}
