//! Common utilities for pipeline integration tests.
//!
//! Every test renders with the software backend, which keeps all
//! intermediate buffers readable on the CPU.

#![allow(dead_code)]

use glam::{Vec3, Vec4};

use deferred_shading::backend::software::SoftwareBackend;
use deferred_shading::backend::TextureViewHandle;
use deferred_shading::pipeline::encoding;
use deferred_shading::resources::{Mesh, MeshId};
use deferred_shading::scene::{Camera, CameraProvider, CameraSnapshot, Scene, SceneObject};
use deferred_shading::{DeferredPipeline, LightingConfig, PipelineConfig};

/// One step of an Rgba8Unorm texel
pub const UNORM8_STEP: f32 = 1.0 / 255.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Diffuse-only material with unit coefficient
pub fn diffuse_only() -> LightingConfig {
    LightingConfig {
        shininess: 32.0,
        k_diffuse: 1.0,
        k_specular: 0.0,
    }
}

pub fn config_with(lighting: LightingConfig) -> PipelineConfig {
    PipelineConfig {
        lighting,
        ..Default::default()
    }
}

/// A software-backed pipeline whose surface is `width` x `height`
pub fn create_pipeline(width: u32, height: u32, config: &PipelineConfig) -> DeferredPipeline<SoftwareBackend> {
    init_logging();
    DeferredPipeline::new(SoftwareBackend::new(width, height), config).expect("pipeline creation")
}

/// Camera on +Z looking at the origin, sized for a `width` x `height` surface
pub fn front_camera(width: u32, height: u32) -> Camera {
    let mut camera = Camera::new(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO);
    camera.set_aspect(width as f32, height as f32);
    camera
}

pub fn snapshot(camera: &Camera) -> CameraSnapshot {
    camera.snapshot()
}

/// A scene with one unit-diameter sphere at the origin, no lights
pub fn sphere_scene(pipeline: &mut DeferredPipeline<SoftwareBackend>, color: Vec3) -> (Scene, MeshId) {
    let sphere = pipeline
        .add_mesh(&Mesh::sphere(48, 24))
        .expect("sphere upload");
    let mut scene = Scene::new();
    scene.add_object(SceneObject::new(sphere).with_color(color));
    (scene, sphere)
}

pub fn read_view(pipeline: &DeferredPipeline<SoftwareBackend>, view: TextureViewHandle, x: u32, y: u32) -> Vec4 {
    pipeline
        .backend()
        .view_texture(view)
        .expect("view is alive")
        .texel(x, y)
}

pub fn albedo(pipeline: &DeferredPipeline<SoftwareBackend>, x: u32, y: u32) -> Vec4 {
    read_view(pipeline, pipeline.gbuffer().albedo().view(), x, y)
}

pub fn normal(pipeline: &DeferredPipeline<SoftwareBackend>, x: u32, y: u32) -> Vec3 {
    let encoded = read_view(pipeline, pipeline.gbuffer().normal().view(), x, y);
    encoding::decode_normal(encoded.truncate())
}

pub fn depth(pipeline: &DeferredPipeline<SoftwareBackend>, x: u32, y: u32) -> f32 {
    read_view(pipeline, pipeline.gbuffer().depth().view(), x, y).x
}

pub fn diffuse(pipeline: &DeferredPipeline<SoftwareBackend>, x: u32, y: u32) -> Vec3 {
    read_view(pipeline, pipeline.light_accumulation().diffuse().view(), x, y).truncate()
}

pub fn specular(pipeline: &DeferredPipeline<SoftwareBackend>, x: u32, y: u32) -> Vec3 {
    read_view(pipeline, pipeline.light_accumulation().specular().view(), x, y).truncate()
}

pub fn surface(pipeline: &DeferredPipeline<SoftwareBackend>, x: u32, y: u32) -> Vec4 {
    pipeline
        .backend()
        .surface()
        .expect("display surface")
        .texel(x, y)
}

pub fn assert_vec3_near(actual: Vec3, expected: Vec3, tolerance: f32) {
    assert!(
        actual.abs_diff_eq(expected, tolerance),
        "expected {:?}, got {:?} (tolerance {})",
        expected,
        actual,
        tolerance
    );
}
