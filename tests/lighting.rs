//! Light accumulation tests: diffuse and specular sums after one frame.

mod common;

use glam::Vec3;
use rstest::rstest;

use common::*;
use deferred_shading::pipeline::encoding;
use deferred_shading::scene::{Camera, DirectionalLight, Scene, SceneObject};
use deferred_shading::PipelineConfig;

/// Half-float storage plus tessellation noise
const ACCUMULATION_TOLERANCE: f32 = 1e-2;

#[test]
fn test_no_lights_leaves_accumulation_black() {
    let mut pipeline = create_pipeline(32, 32, &PipelineConfig::default());
    let (scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);

    let stats = pipeline
        .render_frame(&scene, &snapshot(&front_camera(32, 32)))
        .unwrap();

    assert_eq!(stats.lights_drawn, 0);
    for (x, y) in [(16, 16), (0, 0), (10, 20)] {
        assert_eq!(diffuse(&pipeline, x, y), Vec3::ZERO);
        assert_eq!(specular(&pipeline, x, y), Vec3::ZERO);
    }
}

#[test]
fn test_light_toward_camera_lights_sphere_center() {
    let mut pipeline = create_pipeline(64, 64, &config_with(diffuse_only()));
    let (mut scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);
    scene.add_directional_light(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE);

    let stats = pipeline
        .render_frame(&scene, &snapshot(&front_camera(64, 64)))
        .unwrap();

    assert_eq!(stats.lights_drawn, 1);
    assert_vec3_near(diffuse(&pipeline, 32, 32), Vec3::ONE, ACCUMULATION_TOLERANCE);
    assert_eq!(specular(&pipeline, 32, 32), Vec3::ZERO);
}

#[rstest]
#[case::full(1.0)]
#[case::dimmed(0.7)]
#[case::faint(0.25)]
fn test_diffuse_scales_with_coefficient(#[case] k_diffuse: f32) {
    let mut lighting = diffuse_only();
    lighting.k_diffuse = k_diffuse;
    let mut pipeline = create_pipeline(48, 48, &config_with(lighting));
    let (mut scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);
    scene.add_directional_light(Vec3::new(0.0, 0.0, -1.0), Vec3::new(1.0, 0.5, 0.0));

    pipeline
        .render_frame(&scene, &snapshot(&front_camera(48, 48)))
        .unwrap();

    assert_vec3_near(
        diffuse(&pipeline, 24, 24),
        Vec3::new(1.0, 0.5, 0.0) * k_diffuse,
        ACCUMULATION_TOLERANCE,
    );
}

#[test]
fn test_light_from_above_leaves_underside_dark() {
    let mut pipeline = create_pipeline(64, 64, &PipelineConfig::default());
    let (mut scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);
    // Travels straight down
    scene.add_directional_light(Vec3::new(0.0, -1.0, 0.0), Vec3::ONE);

    pipeline
        .render_frame(&scene, &snapshot(&front_camera(64, 64)))
        .unwrap();

    assert!(diffuse(&pipeline, 32, 24).x > 0.1);
    assert_eq!(diffuse(&pipeline, 32, 40), Vec3::ZERO);
    assert_eq!(specular(&pipeline, 32, 40), Vec3::ZERO);
}

#[test]
fn test_sphere_seen_from_above_under_overhead_light() {
    let (width, height) = (64, 64);
    let mut pipeline = create_pipeline(width, height, &config_with(diffuse_only()));
    let (mut scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);
    scene.add_directional_light(Vec3::new(0.0, -1.0, 0.0), Vec3::ONE);
    let mut camera = Camera::new(Vec3::new(0.0, 3.0, 0.0), Vec3::ZERO);
    camera.set_aspect(width as f32, height as f32);

    let stats = pipeline.render_frame(&scene, &snapshot(&camera)).unwrap();
    assert_eq!(stats.objects_drawn, 1);
    assert!(pipeline.backend().pass_log()[0].draws[0].fragments_written > 0);

    // Top of the sphere faces the light
    assert!(encoding::is_covered(albedo(&pipeline, 32, 32)));
    assert!(normal(&pipeline, 32, 32).y > 0.9);
    assert_vec3_near(diffuse(&pipeline, 32, 32), Vec3::ONE, ACCUMULATION_TOLERANCE);

    let mut covered = 0;
    for y in 0..height {
        for x in 0..width {
            if !encoding::is_covered(albedo(&pipeline, x, y)) {
                continue;
            }
            covered += 1;
            let n = normal(&pipeline, x, y);
            let lit = diffuse(&pipeline, x, y);
            if n.y < 0.0 {
                assert_eq!(lit, Vec3::ZERO, "pixel ({}, {}) faces away but is lit", x, y);
            } else {
                assert_vec3_near(lit, Vec3::splat(n.y), ACCUMULATION_TOLERANCE);
            }
        }
    }
    assert!(covered > 100, "only {} covered pixels", covered);
}

#[test]
fn test_specular_follows_each_object_coefficient() {
    let (width, height) = (64, 64);
    let mut pipeline = create_pipeline(width, height, &PipelineConfig::default());
    let (_, sphere) = sphere_scene(&mut pipeline, Vec3::ONE);
    let left = Vec3::new(-0.6, 0.0, 0.0);
    let right = Vec3::new(0.6, 0.0, 0.0);

    let mut scene = Scene::new();
    scene.add_object(SceneObject::new(sphere).with_position(left).with_specular(0.4));
    scene.add_object(SceneObject::new(sphere).with_position(right));
    scene.add_directional_light(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE);
    let camera = snapshot(&front_camera(width, height));

    pipeline.render_frame(&scene, &camera).unwrap();

    // Highlight on the right sphere, where the normal halves eye and light
    let half_vector = ((camera.eye_position - right).normalize() + Vec3::Z).normalize();
    let (uv, _) = encoding::project_to_screen(right + half_vector * 0.5, camera.view_projection());
    let x = (uv.x * width as f32) as u32;
    let y = (uv.y * height as f32) as u32;
    let mirrored = width - 1 - x;

    let full = specular(&pipeline, x, y);
    let dimmed = specular(&pipeline, mirrored, y);
    assert!(full.x > 0.5, "no highlight at ({}, {}): {:?}", x, y, full);
    assert_vec3_near(dimmed, full * 0.4, ACCUMULATION_TOLERANCE);

    // Diffuse does not depend on the coefficient
    assert_vec3_near(diffuse(&pipeline, mirrored, y), diffuse(&pipeline, x, y), ACCUMULATION_TOLERANCE);
}

#[test]
fn test_lights_add_linearly() {
    let (width, height) = (48, 48);
    let a = DirectionalLight::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(0.6, 0.2, 0.1));
    let b = DirectionalLight::new(Vec3::new(0.5, 0.0, -1.0), Vec3::new(0.1, 0.3, 0.5));

    let render = |lights: &[DirectionalLight]| {
        let mut pipeline = create_pipeline(width, height, &PipelineConfig::default());
        let (mut scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);
        for light in lights {
            scene.add_light(*light);
        }
        let stats = pipeline
            .render_frame(&scene, &snapshot(&front_camera(width, height)))
            .unwrap();
        assert_eq!(stats.lights_drawn, lights.len());

        [(24, 24), (20, 18), (29, 27), (18, 30)]
            .map(|(x, y)| (diffuse(&pipeline, x, y), specular(&pipeline, x, y)))
    };

    let only_a = render(&[a]);
    let only_b = render(&[b]);
    let both = render(&[a, b]);

    for ((a, b), both) in only_a.iter().zip(&only_b).zip(&both) {
        assert_vec3_near(both.0, a.0 + b.0, ACCUMULATION_TOLERANCE);
        assert_vec3_near(both.1, a.1 + b.1, ACCUMULATION_TOLERANCE);
    }
}

#[test]
fn test_accumulation_is_cleared_between_frames() {
    let mut pipeline = create_pipeline(32, 32, &PipelineConfig::default());
    let (mut scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);
    scene.add_directional_light(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE);
    let camera = snapshot(&front_camera(32, 32));

    pipeline.render_frame(&scene, &camera).unwrap();
    let first = diffuse(&pipeline, 16, 16);
    assert!(first.x > 0.5);

    // Same light again: the sum must not carry over
    pipeline.render_frame(&scene, &camera).unwrap();
    assert_vec3_near(diffuse(&pipeline, 16, 16), first, 1e-3);

    scene.lights.clear();
    pipeline.render_frame(&scene, &camera).unwrap();
    assert_eq!(diffuse(&pipeline, 16, 16), Vec3::ZERO);
}

#[test]
fn test_background_pixels_get_no_light() {
    let mut pipeline = create_pipeline(32, 32, &PipelineConfig::default());
    let mut scene = Scene::new();
    scene.add_directional_light(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE);

    pipeline
        .render_frame(&scene, &snapshot(&front_camera(32, 32)))
        .unwrap();

    assert_eq!(diffuse(&pipeline, 16, 16), Vec3::ZERO);
    assert_eq!(specular(&pipeline, 16, 16), Vec3::ZERO);
}
