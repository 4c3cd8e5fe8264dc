//! Whole-frame tests: combine output, pass order, resizing and teardown.

mod common;

use glam::{Vec3, Vec4};
use rstest::rstest;

use common::*;
use deferred_shading::backend::{GraphicsBackend, LoadOp};
use deferred_shading::resources::{MeshId, TextureId};
use deferred_shading::scene::{Camera, DirectionalLight, Scene, SceneObject};
use deferred_shading::{AmbientLight, LightingConfig, PipelineConfig};

fn assert_surface_near(actual: Vec4, expected: Vec3) {
    assert_vec3_near(actual.truncate(), expected, 2.0 * UNORM8_STEP);
}

#[test]
fn test_combine_multiplies_albedo_by_diffuse() {
    let lighting = LightingConfig {
        k_diffuse: 0.7,
        ..diffuse_only()
    };
    let mut pipeline = create_pipeline(64, 64, &config_with(lighting));
    let (mut scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);
    scene.add_directional_light(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE);

    pipeline
        .render_frame(&scene, &snapshot(&front_camera(64, 64)))
        .unwrap();

    assert_vec3_near(surface(&pipeline, 32, 32).truncate(), Vec3::splat(0.7), 0.02);
}

#[test]
fn test_uncovered_pixels_show_background() {
    let config = PipelineConfig {
        background: Vec4::new(0.1, 0.2, 0.3, 1.0),
        ..Default::default()
    };
    let mut pipeline = create_pipeline(40, 30, &config);
    let (mut scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);
    scene.add_directional_light(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE);

    pipeline
        .render_frame(&scene, &snapshot(&front_camera(40, 30)))
        .unwrap();

    for (x, y) in [(0, 0), (39, 0), (0, 29), (39, 29)] {
        assert_surface_near(surface(&pipeline, x, y), Vec3::new(0.1, 0.2, 0.3));
    }
}

#[rstest]
#[case::dim(0.3)]
#[case::bright(0.8)]
fn test_ambient_is_modulated_by_albedo(#[case] intensity: f32) {
    let config = PipelineConfig {
        ambient: Some(AmbientLight::white(intensity)),
        ..Default::default()
    };
    let mut pipeline = create_pipeline(32, 32, &config);
    let (scene, _) = sphere_scene(&mut pipeline, Vec3::X);

    pipeline
        .render_frame(&scene, &snapshot(&front_camera(32, 32)))
        .unwrap();

    assert_surface_near(surface(&pipeline, 16, 16), Vec3::new(intensity, 0.0, 0.0));
}

#[test]
fn test_unlit_scene_without_ambient_is_black() {
    let mut pipeline = create_pipeline(32, 32, &PipelineConfig::default());
    let (scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);

    pipeline
        .render_frame(&scene, &snapshot(&front_camera(32, 32)))
        .unwrap();

    assert_surface_near(surface(&pipeline, 16, 16), Vec3::ZERO);
}

#[test]
fn test_lighting_can_change_between_frames() {
    let mut pipeline = create_pipeline(32, 32, &config_with(diffuse_only()));
    let (mut scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);
    scene.add_directional_light(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE);
    let camera = snapshot(&front_camera(32, 32));

    pipeline.render_frame(&scene, &camera).unwrap();
    let bright = surface(&pipeline, 16, 16).x;

    pipeline.set_lighting(LightingConfig {
        k_diffuse: 0.5,
        ..diffuse_only()
    });
    pipeline.render_frame(&scene, &camera).unwrap();
    let dim = surface(&pipeline, 16, 16).x;

    assert!((dim - bright * 0.5).abs() < 0.02, "bright {}, dim {}", bright, dim);
}

#[test]
fn test_passes_run_in_order() {
    let config = PipelineConfig {
        debug_view: true,
        ..Default::default()
    };
    let mut pipeline = create_pipeline(48, 32, &config);
    let (mut scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);
    scene.add_directional_light(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE);
    scene.add_directional_light(Vec3::new(1.0, -1.0, 0.0), Vec3::splat(0.5));

    let stats = pipeline
        .render_frame(&scene, &snapshot(&front_camera(48, 32)))
        .unwrap();
    assert_eq!(stats.objects_drawn, 1);
    assert_eq!(stats.lights_drawn, 2);

    let log = pipeline.backend().pass_log();
    let labels: Vec<_> = log.iter().map(|pass| pass.label.as_deref()).collect();
    assert_eq!(
        labels,
        vec![
            Some("G-Buffer"),
            Some("Light Accumulation"),
            Some("Combine"),
            Some("Debug View")
        ]
    );

    let geometry = &log[0];
    assert!(geometry.depth_attached);
    assert_eq!(geometry.draws.len(), 1);
    assert!(geometry.draws[0].fragments_written > 0);

    let lights = &log[1];
    assert!(!lights.depth_attached);
    assert_eq!(lights.color_load_ops, vec![LoadOp::Clear([0.0; 4]); 2]);
    assert_eq!(lights.draws.len(), 2);
    assert!(lights.draws.iter().all(|draw| draw.blend.is_some() && draw.depth.is_none()));

    assert!(matches!(log[2].color_load_ops.as_slice(), [LoadOp::Clear(_)]));
    assert_eq!(log[3].color_load_ops, vec![LoadOp::Load]);

    for pass in log {
        assert!(pass.hazards.is_empty(), "{:?}: {:?}", pass.label, pass.hazards);
    }
}

#[test]
fn test_debug_view_is_off_by_default() {
    let mut pipeline = create_pipeline(16, 16, &PipelineConfig::default());
    pipeline
        .render_frame(&Scene::new(), &snapshot(&front_camera(16, 16)))
        .unwrap();
    assert_eq!(pipeline.backend().pass_log().len(), 3);

    pipeline.set_debug_view(true);
    pipeline
        .render_frame(&Scene::new(), &snapshot(&front_camera(16, 16)))
        .unwrap();
    assert_eq!(pipeline.backend().pass_log().len(), 4);
}

#[test]
fn test_resize_reallocates_every_target() {
    let mut pipeline = create_pipeline(80, 60, &PipelineConfig::default());
    let (mut scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);
    scene.add_directional_light(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE);

    pipeline
        .render_frame(&scene, &snapshot(&front_camera(80, 60)))
        .unwrap();
    assert_eq!(pipeline.size(), (80, 60));

    pipeline.resize(128, 72).unwrap();
    assert_eq!(pipeline.size(), (128, 72));
    assert_eq!(pipeline.gbuffer().size(), (128, 72));
    assert_eq!(pipeline.light_accumulation().size(), (128, 72));

    let stats = pipeline
        .render_frame(&scene, &snapshot(&front_camera(128, 72)))
        .unwrap();
    assert!(!stats.reallocated);
    assert_eq!(stats.size, (128, 72));

    for pass in pipeline.backend().pass_log() {
        assert!(pass.attachment_sizes.iter().all(|size| *size == (128, 72)));
        for draw in &pass.draws {
            if pass.label.as_deref() != Some("G-Buffer") {
                assert!(draw.sampled_sizes.iter().all(|size| *size == (128, 72)));
            }
        }
        assert!(pass.hazards.is_empty(), "{:?}: {:?}", pass.label, pass.hazards);
    }
}

#[test]
fn test_surface_resize_is_picked_up_by_next_frame() {
    let mut pipeline = create_pipeline(32, 32, &PipelineConfig::default());
    pipeline.backend_mut().resize(48, 24);

    let stats = pipeline
        .render_frame(&Scene::new(), &snapshot(&front_camera(48, 24)))
        .unwrap();

    assert!(stats.reallocated);
    assert_eq!(stats.size, (48, 24));
    assert_eq!(pipeline.size(), (48, 24));
}

#[test]
fn test_lost_surface_skips_one_frame() {
    let mut pipeline = create_pipeline(16, 16, &PipelineConfig::default());
    let camera = snapshot(&front_camera(16, 16));
    pipeline.backend_mut().lose_surface();

    let stats = pipeline.render_frame(&Scene::new(), &camera).unwrap();
    assert!(stats.skipped);
    assert_eq!(stats.objects_drawn, 0);
    assert_eq!(pipeline.backend().frame_index(), 0);

    let stats = pipeline.render_frame(&Scene::new(), &camera).unwrap();
    assert!(!stats.skipped);
    assert_eq!(pipeline.backend().pass_log().len(), 3);
}

#[rstest]
#[case::zero_width(0, 64)]
#[case::zero_height(64, 0)]
#[case::both(0, 0)]
fn test_zero_resize_is_ignored(#[case] width: u32, #[case] height: u32) {
    let mut pipeline = create_pipeline(32, 16, &PipelineConfig::default());
    pipeline.resize(width, height).unwrap();
    assert_eq!(pipeline.size(), (32, 16));
    assert_eq!(pipeline.backend().surface_size(), (32, 16));
}

#[test]
fn test_invalid_objects_are_skipped() {
    let mut pipeline = create_pipeline(32, 32, &PipelineConfig::default());
    let (mut scene, sphere) = sphere_scene(&mut pipeline, Vec3::ONE);
    scene.add_object(SceneObject::new(MeshId(42)));
    scene.add_object(SceneObject::new(sphere).with_texture(TextureId(7)));
    scene.add_object(SceneObject::new(sphere).with_scale(Vec3::new(1.0, 0.0, 1.0)));

    let stats = pipeline
        .render_frame(&scene, &snapshot(&front_camera(32, 32)))
        .unwrap();

    assert_eq!(stats.objects_drawn, 1);
    assert_eq!(stats.objects_skipped, 3);
    assert_eq!(pipeline.backend().pass_log()[0].draws.len(), 1);
}

#[test]
fn test_tiny_objects_are_still_drawn() {
    let mut pipeline = create_pipeline(32, 32, &PipelineConfig::default());
    let (mut scene, sphere) = sphere_scene(&mut pipeline, Vec3::ONE);
    scene.add_object(SceneObject::new(sphere).with_scale(Vec3::splat(1e-5)));

    let stats = pipeline
        .render_frame(&scene, &snapshot(&front_camera(32, 32)))
        .unwrap();

    assert_eq!(stats.objects_drawn, 2);
    assert_eq!(stats.objects_skipped, 0);
}

#[test]
fn test_camera_without_a_view_draws_nothing() {
    let mut pipeline = create_pipeline(32, 32, &PipelineConfig::default());
    let (mut scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);
    scene.add_directional_light(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE);
    let camera = Camera::new(Vec3::ONE, Vec3::ONE);

    let stats = pipeline.render_frame(&scene, &snapshot(&camera)).unwrap();

    assert_eq!(stats.objects_drawn, 0);
    assert_eq!(stats.objects_skipped, 1);
    assert!(!deferred_shading::pipeline::encoding::is_covered(albedo(&pipeline, 16, 16)));
    assert_eq!(diffuse(&pipeline, 16, 16), Vec3::ZERO);
}

#[test]
fn test_degenerate_light_is_skipped() {
    let mut pipeline = create_pipeline(32, 32, &config_with(diffuse_only()));
    let (mut scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);
    scene.add_light(DirectionalLight::new(Vec3::ZERO, Vec3::ONE));
    scene.add_directional_light(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE);

    let stats = pipeline
        .render_frame(&scene, &snapshot(&front_camera(32, 32)))
        .unwrap();

    assert_eq!(stats.lights_drawn, 1);
    assert_eq!(pipeline.backend().pass_log()[1].draws.len(), 1);
    assert_vec3_near(diffuse(&pipeline, 16, 16), Vec3::ONE, 1e-2);
}

#[test]
fn test_frames_are_counted() {
    let mut pipeline = create_pipeline(8, 8, &PipelineConfig::default());
    let camera = snapshot(&front_camera(8, 8));
    for expected in 1..=3 {
        let stats = pipeline.render_frame(&Scene::new(), &camera).unwrap();
        assert_eq!(stats.frame, expected);
        assert_eq!(pipeline.backend().frame_index(), expected);
        assert!(pipeline.backend().pass_log().iter().all(|pass| pass.frame == expected));
    }
}

#[test]
fn test_release_frees_everything_but_the_surface() {
    let mut pipeline = create_pipeline(32, 32, &PipelineConfig::default());
    let (mut scene, _) = sphere_scene(&mut pipeline, Vec3::ONE);
    scene.add_directional_light(Vec3::new(0.0, 0.0, -1.0), Vec3::ONE);
    pipeline
        .add_texture(&deferred_shading::resources::TextureData::white())
        .unwrap();
    pipeline
        .render_frame(&scene, &snapshot(&front_camera(32, 32)))
        .unwrap();
    pipeline.resize(40, 40).unwrap();

    let backend = pipeline.release();
    assert_eq!(backend.texture_count(), 1);
}
