//! Deferred shading demo
//!
//! A green sphere resting on a brick-textured ground plane, lit by one
//! directional light.
//!
//! # Controls
//!
//! - WASD / QE: move, Shift: sprint, scroll: movement speed
//! - Right mouse button + drag: look around
//! - F1: toggle the intermediate buffer view
//! - Escape: exit
//!
//! # Usage
//!
//! ```bash
//! cargo run --example deferred -- --ambient 0.3 --debug-view
//! RUST_LOG=debug cargo run --example deferred
//! ```

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use glam::{Vec2, Vec3};
use winit::keyboard::KeyCode;

use deferred_shading::resources::{BuiltinContent, ContentSource, DirectoryContent};
use deferred_shading::scene::{
    Camera, CameraController, CameraProvider, DirectionalLight, FreeFlyController, Scene, SceneObject,
    Transform,
};
use deferred_shading::{window, AmbientLight, DeferredPipeline, LightingConfig, PipelineConfig, WgpuBackend};

#[derive(Parser, Debug)]
#[command(name = "deferred", about = "Deferred shading demo")]
struct Args {
    /// Initial window width
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Initial window height
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Present without waiting for vertical sync
    #[arg(long)]
    no_vsync: bool,

    /// Intensity of a white ambient light
    #[arg(long)]
    ambient: Option<f32>,

    /// Start with the intermediate buffer view
    #[arg(long)]
    debug_view: bool,

    /// Directory to load the ground texture ("brick.<ext>") from
    #[arg(long)]
    content: Option<PathBuf>,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            title: "Deferred Shading".to_string(),
            width: self.width,
            height: self.height,
            vsync: !self.no_vsync,
            lighting: LightingConfig {
                shininess: 32.0,
                k_diffuse: 0.7,
                k_specular: 1.0,
            },
            ambient: self.ambient.map(AmbientLight::white),
            debug_view: self.debug_view,
            ..Default::default()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let config = args.pipeline_config();

    let (event_loop, window) = window::create(&config.title, config.width, config.height)?;
    let backend = WgpuBackend::new(window.window_arc(), config.vsync)?;
    let mut pipeline = DeferredPipeline::new(backend, &config)?;

    let content: Box<dyn ContentSource> = match &args.content {
        Some(root) => Box::new(DirectoryContent::new(root)),
        None => Box::new(BuiltinContent),
    };
    let ground_texture = match content.load_texture("brick") {
        Ok(texture) => texture,
        Err(e) => {
            log::warn!("{}, using the builtin brick texture", e);
            BuiltinContent.load_texture("brick")?
        }
    };

    let sphere = pipeline.add_mesh(&content.load_mesh("sphere")?)?;
    let ground = pipeline.add_mesh(&content.load_mesh("quad")?)?;
    let brick = pipeline.add_texture(&ground_texture)?;

    let mut scene = Scene::new();
    scene.add_object(
        SceneObject::new(sphere)
            .with_transform(Transform::from_position_uniform_scale(Vec3::new(0.0, 25.0, -100.0), 50.0))
            .with_color(Vec3::new(0.0, 1.0, 0.0))
            .with_specular(1.0),
    );
    scene.add_object(
        SceneObject::new(ground)
            .with_transform(Transform::from_position_uniform_scale(Vec3::new(0.0, 0.0, -100.0), 500.0))
            .with_texture(brick)
            .with_tiling(Vec2::splat(10.0))
            .with_specular(0.4),
    );
    scene.add_light(DirectionalLight::from_position(
        Vec3::new(250.0, 100.0, 0.0),
        Vec3::new(0.0, 0.0, -100.0),
        Vec3::ONE,
    ));

    let mut camera = Camera::new(Vec3::new(0.0, 50.0, 100.0), Vec3::new(0.0, 0.0, -100.0));
    let (width, height) = pipeline.size();
    camera.set_aspect(width as f32, height as f32);
    let mut controller = FreeFlyController::new();
    controller.sync_with_camera(&camera);

    let mut last_tick = Instant::now();
    window::run(event_loop, window, move |window| {
        if window.should_close() || window.was_pressed(KeyCode::Escape) {
            return false;
        }
        if window.was_pressed(KeyCode::F1) {
            let enabled = !pipeline.debug_view();
            pipeline.set_debug_view(enabled);
            log::info!("Debug view {}", if enabled { "on" } else { "off" });
        }
        if window.was_resized() {
            let (width, height) = window.dimensions();
            if let Err(e) = pipeline.resize(width, height) {
                log::error!("Resize failed: {}", e);
                return false;
            }
            camera.set_aspect(width as f32, height as f32);
        }

        let now = Instant::now();
        let dt = (now - last_tick).as_secs_f32();
        last_tick = now;
        controller.update(&mut camera, window.camera_input(), dt);

        match pipeline.render_frame(&scene, &camera.snapshot()) {
            Ok(stats) => {
                log::trace!(
                    "frame {}: {} objects, {} lights",
                    stats.frame,
                    stats.objects_drawn,
                    stats.lights_drawn
                );
                true
            }
            Err(e) => {
                log::error!("Rendering failed: {}", e);
                false
            }
        }
    })?;

    Ok(())
}
