//! Deferred shading pipeline
//!
//! A frame runs four phases in a fixed order:
//! 1. Geometry encode - objects are drawn into the G-buffer (MRT)
//! 2. G-buffer resolve - the G-buffer becomes readable
//! 3. Light accumulate - one additive full-screen draw per light
//! 4. Combine - albedo and accumulated light are composited to the display
//!
//! The phases hand each other the target tokens from [`targets`], so a phase
//! can only run once the previous one produced what it reads.

pub mod combine_pass;
pub mod debug_view;
pub mod encoding;
pub mod gbuffer_pass;
pub mod lighting_pass;
pub mod quad;
pub mod shading;
pub mod state;
pub mod targets;
pub mod uniforms;

pub use combine_pass::{CombinePass, CombineUniforms};
pub use debug_view::DebugView;
pub use gbuffer_pass::{GeometryDraw, GeometryPass, GeometryUniforms};
pub use lighting_pass::{LightUniforms, LightingPass};
pub use quad::FullScreenQuad;
pub use shading::LightingConfig;
pub use state::PassState;
pub use targets::{GBuffer, LightAccumulationBuffer, ResolvedGBuffer, ResolvedLightAccumulation};

use glam::{Mat4, Vec3, Vec4};

use crate::backend::*;
use crate::resources::{GpuMesh, GpuTexture, Mesh, MeshId, TextureData, TextureId};
use crate::scene::{CameraSnapshot, Light, Scene};
use crate::{AmbientLight, PipelineConfig};

/// Phases of one frame, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FramePhase {
    GeometryEncode,
    GBufferResolve,
    LightAccumulate,
    Combine,
    DebugView,
}

impl std::fmt::Display for FramePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FramePhase::GeometryEncode => "GeometryEncode",
            FramePhase::GBufferResolve => "GBufferResolve",
            FramePhase::LightAccumulate => "LightAccumulate",
            FramePhase::Combine => "Combine",
            FramePhase::DebugView => "DebugView",
        };
        f.write_str(name)
    }
}

/// What one call to [`DeferredPipeline::render_frame`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub frame: u64,
    pub size: (u32, u32),
    pub objects_drawn: usize,
    pub objects_skipped: usize,
    pub lights_drawn: usize,
    /// Targets were reallocated to a new surface size before this frame
    pub reallocated: bool,
    /// The surface was unavailable and nothing was rendered
    pub skipped: bool,
}

/// Render targets sized to the display surface
struct FrameTargets {
    gbuffer: GBuffer,
    light_accumulation: LightAccumulationBuffer,
}

impl FrameTargets {
    fn allocate<B: GraphicsBackend + ?Sized>(backend: &mut B, (width, height): (u32, u32)) -> BackendResult<Self> {
        let gbuffer = GBuffer::new(backend, width, height)?;
        let light_accumulation = match LightAccumulationBuffer::new(backend, width, height) {
            Ok(buffer) => buffer,
            Err(e) => {
                gbuffer.release(backend);
                return Err(e);
            }
        };
        Ok(Self {
            gbuffer,
            light_accumulation,
        })
    }

    fn size(&self) -> (u32, u32) {
        self.gbuffer.size()
    }

    fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        self.gbuffer.release(backend);
        self.light_accumulation.release(backend);
    }
}

/// Passes and shared geometry, created once
struct Passes {
    quad: FullScreenQuad,
    geometry: GeometryPass,
    lighting: LightingPass,
    combine: CombinePass,
    debug: DebugView,
}

/// Frame-invariant shading inputs
#[derive(Debug, Clone, Copy)]
struct ShadingParams {
    lighting: LightingConfig,
    ambient: Option<AmbientLight>,
    background: Vec4,
    debug_view: bool,
}

impl ShadingParams {
    fn combine_uniforms(&self) -> CombineUniforms {
        let ambient = self.ambient.map(|a| a.radiance()).unwrap_or(Vec3::ZERO);
        CombineUniforms::new(ambient, self.background)
    }
}

/// Owns the backend, the surface-sized targets and every pass
pub struct DeferredPipeline<B: GraphicsBackend> {
    backend: B,
    targets: FrameTargets,
    passes: Passes,
    params: ShadingParams,
    meshes: Vec<GpuMesh>,
    textures: Vec<GpuTexture>,
    white_texture: GpuTexture,
    frame: u64,
}

impl<B: GraphicsBackend> DeferredPipeline<B> {
    /// Allocate targets at the surface size and create every pass; any
    /// failure here is fatal
    pub fn new(mut backend: B, config: &PipelineConfig) -> BackendResult<Self> {
        let size = backend.surface_size();
        log::info!(
            "Creating deferred pipeline on {} ({}x{})",
            backend.name(),
            size.0,
            size.1
        );

        let targets = FrameTargets::allocate(&mut backend, size)?;
        let output_format = backend.swapchain_format();
        let passes = Passes {
            quad: FullScreenQuad::new(&mut backend)?,
            geometry: GeometryPass::new(&mut backend)?,
            lighting: LightingPass::new(&mut backend)?,
            combine: CombinePass::new(&mut backend, output_format)?,
            debug: DebugView::new(&mut backend, output_format)?,
        };
        let white_texture = GpuTexture::upload(&mut backend, &TextureData::white())?;

        Ok(Self {
            backend,
            targets,
            passes,
            params: ShadingParams {
                lighting: config.lighting,
                ambient: config.ambient,
                background: config.background,
                debug_view: config.debug_view,
            },
            meshes: Vec::new(),
            textures: Vec::new(),
            white_texture,
            frame: 0,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.targets.gbuffer
    }

    pub fn light_accumulation(&self) -> &LightAccumulationBuffer {
        &self.targets.light_accumulation
    }

    /// Size of the surface-sized targets
    pub fn size(&self) -> (u32, u32) {
        self.targets.size()
    }

    pub fn add_mesh(&mut self, mesh: &Mesh) -> BackendResult<MeshId> {
        let gpu = GpuMesh::upload(&mut self.backend, mesh)?;
        log::debug!("Registered mesh '{}' ({} parts)", gpu.name, gpu.parts.len());
        self.meshes.push(gpu);
        Ok(MeshId(self.meshes.len() - 1))
    }

    pub fn add_texture(&mut self, texture: &TextureData) -> BackendResult<TextureId> {
        let gpu = GpuTexture::upload(&mut self.backend, texture)?;
        log::debug!("Registered texture '{}' ({}x{})", gpu.name, gpu.width, gpu.height);
        self.textures.push(gpu);
        Ok(TextureId(self.textures.len() - 1))
    }

    pub fn set_debug_view(&mut self, enabled: bool) {
        self.params.debug_view = enabled;
    }

    pub fn debug_view(&self) -> bool {
        self.params.debug_view
    }

    pub fn set_lighting(&mut self, lighting: LightingConfig) {
        self.params.lighting = lighting;
    }

    pub fn lighting(&self) -> LightingConfig {
        self.params.lighting
    }

    pub fn set_ambient(&mut self, ambient: Option<AmbientLight>) {
        self.params.ambient = ambient;
    }

    pub fn set_background(&mut self, background: Vec4) {
        self.params.background = background;
    }

    pub fn set_depth_view_scale(&mut self, scale: f32) {
        self.passes.debug.set_depth_scale(scale);
    }

    /// Free every GPU resource the pipeline owns and hand the backend back
    pub fn release(self) -> B {
        let Self {
            mut backend,
            targets,
            passes,
            meshes,
            textures,
            white_texture,
            ..
        } = self;

        targets.release(&mut backend);
        passes.quad.release(&mut backend);
        passes.geometry.release(&mut backend);
        passes.lighting.release(&mut backend);
        passes.combine.release(&mut backend);
        passes.debug.release(&mut backend);
        for mesh in meshes {
            mesh.release(&mut backend);
        }
        for texture in textures {
            texture.release(&mut backend);
        }
        white_texture.release(&mut backend);

        log::info!("Deferred pipeline released");
        backend
    }

    /// Resize the display surface and every target sized to it
    pub fn resize(&mut self, width: u32, height: u32) -> BackendResult<()> {
        if width == 0 || height == 0 {
            log::debug!("Ignoring resize to {}x{}", width, height);
            return Ok(());
        }
        self.backend.resize(width, height);
        let size = self.backend.surface_size();
        self.ensure_target_size(size)?;
        Ok(())
    }

    /// Reallocate the targets if they do not match `size`; true if they did not
    fn ensure_target_size(&mut self, size: (u32, u32)) -> BackendResult<bool> {
        if self.targets.size() == size {
            return Ok(false);
        }
        let old_size = self.targets.size();
        let targets = FrameTargets::allocate(&mut self.backend, size)?;
        std::mem::replace(&mut self.targets, targets).release(&mut self.backend);
        log::info!(
            "Reallocated render targets {}x{} -> {}x{}",
            old_size.0,
            old_size.1,
            size.0,
            size.1
        );
        Ok(true)
    }

    /// Render one frame of `scene` seen from `camera` and present it
    pub fn render_frame(&mut self, scene: &Scene, camera: &CameraSnapshot) -> BackendResult<FrameStats> {
        self.frame += 1;
        let mut stats = FrameStats {
            frame: self.frame,
            ..Default::default()
        };

        let surface = self.backend.surface_size();
        if surface.0 == 0 || surface.1 == 0 {
            stats.skipped = true;
            return Ok(stats);
        }
        stats.reallocated = self.ensure_target_size(surface)?;

        let frame = match self.backend.begin_frame() {
            Ok(frame) => frame,
            Err(BackendError::SurfaceLost) => {
                log::warn!("Surface lost, skipping frame {}", self.frame);
                stats.skipped = true;
                return Ok(stats);
            }
            Err(e) => return Err(e),
        };
        if (frame.width, frame.height) != self.targets.size() {
            stats.reallocated |= self.ensure_target_size((frame.width, frame.height))?;
        }
        stats.size = self.targets.size();

        let result = self.run_phases(&frame, scene, camera, &mut stats);
        let presented = self.backend.end_frame();
        result?;
        match presented {
            Err(BackendError::SurfaceLost) => {
                log::warn!("Surface lost while presenting frame {}", self.frame);
                stats.skipped = true;
            }
            other => other?,
        }

        log::debug!(
            "Frame {}: {} objects, {} lights at {}x{}",
            stats.frame,
            stats.objects_drawn,
            stats.lights_drawn,
            stats.size.0,
            stats.size.1
        );
        Ok(stats)
    }

    fn run_phases(
        &mut self,
        frame: &FrameContext,
        scene: &Scene,
        camera: &CameraSnapshot,
        stats: &mut FrameStats,
    ) -> BackendResult<()> {
        let Self {
            backend,
            targets,
            passes,
            params,
            meshes,
            textures,
            white_texture,
            ..
        } = self;
        let backend: &mut B = backend;

        let registry = Registry {
            meshes: meshes.as_slice(),
            textures: textures.as_slice(),
            white_texture: &*white_texture,
        };
        let (draws, skipped) = registry.geometry_draws(scene, camera);
        stats.objects_skipped = skipped;

        let (gbuffer, objects_drawn) = encode_geometry(backend, &targets.gbuffer, &mut passes.geometry, &draws)?;
        stats.objects_drawn = objects_drawn;

        let (lights, lights_drawn) = accumulate_lights(
            backend,
            &gbuffer,
            &targets.light_accumulation,
            passes,
            &scene.lights,
            camera,
            &params.lighting,
        )?;
        stats.lights_drawn = lights_drawn;

        combine(backend, &gbuffer, &lights, passes, frame, &params.combine_uniforms())?;

        if params.debug_view {
            passes.debug.record(
                backend,
                &gbuffer,
                &lights,
                &passes.quad,
                frame.swapchain_view,
                (frame.width, frame.height),
            )?;
            log::trace!("{} done", FramePhase::DebugView);
        }

        Ok(())
    }
}

/// Uploaded meshes and textures, indexed by [`MeshId`] and [`TextureId`]
struct Registry<'a> {
    meshes: &'a [GpuMesh],
    textures: &'a [GpuTexture],
    white_texture: &'a GpuTexture,
}

impl<'a> Registry<'a> {
    /// Resolve the objects of `scene` into draws; objects referring to
    /// unknown resources or with a singular transform are skipped, and so is
    /// everything when the camera does not produce a usable view
    fn geometry_draws(&self, scene: &Scene, camera: &CameraSnapshot) -> (Vec<GeometryDraw<'a>>, usize) {
        if !camera.is_finite() {
            log::warn!(
                "Camera at {:?} has a non-finite view, skipping {} objects",
                camera.eye_position,
                scene.objects.len()
            );
            return (Vec::new(), scene.objects.len());
        }

        let mut draws = Vec::with_capacity(scene.objects.len());
        let mut skipped = 0;

        for (index, object) in scene.objects.iter().enumerate() {
            let Some(mesh) = self.meshes.get(object.mesh.0) else {
                log::warn!("Object {} uses unknown mesh {:?}", index, object.mesh);
                skipped += 1;
                continue;
            };
            let albedo = match object.texture {
                None => self.white_texture.view,
                Some(id) => match self.textures.get(id.0) {
                    Some(texture) => texture.view,
                    None => {
                        log::warn!("Object {} uses unknown texture {:?}", index, id);
                        skipped += 1;
                        continue;
                    }
                },
            };
            let world = object.transform.matrix();
            if !is_invertible(world) {
                log::warn!("Object {} has a degenerate transform", index);
                skipped += 1;
                continue;
            }

            draws.push(GeometryDraw {
                mesh,
                albedo,
                uniforms: GeometryUniforms::new(world, camera, object.color, object.tiling, object.specular),
            });
        }

        (draws, skipped)
    }
}

/// Whether `world` can be inverted for the normal matrix
///
/// The determinant is compared against the product of the basis lengths, so
/// uniformly tiny objects still count as invertible while flattened ones do not.
fn is_invertible(world: Mat4) -> bool {
    let basis = [world.x_axis.truncate(), world.y_axis.truncate(), world.z_axis.truncate()];
    let volume = basis.iter().map(|axis| axis.length()).product::<f32>();
    if !world.is_finite() || !volume.is_normal() {
        return false;
    }
    (world.determinant() / volume).abs() > 1e-6 && world.inverse().is_finite()
}

/// GeometryEncode followed by GBufferResolve
fn encode_geometry<'t, B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    gbuffer: &'t GBuffer,
    pass: &mut GeometryPass,
    draws: &[GeometryDraw<'_>],
) -> BackendResult<(ResolvedGBuffer<'t>, usize)> {
    let writer = gbuffer.bind(backend);
    let drawn = pass.record(backend, &writer, draws);
    log::trace!("{} done", FramePhase::GeometryEncode);

    // Resolve even when recording failed so the pass is closed
    let resolved = writer.resolve(backend);
    log::trace!("{} done", FramePhase::GBufferResolve);
    Ok((resolved, drawn?))
}

/// LightAccumulate: bind (the one clear of the frame), N additive draws, resolve
fn accumulate_lights<'t, B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    gbuffer: &ResolvedGBuffer<'_>,
    accumulation: &'t LightAccumulationBuffer,
    passes: &mut Passes,
    lights: &[Light],
    camera: &CameraSnapshot,
    lighting: &LightingConfig,
) -> BackendResult<(ResolvedLightAccumulation<'t>, usize)> {
    let writer = accumulation.bind(backend);
    let drawn = passes
        .lighting
        .record(backend, gbuffer, &writer, &passes.quad, lights, camera, lighting);
    let resolved = writer.resolve(backend);
    log::trace!("{} done", FramePhase::LightAccumulate);
    Ok((resolved, drawn?))
}

/// Combine into the frame's display view
fn combine<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    gbuffer: &ResolvedGBuffer<'_>,
    lights: &ResolvedLightAccumulation<'_>,
    passes: &mut Passes,
    frame: &FrameContext,
    uniforms: &CombineUniforms,
) -> BackendResult<()> {
    passes.combine.record(
        backend,
        gbuffer,
        lights,
        &passes.quad,
        frame.swapchain_view,
        (frame.width, frame.height),
        uniforms,
    )?;
    log::trace!("{} done", FramePhase::Combine);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareBackend;

    #[test]
    fn test_phases_are_ordered() {
        assert!(FramePhase::GeometryEncode < FramePhase::GBufferResolve);
        assert!(FramePhase::GBufferResolve < FramePhase::LightAccumulate);
        assert!(FramePhase::LightAccumulate < FramePhase::Combine);
    }

    #[test]
    fn test_tiny_objects_are_invertible() {
        assert!(is_invertible(Mat4::from_scale(Vec3::splat(1e-5))));
        assert!(is_invertible(Mat4::from_scale(Vec3::new(1e-4, 2.0, 30.0))));
        assert!(!is_invertible(Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0))));
        assert!(!is_invertible(Mat4::from_cols(
            glam::Vec4::X,
            glam::Vec4::X,
            glam::Vec4::Z,
            glam::Vec4::W
        )));
        assert!(!is_invertible(Mat4::from_scale(Vec3::splat(f32::NAN))));
    }

    #[test]
    fn test_empty_scene_renders_background() {
        let config = PipelineConfig::default();
        let mut pipeline = DeferredPipeline::new(SoftwareBackend::new(8, 6), &config).unwrap();
        let camera = crate::scene::Camera::default();
        let stats = pipeline
            .render_frame(&Scene::new(), &crate::scene::CameraProvider::snapshot(&camera))
            .unwrap();

        assert_eq!(stats.objects_drawn, 0);
        assert_eq!(stats.lights_drawn, 0);
        assert!(!stats.skipped);

        let surface = pipeline.backend().surface().unwrap();
        let texel = surface.texel(3, 3);
        assert!((texel - config.background).abs().max_element() < 1.0 / 255.0 + 1e-6);
    }
}
