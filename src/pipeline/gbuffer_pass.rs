//! Geometry encode pass
//!
//! Renders every opaque object into the G-buffer's three targets (MRT):
//! - Albedo: texture color times object color, alpha = 1 marks coverage
//! - Normal: world-space normal, encoded into [0,1]; alpha holds the
//!   object's specular coefficient
//! - Depth: NDC depth of the visible surface
//!
//! Hidden surfaces are removed with the depth buffer attached to the albedo
//! target.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::backend::*;
use crate::pipeline::state::PassState;
use crate::pipeline::targets::{GBuffer, GBufferWriter, DEPTH_BUFFER_FORMAT};
use crate::pipeline::uniforms::{uniform_layout_entries, UniformSlots};
use crate::resources::GpuMesh;
use crate::scene::CameraSnapshot;
use crate::shader::ShaderProgram;

/// Parameters of the `gbuffer` program, `@group(0) @binding(0)`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GeometryUniforms {
    pub world: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    pub inverse_transpose_world: Mat4,
    /// rgb multiplies the albedo texture, a = specular coefficient
    pub albedo_color: Vec4,
    /// xy = texture repeat count, zw unused
    pub tiling: Vec4,
}

impl GeometryUniforms {
    pub fn new(world: Mat4, camera: &CameraSnapshot, color: Vec3, tiling: Vec2, specular: f32) -> Self {
        Self {
            world,
            view: camera.view,
            projection: camera.projection,
            inverse_transpose_world: world.inverse().transpose(),
            albedo_color: color.extend(specular),
            tiling: Vec4::new(tiling.x, tiling.y, 0.0, 0.0),
        }
    }
}

/// One object as the pass draws it
#[derive(Debug, Clone, Copy)]
pub struct GeometryDraw<'a> {
    pub mesh: &'a GpuMesh,
    pub albedo: TextureViewHandle,
    pub uniforms: GeometryUniforms,
}

/// Surface encoding program; the encoding helpers are prepended
pub const GBUFFER_SHADER: &str = r#"
struct GeometryUniforms {
    world: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    inverse_transpose_world: mat4x4<f32>,
    albedo_color: vec4<f32>,
    tiling: vec4<f32>,
}

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_normal: vec3<f32>,
    @location(1) uv: vec2<f32>,
}

struct GBufferOutput {
    @location(0) albedo: vec4<f32>,
    @location(1) normal: vec4<f32>,
    @location(2) depth: f32,
}

@group(0) @binding(0) var<uniform> uniforms: GeometryUniforms;
@group(1) @binding(0) var albedo_texture: texture_2d<f32>;
@group(1) @binding(1) var albedo_sampler: sampler;

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    let world_position = uniforms.world * vec4<f32>(input.position, 1.0);
    output.clip_position = uniforms.projection * uniforms.view * world_position;
    output.world_normal = (uniforms.inverse_transpose_world * vec4<f32>(input.normal, 0.0)).xyz;
    output.uv = input.uv * uniforms.tiling.xy;
    return output;
}

@fragment
fn fs_main(input: VertexOutput) -> GBufferOutput {
    var output: GBufferOutput;
    let texel = textureSample(albedo_texture, albedo_sampler, input.uv);
    output.albedo = vec4<f32>(texel.rgb * uniforms.albedo_color.rgb, 1.0);
    output.normal = vec4<f32>(encode_normal(normalize(input.world_normal)), uniforms.albedo_color.a);
    // Fragment position z is already clip.z / clip.w
    output.depth = input.clip_position.z;
    return output;
}
"#;

/// Draws scene objects into a bound G-buffer
pub struct GeometryPass {
    pipeline: RenderPipelineHandle,
    material_layout: BindGroupLayoutHandle,
    sampler: SamplerHandle,
    uniforms: UniformSlots<GeometryUniforms>,
    materials: HashMap<TextureViewHandle, BindGroupHandle>,
}

impl GeometryPass {
    pub const STATE: PassState = PassState::GEOMETRY;

    /// Layouts of `@group(0)` (object parameters) and `@group(1)` (albedo)
    pub fn bind_group_layouts() -> [Vec<BindGroupLayoutEntry>; 2] {
        [
            uniform_layout_entries(ShaderStageFlags::VERTEX_FRAGMENT),
            vec![
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStageFlags::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                    },
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStageFlags::FRAGMENT,
                    ty: BindingType::Sampler { filtering: true },
                },
            ],
        ]
    }

    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B) -> BackendResult<Self> {
        let [uniform_entries, material_entries] = Self::bind_group_layouts();
        let uniform_layout = backend.create_bind_group_layout(&uniform_entries)?;
        let material_layout = backend.create_bind_group_layout(&material_entries)?;

        let pipeline = backend.create_render_pipeline(&Self::STATE.pipeline_descriptor(
            "Geometry Encode",
            ShaderProgram::GBuffer,
            Vertex::layout(),
            vec![uniform_layout, material_layout],
            &GBuffer::FORMATS,
            Some(DEPTH_BUFFER_FORMAT),
        ))?;

        let sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("Albedo Sampler".to_string()),
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            ..Default::default()
        })?;

        Ok(Self {
            pipeline,
            material_layout,
            sampler,
            uniforms: UniformSlots::new("Geometry", uniform_layout),
            materials: HashMap::new(),
        })
    }

    fn material<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        albedo: TextureViewHandle,
    ) -> BackendResult<BindGroupHandle> {
        if let Some(group) = self.materials.get(&albedo) {
            return Ok(*group);
        }
        let group = backend.create_bind_group(
            self.material_layout,
            &[
                (0, BindGroupEntry::Texture(albedo)),
                (1, BindGroupEntry::Sampler(self.sampler)),
            ],
        )?;
        self.materials.insert(albedo, group);
        Ok(group)
    }

    /// Draw every object into the bound G-buffer, returning the draw count
    pub fn record<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        _target: &GBufferWriter<'_>,
        draws: &[GeometryDraw<'_>],
    ) -> BackendResult<usize> {
        backend.set_render_pipeline(self.pipeline);

        for (index, draw) in draws.iter().enumerate() {
            let object = self.uniforms.write(backend, index, &draw.uniforms)?;
            let material = self.material(backend, draw.albedo)?;

            backend.set_bind_group(0, object);
            backend.set_bind_group(1, material);
            draw.mesh.draw(backend);

            log::trace!(
                "Geometry draw {}: '{}' ({} parts)",
                index,
                draw.mesh.name,
                draw.mesh.parts.len()
            );
        }

        Ok(draws.len())
    }

    pub fn release<B: GraphicsBackend + ?Sized>(mut self, backend: &mut B) {
        for (_, group) in self.materials.drain() {
            backend.destroy_bind_group(group);
        }
        self.uniforms.release(backend);
    }
}
