//! Light accumulation pass
//!
//! One full-screen draw per light. Each draw reads the resolved G-buffer,
//! rebuilds position and normal per pixel, evaluates Phong and adds the
//! result into the diffuse and specular accumulation targets. The specular
//! term is scaled by the surface's own coefficient from the normal alpha.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::backend::*;
use crate::pipeline::quad::FullScreenQuad;
use crate::pipeline::shading::LightingConfig;
use crate::pipeline::state::PassState;
use crate::pipeline::targets::{GBuffer, LightAccumulationBuffer, LightAccumulationWriter, ResolvedGBuffer};
use crate::pipeline::uniforms::{texture_layout_entry, uniform_layout_entries, UniformSlots};
use crate::scene::{CameraSnapshot, DirectionalLight, Light};
use crate::shader::ShaderProgram;

/// Parameters of the `directional_light` program, `@group(1) @binding(0)`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightUniforms {
    pub inverse_view_projection: Mat4,
    /// xyz = direction the light travels
    pub light_direction: Vec4,
    pub light_color: Vec4,
    pub eye_position: Vec4,
    /// x = shininess, y = k_diffuse, z = k_specular
    pub material: Vec4,
}

impl LightUniforms {
    pub fn new(light: &DirectionalLight, camera: &CameraSnapshot, config: &LightingConfig) -> Self {
        Self {
            inverse_view_projection: camera.inverse_view_projection(),
            light_direction: light.direction.extend(0.0),
            light_color: light.color.extend(1.0),
            eye_position: camera.eye_position.extend(1.0),
            material: Vec4::new(config.shininess, config.k_diffuse, config.k_specular, 0.0),
        }
    }

    pub fn lighting_config(&self) -> LightingConfig {
        LightingConfig {
            shininess: self.material.x,
            k_diffuse: self.material.y,
            k_specular: self.material.z,
        }
    }
}

/// Directional light program; the encoding helpers and the full-screen
/// vertex stage are prepended
pub const DIRECTIONAL_LIGHT_SHADER: &str = r#"
struct LightUniforms {
    inverse_view_projection: mat4x4<f32>,
    light_direction: vec4<f32>,
    light_color: vec4<f32>,
    eye_position: vec4<f32>,
    material: vec4<f32>,
}

struct LightOutput {
    @location(0) diffuse: vec4<f32>,
    @location(1) specular: vec4<f32>,
}

@group(0) @binding(0) var gbuffer_albedo: texture_2d<f32>;
@group(0) @binding(1) var gbuffer_normal: texture_2d<f32>;
@group(0) @binding(2) var gbuffer_depth: texture_2d<f32>;
@group(1) @binding(0) var<uniform> light: LightUniforms;

@fragment
fn fs_main(input: QuadOutput) -> LightOutput {
    var output: LightOutput;
    output.diffuse = vec4<f32>(0.0);
    output.specular = vec4<f32>(0.0);

    let pixel = vec2<i32>(input.position.xy);
    let albedo = textureLoad(gbuffer_albedo, pixel, 0);
    if (albedo.a < COVERAGE_THRESHOLD) {
        return output;
    }

    let encoded_normal = textureLoad(gbuffer_normal, pixel, 0);
    let n = decode_normal(encoded_normal.xyz);
    let depth = textureLoad(gbuffer_depth, pixel, 0).r;
    let world_position = reconstruct_world_position(input.uv, depth, light.inverse_view_projection);

    let l = normalize(-light.light_direction.xyz);
    let v = normalize(light.eye_position.xyz - world_position);
    let n_dot_l = dot(n, l);

    let diffuse = light.light_color.rgb * max(n_dot_l, 0.0) * light.material.y;
    var specular = vec3<f32>(0.0);
    if (n_dot_l > 0.0) {
        let r = reflect(-l, n);
        specular = light.light_color.rgb * pow(max(dot(r, v), 0.0), light.material.x) * light.material.z
            * encoded_normal.a;
    }

    output.diffuse = vec4<f32>(diffuse, 1.0);
    output.specular = vec4<f32>(specular, 1.0);
    return output;
}
"#;

/// Accumulates every light of a scene into a bound accumulation buffer
pub struct LightingPass {
    pipeline: RenderPipelineHandle,
    gbuffer_layout: BindGroupLayoutHandle,
    uniforms: UniformSlots<LightUniforms>,
    gbuffer_group: Option<([TextureViewHandle; 3], BindGroupHandle)>,
}

impl LightingPass {
    pub const STATE: PassState = PassState::LIGHT_ACCUMULATION;

    /// Layouts of `@group(0)` (G-buffer) and `@group(1)` (light parameters)
    pub fn bind_group_layouts() -> [Vec<BindGroupLayoutEntry>; 2] {
        [
            vec![
                texture_layout_entry(0, GBuffer::ALBEDO_FORMAT),
                texture_layout_entry(1, GBuffer::NORMAL_FORMAT),
                texture_layout_entry(2, GBuffer::DEPTH_FORMAT),
            ],
            uniform_layout_entries(ShaderStageFlags::FRAGMENT),
        ]
    }

    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B) -> BackendResult<Self> {
        let [gbuffer_entries, uniform_entries] = Self::bind_group_layouts();
        let gbuffer_layout = backend.create_bind_group_layout(&gbuffer_entries)?;
        let uniform_layout = backend.create_bind_group_layout(&uniform_entries)?;

        let pipeline = backend.create_render_pipeline(&Self::STATE.pipeline_descriptor(
            "Light Accumulate",
            ShaderProgram::DirectionalLight,
            QuadVertex::layout(),
            vec![gbuffer_layout, uniform_layout],
            &LightAccumulationBuffer::FORMATS,
            None,
        ))?;

        Ok(Self {
            pipeline,
            gbuffer_layout,
            uniforms: UniformSlots::new("Light", uniform_layout),
            gbuffer_group: None,
        })
    }

    /// Bind group over the G-buffer views, rebuilt when the targets change
    fn gbuffer_group<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        gbuffer: &ResolvedGBuffer<'_>,
    ) -> BackendResult<BindGroupHandle> {
        let views = [gbuffer.albedo(), gbuffer.normal(), gbuffer.depth()];
        if let Some((cached, group)) = self.gbuffer_group {
            if cached == views {
                return Ok(group);
            }
            backend.destroy_bind_group(group);
            self.gbuffer_group = None;
        }

        let group = backend.create_bind_group(
            self.gbuffer_layout,
            &[
                (0, BindGroupEntry::Texture(views[0])),
                (1, BindGroupEntry::Texture(views[1])),
                (2, BindGroupEntry::Texture(views[2])),
            ],
        )?;
        self.gbuffer_group = Some((views, group));
        Ok(group)
    }

    /// Add every light into the accumulation buffer, returning how many were
    /// drawn. The buffer was cleared when it was bound; nothing here clears it.
    pub fn record<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        gbuffer: &ResolvedGBuffer<'_>,
        _target: &LightAccumulationWriter<'_>,
        quad: &FullScreenQuad,
        lights: &[Light],
        camera: &CameraSnapshot,
        config: &LightingConfig,
    ) -> BackendResult<usize> {
        let gbuffer_group = self.gbuffer_group(backend, gbuffer)?;
        backend.set_render_pipeline(self.pipeline);
        backend.set_bind_group(0, gbuffer_group);

        let mut drawn = 0;
        for (index, light) in lights.iter().enumerate() {
            let Light::Directional(directional) = light;
            if directional.is_degenerate() {
                log::warn!("Skipping light {} with a zero direction", index);
                continue;
            }

            let uniforms = LightUniforms::new(directional, camera, config);
            let group = self.uniforms.write(backend, drawn, &uniforms)?;
            backend.set_bind_group(1, group);
            quad.draw(backend);
            drawn += 1;

            log::trace!(
                "Light {}: direction {:?}, color {:?}",
                index,
                directional.direction,
                directional.color
            );
        }

        Ok(drawn)
    }

    pub fn release<B: GraphicsBackend + ?Sized>(mut self, backend: &mut B) {
        if let Some((_, group)) = self.gbuffer_group.take() {
            backend.destroy_bind_group(group);
        }
        self.uniforms.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_uniform_size() {
        assert_eq!(std::mem::size_of::<LightUniforms>(), 64 + 4 * 16);
    }

    #[test]
    fn test_material_round_trips_through_uniforms() {
        let config = LightingConfig {
            shininess: 32.0,
            k_diffuse: 0.7,
            k_specular: 0.4,
        };
        let camera = CameraSnapshot {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            eye_position: Vec3::new(1.0, 2.0, 3.0),
        };
        let light = DirectionalLight::new(Vec3::NEG_Y, Vec3::new(1.0, 0.5, 0.25));
        let uniforms = LightUniforms::new(&light, &camera, &config);

        assert_eq!(uniforms.lighting_config(), config);
        assert_eq!(uniforms.light_direction, Vec4::new(0.0, -1.0, 0.0, 0.0));
        assert_eq!(uniforms.eye_position.truncate(), camera.eye_position);
    }
}
