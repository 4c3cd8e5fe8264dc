//! Combine pass
//!
//! Composites the resolved G-buffer albedo with the accumulated light into the
//! display surface: `albedo * (diffuse + ambient) + specular` where geometry
//! was drawn, the background color everywhere else.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::backend::*;
use crate::pipeline::quad::FullScreenQuad;
use crate::pipeline::state::PassState;
use crate::pipeline::targets::{GBuffer, LightAccumulationBuffer, ResolvedGBuffer, ResolvedLightAccumulation};
use crate::pipeline::uniforms::{texture_layout_entry, uniform_layout_entries, UniformSlots};
use crate::shader::ShaderProgram;

/// Parameters of the `combine` program, `@group(1) @binding(0)`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CombineUniforms {
    /// rgb added to the diffuse light before the albedo multiply
    pub ambient: Vec4,
    /// Color of pixels no geometry covered
    pub background: Vec4,
}

impl CombineUniforms {
    pub fn new(ambient: Vec3, background: Vec4) -> Self {
        Self {
            ambient: ambient.extend(0.0),
            background,
        }
    }
}

/// Combine program; the encoding helpers and the full-screen vertex stage
/// are prepended
pub const COMBINE_SHADER: &str = r#"
struct CombineUniforms {
    ambient: vec4<f32>,
    background: vec4<f32>,
}

@group(0) @binding(0) var albedo_texture: texture_2d<f32>;
@group(0) @binding(1) var diffuse_texture: texture_2d<f32>;
@group(0) @binding(2) var specular_texture: texture_2d<f32>;
@group(1) @binding(0) var<uniform> params: CombineUniforms;

@fragment
fn fs_main(input: QuadOutput) -> @location(0) vec4<f32> {
    let pixel = vec2<i32>(input.position.xy);
    let albedo = textureLoad(albedo_texture, pixel, 0);
    if (albedo.a < COVERAGE_THRESHOLD) {
        return params.background;
    }

    let diffuse = textureLoad(diffuse_texture, pixel, 0).rgb;
    let specular = textureLoad(specular_texture, pixel, 0).rgb;
    return vec4<f32>(albedo.rgb * (diffuse + params.ambient.rgb) + specular, 1.0);
}
"#;

/// Final composite into the display surface
pub struct CombinePass {
    pipeline: RenderPipelineHandle,
    inputs_layout: BindGroupLayoutHandle,
    uniforms: UniformSlots<CombineUniforms>,
    inputs_group: Option<([TextureViewHandle; 3], BindGroupHandle)>,
}

impl CombinePass {
    pub const STATE: PassState = PassState::COMBINE;

    /// Layouts of `@group(0)` (albedo, diffuse, specular) and `@group(1)`
    pub fn bind_group_layouts() -> [Vec<BindGroupLayoutEntry>; 2] {
        [
            vec![
                texture_layout_entry(0, GBuffer::ALBEDO_FORMAT),
                texture_layout_entry(1, LightAccumulationBuffer::FORMAT),
                texture_layout_entry(2, LightAccumulationBuffer::FORMAT),
            ],
            uniform_layout_entries(ShaderStageFlags::FRAGMENT),
        ]
    }

    /// `output_format` is the format of the display surface
    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B, output_format: TextureFormat) -> BackendResult<Self> {
        let [inputs_entries, uniform_entries] = Self::bind_group_layouts();
        let inputs_layout = backend.create_bind_group_layout(&inputs_entries)?;
        let uniform_layout = backend.create_bind_group_layout(&uniform_entries)?;

        let pipeline = backend.create_render_pipeline(&Self::STATE.pipeline_descriptor(
            "Combine",
            ShaderProgram::Combine,
            QuadVertex::layout(),
            vec![inputs_layout, uniform_layout],
            &[output_format],
            None,
        ))?;

        Ok(Self {
            pipeline,
            inputs_layout,
            uniforms: UniformSlots::new("Combine", uniform_layout),
            inputs_group: None,
        })
    }

    fn inputs_group<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        views: [TextureViewHandle; 3],
    ) -> BackendResult<BindGroupHandle> {
        if let Some((cached, group)) = self.inputs_group {
            if cached == views {
                return Ok(group);
            }
            backend.destroy_bind_group(group);
            self.inputs_group = None;
        }

        let group = backend.create_bind_group(
            self.inputs_layout,
            &[
                (0, BindGroupEntry::Texture(views[0])),
                (1, BindGroupEntry::Texture(views[1])),
                (2, BindGroupEntry::Texture(views[2])),
            ],
        )?;
        self.inputs_group = Some((views, group));
        Ok(group)
    }

    /// Render the composite into `output`, a `size` sized display view
    #[allow(clippy::too_many_arguments)]
    pub fn record<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        gbuffer: &ResolvedGBuffer<'_>,
        lights: &ResolvedLightAccumulation<'_>,
        quad: &FullScreenQuad,
        output: TextureViewHandle,
        size: (u32, u32),
        uniforms: &CombineUniforms,
    ) -> BackendResult<()> {
        let inputs = self.inputs_group(backend, [gbuffer.albedo(), lights.diffuse(), lights.specular()])?;
        let params = self.uniforms.write(backend, 0, uniforms)?;

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Combine".to_string()),
            color_attachments: vec![ColorAttachment {
                view: output,
                load_op: LoadOp::Clear(uniforms.background.to_array()),
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        });
        backend.set_viewport(0.0, 0.0, size.0 as f32, size.1 as f32, 0.0, 1.0);
        backend.set_render_pipeline(self.pipeline);
        backend.set_bind_group(0, inputs);
        backend.set_bind_group(1, params);
        quad.draw(backend);
        backend.end_render_pass();

        Ok(())
    }

    pub fn release<B: GraphicsBackend + ?Sized>(mut self, backend: &mut B) {
        if let Some((_, group)) = self.inputs_group.take() {
            backend.destroy_bind_group(group);
        }
        self.uniforms.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambient_alpha_is_zero() {
        let uniforms = CombineUniforms::new(Vec3::splat(0.3), Vec4::new(0.39, 0.58, 0.93, 1.0));
        assert_eq!(uniforms.ambient, Vec4::new(0.3, 0.3, 0.3, 0.0));
        assert_eq!(std::mem::size_of::<CombineUniforms>(), 32);
    }
}
