//! Intermediate buffer view
//!
//! After the combine pass, blits the five intermediate buffers into a 3x2
//! grid of viewports over the display. The last cell keeps the final image.
//! Only reads resolved buffers.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use crate::backend::*;
use crate::pipeline::quad::FullScreenQuad;
use crate::pipeline::state::PassState;
use crate::pipeline::targets::{GBuffer, ResolvedGBuffer, ResolvedLightAccumulation};
use crate::pipeline::uniforms::{texture_layout_entry, uniform_layout_entries, UniformSlots};
use crate::shader::ShaderProgram;

pub const GRID_COLUMNS: u32 = 3;
pub const GRID_ROWS: u32 = 2;

/// Stretch applied to `1 - depth`; perspective depth crowds near 1.0
pub const DEFAULT_DEPTH_SCALE: f32 = 50.0;

/// How a blitted texel is turned into a color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugChannel {
    /// rgb as stored
    Color,
    /// Red channel as depth, shown as gray `(1 - r) * scale`
    Depth,
}

/// Parameters of the `debug_blit` program, `@group(1) @binding(0)`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DebugBlitUniforms {
    /// x = channel (0 color, 1 depth), y = depth scale
    pub params: Vec4,
}

impl DebugBlitUniforms {
    pub fn new(channel: DebugChannel, depth_scale: f32) -> Self {
        let mode = match channel {
            DebugChannel::Color => 0.0,
            DebugChannel::Depth => 1.0,
        };
        Self {
            params: Vec4::new(mode, depth_scale, 0.0, 0.0),
        }
    }

    pub fn channel(&self) -> DebugChannel {
        if self.params.x >= 0.5 {
            DebugChannel::Depth
        } else {
            DebugChannel::Color
        }
    }
}

/// Buffers shown by the view, in grid order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugBuffer {
    Albedo,
    Normal,
    Depth,
    Diffuse,
    Specular,
}

impl DebugBuffer {
    pub const ALL: [DebugBuffer; 5] = [
        DebugBuffer::Albedo,
        DebugBuffer::Normal,
        DebugBuffer::Depth,
        DebugBuffer::Diffuse,
        DebugBuffer::Specular,
    ];

    pub fn channel(&self) -> DebugChannel {
        match self {
            DebugBuffer::Depth => DebugChannel::Depth,
            _ => DebugChannel::Color,
        }
    }

    fn view(&self, gbuffer: &ResolvedGBuffer<'_>, lights: &ResolvedLightAccumulation<'_>) -> TextureViewHandle {
        match self {
            DebugBuffer::Albedo => gbuffer.albedo(),
            DebugBuffer::Normal => gbuffer.normal(),
            DebugBuffer::Depth => gbuffer.depth(),
            DebugBuffer::Diffuse => lights.diffuse(),
            DebugBuffer::Specular => lights.specular(),
        }
    }
}

/// Viewport `(x, y, width, height)` of grid cell `index` on a `size` display
pub fn cell_rect(index: usize, size: (u32, u32)) -> (f32, f32, f32, f32) {
    let width = (size.0 / GRID_COLUMNS).max(1) as f32;
    let height = (size.1 / GRID_ROWS).max(1) as f32;
    let column = (index as u32 % GRID_COLUMNS) as f32;
    let row = (index as u32 / GRID_COLUMNS) as f32;
    (column * width, row * height, width, height)
}

/// Single-texture blit; the full-screen vertex stage is prepended
pub const DEBUG_BLIT_SHADER: &str = r#"
struct DebugBlitUniforms {
    params: vec4<f32>,
}

@group(0) @binding(0) var source_texture: texture_2d<f32>;
@group(1) @binding(0) var<uniform> blit: DebugBlitUniforms;

@fragment
fn fs_main(input: QuadOutput) -> @location(0) vec4<f32> {
    let dimensions = textureDimensions(source_texture);
    let uv = clamp(input.uv, vec2<f32>(0.0), vec2<f32>(1.0));
    let coord = min(vec2<u32>(uv * vec2<f32>(dimensions)), dimensions - vec2<u32>(1u));
    let texel = textureLoad(source_texture, coord, 0);

    if (blit.params.x >= 0.5) {
        let gray = clamp((1.0 - texel.r) * blit.params.y, 0.0, 1.0);
        return vec4<f32>(gray, gray, gray, 1.0);
    }
    return vec4<f32>(texel.rgb, 1.0);
}
"#;

/// Split-screen dump of the intermediate buffers
pub struct DebugView {
    pipeline: RenderPipelineHandle,
    source_layout: BindGroupLayoutHandle,
    uniforms: UniformSlots<DebugBlitUniforms>,
    sources: [Option<(TextureViewHandle, BindGroupHandle)>; 5],
    depth_scale: f32,
}

impl DebugView {
    pub const STATE: PassState = PassState::DEBUG_BLIT;

    /// Layouts of `@group(0)` (source texture) and `@group(1)`; the source is
    /// declared non-filterable so the depth target can be bound too
    pub fn bind_group_layouts() -> [Vec<BindGroupLayoutEntry>; 2] {
        [
            vec![texture_layout_entry(0, GBuffer::DEPTH_FORMAT)],
            uniform_layout_entries(ShaderStageFlags::FRAGMENT),
        ]
    }

    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B, output_format: TextureFormat) -> BackendResult<Self> {
        let [source_entries, uniform_entries] = Self::bind_group_layouts();
        let source_layout = backend.create_bind_group_layout(&source_entries)?;
        let uniform_layout = backend.create_bind_group_layout(&uniform_entries)?;

        let pipeline = backend.create_render_pipeline(&Self::STATE.pipeline_descriptor(
            "Debug View",
            ShaderProgram::DebugBlit,
            QuadVertex::layout(),
            vec![source_layout, uniform_layout],
            &[output_format],
            None,
        ))?;

        Ok(Self {
            pipeline,
            source_layout,
            uniforms: UniformSlots::new("Debug Blit", uniform_layout),
            sources: [None; 5],
            depth_scale: DEFAULT_DEPTH_SCALE,
        })
    }

    pub fn set_depth_scale(&mut self, scale: f32) {
        self.depth_scale = scale;
    }

    fn source_group<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        cell: usize,
        view: TextureViewHandle,
    ) -> BackendResult<BindGroupHandle> {
        if let Some((cached, group)) = self.sources[cell] {
            if cached == view {
                return Ok(group);
            }
            backend.destroy_bind_group(group);
            self.sources[cell] = None;
        }
        let group = backend.create_bind_group(self.source_layout, &[(0, BindGroupEntry::Texture(view))])?;
        self.sources[cell] = Some((view, group));
        Ok(group)
    }

    /// Draw the grid over `output`, keeping what combine wrote underneath
    #[allow(clippy::too_many_arguments)]
    pub fn record<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        gbuffer: &ResolvedGBuffer<'_>,
        lights: &ResolvedLightAccumulation<'_>,
        quad: &FullScreenQuad,
        output: TextureViewHandle,
        size: (u32, u32),
    ) -> BackendResult<()> {
        let mut cells = Vec::with_capacity(DebugBuffer::ALL.len());
        for (cell, buffer) in DebugBuffer::ALL.iter().enumerate() {
            let source = self.source_group(backend, cell, buffer.view(gbuffer, lights))?;
            let params = self.uniforms.write(
                backend,
                cell,
                &DebugBlitUniforms::new(buffer.channel(), self.depth_scale),
            )?;
            cells.push((source, params));
        }

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Debug View".to_string()),
            color_attachments: vec![ColorAttachment {
                view: output,
                load_op: LoadOp::Load,
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        });
        backend.set_render_pipeline(self.pipeline);
        for (cell, (source, params)) in cells.into_iter().enumerate() {
            let (x, y, width, height) = cell_rect(cell, size);
            backend.set_viewport(x, y, width, height, 0.0, 1.0);
            backend.set_bind_group(0, source);
            backend.set_bind_group(1, params);
            quad.draw(backend);
        }
        backend.end_render_pass();

        Ok(())
    }

    pub fn release<B: GraphicsBackend + ?Sized>(mut self, backend: &mut B) {
        for (_, group) in self.sources.iter_mut().filter_map(Option::take) {
            backend.destroy_bind_group(group);
        }
        self.uniforms.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_cells_tile_the_display() {
        assert_eq!(cell_rect(0, (900, 600)), (0.0, 0.0, 300.0, 300.0));
        assert_eq!(cell_rect(2, (900, 600)), (600.0, 0.0, 300.0, 300.0));
        assert_eq!(cell_rect(4, (900, 600)), (300.0, 300.0, 300.0, 300.0));
    }

    #[test]
    fn test_channel_encoding() {
        assert_eq!(DebugBlitUniforms::new(DebugChannel::Depth, 10.0).channel(), DebugChannel::Depth);
        assert_eq!(DebugBlitUniforms::new(DebugChannel::Color, 10.0).channel(), DebugChannel::Color);
        assert_eq!(DebugBuffer::Depth.channel(), DebugChannel::Depth);
    }
}
