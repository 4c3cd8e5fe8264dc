//! Fixed-function state per pipeline phase
//!
//! Each phase owns an immutable [`PassState`] that is baked into its render
//! pipelines, so entering a phase sets every blend/depth/raster bit it needs
//! and nothing leaks over from the previous phase.

use crate::backend::*;

/// Depth test configuration of a phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthState {
    pub compare: CompareFunction,
    pub write: bool,
}

/// Blend, depth and rasterizer state a phase runs with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassState {
    /// `None` writes fragments straight through
    pub blend: Option<BlendState>,
    /// `None` disables the depth test
    pub depth: Option<DepthState>,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
}

impl PassState {
    /// GeometryEncode: opaque, depth `Less` with writes, back faces culled
    pub const GEOMETRY: PassState = PassState {
        blend: None,
        depth: Some(DepthState {
            compare: CompareFunction::Less,
            write: true,
        }),
        cull_mode: CullMode::Back,
        front_face: FrontFace::Ccw,
    };

    /// LightAccumulate: additive, no depth test, no culling
    pub const LIGHT_ACCUMULATION: PassState = PassState {
        blend: Some(BlendState {
            color: BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::One,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent {
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::One,
                operation: BlendOperation::Add,
            },
        }),
        depth: None,
        cull_mode: CullMode::None,
        front_face: FrontFace::Ccw,
    };

    /// Combine: opaque, no depth test, no culling
    pub const COMBINE: PassState = PassState {
        blend: None,
        depth: None,
        cull_mode: CullMode::None,
        front_face: FrontFace::Ccw,
    };

    /// Debug overlay, same as combine
    pub const DEBUG_BLIT: PassState = Self::COMBINE;

    /// Color target states for `formats`, all sharing this phase's blend state
    pub fn color_targets(&self, formats: &[TextureFormat]) -> Vec<ColorTargetState> {
        formats
            .iter()
            .map(|&format| ColorTargetState {
                format,
                blend: self.blend,
                write_mask: ColorWrites::ALL,
            })
            .collect()
    }

    /// Depth-stencil state for a pipeline rendering with `depth_format` attached
    pub fn depth_stencil(&self, depth_format: Option<TextureFormat>) -> Option<DepthStencilState> {
        let format = depth_format?;
        let depth = self.depth.unwrap_or(DepthState {
            compare: CompareFunction::Always,
            write: false,
        });
        Some(DepthStencilState {
            format,
            depth_write_enabled: depth.write,
            depth_compare: depth.compare,
        })
    }

    /// Build the pipeline descriptor of `program` under this state
    pub fn pipeline_descriptor(
        &self,
        label: &str,
        program: crate::shader::ShaderProgram,
        vertex_layout: VertexBufferLayout,
        bind_group_layouts: Vec<BindGroupLayoutHandle>,
        color_formats: &[TextureFormat],
        depth_format: Option<TextureFormat>,
    ) -> RenderPipelineDescriptor {
        RenderPipelineDescriptor {
            label: Some(label.to_string()),
            program,
            vertex_layouts: vec![vertex_layout],
            bind_group_layouts,
            primitive_topology: PrimitiveTopology::TriangleList,
            front_face: self.front_face,
            cull_mode: self.cull_mode,
            depth_stencil: self.depth_stencil(depth_format),
            color_targets: self.color_targets(color_formats),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_accumulation_is_additive() {
        assert_eq!(PassState::LIGHT_ACCUMULATION.blend, Some(BlendState::additive()));
        assert!(PassState::LIGHT_ACCUMULATION.depth.is_none());
    }

    #[test]
    fn test_geometry_and_combine_are_opaque() {
        assert!(PassState::GEOMETRY.blend.is_none());
        assert!(PassState::COMBINE.blend.is_none());
        assert_eq!(PassState::GEOMETRY.cull_mode, CullMode::Back);
        assert_eq!(
            PassState::GEOMETRY.depth,
            Some(DepthState {
                compare: CompareFunction::Less,
                write: true
            })
        );
    }

    #[test]
    fn test_disabled_depth_maps_to_always_without_writes() {
        let ds = PassState::COMBINE
            .depth_stencil(Some(TextureFormat::Depth32Float))
            .unwrap();
        assert_eq!(ds.depth_compare, CompareFunction::Always);
        assert!(!ds.depth_write_enabled);
        assert!(PassState::COMBINE.depth_stencil(None).is_none());
    }
}
