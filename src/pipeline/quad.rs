//! Full-screen quad
//!
//! Two triangles covering NDC [-1,1]^2 with UVs whose origin is the top-left
//! corner, drawn without any transform to run a fragment program once per
//! pixel.

use crate::backend::*;
use glam::Vec2;

/// Vertex stage shared by every full-screen program
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct QuadInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
}

struct QuadOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(input: QuadInput) -> QuadOutput {
    var output: QuadOutput;
    output.position = vec4<f32>(input.position, 0.0, 1.0);
    output.uv = input.uv;
    return output;
}
"#;

pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: Vec2::new(-1.0, 1.0),
        uv: Vec2::new(0.0, 0.0),
    },
    QuadVertex {
        position: Vec2::new(1.0, 1.0),
        uv: Vec2::new(1.0, 0.0),
    },
    QuadVertex {
        position: Vec2::new(-1.0, -1.0),
        uv: Vec2::new(0.0, 1.0),
    },
    QuadVertex {
        position: Vec2::new(1.0, -1.0),
        uv: Vec2::new(1.0, 1.0),
    },
];

/// Counter-clockwise in NDC
pub const QUAD_INDICES: [u16; 6] = [2, 3, 1, 2, 1, 0];

pub struct FullScreenQuad {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
}

impl FullScreenQuad {
    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B) -> BackendResult<Self> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        let vertex_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some("Full-Screen Quad Vertices".to_string()),
                size: vertex_bytes.len() as u64,
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            },
            vertex_bytes,
        )?;

        // Index buffer sizes must be 4-byte aligned on some backends
        let mut index_bytes = bytemuck::cast_slice::<u16, u8>(&QUAD_INDICES).to_vec();
        index_bytes.resize(index_bytes.len().next_multiple_of(4), 0);
        let index_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some("Full-Screen Quad Indices".to_string()),
                size: index_bytes.len() as u64,
                usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
            },
            &index_bytes,
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
        })
    }

    /// Draw the quad with whatever pipeline and bind groups are set
    pub fn draw<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) {
        backend.set_vertex_buffer(0, self.vertex_buffer, 0);
        backend.set_index_buffer(self.index_buffer, 0, IndexFormat::Uint16);
        backend.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
    }

    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_buffer(self.vertex_buffer);
        backend.destroy_buffer(self.index_buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_area(a: Vec2, b: Vec2, c: Vec2) -> f32 {
        (b - a).perp_dot(c - a)
    }

    #[test]
    fn test_quad_triangles_are_counter_clockwise() {
        for tri in QUAD_INDICES.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| QUAD_VERTICES[tri[i] as usize].position);
            assert!(signed_area(a, b, c) > 0.0);
        }
    }

    #[test]
    fn test_quad_uv_matches_screen_convention() {
        for v in QUAD_VERTICES {
            let uv = crate::pipeline::encoding::ndc_to_uv(v.position);
            assert_eq!(uv, v.uv);
        }
    }
}
