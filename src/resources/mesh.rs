//! Mesh data structures and generation

use crate::backend::*;
use glam::{Vec2, Vec3, Vec4};

/// One drawable part of a mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl SubMesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// First index that points past the vertex list
    pub fn out_of_range_index(&self) -> Option<u32> {
        let count = self.vertices.len() as u32;
        self.indices.iter().copied().find(|&i| i >= count)
    }
}

/// A named list of sub-meshes drawn with the same transform and material
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub submeshes: Vec<SubMesh>,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            submeshes: Vec::new(),
        }
    }

    pub fn from_submesh(name: &str, submesh: SubMesh) -> Self {
        Self {
            name: name.to_string(),
            submeshes: vec![submesh],
        }
    }

    /// Concatenate the parts of several meshes
    pub fn merge(name: &str, meshes: impl IntoIterator<Item = Mesh>) -> Self {
        Self {
            name: name.to_string(),
            submeshes: meshes.into_iter().flat_map(|m| m.submeshes).collect(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.vertices.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.submeshes.iter().map(SubMesh::triangle_count).sum()
    }

    /// Create a unit cube centered at origin
    pub fn cube() -> Self {
        let faces = [
            (Vec3::Z, Vec3::X),
            (-Vec3::Z, -Vec3::X),
            (Vec3::X, -Vec3::Z),
            (-Vec3::X, Vec3::Z),
            (Vec3::Y, Vec3::X),
            (-Vec3::Y, Vec3::X),
        ];

        let mut submesh = SubMesh::default();
        for (normal, right) in faces {
            let up = normal.cross(right);
            let base = submesh.vertices.len() as u32;
            let corners = [
                (-0.5, -0.5, Vec2::new(0.0, 1.0)),
                (0.5, -0.5, Vec2::new(1.0, 1.0)),
                (0.5, 0.5, Vec2::new(1.0, 0.0)),
                (-0.5, 0.5, Vec2::new(0.0, 0.0)),
            ];
            for (x, y, uv) in corners {
                submesh.vertices.push(Vertex {
                    position: normal * 0.5 + right * x + up * y,
                    normal,
                    uv,
                    tangent: right.extend(1.0),
                });
            }
            submesh
                .indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::from_submesh("cube", submesh)
    }

    /// UV sphere of radius 0.5, counter-clockwise seen from outside
    ///
    /// `rings` is rounded up to an even count so there is a row of vertices on
    /// the equator.
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = (rings.max(2) + 1) & !1;

        let segment_angle = std::f32::consts::TAU / segments as f32;
        let ring_angle = std::f32::consts::PI / rings as f32;

        let mut submesh = SubMesh::default();
        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            let y = phi.cos();
            let ring_radius = phi.sin();

            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let x = ring_radius * theta.cos();
                let z = ring_radius * theta.sin();

                submesh.vertices.push(Vertex {
                    position: Vec3::new(x, y, z) * 0.5,
                    normal: Vec3::new(x, y, z).normalize_or_zero(),
                    uv: Vec2::new(segment as f32 / segments as f32, ring as f32 / rings as f32),
                    tangent: Vec4::new(-theta.sin(), 0.0, theta.cos(), 1.0),
                });
            }
        }

        // `next` is one ring further down, `+ 1` one segment further around
        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;

                submesh.indices.extend_from_slice(&[
                    current,
                    current + 1,
                    next,
                    current + 1,
                    next + 1,
                    next,
                ]);
            }
        }

        Self::from_submesh("sphere", submesh)
    }

    /// Unit plane on XZ facing +Y
    pub fn plane() -> Self {
        Self::grid(1.0, 1.0, 1)
    }

    /// Subdivided plane on XZ facing +Y
    pub fn grid(width: f32, depth: f32, subdivisions: u32) -> Self {
        let subdivisions = subdivisions.max(1);
        let half_width = width / 2.0;
        let half_depth = depth / 2.0;
        let step_x = width / subdivisions as f32;
        let step_z = depth / subdivisions as f32;

        let mut submesh = SubMesh::default();
        for z in 0..=subdivisions {
            for x in 0..=subdivisions {
                submesh.vertices.push(Vertex {
                    position: Vec3::new(-half_width + x as f32 * step_x, 0.0, -half_depth + z as f32 * step_z),
                    normal: Vec3::Y,
                    uv: Vec2::new(x as f32 / subdivisions as f32, z as f32 / subdivisions as f32),
                    tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
                });
            }
        }

        for z in 0..subdivisions {
            for x in 0..subdivisions {
                let current = z * (subdivisions + 1) + x;
                let next = current + subdivisions + 1;

                submesh.indices.extend_from_slice(&[
                    current,
                    next,
                    current + 1,
                    current + 1,
                    next,
                    next + 1,
                ]);
            }
        }

        Self::from_submesh("plane", submesh)
    }
}

/// One uploaded sub-mesh
#[derive(Debug)]
pub struct GpuSubMesh {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
}

/// Mesh uploaded to the backend
#[derive(Debug)]
pub struct GpuMesh {
    pub name: String,
    pub parts: Vec<GpuSubMesh>,
}

impl GpuMesh {
    /// Upload every non-empty sub-mesh
    pub fn upload<B: GraphicsBackend + ?Sized>(backend: &mut B, mesh: &Mesh) -> BackendResult<Self> {
        let mut parts = Vec::with_capacity(mesh.submeshes.len());
        for (i, submesh) in mesh.submeshes.iter().enumerate() {
            if submesh.indices.is_empty() {
                log::warn!("Skipping empty part {} of mesh '{}'", i, mesh.name);
                continue;
            }
            if let Some(index) = submesh.out_of_range_index() {
                return Err(BackendError::BufferCreationFailed(format!(
                    "mesh '{}' part {} references vertex {} of {}",
                    mesh.name,
                    i,
                    index,
                    submesh.vertices.len()
                )));
            }

            let vertex_buffer = backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("{} Vertices {}", mesh.name, i)),
                    size: submesh.vertex_bytes().len() as u64,
                    usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
                },
                submesh.vertex_bytes(),
            )?;
            let index_buffer = backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("{} Indices {}", mesh.name, i)),
                    size: submesh.index_bytes().len() as u64,
                    usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
                },
                submesh.index_bytes(),
            )?;

            parts.push(GpuSubMesh {
                vertex_buffer,
                index_buffer,
                index_count: submesh.indices.len() as u32,
            });
        }

        Ok(Self {
            name: mesh.name.clone(),
            parts,
        })
    }

    /// Draw every part with the pipeline and bind groups already set
    pub fn draw<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) {
        for part in &self.parts {
            backend.set_vertex_buffer(0, part.vertex_buffer, 0);
            backend.set_index_buffer(part.index_buffer, 0, IndexFormat::Uint32);
            backend.draw_indexed(0..part.index_count, 0, 0..1);
        }
    }

    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        for part in self.parts {
            backend.destroy_buffer(part.vertex_buffer);
            backend.destroy_buffer(part.index_buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every triangle must wind counter-clockwise around its outward normal
    fn assert_outward_ccw(mesh: &Mesh) {
        for submesh in &mesh.submeshes {
            for tri in submesh.indices.chunks(3) {
                let [a, b, c] = [0, 1, 2].map(|i| submesh.vertices[tri[i] as usize]);
                let face = (b.position - a.position).cross(c.position - a.position);
                if face.length_squared() < 1e-12 {
                    continue; // collapsed at a pole
                }
                let normal = a.normal + b.normal + c.normal;
                assert!(face.dot(normal) > 0.0, "{} triangle {:?} winds clockwise", mesh.name, tri);
            }
        }
    }

    #[test]
    fn test_primitives_wind_counter_clockwise() {
        assert_outward_ccw(&Mesh::sphere(16, 8));
        assert_outward_ccw(&Mesh::cube());
        assert_outward_ccw(&Mesh::plane());
        assert_outward_ccw(&Mesh::grid(10.0, 10.0, 4));
    }

    #[test]
    fn test_sphere_has_equator_and_radius() {
        let sphere = Mesh::sphere(12, 7);
        let vertices = &sphere.submeshes[0].vertices;
        assert!(vertices.iter().any(|v| v.position.y.abs() < 1e-6));
        assert!(vertices
            .iter()
            .all(|v| (v.position.length() - 0.5).abs() < 1e-5));
        assert!(sphere.submeshes[0].out_of_range_index().is_none());
    }

    #[test]
    fn test_merge_keeps_parts() {
        let mesh = Mesh::merge("props", [Mesh::cube(), Mesh::plane()]);
        assert_eq!(mesh.submeshes.len(), 2);
        assert_eq!(mesh.triangle_count(), 12 + 2);
    }

    #[test]
    fn test_upload_rejects_bad_indices() {
        let mut backend = crate::backend::software::SoftwareBackend::new(1, 1);
        let mesh = Mesh::from_submesh(
            "broken",
            SubMesh::new(vec![Vertex::new(Vec3::ZERO, Vec3::Y, Vec2::ZERO)], vec![0, 1, 2]),
        );
        assert!(GpuMesh::upload(&mut backend, &mesh).is_err());

        let gpu = GpuMesh::upload(&mut backend, &Mesh::cube()).unwrap();
        assert_eq!(gpu.parts.len(), 1);
        assert_eq!(gpu.parts[0].index_count, 36);
    }
}
