//! Triangle setup and scan conversion for the software backend

use glam::{Vec2, Vec3, Vec4};

use crate::backend::{CullMode, FrontFace};

pub const MAX_VARYINGS: usize = 8;

/// Interpolated vertex outputs, unused slots stay zero
pub type Varyings = [f32; MAX_VARYINGS];

/// Vertex stage output
#[derive(Debug, Clone, Copy)]
pub struct ClipVertex {
    pub clip: Vec4,
    pub varyings: Varyings,
}

impl ClipVertex {
    fn lerp(&self, other: &ClipVertex, t: f32) -> ClipVertex {
        let mut varyings = [0.0; MAX_VARYINGS];
        for (i, v) in varyings.iter_mut().enumerate() {
            *v = self.varyings[i] + (other.varyings[i] - self.varyings[i]) * t;
        }
        ClipVertex {
            clip: self.clip.lerp(other.clip, t),
            varyings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// NDC to framebuffer coordinates (y down) and depth
    fn transform(&self, ndc: Vec3) -> Vec3 {
        Vec3::new(
            self.x + (ndc.x + 1.0) * 0.5 * self.width,
            self.y + (1.0 - ndc.y) * 0.5 * self.height,
            self.min_depth + ndc.z * (self.max_depth - self.min_depth),
        )
    }
}

/// One covered pixel of a triangle
#[derive(Debug, Clone, Copy)]
pub struct Fragment {
    pub x: u32,
    pub y: u32,
    /// `@builtin(position)`: pixel center, depth and 1/w
    pub position: Vec4,
    pub front_facing: bool,
    pub varyings: Varyings,
}

/// Clip a triangle against the near plane (`z >= 0`), returning a fan
pub fn clip_near(triangle: [ClipVertex; 3]) -> Vec<[ClipVertex; 3]> {
    if triangle.iter().all(|v| v.clip.z >= 0.0) {
        return vec![triangle];
    }
    if triangle.iter().all(|v| v.clip.z < 0.0) {
        return Vec::new();
    }

    let mut polygon: Vec<ClipVertex> = Vec::with_capacity(4);
    for i in 0..3 {
        let current = triangle[i];
        let next = triangle[(i + 1) % 3];
        let current_inside = current.clip.z >= 0.0;
        let next_inside = next.clip.z >= 0.0;

        if current_inside {
            polygon.push(current);
        }
        if current_inside != next_inside {
            let t = current.clip.z / (current.clip.z - next.clip.z);
            polygon.push(current.lerp(&next, t));
        }
    }

    (1..polygon.len().saturating_sub(1))
        .map(|i| [polygon[0], polygon[i], polygon[i + 1]])
        .collect()
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Top-left fill rule for edges of a triangle with positive `edge` area
fn is_top_left(a: Vec2, b: Vec2) -> bool {
    let d = b - a;
    (d.y == 0.0 && d.x > 0.0) || d.y < 0.0
}

fn covers(w: f32, top_left: bool) -> bool {
    w > 0.0 || (w == 0.0 && top_left)
}

/// Scan convert a clipped triangle, calling `emit` for every covered pixel
/// inside the viewport and the `bounds` of the attachments.
pub fn rasterize(
    triangle: &[ClipVertex; 3],
    viewport: &Viewport,
    cull_mode: CullMode,
    front_face: FrontFace,
    bounds: (u32, u32),
    mut emit: impl FnMut(Fragment),
) {
    let screen: [Vec3; 3] =
        std::array::from_fn(|i| viewport.transform(triangle[i].clip.truncate() / triangle[i].clip.w));
    let inv_w: [f32; 3] = std::array::from_fn(|i| 1.0 / triangle[i].clip.w);

    let area = edge(screen[0].truncate(), screen[1].truncate(), screen[2].truncate());
    if area == 0.0 || !area.is_finite() {
        return;
    }

    // Framebuffer y points down, so counter-clockwise in NDC is negative here
    let ccw = area < 0.0;
    let front_facing = match front_face {
        FrontFace::Ccw => ccw,
        FrontFace::Cw => !ccw,
    };
    match cull_mode {
        CullMode::Back if !front_facing => return,
        CullMode::Front if front_facing => return,
        _ => {}
    }

    let order: [usize; 3] = if area > 0.0 { [0, 1, 2] } else { [0, 2, 1] };
    let area = area.abs();
    let p: [Vec2; 3] = std::array::from_fn(|i| screen[order[i]].truncate());
    let z: [f32; 3] = std::array::from_fn(|i| screen[order[i]].z);
    let iw: [f32; 3] = std::array::from_fn(|i| inv_w[order[i]]);
    let attrs: [&Varyings; 3] = std::array::from_fn(|i| &triangle[order[i]].varyings);

    let top_left = [
        is_top_left(p[1], p[2]),
        is_top_left(p[2], p[0]),
        is_top_left(p[0], p[1]),
    ];

    let min = p[0].min(p[1]).min(p[2]);
    let max = p[0].max(p[1]).max(p[2]);
    let x_start = min.x.floor().max(viewport.x.floor()).max(0.0) as u32;
    let y_start = min.y.floor().max(viewport.y.floor()).max(0.0) as u32;
    let x_end = (max.x.ceil().min((viewport.x + viewport.width).ceil()).max(0.0) as u32).min(bounds.0);
    let y_end = (max.y.ceil().min((viewport.y + viewport.height).ceil()).max(0.0) as u32).min(bounds.1);

    for y in y_start..y_end {
        for x in x_start..x_end {
            let center = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let w = [
                edge(p[1], p[2], center),
                edge(p[2], p[0], center),
                edge(p[0], p[1], center),
            ];
            if !(0..3).all(|i| covers(w[i], top_left[i])) {
                continue;
            }

            let l = [w[0] / area, w[1] / area, w[2] / area];
            let depth = l[0] * z[0] + l[1] * z[1] + l[2] * z[2];
            if !(0.0..=1.0).contains(&depth) {
                continue;
            }

            let one_over_w = l[0] * iw[0] + l[1] * iw[1] + l[2] * iw[2];
            let mut varyings = [0.0; MAX_VARYINGS];
            for (k, v) in varyings.iter_mut().enumerate() {
                *v = (l[0] * attrs[0][k] * iw[0]
                    + l[1] * attrs[1][k] * iw[1]
                    + l[2] * attrs[2][k] * iw[2])
                    / one_over_w;
            }

            emit(Fragment {
                x,
                y,
                position: Vec4::new(center.x, center.y, depth, one_over_w),
                front_facing,
                varyings,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32, z: f32) -> ClipVertex {
        ClipVertex {
            clip: Vec4::new(x, y, z, 1.0),
            varyings: [0.0; MAX_VARYINGS],
        }
    }

    fn count(triangle: &[ClipVertex; 3], cull: CullMode, size: u32) -> usize {
        let mut n = 0;
        rasterize(
            triangle,
            &Viewport::full(size, size),
            cull,
            FrontFace::Ccw,
            (size, size),
            |_| n += 1,
        );
        n
    }

    #[test]
    fn test_ccw_triangle_is_front_facing() {
        let tri = [vertex(-1.0, -1.0, 0.5), vertex(1.0, -1.0, 0.5), vertex(-1.0, 1.0, 0.5)];
        let mut facing = None;
        rasterize(&tri, &Viewport::full(4, 4), CullMode::None, FrontFace::Ccw, (4, 4), |f| {
            facing = Some(f.front_facing)
        });
        assert_eq!(facing, Some(true));
        assert!(count(&tri, CullMode::Back, 4) > 0);
        assert_eq!(count(&tri, CullMode::Front, 4), 0);
    }

    #[test]
    fn test_back_face_is_culled() {
        let tri = [vertex(-1.0, -1.0, 0.5), vertex(-1.0, 1.0, 0.5), vertex(1.0, -1.0, 0.5)];
        assert_eq!(count(&tri, CullMode::Back, 4), 0);
        assert!(count(&tri, CullMode::None, 4) > 0);
    }

    #[test]
    fn test_shared_edge_is_filled_once() {
        // Two halves of a full-screen quad sharing the diagonal
        let a = [vertex(-1.0, -1.0, 0.0), vertex(1.0, -1.0, 0.0), vertex(1.0, 1.0, 0.0)];
        let b = [vertex(-1.0, -1.0, 0.0), vertex(1.0, 1.0, 0.0), vertex(-1.0, 1.0, 0.0)];
        let mut hits = vec![0u32; 64];
        for tri in [&a, &b] {
            rasterize(tri, &Viewport::full(8, 8), CullMode::None, FrontFace::Ccw, (8, 8), |f| {
                hits[(f.y * 8 + f.x) as usize] += 1
            });
        }
        assert!(hits.iter().all(|&h| h == 1), "{hits:?}");
    }

    #[test]
    fn test_viewport_limits_coverage() {
        let a = [vertex(-1.0, -1.0, 0.0), vertex(1.0, -1.0, 0.0), vertex(1.0, 1.0, 0.0)];
        let b = [vertex(-1.0, -1.0, 0.0), vertex(1.0, 1.0, 0.0), vertex(-1.0, 1.0, 0.0)];
        let viewport = Viewport {
            x: 4.0,
            y: 0.0,
            width: 4.0,
            height: 4.0,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let mut covered = Vec::new();
        for tri in [&a, &b] {
            rasterize(tri, &viewport, CullMode::None, FrontFace::Ccw, (8, 8), |f| {
                covered.push((f.x, f.y))
            });
        }
        assert_eq!(covered.len(), 16);
        assert!(covered.iter().all(|&(x, y)| (4..8).contains(&x) && y < 4));
    }

    #[test]
    fn test_near_clipping_splits_triangle() {
        let tri = [vertex(0.0, 0.0, -1.0), vertex(1.0, 0.0, 1.0), vertex(0.0, 1.0, 1.0)];
        let clipped = clip_near(tri);
        assert_eq!(clipped.len(), 2);
        assert!(clipped.iter().flatten().all(|v| v.clip.z >= -1e-6));
        assert!(clip_near([vertex(0.0, 0.0, -1.0); 3]).is_empty());
    }

    #[test]
    fn test_varyings_interpolate_at_pixel_centers() {
        let mut tri = [vertex(-1.0, 1.0, 0.0), vertex(-1.0, -1.0, 0.0), vertex(1.0, 1.0, 0.0)];
        tri[0].varyings[0] = 0.0;
        tri[1].varyings[0] = 0.0;
        tri[2].varyings[0] = 1.0;
        let mut first = None;
        rasterize(&tri, &Viewport::full(4, 4), CullMode::None, FrontFace::Ccw, (4, 4), |f| {
            if f.x == 0 && f.y == 0 {
                first = Some(f.varyings[0]);
            }
        });
        assert!((first.unwrap() - 0.125).abs() < 1e-6);
    }
}
