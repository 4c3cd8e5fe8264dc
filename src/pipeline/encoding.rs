//! G-buffer encode/decode conventions
//!
//! Everything written by the geometry program and read back by the lighting
//! program goes through one of the pairs below. The WGSL side of each pair is
//! [`WGSL_ENCODING`], which is prepended to every program touching the
//! G-buffer, so the two halves cannot drift apart.
//!
//! | target | stored value                        | decode                                   |
//! |--------|-------------------------------------|------------------------------------------|
//! | albedo | `rgb`, `a = 1` where covered        | `rgb`, coverage = `a >= 0.5`             |
//! | normal | `n * 0.5 + 0.5`, `a` = specular k   | `normalize(e * 2 - 1)`, `k = a`          |
//! | depth  | NDC depth `clip.z / clip.w` in [0,1]| un-project `(ndc.xy, depth)` by inv(VP)  |
//!
//! Screen UV has its origin at the top-left pixel corner; NDC y points up.

use glam::{Mat4, Vec2, Vec3, Vec4};

/// Depth value of pixels no geometry reached (the far plane)
pub const DEPTH_CLEAR: f32 = 1.0;

/// Albedo alpha at or above this marks a pixel as covered by geometry
pub const COVERAGE_THRESHOLD: f32 = 0.5;

/// WGSL implementation of the conventions in this module
pub const WGSL_ENCODING: &str = r#"
const COVERAGE_THRESHOLD: f32 = 0.5;

fn encode_normal(n: vec3<f32>) -> vec3<f32> {
    return n * 0.5 + 0.5;
}

fn decode_normal(e: vec3<f32>) -> vec3<f32> {
    return normalize(e * 2.0 - 1.0);
}

fn uv_to_ndc(uv: vec2<f32>) -> vec2<f32> {
    return vec2<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);
}

fn reconstruct_world_position(uv: vec2<f32>, depth: f32, inverse_view_projection: mat4x4<f32>) -> vec3<f32> {
    let world = inverse_view_projection * vec4<f32>(uv_to_ndc(uv), depth, 1.0);
    return world.xyz / world.w;
}
"#;

/// Remap a unit normal from [-1,1] to [0,1]
pub fn encode_normal(normal: Vec3) -> Vec3 {
    normal * 0.5 + Vec3::splat(0.5)
}

/// Inverse of [`encode_normal`], renormalized to absorb storage quantization
pub fn decode_normal(encoded: Vec3) -> Vec3 {
    (encoded * 2.0 - Vec3::ONE).normalize_or_zero()
}

/// Depth stored for a clip-space position
pub fn encode_depth(clip: Vec4) -> f32 {
    clip.z / clip.w
}

/// Screen UV (top-left origin) to NDC xy
pub fn uv_to_ndc(uv: Vec2) -> Vec2 {
    Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0)
}

/// NDC xy to screen UV (top-left origin)
pub fn ndc_to_uv(ndc: Vec2) -> Vec2 {
    Vec2::new((ndc.x + 1.0) * 0.5, (1.0 - ndc.y) * 0.5)
}

/// UV of the center of pixel `(x, y)` on a `width` x `height` target
pub fn pixel_center_uv(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / width as f32,
        (y as f32 + 0.5) / height as f32,
    )
}

/// Recover the world position of a pixel from its screen UV and stored depth
pub fn reconstruct_world_position(uv: Vec2, depth: f32, inverse_view_projection: Mat4) -> Vec3 {
    let ndc = uv_to_ndc(uv);
    let world = inverse_view_projection * Vec4::new(ndc.x, ndc.y, depth, 1.0);
    world.truncate() / world.w
}

/// Project a world position to `(uv, depth)`, the values the G-buffer holds for it
pub fn project_to_screen(world: Vec3, view_projection: Mat4) -> (Vec2, f32) {
    let clip = view_projection * world.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    (ndc_to_uv(ndc.truncate()), encode_depth(clip))
}

/// Whether an albedo texel belongs to a covered pixel
pub fn is_covered(albedo: Vec4) -> bool {
    albedo.w >= COVERAGE_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    fn unit_vectors() -> Vec<Vec3> {
        let mut out = Vec::new();
        let steps = 24;
        for i in 0..=steps {
            let theta = std::f32::consts::PI * i as f32 / steps as f32;
            for j in 0..(steps * 2) {
                let phi = std::f32::consts::PI * j as f32 / steps as f32;
                out.push(Vec3::new(
                    theta.sin() * phi.cos(),
                    theta.cos(),
                    theta.sin() * phi.sin(),
                ));
            }
        }
        out.extend([
            Vec3::X,
            Vec3::NEG_X,
            Vec3::Y,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::NEG_Z,
            Vec3::ONE.normalize(),
            -Vec3::ONE.normalize(),
        ]);
        out
    }

    #[test]
    fn test_normal_round_trip() {
        for n in unit_vectors() {
            let decoded = decode_normal(encode_normal(n));
            assert!(decoded.abs_diff_eq(n, 1e-4), "{n} -> {decoded}");
        }
    }

    #[test]
    fn test_normal_round_trip_through_half_storage() {
        for n in unit_vectors() {
            let e = encode_normal(n);
            let stored = Vec3::new(
                f16::from_f32(e.x).to_f32(),
                f16::from_f32(e.y).to_f32(),
                f16::from_f32(e.z).to_f32(),
            );
            let decoded = decode_normal(stored);
            assert!(decoded.abs_diff_eq(n, 1e-3), "{n} -> {decoded}");
        }
    }

    #[test]
    fn test_encoded_normal_is_in_unit_range() {
        for n in unit_vectors() {
            let e = encode_normal(n);
            assert!(e.min_element() >= 0.0 && e.max_element() <= 1.0);
        }
    }

    #[test]
    fn test_depth_reconstruction() {
        let view = Mat4::look_at_rh(Vec3::new(3.0, 4.0, 5.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(60f32.to_radians(), 4.0 / 3.0, 0.1, 100.0);
        let view_projection = projection * view;
        let inverse = view_projection.inverse();

        for point in [
            Vec3::ZERO,
            Vec3::new(1.0, 0.5, -0.25),
            Vec3::new(-2.0, 1.0, 1.0),
            Vec3::new(0.3, -1.2, 2.0),
        ] {
            let (uv, depth) = project_to_screen(point, view_projection);
            assert!((0.0..=1.0).contains(&depth));
            let rebuilt = reconstruct_world_position(uv, depth, inverse);
            assert!(rebuilt.abs_diff_eq(point, 1e-3), "{point} -> {rebuilt}");
        }
    }

    #[test]
    fn test_uv_ndc_corners() {
        assert_eq!(uv_to_ndc(Vec2::ZERO), Vec2::new(-1.0, 1.0));
        assert_eq!(uv_to_ndc(Vec2::ONE), Vec2::new(1.0, -1.0));
        assert_eq!(ndc_to_uv(Vec2::new(-1.0, 1.0)), Vec2::ZERO);
        let uv = Vec2::new(0.25, 0.8);
        assert!(ndc_to_uv(uv_to_ndc(uv)).abs_diff_eq(uv, 1e-6));
    }

    #[test]
    fn test_pixel_center_uv() {
        assert_eq!(pixel_center_uv(0, 0, 2, 2), Vec2::new(0.25, 0.25));
        assert_eq!(pixel_center_uv(1, 1, 2, 2), Vec2::new(0.75, 0.75));
    }

    #[test]
    fn test_coverage() {
        assert!(is_covered(Vec4::new(0.0, 0.0, 0.0, 1.0)));
        assert!(!is_covered(Vec4::new(1.0, 1.0, 1.0, 0.0)));
    }
}
