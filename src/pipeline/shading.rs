//! Lighting and compositing math shared by the software backend and tests.
//! Mirrors the WGSL in `lighting_pass` and `combine_pass`.

use glam::Vec3;

/// Material constants applied uniformly to every lit surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightingConfig {
    pub shininess: f32,
    pub k_diffuse: f32,
    pub k_specular: f32,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            shininess: 32.0,
            k_diffuse: 1.0,
            k_specular: 1.0,
        }
    }
}

/// One light's contribution to a single surface point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LightContribution {
    pub diffuse: Vec3,
    pub specular: Vec3,
}

/// GLSL/WGSL `reflect`
pub fn reflect(incident: Vec3, normal: Vec3) -> Vec3 {
    incident - 2.0 * normal.dot(incident) * normal
}

/// Phong for a directional light.
///
/// `light_direction` is the direction the light travels; the light vector is
/// its negation. Surfaces facing away from the light get no specular either.
pub fn directional_light(
    normal: Vec3,
    world_position: Vec3,
    eye_position: Vec3,
    light_direction: Vec3,
    light_color: Vec3,
    config: &LightingConfig,
) -> LightContribution {
    let l = (-light_direction).normalize_or_zero();
    let v = (eye_position - world_position).normalize_or_zero();
    let n_dot_l = normal.dot(l);

    let diffuse = light_color * n_dot_l.max(0.0) * config.k_diffuse;
    let specular = if n_dot_l > 0.0 {
        let r = reflect(-l, normal);
        light_color * r.dot(v).max(0.0).powf(config.shininess) * config.k_specular
    } else {
        Vec3::ZERO
    };

    LightContribution { diffuse, specular }
}

/// `albedo * (diffuse + ambient) + specular`
pub fn combine(albedo: Vec3, diffuse: Vec3, specular: Vec3, ambient: Vec3) -> Vec3 {
    albedo * (diffuse + ambient) + specular
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_without_ambient() {
        let out = combine(Vec3::ONE, Vec3::splat(0.5), Vec3::splat(0.2), Vec3::ZERO);
        assert!(out.abs_diff_eq(Vec3::splat(0.7), 1e-6));
    }

    #[test]
    fn test_combine_ambient_is_modulated_by_albedo() {
        let out = combine(
            Vec3::new(0.5, 1.0, 0.0),
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::splat(0.3),
        );
        assert!(out.abs_diff_eq(Vec3::new(0.15, 0.3, 0.0), 1e-6));
    }

    #[test]
    fn test_light_facing_surface() {
        let c = directional_light(
            Vec3::Y,
            Vec3::ZERO,
            Vec3::new(0.0, 10.0, 0.0),
            Vec3::NEG_Y,
            Vec3::ONE,
            &LightingConfig::default(),
        );
        assert!(c.diffuse.abs_diff_eq(Vec3::ONE, 1e-6));
        // Mirror direction points straight at the eye
        assert!(c.specular.abs_diff_eq(Vec3::ONE, 1e-5));
    }

    #[test]
    fn test_light_behind_surface() {
        let c = directional_light(
            Vec3::NEG_Y,
            Vec3::ZERO,
            Vec3::new(0.0, -10.0, 0.0),
            Vec3::NEG_Y,
            Vec3::ONE,
            &LightingConfig::default(),
        );
        assert_eq!(c.diffuse, Vec3::ZERO);
        assert_eq!(c.specular, Vec3::ZERO);
    }

    #[test]
    fn test_coefficients_scale_terms() {
        let config = LightingConfig {
            shininess: 8.0,
            k_diffuse: 0.7,
            k_specular: 0.4,
        };
        let c = directional_light(
            Vec3::Y,
            Vec3::ZERO,
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::NEG_Y,
            Vec3::new(1.0, 0.5, 0.0),
            &config,
        );
        assert!(c.diffuse.abs_diff_eq(Vec3::new(0.7, 0.35, 0.0), 1e-6));
        assert!(c.specular.abs_diff_eq(Vec3::new(0.4, 0.2, 0.0), 1e-5));
    }

    #[test]
    fn test_reflect() {
        let r = reflect(Vec3::new(1.0, -1.0, 0.0), Vec3::Y);
        assert_eq!(r, Vec3::new(1.0, 1.0, 0.0));
    }
}
