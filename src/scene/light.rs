//! Light types

use glam::Vec3;

/// A light shining along one direction everywhere in the scene (like the sun)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels, normalized
    pub direction: Vec3,
    /// Hue times intensity
    pub color: Vec3,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.5, -1.0, -0.5).normalize(),
            color: Vec3::ONE,
        }
    }
}

impl DirectionalLight {
    /// A zero direction stays zero and the light contributes nothing
    pub fn new(direction: Vec3, color: Vec3) -> Self {
        Self {
            direction: direction.normalize_or_zero(),
            color,
        }
    }

    /// Light travelling from `position` toward `target`
    pub fn from_position(position: Vec3, target: Vec3, color: Vec3) -> Self {
        Self::new(target - position, color)
    }

    /// Scale the color by `intensity`
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.color *= intensity;
        self
    }

    /// Unit vector from a lit surface toward the light
    pub fn to_light(&self) -> Vec3 {
        -self.direction
    }

    pub fn is_degenerate(&self) -> bool {
        self.direction == Vec3::ZERO
    }
}

/// Light types the pipeline can accumulate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Directional(DirectionalLight),
}

impl Light {
    pub fn color(&self) -> Vec3 {
        match self {
            Light::Directional(light) => light.color,
        }
    }
}

impl From<DirectionalLight> for Light {
    fn from(light: DirectionalLight) -> Self {
        Light::Directional(light)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_is_normalized() {
        let light = DirectionalLight::new(Vec3::new(0.0, -10.0, 0.0), Vec3::ONE);
        assert_eq!(light.direction, Vec3::NEG_Y);
        assert_eq!(light.to_light(), Vec3::Y);
    }

    #[test]
    fn test_from_position_points_at_target() {
        let light = DirectionalLight::from_position(Vec3::new(250.0, 100.0, 0.0), Vec3::ZERO, Vec3::ONE);
        assert!(light.direction.x < 0.0 && light.direction.y < 0.0);
        assert!((light.direction.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_direction_is_degenerate() {
        let light = DirectionalLight::new(Vec3::ZERO, Vec3::ONE).with_intensity(2.0);
        assert!(light.is_degenerate());
        assert_eq!(light.color, Vec3::splat(2.0));
    }
}
