//! Object placement

use glam::{Mat4, Quat, Vec3};

/// Position, orientation and scale of a scene object
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn from_position_scale(position: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            scale,
            ..Default::default()
        }
    }

    /// Uniform scale, the common case for the built-in primitives
    pub fn from_position_uniform_scale(position: Vec3, scale: f32) -> Self {
        Self::from_position_scale(position, Vec3::splat(scale))
    }

    /// Create transform from position, rotation (euler angles in radians), and scale
    pub fn from_components(position: Vec3, rotation_euler: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::from_euler(
                glam::EulerRot::XYZ,
                rotation_euler.x,
                rotation_euler.y,
                rotation_euler.z,
            ),
            scale,
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// World matrix
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Inverse transpose of the world matrix, for transforming normals
    pub fn normal_matrix(&self) -> Mat4 {
        self.matrix().inverse().transpose()
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }

    pub fn rotate_axis(&mut self, axis: Vec3, angle: f32) {
        self.rotation = Quat::from_axis_angle(axis, angle) * self.rotation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_matrix_keeps_normals_perpendicular() {
        let t = Transform::from_position_scale(Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 1.0, 1.0));
        // Surface of a stretched sphere at 45 degrees in XY
        let tangent = t.matrix().transform_vector3(Vec3::new(-1.0, 1.0, 0.0));
        let normal = t.normal_matrix().transform_vector3(Vec3::new(1.0, 1.0, 0.0));
        assert!(tangent.dot(normal).abs() < 1e-5);
    }

    #[test]
    fn test_matrix_applies_scale_before_translation() {
        let t = Transform::from_position_uniform_scale(Vec3::new(0.0, 25.0, -100.0), 50.0);
        let top = t.matrix().transform_point3(Vec3::new(0.0, 0.5, 0.0));
        assert!((top - Vec3::new(0.0, 50.0, -100.0)).length() < 1e-4);
    }
}
