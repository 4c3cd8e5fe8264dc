//! Camera system

use glam::{Mat4, Vec3};

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4, // 45 degrees
            aspect: 4.0 / 3.0,
            near: 1.0,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Projection::Orthographic {
            left: -half_w,
            right: half_w,
            bottom: -half_h,
            top: half_h,
            near,
            far,
        }
    }

    /// Right-handed projection into a [0,1] depth range
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(left, right, bottom, top, near, far),
        }
    }

    pub fn near(&self) -> f32 {
        match self {
            Projection::Perspective { near, .. } => *near,
            Projection::Orthographic { near, .. } => *near,
        }
    }

    pub fn far(&self) -> f32 {
        match self {
            Projection::Perspective { far, .. } => *far,
            Projection::Orthographic { far, .. } => *far,
        }
    }

    pub fn aspect(&self) -> f32 {
        match *self {
            Projection::Perspective { aspect, .. } => aspect,
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                ..
            } => (right - left) / (top - bottom),
        }
    }

    /// Orthographic volumes keep their height and widen to the new aspect
    pub fn set_aspect(&mut self, aspect: f32) {
        match self {
            Projection::Perspective { aspect: a, .. } => *a = aspect,
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                ..
            } => {
                let half_w = (*top - *bottom) * 0.5 * aspect;
                let center = (*left + *right) * 0.5;
                *left = center - half_w;
                *right = center + half_w;
            }
        }
    }
}

/// The camera values one frame is rendered with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSnapshot {
    pub view: Mat4,
    pub projection: Mat4,
    pub eye_position: Vec3,
}

impl CameraSnapshot {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    pub fn inverse_view_projection(&self) -> Mat4 {
        self.view_projection().inverse()
    }

    /// False when the view or projection holds a NaN or infinity, e.g. a
    /// camera whose target equals its position
    pub fn is_finite(&self) -> bool {
        self.view.is_finite() && self.projection.is_finite() && self.eye_position.is_finite()
    }
}

/// Source of the view the pipeline renders from
pub trait CameraProvider {
    fn view(&self) -> Mat4;
    fn projection(&self) -> Mat4;
    fn eye_position(&self) -> Vec3;
    fn aspect_ratio(&self) -> f32;

    fn snapshot(&self) -> CameraSnapshot {
        CameraSnapshot {
            view: self.view(),
            projection: self.projection(),
            eye_position: self.eye_position(),
        }
    }
}

/// Camera for viewing the scene
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            projection: Projection::default(),
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            up: Vec3::Y,
            projection: Projection::default(),
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_up(mut self, up: Vec3) -> Self {
        self.up = up;
        self
    }

    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Up vector used for the view matrix
    ///
    /// When the camera looks along `up` the configured vector cannot orient
    /// the view, so a perpendicular axis is used instead. Looking straight
    /// down with `up = Y` keeps -Z at the top of the screen, the same picture
    /// a camera tilted slightly from +Z would give.
    pub fn view_up(&self) -> Vec3 {
        let forward = (self.target - self.position).normalize_or_zero();
        if forward.cross(self.up).length_squared() > 1e-8 {
            return self.up;
        }
        let axis = if self.up.z.abs() > 0.9 { Vec3::Y } else { Vec3::Z };
        axis * forward.dot(self.up).signum()
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.view_up())
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    /// Get combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Get the forward direction
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize()
    }

    /// Get the right direction
    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.view_up()).normalize()
    }

    /// Update aspect ratio from a surface size; a zero height is ignored
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.projection.set_aspect(width / height);
        }
    }
}

impl CameraProvider for Camera {
    fn view(&self) -> Mat4 {
        self.view_matrix()
    }

    fn projection(&self) -> Mat4 {
        self.projection_matrix()
    }

    fn eye_position(&self) -> Vec3 {
        self.position
    }

    fn aspect_ratio(&self) -> f32 {
        self.projection.aspect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_matches_camera() {
        let camera = Camera::new(Vec3::new(0.0, 50.0, 100.0), Vec3::new(0.0, 0.0, -100.0));
        let snapshot = camera.snapshot();
        assert_eq!(snapshot.view, camera.view_matrix());
        assert_eq!(snapshot.eye_position, camera.position);
        assert_eq!(snapshot.view_projection(), camera.view_projection_matrix());
    }

    #[test]
    fn test_target_projects_to_screen_center() {
        let camera = Camera::new(Vec3::new(0.0, 50.0, 100.0), Vec3::new(0.0, 0.0, -100.0));
        let clip = camera.view_projection_matrix() * Vec3::new(0.0, 0.0, -100.0).extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!((0.0..1.0).contains(&ndc.z));
    }

    #[test]
    fn test_straight_down_camera_has_finite_view() {
        let camera = Camera::new(Vec3::new(0.0, 3.0, 0.0), Vec3::ZERO);
        assert_eq!(camera.view_up(), Vec3::NEG_Z);
        assert!(camera.snapshot().is_finite());

        // Screen up matches a camera tilted a hair toward +Z
        let tilted = Camera::new(Vec3::new(0.0, 3.0, 1e-3), Vec3::ZERO);
        let far = Vec3::new(0.0, 0.0, -0.5).extend(1.0);
        let straight_y = (camera.view_projection_matrix() * far).y;
        let tilted_y = (tilted.view_projection_matrix() * far).y;
        assert!(straight_y > 0.0 && tilted_y > 0.0);

        let up = Camera::new(Vec3::new(0.0, -3.0, 0.0), Vec3::ZERO);
        assert_eq!(up.view_up(), Vec3::Z);
        assert!(up.snapshot().is_finite());
    }

    #[test]
    fn test_target_at_position_is_not_finite() {
        let camera = Camera::new(Vec3::ONE, Vec3::ONE);
        assert!(!camera.snapshot().is_finite());
    }

    #[test]
    fn test_set_aspect() {
        let mut camera = Camera::default();
        camera.set_aspect(1280.0, 720.0);
        assert!((camera.aspect_ratio() - 16.0 / 9.0).abs() < 1e-6);
        camera.set_aspect(1280.0, 0.0);
        assert!((camera.aspect_ratio() - 16.0 / 9.0).abs() < 1e-6);

        let mut ortho = Projection::orthographic(2.0, 2.0, 0.1, 10.0);
        ortho.set_aspect(2.0);
        assert!((ortho.aspect() - 2.0).abs() < 1e-6);
    }
}
