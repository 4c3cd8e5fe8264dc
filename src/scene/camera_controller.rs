//! Camera control
//!
//! The pipeline only reads a [`super::CameraSnapshot`]; controllers turn
//! per-tick input into camera movement before the snapshot is taken.

use glam::{Vec2, Vec3};

use super::Camera;

/// Input state for camera controllers
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    /// Movement keys (WASD, QE for up/down)
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,

    /// Sprint modifier (shift)
    pub sprint: bool,

    /// Mouse delta since last tick (in pixels)
    pub mouse_delta: Vec2,

    /// Mouse scroll delta (positive = scroll up)
    pub scroll_delta: f32,

    /// Whether mouse look is active (right mouse button held)
    pub mouse_look_active: bool,
}

impl CameraInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset per-tick deltas (call after update)
    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }
}

pub trait CameraController {
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32);

    fn name(&self) -> &'static str;

    fn reset(&mut self);
}

/// Free-fly camera controller (FPS-style)
///
/// - WASD: Move forward/backward/left/right
/// - QE: Move down/up
/// - Mouse: Look around (when mouse_look_active)
/// - Scroll: Adjust movement speed
/// - Shift: Sprint
#[derive(Debug, Clone)]
pub struct FreeFlyController {
    /// Horizontal rotation in radians
    pub yaw: f32,
    /// Vertical rotation in radians, positive looks down
    pub pitch: f32,
    /// Units per second
    pub move_speed: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    /// Radians per pixel
    pub mouse_sensitivity: f32,
    pub sprint_multiplier: f32,
    /// Speed change per scroll unit
    pub scroll_speed_factor: f32,
    initial_speed: f32,
}

impl Default for FreeFlyController {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            move_speed: 5.0,
            min_speed: 0.5,
            max_speed: 500.0,
            mouse_sensitivity: 0.003,
            sprint_multiplier: 2.0,
            scroll_speed_factor: 1.2,
            initial_speed: 5.0,
        }
    }
}

impl FreeFlyController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.move_speed = speed;
        self.initial_speed = speed;
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: f32) -> Self {
        self.mouse_sensitivity = sensitivity;
        self
    }

    /// Initialize yaw/pitch from the camera's current orientation
    pub fn sync_with_camera(&mut self, camera: &Camera) {
        let forward = (camera.target - camera.position).normalize_or_zero();
        if forward == Vec3::ZERO {
            log::warn!("Camera target equals its position, keeping controller orientation");
            return;
        }
        self.yaw = forward.z.atan2(forward.x);
        self.pitch = (-forward.y).clamp(-1.0, 1.0).asin();
    }

    fn forward_direction(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            -self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    /// Perpendicular to forward, on the XZ plane
    fn right_direction(&self) -> Vec3 {
        Vec3::new(-self.yaw.sin(), 0.0, self.yaw.cos()).normalize()
    }
}

impl CameraController for FreeFlyController {
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32) {
        if input.scroll_delta > 0.0 {
            self.move_speed *= self.scroll_speed_factor;
        } else if input.scroll_delta < 0.0 {
            self.move_speed /= self.scroll_speed_factor;
        }
        self.move_speed = self.move_speed.clamp(self.min_speed, self.max_speed);

        if input.mouse_look_active && input.mouse_delta != Vec2::ZERO {
            self.yaw += input.mouse_delta.x * self.mouse_sensitivity;
            self.pitch += input.mouse_delta.y * self.mouse_sensitivity;

            let max_pitch = std::f32::consts::FRAC_PI_2 - 0.01;
            self.pitch = self.pitch.clamp(-max_pitch, max_pitch);
            self.yaw %= std::f32::consts::TAU;
        }

        let forward = self.forward_direction();
        let right = self.right_direction();

        let mut velocity = Vec3::ZERO;
        for (pressed, direction) in [
            (input.forward, forward),
            (input.backward, -forward),
            (input.right, right),
            (input.left, -right),
            (input.up, Vec3::Y),
            (input.down, Vec3::NEG_Y),
        ] {
            if pressed {
                velocity += direction;
            }
        }
        let velocity = velocity.normalize_or_zero();

        let speed = if input.sprint {
            self.move_speed * self.sprint_multiplier
        } else {
            self.move_speed
        };

        camera.position += velocity * speed * dt;
        camera.target = camera.position + forward;
    }

    fn name(&self) -> &'static str {
        "FreeFly"
    }

    fn reset(&mut self) {
        self.yaw = 0.0;
        self.pitch = 0.0;
        self.move_speed = self.initial_speed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_camera() -> Camera {
        Camera::new(Vec3::new(0.0, 50.0, 100.0), Vec3::new(0.0, 0.0, -100.0))
    }

    #[test]
    fn test_sync_preserves_view_direction() {
        let mut camera = demo_camera();
        let expected = camera.forward();
        let mut controller = FreeFlyController::new();
        controller.sync_with_camera(&camera);
        controller.update(&mut camera, &CameraInput::new(), 0.016);
        assert!((camera.forward() - expected).length() < 1e-4);
    }

    #[test]
    fn test_forward_moves_along_view() {
        let mut camera = demo_camera();
        let mut controller = FreeFlyController::new().with_speed(10.0);
        controller.sync_with_camera(&camera);
        let start = camera.position;
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };
        controller.update(&mut camera, &input, 1.0);
        assert!(((camera.position - start).length() - 10.0).abs() < 1e-3);
        assert!(camera.position.z < start.z);
    }

    #[test]
    fn test_scroll_changes_speed_within_limits() {
        let mut camera = demo_camera();
        let mut controller = FreeFlyController::new();
        let input = CameraInput {
            scroll_delta: -1.0,
            ..Default::default()
        };
        for _ in 0..100 {
            controller.update(&mut camera, &input, 0.0);
        }
        assert_eq!(controller.move_speed, controller.min_speed);
        controller.reset();
        assert_eq!(controller.move_speed, 5.0);
    }
}
