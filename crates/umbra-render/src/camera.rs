//! Arcball camera.

use glam::{Mat4, Quat, Vec2, Vec3};
use umbra_core::CameraOptions;

/// A perspective camera orbiting a target point.
///
/// The projection has no far plane: shadow-volume caps are extruded to
/// infinity and must stay inside the frustum.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space.
    pub position: Vec3,
    /// Point the camera is looking at.
    pub target: Vec3,
    /// Up vector.
    pub up: Vec3,
    /// Field of view in radians.
    pub fov: f32,
    /// Aspect ratio (width / height).
    pub aspect_ratio: f32,
    /// Near clipping plane.
    pub near: f32,
    /// Movement speed multiplier for pan and zoom.
    pub move_speed: f32,
}

impl Camera {
    /// Creates a new camera with default settings.
    #[must_use]
    pub fn new(aspect_ratio: f32) -> Self {
        Self::from_options(&CameraOptions::default(), aspect_ratio)
    }

    #[must_use]
    pub fn from_options(options: &CameraOptions, aspect_ratio: f32) -> Self {
        let mut camera = Self {
            position: options.eye,
            target: options.center,
            up: options.up.normalize_or(Vec3::Y),
            fov: std::f32::consts::FRAC_PI_4,
            aspect_ratio,
            near: 0.1,
            move_speed: 1.0,
        };
        camera.set_fov_degrees(options.fov_degrees);
        camera.set_near(options.near);
        camera
    }

    /// Sets the aspect ratio.
    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
    }

    /// Returns the view matrix.
    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Returns the infinite-far perspective projection.
    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_infinite_rh(self.fov, self.aspect_ratio, self.near)
    }

    /// Returns the combined view-projection matrix.
    #[must_use]
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Returns the camera's forward direction.
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize()
    }

    /// Returns the camera's right direction.
    #[must_use]
    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize()
    }

    /// Distance from the camera to its target.
    #[must_use]
    pub fn distance(&self) -> f32 {
        self.position.distance(self.target)
    }

    /// Rotates the scene as if dragging a virtual trackball from `from` to
    /// `to`, both in window pixels.
    pub fn arcball_rotate(&mut self, from: Vec2, to: Vec2, viewport: Vec2) {
        let a = arcball_vector(from, viewport);
        let b = arcball_vector(to, viewport);
        let angle = a.dot(b).clamp(-1.0, 1.0).acos();
        if angle < 1e-6 {
            return;
        }
        let Some(axis_camera) = a.cross(b).try_normalize() else {
            return;
        };

        // Moving the scene by q is moving the camera by q^-1 around the target.
        let camera_to_world = Quat::from_mat4(&self.view_matrix().inverse());
        let axis = camera_to_world * axis_camera;
        let rotation = Quat::from_axis_angle(axis, -angle);

        self.position = self.target + rotation * (self.position - self.target);
        self.up = (rotation * self.up).normalize();
    }

    /// Pans the camera.
    pub fn pan(&mut self, delta_x: f32, delta_y: f32) {
        let scale = self.distance() * self.move_speed;
        let right = self.right();
        let up = right.cross(self.forward());
        let offset = (right * delta_x + up * delta_y) * scale;
        self.position += offset;
        self.target += offset;
    }

    /// Zooms the camera toward or away from the target.
    pub fn zoom(&mut self, delta: f32) {
        let direction = self.forward();
        let distance = self.distance();
        let new_distance = (distance * (1.0 - delta * 0.1 * self.move_speed)).max(self.near * 2.0);
        self.position = self.target - direction * new_distance;
    }

    /// Points the camera at the given bounding box from the current direction.
    pub fn look_at_box(&mut self, min: Vec3, max: Vec3) {
        let center = (min + max) * 0.5;
        let radius = ((max - min).length() * 0.5).max(1e-3);
        let distance = radius / (self.fov * 0.5).sin();
        let direction = (self.position - self.target).try_normalize().unwrap_or(Vec3::Z);

        self.target = center;
        self.position = center + direction * distance;
        self.near = (radius * 1e-3).max(1e-4);
    }

    /// Sets the movement speed.
    pub fn set_move_speed(&mut self, speed: f32) {
        self.move_speed = speed.max(0.01);
    }

    /// Sets the field of view in radians.
    pub fn set_fov(&mut self, fov: f32) {
        self.fov = fov.clamp(0.1, std::f32::consts::PI - 0.1);
    }

    /// Sets the near clipping plane.
    pub fn set_near(&mut self, near: f32) {
        self.near = near.max(0.001);
    }

    /// Returns FOV in degrees.
    #[must_use]
    pub fn fov_degrees(&self) -> f32 {
        self.fov.to_degrees()
    }

    /// Sets FOV from degrees.
    pub fn set_fov_degrees(&mut self, degrees: f32) {
        self.set_fov(degrees.to_radians());
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(16.0 / 9.0)
    }
}

/// Maps a window position onto the unit trackball sphere, in camera space.
fn arcball_vector(point: Vec2, viewport: Vec2) -> Vec3 {
    let size = viewport.max(Vec2::ONE);
    let x = 2.0 * point.x / size.x - 1.0;
    let y = 1.0 - 2.0 * point.y / size.y;
    let d2 = x * x + y * y;
    if d2 <= 1.0 {
        Vec3::new(x, y, (1.0 - d2).sqrt())
    } else {
        Vec3::new(x, y, 0.0).normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_from_options() {
        let camera = Camera::new(1.0);
        assert_eq!(camera.position, Vec3::new(3.0, 4.0, 8.0));
        assert_eq!(camera.target, Vec3::new(-5.0, -3.0, 0.0));
        assert!((camera.fov_degrees() - 50.0).abs() < 1e-4);
        assert!((camera.near - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_projection_has_no_far_plane() {
        let camera = Camera::new(1.0);
        let proj = camera.projection_matrix();
        // A point at infinity along -Z stays in front of the far plane.
        let clip = proj * glam::Vec4::new(0.0, 0.0, -1.0, 0.0);
        assert!(clip.w > 0.0);
        assert!(clip.z <= clip.w + 1e-6);
    }

    #[test]
    fn test_set_fov_clamping() {
        let mut camera = Camera::new(1.0);
        camera.set_fov(0.0);
        assert!(camera.fov >= 0.1);

        camera.set_fov(std::f32::consts::PI);
        assert!(camera.fov < std::f32::consts::PI);
    }

    #[test]
    fn test_arcball_keeps_distance() {
        let mut camera = Camera::new(1.0);
        let before = camera.distance();
        camera.arcball_rotate(
            Vec2::new(400.0, 300.0),
            Vec2::new(460.0, 280.0),
            Vec2::new(800.0, 600.0),
        );
        assert!((camera.distance() - before).abs() < 1e-3);
        assert_ne!(camera.position, Vec3::new(3.0, 4.0, 8.0));
    }

    #[test]
    fn test_arcball_without_motion_is_identity() {
        let mut camera = Camera::new(1.0);
        let p = Vec2::new(10.0, 10.0);
        camera.arcball_rotate(p, p, Vec2::new(800.0, 600.0));
        assert_eq!(camera.position, Vec3::new(3.0, 4.0, 8.0));
    }

    #[test]
    fn test_arcball_vector_is_unit() {
        for p in [Vec2::ZERO, Vec2::new(400.0, 300.0), Vec2::new(790.0, 5.0)] {
            let v = arcball_vector(p, Vec2::new(800.0, 600.0));
            assert!((v.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_zoom_in_decreases_distance() {
        let mut camera = Camera::new(1.0);
        let initial = camera.distance();
        camera.zoom(1.0);
        assert!(camera.distance() < initial);
    }

    #[test]
    fn test_pan_moves_target_and_eye_together() {
        let mut camera = Camera::new(1.0);
        let offset = camera.position - camera.target;
        camera.pan(0.1, -0.2);
        assert!((camera.position - camera.target - offset).length() < 1e-4);
    }

    #[test]
    fn test_look_at_box() {
        let mut camera = Camera::new(1.0);
        camera.look_at_box(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert_eq!(camera.target, Vec3::ZERO);
        assert!(camera.distance() > 3.0_f32.sqrt());
    }
}
