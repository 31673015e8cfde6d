use std::f32::consts::PI;

use ultraviolet::{Mat4, Vec3};
use winit::event::MouseButton;

use crate::input_map::InputMap;

/// Spherical-coordinate rig around a fixed target: drag with the left
/// mouse button to rotate, scroll or right-drag to zoom.
pub struct OrbitCamera {
    pub theta: f32,
    pub phi: f32,
    pub radius: f32,
    pub target: Vec3,

    aspect_ratio: f32,
    fov_y: f32,
    near: f32,
    far: f32,
}

impl OrbitCamera {
    pub fn new(aspect_ratio: f32) -> Self {
        Self {
            theta: 1.25 * PI,
            phi: 0.35 * PI,
            radius: 90.0,
            target: Vec3::new(0.0, 4.0, 0.0),
            aspect_ratio,
            fov_y: 0.25 * PI,
            near: 1.0,
            far: 1000.0,
        }
    }

    pub fn update(&mut self, input: &InputMap) {
        let mouse = input.mouse_delta();

        if input.is_mouse_pressed(MouseButton::Left) {
            self.theta += mouse.x * 0.005;
            self.phi = (self.phi + mouse.y * 0.005).clamp(0.05, PI - 0.05);
        }
        if input.is_mouse_pressed(MouseButton::Right) {
            self.radius += mouse.y * 0.2;
        }
        self.radius = (self.radius - input.scroll_delta() * 4.0).clamp(10.0, 400.0);
    }

    pub fn update_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
    }

    pub fn position(&self) -> Vec3 {
        self.target
            + Vec3::new(
                self.radius * self.phi.sin() * self.theta.cos(),
                self.radius * self.phi.cos(),
                self.radius * self.phi.sin() * self.theta.sin(),
            )
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position(), self.target, Vec3::new(0.0, 1.0, 0.0))
    }

    pub fn projection_matrix(&self) -> Mat4 {
        ultraviolet::projection::perspective_vk(self.fov_y, self.aspect_ratio, self.near, self.far)
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_stays_at_radius_from_target() {
        let camera = OrbitCamera::new(16.0 / 9.0);
        let distance = (camera.position() - camera.target).mag();
        assert!((distance - camera.radius).abs() < 1e-3);
    }

    #[test]
    fn polar_angle_never_reaches_the_poles() {
        let mut camera = OrbitCamera::new(1.0);
        let mut input = InputMap::new();
        input.update_mouse_press(MouseButton::Left);
        input.accumulate_mouse_delta(ultraviolet::Vec2::new(0.0, 1e6));
        camera.update(&input);
        assert!(camera.phi < PI);
        assert!(camera.phi > 0.0);
    }
}
