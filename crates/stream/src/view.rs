use std::f32::consts::FRAC_1_SQRT_2;

use glam::{Vec2, Vec3};
use terrastream_common::TileCoord;

/// Horizontal view volume used to flag resident tiles as visible.
///
/// The test is conservative: a tile is treated as its bounding circle, so a
/// tile is never culled while any part of it may be inside the cone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewCone {
    eye: Vec2,
    /// Unit XZ direction, or zero for an omnidirectional view.
    forward: Vec2,
    half_angle: f32,
    far: f32,
}

impl ViewCone {
    /// `fov_degrees` is the full horizontal field of view.
    pub fn new(eye: Vec3, forward: Vec3, fov_degrees: f32, far: f32) -> Self {
        let half_angle = (fov_degrees.clamp(0.0, 360.0) * 0.5).to_radians();
        Self {
            eye: Vec2::new(eye.x, eye.z),
            forward: Vec2::new(forward.x, forward.z).normalize_or_zero(),
            half_angle,
            far: far.max(0.0),
        }
    }

    pub fn from_eye_target(eye: Vec3, target: Vec3, fov_degrees: f32, far: f32) -> Self {
        Self::new(eye, target - eye, fov_degrees, far)
    }

    pub fn eye(&self) -> Vec2 {
        self.eye
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn contains_tile(&self, coord: TileCoord, tile_size: f32) -> bool {
        let origin = coord.origin(tile_size);
        let center = Vec2::new(origin.x, origin.z) + Vec2::splat(tile_size * 0.5);
        let radius = tile_size * FRAC_1_SQRT_2;

        let to_center = center - self.eye;
        let dist = to_center.length();
        if dist - radius > self.far {
            return false;
        }
        if dist <= radius || self.forward == Vec2::ZERO {
            return true;
        }

        let angle = (to_center.dot(self.forward) / dist).clamp(-1.0, 1.0).acos();
        let slack = (radius / dist).clamp(0.0, 1.0).asin();
        angle <= self.half_angle + slack
    }
}
