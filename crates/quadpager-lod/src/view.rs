//! Camera parameters consumed read-only by the importance evaluator.

use glam::{DMat4, DVec3, UVec2};

use crate::Frustum;

/// A snapshot of the camera: position, combined view-projection matrix and
/// viewport size in pixels.
///
/// The projection is expected to use the `[0, 1]` depth range of
/// `DMat4::perspective_rh`.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewState {
    /// Camera position in world space.
    pub eye: DVec3,
    /// Projection * view.
    pub view_projection: DMat4,
    /// Viewport size in pixels.
    pub viewport: UVec2,
}

impl ViewState {
    /// Build a view state from explicit matrices.
    pub fn new(eye: DVec3, view_projection: DMat4, viewport: UVec2) -> Self {
        Self {
            eye,
            view_projection,
            viewport,
        }
    }

    /// A perspective camera at `eye` looking at `target`.
    ///
    /// Near and far planes are derived from the eye-target distance so the
    /// ground plane stays inside the depth range for typical map views.
    pub fn look_at(eye: DVec3, target: DVec3, up: DVec3, fov_y: f64, viewport: UVec2) -> Self {
        let distance = (target - eye).length().max(1e-9);
        let aspect = viewport.x.max(1) as f64 / viewport.y.max(1) as f64;
        let view = DMat4::look_at_rh(eye, target, up);
        let proj = DMat4::perspective_rh(fov_y, aspect, distance * 1e-3, distance * 1e3);
        Self::new(eye, proj * view, viewport)
    }

    /// A camera straight above the ground point `(x, y)` at `height`, looking down
    /// with +Y as screen up.
    pub fn top_down(x: f64, y: f64, height: f64, fov_y: f64, viewport: UVec2) -> Self {
        Self::look_at(
            DVec3::new(x, y, height),
            DVec3::new(x, y, 0.0),
            DVec3::Y,
            fov_y,
            viewport,
        )
    }

    /// Frustum planes for this view.
    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_projection(&self.view_projection)
    }
}
