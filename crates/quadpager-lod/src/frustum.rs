//! View frustum tests in world space using f64 planes extracted from the view-projection matrix.

use glam::{DMat4, DVec3, DVec4};
use quadpager_tile::Mbr;

/// Plane indices into the frustum planes array.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// An axis-aligned bounding box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: DVec3,
    /// Maximum corner of the bounding box.
    pub max: DVec3,
}

impl Aabb {
    /// Create a new AABB from min and max corners.
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// A flat box covering a rectangle of the ground plane (Z = 0).
    pub fn from_ground(mbr: &Mbr) -> Self {
        Self {
            min: DVec3::new(mbr.ll.x, mbr.ll.y, 0.0),
            max: DVec3::new(mbr.ur.x, mbr.ur.y, 0.0),
        }
    }

    /// Returns the center point of the AABB.
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }
}

/// A view frustum defined by six inward-pointing planes.
#[derive(Clone, Debug)]
pub struct Frustum {
    /// Six planes: left, right, bottom, top, near, far.
    /// Each `DVec4(a, b, c, d)` holds a unit inward normal and the distance term.
    planes: [DVec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a combined view-projection matrix
    /// (Griggs-Hartmann), assuming the `[0, 1]` depth range produced by
    /// `DMat4::perspective_rh`.
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [DVec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        planes[NEAR] = rows[2];
        planes[FAR] = rows[3] - rows[2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Test whether an AABB is at least partially inside the frustum.
    ///
    /// Positive-vertex test: conservative near frustum corners, never
    /// rejects a visible box.
    pub fn is_visible(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            let normal = plane.truncate();
            let p = DVec3::new(
                if normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            if normal.dot(p) + plane.w < 0.0 {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_camera_vp() -> DMat4 {
        let view = DMat4::look_to_rh(DVec3::ZERO, DVec3::NEG_Z, DVec3::Y);
        let proj = DMat4::perspective_rh(std::f64::consts::FRAC_PI_4, 16.0 / 9.0, 0.1, 1000.0);
        proj * view
    }

    #[test]
    fn test_object_in_front_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        let aabb = Aabb::new(DVec3::new(-1.0, -1.0, -5.0), DVec3::new(1.0, 1.0, -3.0));
        assert!(frustum.is_visible(&aabb));
    }

    #[test]
    fn test_object_behind_camera_not_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        let aabb = Aabb::new(DVec3::new(-1.0, -1.0, 5.0), DVec3::new(1.0, 1.0, 10.0));
        assert!(!frustum.is_visible(&aabb));
    }

    #[test]
    fn test_all_six_planes_tested() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());

        let left = Aabb::new(DVec3::new(-1000.0, 0.0, -5.0), DVec3::new(-999.0, 1.0, -4.0));
        assert!(!frustum.is_visible(&left));

        let right = Aabb::new(DVec3::new(999.0, 0.0, -5.0), DVec3::new(1000.0, 1.0, -4.0));
        assert!(!frustum.is_visible(&right));

        let above = Aabb::new(DVec3::new(0.0, 999.0, -5.0), DVec3::new(1.0, 1000.0, -4.0));
        assert!(!frustum.is_visible(&above));

        let below = Aabb::new(DVec3::new(0.0, -1000.0, -5.0), DVec3::new(1.0, -999.0, -4.0));
        assert!(!frustum.is_visible(&below));

        let beyond_far = Aabb::new(DVec3::new(0.0, 0.0, -2000.0), DVec3::new(1.0, 1.0, -1500.0));
        assert!(!frustum.is_visible(&beyond_far));
    }

    #[test]
    fn test_partially_inside_is_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        let aabb = Aabb::new(DVec3::new(-100.0, -1.0, -10.0), DVec3::new(1.0, 1.0, -5.0));
        assert!(frustum.is_visible(&aabb));
    }

    #[test]
    fn test_planes_are_normalized() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        for plane in &frustum.planes {
            let len = plane.truncate().length();
            assert!((len - 1.0).abs() < 1e-9, "plane normal not normalized: {len}");
        }
    }

    #[test]
    fn test_ground_box_is_flat() {
        let mbr = Mbr::new(glam::DVec2::new(-1.0, -2.0), glam::DVec2::new(3.0, 4.0));
        let aabb = Aabb::from_ground(&mbr);
        assert_eq!(aabb.min.z, 0.0);
        assert_eq!(aabb.max.z, 0.0);
        assert_eq!(aabb.center(), DVec3::new(1.0, 1.0, 0.0));
    }
}
