//! Screen-space importance of a tile under a view.
//!
//! Importance is the number of on-screen pixels the tile covers divided by the
//! number of pixels in one tile image. A value of 1.0 means the tile is shown
//! at its native resolution; above that it is magnified and a finer level
//! would add detail. Tiles outside the view score 0.

use glam::{DVec4, UVec2};
use quadpager_tile::{CoordSystem, TileId};

use crate::{Aabb, Frustum, ViewState};

/// Evaluates tile importance for one view.
///
/// Built once per view update; the frustum planes are extracted up front.
pub struct ImportanceEvaluator {
    view_projection: glam::DMat4,
    viewport: UVec2,
    frustum: Frustum,
    tile_pixels: f64,
}

impl ImportanceEvaluator {
    /// Create an evaluator for `view` with tiles of `tile_size` x `tile_size` pixels.
    pub fn new(view: &ViewState, tile_size: u32) -> Self {
        let side = tile_size.max(1) as f64;
        Self {
            view_projection: view.view_projection,
            viewport: view.viewport,
            frustum: view.frustum(),
            tile_pixels: side * side,
        }
    }

    /// Unscaled importance of `tile` in the pyramid `coords`.
    pub fn importance(&self, coords: &CoordSystem, tile: &TileId) -> f64 {
        let bounds = coords.tile_bounds(tile);
        if !self.frustum.is_visible(&Aabb::from_ground(&bounds)) {
            return 0.0;
        }
        self.screen_area(&bounds.corners()) / self.tile_pixels
    }

    /// Pixel area covered by a planar quad after clipping to the view volume.
    pub fn screen_area(&self, corners: &[glam::DVec3; 4]) -> f64 {
        let mut poly: Vec<DVec4> = corners
            .iter()
            .map(|c| self.view_projection * c.extend(1.0))
            .collect();

        for plane in CLIP_PLANES {
            poly = clip_polygon(&poly, plane);
            if poly.len() < 3 {
                return 0.0;
            }
        }

        let half_w = self.viewport.x as f64 * 0.5;
        let half_h = self.viewport.y as f64 * 0.5;
        let screen: Vec<(f64, f64)> = poly
            .iter()
            .map(|p| {
                let w = p.w.max(f64::EPSILON);
                ((p.x / w + 1.0) * half_w, (p.y / w + 1.0) * half_h)
            })
            .collect();

        let mut twice_area = 0.0;
        for i in 0..screen.len() {
            let (x0, y0) = screen[i];
            let (x1, y1) = screen[(i + 1) % screen.len()];
            twice_area += x0 * y1 - x1 * y0;
        }
        (twice_area * 0.5).abs()
    }
}

/// Homogeneous clip planes as `(x, y, z, w)` coefficients: a point is inside
/// when the dot product is non-negative. Near (z >= 0), then the four sides.
const CLIP_PLANES: [DVec4; 5] = [
    DVec4::new(0.0, 0.0, 1.0, 0.0),
    DVec4::new(1.0, 0.0, 0.0, 1.0),
    DVec4::new(-1.0, 0.0, 0.0, 1.0),
    DVec4::new(0.0, 1.0, 0.0, 1.0),
    DVec4::new(0.0, -1.0, 0.0, 1.0),
];

/// One Sutherland-Hodgman pass in clip space.
fn clip_polygon(poly: &[DVec4], plane: DVec4) -> Vec<DVec4> {
    let mut out = Vec::with_capacity(poly.len() + 2);
    for i in 0..poly.len() {
        let a = poly[i];
        let b = poly[(i + 1) % poly.len()];
        let da = a.dot(plane);
        let db = b.dot(plane);
        if da >= 0.0 {
            out.push(a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            let t = da / (da - db);
            out.push(a + (b - a) * t);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    const FOV_90: f64 = std::f64::consts::FRAC_PI_2;

    /// Camera over the middle of the unit square, seeing a ground patch
    /// `2 * height` wide on a square viewport.
    fn top_down(height: f64, px: u32) -> ViewState {
        ViewState::top_down(0.5, 0.5, height, FOV_90, UVec2::splat(px))
    }

    #[test]
    fn test_tile_filling_screen_scores_screen_over_tile_pixels() {
        // Ground patch 1.0 wide: the root exactly fills a 1024 px viewport.
        let eval = ImportanceEvaluator::new(&top_down(0.5, 1024), 256);
        let imp = eval.importance(&CoordSystem::unit(), &TileId::ROOT);
        assert!((imp - 16.0).abs() < 1e-3, "importance {imp}");
    }

    #[test]
    fn test_importance_quarters_per_level_when_fully_visible() {
        let eval = ImportanceEvaluator::new(&top_down(0.5, 1024), 256);
        let cs = CoordSystem::unit();
        let child = eval.importance(&cs, &TileId::new(1, 0, 0));
        let grandchild = eval.importance(&cs, &TileId::new(2, 1, 1));
        assert!((child - 4.0).abs() < 1e-3);
        assert!((grandchild - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_offscreen_tile_scores_zero() {
        let eval = ImportanceEvaluator::new(&top_down(0.05, 512), 256);
        let cs = CoordSystem::unit();
        assert_eq!(eval.importance(&cs, &TileId::new(3, 7, 7)), 0.0);
        assert!(eval.importance(&cs, &TileId::new(3, 3, 3)) > 0.0);
    }

    #[test]
    fn test_partially_visible_tile_is_clipped_to_screen() {
        // Ground patch 0.2 wide: the root covers far more than the screen,
        // but only the on-screen part counts.
        let eval = ImportanceEvaluator::new(&top_down(0.1, 512), 256);
        let imp = eval.importance(&CoordSystem::unit(), &TileId::ROOT);
        assert!((imp - 4.0).abs() < 1e-3, "importance {imp}");
    }

    #[test]
    fn test_geometry_behind_camera_is_clipped() {
        // Oblique view: the camera sits inside the pyramid, so part of the root
        // is behind it. Area must stay finite and bounded by the screen.
        let view = ViewState::look_at(
            DVec3::new(0.5, 0.1, 0.05),
            DVec3::new(0.5, 0.6, 0.0),
            DVec3::Z,
            FOV_90,
            UVec2::new(640, 480),
        );
        let eval = ImportanceEvaluator::new(&view, 256);
        let imp = eval.importance(&CoordSystem::unit(), &TileId::ROOT);
        let max = 640.0 * 480.0 / (256.0 * 256.0);
        assert!(imp > 0.0 && imp <= max + 1e-6, "importance {imp}");
    }

    #[test]
    fn test_closer_tiles_matter_more_in_oblique_view() {
        let view = ViewState::look_at(
            DVec3::new(0.5, -0.2, 0.3),
            DVec3::new(0.5, 0.5, 0.0),
            DVec3::Z,
            FOV_90,
            UVec2::new(1024, 768),
        );
        let eval = ImportanceEvaluator::new(&view, 256);
        let cs = CoordSystem::unit();
        let near = eval.importance(&cs, &TileId::new(3, 4, 1));
        let far = eval.importance(&cs, &TileId::new(3, 4, 6));
        assert!(near > far, "near={near} far={far}");
    }
}
