//! The pyramid plane: world-space extents of the pyramid and of each tile.

use glam::{DVec2, DVec3};

use crate::TileId;

/// An axis-aligned rectangle in world X/Y.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mbr {
    /// Lower-left corner.
    pub ll: DVec2,
    /// Upper-right corner.
    pub ur: DVec2,
}

impl Mbr {
    /// Build a rectangle from two opposite corners in any order.
    #[must_use]
    pub fn new(a: DVec2, b: DVec2) -> Self {
        Self {
            ll: a.min(b),
            ur: a.max(b),
        }
    }

    /// Width along X.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.ur.x - self.ll.x
    }

    /// Height along Y.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.ur.y - self.ll.y
    }

    /// True if the two rectangles share any area. Touching edges do not count.
    #[must_use]
    pub fn overlaps(&self, other: &Mbr) -> bool {
        self.ll.x < other.ur.x
            && other.ll.x < self.ur.x
            && self.ll.y < other.ur.y
            && other.ll.y < self.ur.y
    }

    /// The four corners lifted onto the Z = 0 plane, counter-clockwise from `ll`.
    #[must_use]
    pub fn corners(&self) -> [DVec3; 4] {
        [
            DVec3::new(self.ll.x, self.ll.y, 0.0),
            DVec3::new(self.ur.x, self.ll.y, 0.0),
            DVec3::new(self.ur.x, self.ur.y, 0.0),
            DVec3::new(self.ll.x, self.ur.y, 0.0),
        ]
    }
}

/// World-space definition of the tile pyramid.
///
/// Level 0 covers `bounds`. Optional coverage rectangles make the pyramid
/// sparse: tiles that overlap none of them are treated as having no data.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordSystem {
    bounds: Mbr,
    coverage: Vec<Mbr>,
}

impl CoordSystem {
    /// A pyramid whose root tile covers `bounds`.
    #[must_use]
    pub fn new(bounds: Mbr) -> Self {
        Self {
            bounds,
            coverage: Vec::new(),
        }
    }

    /// A pyramid over the unit square `[0, 1] x [0, 1]`.
    #[must_use]
    pub fn unit() -> Self {
        Self::new(Mbr::new(DVec2::ZERO, DVec2::ONE))
    }

    /// Extents of the root tile.
    #[must_use]
    pub fn bounds(&self) -> &Mbr {
        &self.bounds
    }

    /// Restrict valid tiles to those overlapping `mbr` (in addition to any
    /// rectangles already added).
    pub fn add_coverage(&mut self, mbr: Mbr) {
        self.coverage.push(mbr);
    }

    /// Drop all coverage rectangles, making every tile valid again.
    pub fn clear_coverage(&mut self) {
        self.coverage.clear();
    }

    /// Coverage rectangles currently in effect.
    #[must_use]
    pub fn coverage(&self) -> &[Mbr] {
        &self.coverage
    }

    /// World-space bounds of a tile.
    #[must_use]
    pub fn tile_bounds(&self, tile: &TileId) -> Mbr {
        let (x0, y0, x1, y1) = tile.unit_bounds();
        let size = DVec2::new(self.bounds.width(), self.bounds.height());
        Mbr {
            ll: self.bounds.ll + DVec2::new(x0, y0) * size,
            ur: self.bounds.ll + DVec2::new(x1, y1) * size,
        }
    }

    /// Whether the tile carries data under the coverage rules.
    #[must_use]
    pub fn is_covered(&self, tile: &TileId) -> bool {
        if self.coverage.is_empty() {
            return true;
        }
        let bounds = self.tile_bounds(tile);
        self.coverage.iter().any(|c| c.overlaps(&bounds))
    }
}

impl Default for CoordSystem {
    fn default() -> Self {
        Self::unit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spherical_mercator() -> CoordSystem {
        let half = 20_037_508.34;
        CoordSystem::new(Mbr::new(
            DVec2::new(-half, -half),
            DVec2::new(half, half),
        ))
    }

    #[test]
    fn test_root_bounds_match_pyramid() {
        let cs = spherical_mercator();
        assert_eq!(cs.tile_bounds(&TileId::ROOT), *cs.bounds());
    }

    #[test]
    fn test_child_bounds_tile_the_parent() {
        let cs = spherical_mercator();
        let parent = TileId::new(2, 1, 3);
        let pb = cs.tile_bounds(&parent);
        let area: f64 = parent
            .children()
            .unwrap()
            .iter()
            .map(|c| {
                let b = cs.tile_bounds(c);
                b.width() * b.height()
            })
            .sum();
        assert!((area - pb.width() * pb.height()).abs() / area < 1e-9);
    }

    #[test]
    fn test_mbr_normalizes_corners() {
        let m = Mbr::new(DVec2::new(3.0, 4.0), DVec2::new(1.0, 2.0));
        assert_eq!(m.ll, DVec2::new(1.0, 2.0));
        assert_eq!(m.ur, DVec2::new(3.0, 4.0));
    }

    #[test]
    fn test_touching_edges_do_not_overlap() {
        let a = Mbr::new(DVec2::ZERO, DVec2::ONE);
        let b = Mbr::new(DVec2::new(1.0, 0.0), DVec2::new(2.0, 1.0));
        let c = Mbr::new(DVec2::new(0.5, 0.5), DVec2::new(2.0, 2.0));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
    }

    #[test]
    fn test_coverage_makes_pyramid_sparse() {
        let mut cs = CoordSystem::unit();
        assert!(cs.is_covered(&TileId::new(1, 1, 1)));

        cs.add_coverage(Mbr::new(DVec2::new(0.0, 0.0), DVec2::new(0.25, 0.25)));
        assert!(cs.is_covered(&TileId::ROOT));
        assert!(cs.is_covered(&TileId::new(1, 0, 0)));
        assert!(!cs.is_covered(&TileId::new(1, 1, 1)));
        assert!(!cs.is_covered(&TileId::new(2, 1, 0)));

        cs.clear_coverage();
        assert!(cs.is_covered(&TileId::new(2, 1, 0)));
    }

    #[test]
    fn test_corners_on_ground_plane() {
        let m = Mbr::new(DVec2::ZERO, DVec2::new(2.0, 1.0));
        let corners = m.corners();
        assert!(corners.iter().all(|c| c.z == 0.0));
        assert_eq!(corners[2], DVec3::new(2.0, 1.0, 0.0));
    }
}
