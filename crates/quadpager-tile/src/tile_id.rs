//! Unique tile identifier in a power-of-two quad pyramid.

/// Uniquely identifies a tile in the pyramid.
///
/// - `level`: zoom level. Level 0 is a single tile covering the whole pyramid;
///   every level below it doubles the resolution along each axis.
/// - `x`, `y`: grid coordinates at this level, both in `0..2^level`.
///
/// Ordering is by level first, so sorting a set of ids puts coarser tiles first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    /// Zoom level (0 = root).
    pub level: u32,
    /// Horizontal grid coordinate at this level.
    pub x: u32,
    /// Vertical grid coordinate at this level.
    pub y: u32,
}

impl TileId {
    /// Deepest level whose grid still fits in `u32` coordinates.
    pub const MAX_LEVEL: u32 = 31;

    /// The root tile covering the whole pyramid.
    pub const ROOT: TileId = TileId {
        level: 0,
        x: 0,
        y: 0,
    };

    /// Number of tiles along one axis at the given level.
    ///
    /// # Panics
    ///
    /// Panics if `level` exceeds [`Self::MAX_LEVEL`].
    #[must_use]
    pub fn grid_size(level: u32) -> u64 {
        assert!(
            level <= Self::MAX_LEVEL,
            "level {level} exceeds MAX_LEVEL {}",
            Self::MAX_LEVEL
        );
        1u64 << level
    }

    /// Construct a `TileId`, validating that `x` and `y` lie inside the grid
    /// for the given level.
    ///
    /// # Panics
    ///
    /// Panics if `level` exceeds [`Self::MAX_LEVEL`] or if `x`/`y` are out of range.
    #[must_use]
    pub fn new(level: u32, x: u32, y: u32) -> Self {
        let size = Self::grid_size(level);
        assert!(
            (x as u64) < size,
            "x={x} out of range for level {level} (max {size})"
        );
        assert!(
            (y as u64) < size,
            "y={y} out of range for level {level} (max {size})"
        );
        Self { level, x, y }
    }

    /// Non-panicking constructor for ids that come from outside the pyramid
    /// (fetch callbacks, config files).
    #[must_use]
    pub fn try_new(level: u32, x: u32, y: u32) -> Option<Self> {
        if level > Self::MAX_LEVEL {
            return None;
        }
        let size = 1u64 << level;
        if (x as u64) < size && (y as u64) < size {
            Some(Self { level, x, y })
        } else {
            None
        }
    }

    /// The parent tile one level up. Returns `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<TileId> {
        if self.level == 0 {
            return None;
        }
        Some(TileId {
            level: self.level - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// The four children one level down, ordered
    /// `[(2x, 2y), (2x+1, 2y), (2x, 2y+1), (2x+1, 2y+1)]`.
    ///
    /// Returns `None` at [`Self::MAX_LEVEL`].
    #[must_use]
    pub fn children(&self) -> Option<[TileId; 4]> {
        if self.level >= Self::MAX_LEVEL {
            return None;
        }
        let level = self.level + 1;
        let cx = self.x * 2;
        let cy = self.y * 2;
        Some([
            TileId::new(level, cx, cy),
            TileId::new(level, cx + 1, cy),
            TileId::new(level, cx, cy + 1),
            TileId::new(level, cx + 1, cy + 1),
        ])
    }

    /// The ancestor of this tile at `level`, or the tile itself when
    /// `level == self.level`. Returns `None` if `level` is deeper than this tile.
    #[must_use]
    pub fn ancestor_at(&self, level: u32) -> Option<TileId> {
        if level > self.level {
            return None;
        }
        let shift = self.level - level;
        Some(TileId {
            level,
            x: self.x >> shift,
            y: self.y >> shift,
        })
    }

    /// True if `other` lies strictly below this tile in the pyramid.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &TileId) -> bool {
        other.level > self.level && other.ancestor_at(self.level) == Some(*self)
    }

    /// Normalized bounds of this tile inside the unit square,
    /// as `(x_min, y_min, x_max, y_max)`.
    #[must_use]
    pub fn unit_bounds(&self) -> (f64, f64, f64, f64) {
        let size = Self::grid_size(self.level) as f64;
        (
            self.x as f64 / size,
            self.y as f64 / size,
            (self.x as f64 + 1.0) / size,
            (self.y as f64 + 1.0) / size,
        )
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}: {}, {})", self.level, self.x, self.y)
    }
}
