//! The ordered set of tiles a view requires.

use std::cmp::Ordering;

use quadpager_tile::TileId;
use rustc_hash::FxHashMap;

/// One tile of a target set with the importance it was ranked by.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetTile {
    /// The tile.
    pub id: TileId,
    /// Scaled importance under the view that produced the set.
    pub importance: f64,
}

/// Load-priority order: importance descending, then coarser level, then `(x, y)`.
pub(crate) fn rank(a: &TargetTile, b: &TargetTile) -> Ordering {
    b.importance
        .partial_cmp(&a.importance)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.level.cmp(&b.id.level))
        .then_with(|| (a.id.x, a.id.y).cmp(&(b.id.x, b.id.y)))
}

/// Tiles required by the current view, in load-priority order.
///
/// Recomputed wholesale on every view update and never edited in place.
#[derive(Clone, Debug, Default)]
pub struct TargetSet {
    tiles: Vec<TargetTile>,
    level: Option<u32>,
    index: FxHashMap<TileId, usize>,
}

impl TargetSet {
    /// Build a set from tiles already in priority order. Duplicate ids keep
    /// their first position.
    pub fn new(tiles: Vec<TargetTile>, level: Option<u32>) -> Self {
        let mut index = FxHashMap::default();
        let mut unique = Vec::with_capacity(tiles.len());
        for tile in tiles {
            if !index.contains_key(&tile.id) {
                index.insert(tile.id, unique.len());
                unique.push(tile);
            }
        }
        Self {
            tiles: unique,
            level,
            index,
        }
    }

    /// Build a set from unordered tiles, sorting them into priority order first.
    pub fn ranked(mut tiles: Vec<TargetTile>, level: Option<u32>) -> Self {
        tiles.sort_by(rank);
        Self::new(tiles, level)
    }

    /// Position of `id` in load order.
    pub fn position(&self, id: &TileId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Whether the view requires `id`.
    pub fn contains(&self, id: &TileId) -> bool {
        self.index.contains_key(id)
    }

    /// Entry for `id`, if targeted.
    pub fn get(&self, id: &TileId) -> Option<&TargetTile> {
        self.position(id).map(|i| &self.tiles[i])
    }

    /// Number of targeted tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// True when the view requires nothing.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tiles in load order.
    pub fn iter(&self) -> impl Iterator<Item = &TargetTile> {
        self.tiles.iter()
    }

    /// Tiles in load order, as a slice.
    pub fn tiles(&self) -> &[TargetTile] {
        &self.tiles
    }

    /// Deepest level present in the set.
    pub fn deepest_level(&self) -> Option<u32> {
        self.tiles.iter().map(|t| t.id.level).max()
    }

    /// The level the set was built for: the uniform level in single-level
    /// mode, otherwise the deepest level present.
    pub fn target_level(&self) -> Option<u32> {
        self.level.or_else(|| self.deepest_level())
    }
}
