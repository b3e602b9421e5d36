//! Stand-in renderer scene that applies change sets.

use quadpager_sampler::{Change, ChangeSet, TileData};
use quadpager_tile::TileId;
use rustc_hash::FxHashMap;

/// Tile frames currently drawable, keyed by tile.
#[derive(Default)]
pub(crate) struct Scene {
    tiles: FxHashMap<TileId, FxHashMap<usize, TileData>>,
    applied: u64,
}

impl Scene {
    /// Apply and empty a change set.
    pub(crate) fn apply(&mut self, changes: &mut ChangeSet) {
        for change in changes.drain() {
            self.applied += 1;
            match change {
                Change::AddTile { tile, frame, data } => {
                    self.tiles.entry(tile).or_default().insert(frame, data);
                }
                Change::RemoveTile { tile } => {
                    self.tiles.remove(&tile);
                }
                Change::RemoveFrame { tile, frame } => {
                    if let Some(frames) = self.tiles.get_mut(&tile) {
                        frames.remove(&frame);
                        if frames.is_empty() {
                            self.tiles.remove(&tile);
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub(crate) fn bytes(&self) -> usize {
        self.tiles
            .values()
            .flat_map(|frames| frames.values())
            .map(|data| data.len())
            .sum()
    }

    pub(crate) fn applied(&self) -> u64 {
        self.applied
    }
}
