//! Batched scene mutations handed to the renderer.

use quadpager_tile::TileId;

use crate::TileData;

/// One resource mutation for the rendering side.
#[derive(Clone, Debug)]
pub enum Change {
    /// A frame of a tile finished loading and can be displayed.
    AddTile {
        /// Tile the data belongs to.
        tile: TileId,
        /// Frame index.
        frame: usize,
        /// Loaded data.
        data: TileData,
    },
    /// Every resource of the tile should be released.
    RemoveTile {
        /// Tile being unloaded.
        tile: TileId,
    },
    /// One frame of a tile was dropped (reload or image depth change).
    RemoveFrame {
        /// Tile owning the frame.
        tile: TileId,
        /// Frame index.
        frame: usize,
    },
}

impl Change {
    /// Tile this change applies to.
    pub fn tile(&self) -> TileId {
        match self {
            Change::AddTile { tile, .. }
            | Change::RemoveTile { tile }
            | Change::RemoveFrame { tile, .. } => *tile,
        }
    }
}

/// Append-only list of changes produced by one step, applied atomically by the renderer.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change.
    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Number of pending changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Pending changes in the order they were produced.
    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    /// Take every pending change, leaving the set empty.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Change> {
        self.changes.drain(..)
    }
}
