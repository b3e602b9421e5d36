//! Tile budget enforcement.
//!
//! Provides [`select_evictions`] to decide which resident tiles to drop when
//! the resident set exceeds `max_tiles`.

use std::cmp::Ordering;

use quadpager_lod::TargetSet;
use quadpager_tile::TileId;

use crate::{ResidentSet, TileNode};

/// Eviction preference, lowest evicted first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum EvictionClass {
    /// Resident but no longer required by the view.
    NonTarget,
    /// Required, but the displayed frame has not arrived.
    TargetUnloaded,
    /// Required and displayable.
    TargetLoaded,
}

/// Classify a resident tile for eviction.
pub fn classify(id: &TileId, node: &TileNode, target: &TargetSet, displayed: usize) -> EvictionClass {
    if !target.contains(id) {
        EvictionClass::NonTarget
    } else if node.is_displayable(displayed) {
        EvictionClass::TargetLoaded
    } else {
        EvictionClass::TargetUnloaded
    }
}

/// Whether a tile is close enough to finishing that evicting it would waste the work.
pub fn is_protected(node: &TileNode, near_completion: f64) -> bool {
    node.in_flight() > 0 && node.loaded_ratio() >= near_completion
}

/// Determine which tiles to evict to bring the resident set within `max_tiles`.
///
/// Returns ids in eviction order: by [`EvictionClass`], then ascending
/// importance, then oldest admitted first. Protected tiles are never
/// returned, so fewer tiles than the overage may come back.
pub fn select_evictions(
    resident: &ResidentSet,
    target: &TargetSet,
    max_tiles: usize,
    displayed: usize,
    near_completion: f64,
) -> Vec<TileId> {
    let overage = resident.len().saturating_sub(max_tiles);
    if overage == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<_> = resident
        .iter()
        .filter(|(_, node)| !is_protected(node, near_completion))
        .map(|(id, node)| {
            let importance = target.get(id).map_or(node.importance, |t| t.importance);
            (*id, classify(id, node, target, displayed), importance, node.enqueued_seq)
        })
        .collect();
    candidates.sort_by(|a, b| {
        a.1.cmp(&b.1)
            .then_with(|| a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal))
            .then_with(|| a.3.cmp(&b.3))
    });

    candidates
        .into_iter()
        .take(overage)
        .map(|(id, ..)| id)
        .collect()
}
