//! Quad tree walker: turns a view into an ordered target set.
//!
//! Refinement is best-first. The walker keeps a max-heap of candidate tiles
//! keyed by importance and repeatedly replaces the most important one with its
//! visible children until every candidate is either at full resolution, at
//! `max_zoom`, or further subdivision would exceed the tile budget. The heap
//! starts from the visible tiles of `min_zoom`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use quadpager_tile::{CoordSystem, TileId};
use tracing::{debug, trace};

use crate::target::rank;
use crate::{ImportanceEvaluator, SamplingParams, TargetSet, TargetTile, ViewState};

/// A heap entry. The max-heap pops the tile that ranks first.
#[derive(Clone, Copy, Debug)]
struct Candidate(TargetTile);

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        rank(&self.0, &other.0).reverse()
    }
}

/// Computes target sets. Reuses its heap between evaluations.
#[derive(Default)]
pub struct QuadTreeWalker {
    heap: BinaryHeap<Candidate>,
}

impl QuadTreeWalker {
    /// Create a walker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the target set for `view`.
    ///
    /// In single-level mode every returned tile (apart from the coarser
    /// `multi_level_loads` extras) shares one level. The set never holds
    /// more than `params.max_tiles` tiles.
    pub fn evaluate(
        &mut self,
        view: &ViewState,
        params: &SamplingParams,
        coords: &CoordSystem,
    ) -> TargetSet {
        let eval = ImportanceEvaluator::new(view, params.tile_size);
        let set = if params.single_level {
            self.single_level(&eval, params, coords)
        } else {
            let tiles = self.refine(&eval, params, coords);
            TargetSet::ranked(tiles, None)
        };
        debug!(
            tiles = set.len(),
            level = ?set.target_level(),
            single_level = params.single_level,
            "Evaluated target set"
        );
        set
    }

    /// Budget-limited best-first refinement. Returns the accepted tiles sorted
    /// into load order and truncated to the budget.
    fn refine(
        &mut self,
        eval: &ImportanceEvaluator,
        params: &SamplingParams,
        coords: &CoordSystem,
    ) -> Vec<TargetTile> {
        self.heap.clear();
        let mut accepted = Vec::new();

        // Nothing above min_zoom carries data: start from its visible tiles.
        let (seeds, _) = level_cover(eval, params, coords, params.min_zoom, params.max_tiles);
        self.heap.extend(seeds.into_iter().map(Candidate));

        while let Some(Candidate(tile)) = self.heap.pop() {
            if tile.id.level >= params.max_zoom || tile.importance <= 1.0 {
                trace!(tile = %tile.id, importance = tile.importance, "Accept at resolution");
                accepted.push(tile);
                continue;
            }

            let children: Vec<_> = visible_children(eval, params, coords, tile.id).collect();
            let count_after = accepted.len() + self.heap.len() + children.len();
            if children.is_empty() || count_after > params.max_tiles {
                trace!(tile = %tile.id, importance = tile.importance, "Accept at budget");
                accepted.push(tile);
                continue;
            }

            trace!(tile = %tile.id, children = children.len(), "Subdivide");
            self.heap.extend(children.into_iter().map(Candidate));
        }

        accepted.sort_by(rank);
        accepted.truncate(params.max_tiles);
        accepted
    }

    fn single_level(
        &mut self,
        eval: &ImportanceEvaluator,
        params: &SamplingParams,
        coords: &CoordSystem,
    ) -> TargetSet {
        let (level, mut tiles) = match params.target_zoom_override {
            Some(zoom) => {
                let level = zoom.clamp(params.min_zoom, params.max_zoom);
                let (tiles, _) = level_cover(eval, params, coords, level, params.max_tiles);
                (level, tiles)
            }
            None => {
                let wanted = self
                    .refine(eval, params, coords)
                    .iter()
                    .map(|t| t.id.level)
                    .max()
                    .unwrap_or(params.min_zoom);
                fitting_level(eval, params, coords, wanted)
            }
        };

        let mut extras = Vec::new();
        let mut seen = Vec::new();
        for &offset in &params.multi_level_loads {
            let Some(extra) = level.checked_add_signed(offset) else {
                continue;
            };
            if offset == 0 || extra < params.min_zoom || seen.contains(&extra) {
                continue;
            }
            seen.push(extra);
            let (found, _) = level_cover(eval, params, coords, extra, params.max_tiles);
            extras.extend(found);
        }
        extras.sort_by(rank);
        extras.truncate(params.max_tiles.saturating_sub(tiles.len()));
        tiles.extend(extras);

        TargetSet::new(tiles, Some(level))
    }
}

/// The deepest level at or above `wanted` whose visible tiles fit the budget,
/// with those tiles in load order. Falls back to the best `max_tiles` tiles
/// of `min_zoom`.
fn fitting_level(
    eval: &ImportanceEvaluator,
    params: &SamplingParams,
    coords: &CoordSystem,
    wanted: u32,
) -> (u32, Vec<TargetTile>) {
    let mut level = wanted.clamp(params.min_zoom, params.max_zoom);
    loop {
        let (tiles, complete) = level_cover(eval, params, coords, level, params.max_tiles);
        if complete || level == params.min_zoom {
            return (level, tiles);
        }
        trace!(level, "Level exceeds tile budget, stepping up");
        level -= 1;
    }
}

/// Visible tiles at `level` in load order, found breadth-first from the root.
///
/// No level of the descent keeps more than `width` tiles: when one holds more,
/// only its `width` highest ranked tiles are expanded and the cover is
/// reported incomplete. The work is bounded by `width * level` evaluations
/// however deep `level` is.
fn level_cover(
    eval: &ImportanceEvaluator,
    params: &SamplingParams,
    coords: &CoordSystem,
    level: u32,
    width: usize,
) -> (Vec<TargetTile>, bool) {
    let mut complete = true;
    let mut frontier: Vec<TargetTile> = score(eval, params, coords, TileId::ROOT)
        .into_iter()
        .collect();
    for _ in 0..level {
        frontier = frontier
            .iter()
            .flat_map(|t| visible_children(eval, params, coords, t.id))
            .collect();
        if frontier.len() > width {
            frontier.sort_by(rank);
            frontier.truncate(width);
            complete = false;
        }
    }
    frontier.sort_by(rank);
    (frontier, complete)
}

/// Scaled importance of `id`, or `None` when the tile should be rejected
/// along with its subtree. Tiles down to `min_zoom` are culled on visibility
/// alone.
fn score(
    eval: &ImportanceEvaluator,
    params: &SamplingParams,
    coords: &CoordSystem,
    id: TileId,
) -> Option<TargetTile> {
    if !coords.is_covered(&id) {
        return None;
    }
    let importance = eval.importance(coords, &id) * params.importance_scale;
    let rejected = if id.level <= params.min_zoom {
        importance <= 0.0
    } else {
        importance <= 0.0 || importance < params.min_importance
    };
    if rejected {
        trace!(tile = %id, importance, "Reject");
        return None;
    }
    Some(TargetTile { id, importance })
}

fn visible_children<'a>(
    eval: &'a ImportanceEvaluator,
    params: &'a SamplingParams,
    coords: &'a CoordSystem,
    id: TileId,
) -> impl Iterator<Item = TargetTile> + 'a {
    id.children()
        .into_iter()
        .flatten()
        .filter_map(move |child| score(eval, params, coords, child))
}
