//! Builder delegates used by the simulation.

use std::sync::{Mutex, PoisonError};

use quadpager_lod::TargetSet;
use quadpager_sampler::{TileData, TileEvent, TileEventSink};
use quadpager_tile::TileId;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

/// Tally of tile events seen by a delegate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct EventCounts {
    pub will_load: u64,
    pub did_load: u64,
    pub did_not_load: u64,
    pub will_unload: u64,
}

/// Counts every event and optionally logs it.
pub(crate) struct EventLogger {
    verbose: bool,
    counts: Mutex<EventCounts>,
}

impl EventLogger {
    pub(crate) fn new(verbose: bool) -> Self {
        Self {
            verbose,
            counts: Mutex::new(EventCounts::default()),
        }
    }

    pub(crate) fn counts(&self) -> EventCounts {
        *self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TileEventSink for EventLogger {
    fn on_event(&self, event: &TileEvent) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            TileEvent::WillLoad { tile, frames } => {
                counts.will_load += 1;
                if self.verbose {
                    debug!(tile = %tile, ?frames, "will load");
                }
            }
            TileEvent::DidLoad { tile, frame, data } => {
                counts.did_load += 1;
                if self.verbose {
                    debug!(tile = %tile, frame, bytes = data.len(), "did load");
                }
            }
            TileEvent::DidNotLoad { tile, frame, reason } => {
                counts.did_not_load += 1;
                if self.verbose {
                    debug!(tile = %tile, frame, %reason, "did not load");
                }
            }
            TileEvent::WillUnload { tile } => {
                counts.will_unload += 1;
                if self.verbose {
                    debug!(tile = %tile, "will unload");
                }
            }
        }
    }
}

/// A frame composited from every tile of a target set.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ComposedFrame {
    pub frame: usize,
    pub tiles: usize,
    pub missing: usize,
    pub bytes: usize,
}

#[derive(Default)]
struct CompositorState {
    /// Frame data by tile, mirrored from load and unload events.
    data: FxHashMap<TileId, FxHashMap<usize, TileData>>,
    /// Target composed last, per frame.
    last: FxHashMap<usize, Vec<TileId>>,
    composed: Vec<ComposedFrame>,
}

/// Offline renderer: keeps its own copy of tile data and only composes a
/// frame once every target tile has it, never a partial one.
#[derive(Default)]
pub(crate) struct OfflineCompositor {
    state: Mutex<CompositorState>,
}

impl OfflineCompositor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Compose `frame` over `target` unless that exact target was already
    /// composed. The caller only asks once the frame is complete.
    pub(crate) fn compose(&self, frame: usize, target: &TargetSet) -> Option<ComposedFrame> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let ids: Vec<TileId> = target.iter().map(|t| t.id).collect();
        if state.last.get(&frame) == Some(&ids) {
            return None;
        }

        let mut composed = ComposedFrame {
            frame,
            tiles: 0,
            missing: 0,
            bytes: 0,
        };
        for id in &ids {
            match state.data.get(id).and_then(|frames| frames.get(&frame)) {
                Some(data) => {
                    composed.tiles += 1;
                    composed.bytes += data.len();
                }
                // Failed tiles count as complete but have nothing to draw.
                None => composed.missing += 1,
            }
        }
        info!(
            frame,
            tiles = composed.tiles,
            missing = composed.missing,
            bytes = composed.bytes,
            "Composed frame"
        );
        state.last.insert(frame, ids);
        state.composed.push(composed.clone());
        Some(composed)
    }

    pub(crate) fn composed(&self) -> Vec<ComposedFrame> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .composed
            .clone()
    }

    /// Tiles the compositor currently holds data for.
    pub(crate) fn held_tiles(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .data
            .len()
    }
}

impl TileEventSink for OfflineCompositor {
    fn on_event(&self, event: &TileEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            TileEvent::DidLoad { tile, frame, data } => {
                state
                    .data
                    .entry(*tile)
                    .or_default()
                    .insert(*frame, data.clone());
            }
            TileEvent::WillUnload { tile } => {
                state.data.remove(tile);
            }
            TileEvent::WillLoad { .. } | TileEvent::DidNotLoad { .. } => {}
        }
    }
}
