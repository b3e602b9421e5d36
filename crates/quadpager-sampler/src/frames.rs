//! Frame manager: per-frame load decisions for multi-frame (time series) tiles.
//!
//! Frames of one tile load independently and may complete out of order. A
//! tile can be displayed once its displayed frame is loaded, whatever the
//! state of its other frames.

use quadpager_lod::{SamplingParams, TargetSet};
use quadpager_tile::TileId;
use tracing::trace;

use crate::{Completion, FetchFailure, LoadStatus, RequestId, ResidentSet, TileEvent};

/// Aggregate state of one frame index across the target set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameStatus {
    /// Every target tile has this frame loaded or failed.
    pub complete: bool,
    /// Highest complete frame index at or below this one, or -1.
    pub current_frame: i32,
}

/// Load progress of one frame index across the target set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLoadInfo {
    /// Some target tile has this frame in flight.
    pub loading: bool,
    /// Every target tile has this frame loaded.
    pub loaded: bool,
    /// Number of target tiles with this frame loaded.
    pub frames_loaded: usize,
}

/// A frame that should be requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadCandidate {
    /// Tile to load.
    pub tile: TileId,
    /// Frame index.
    pub frame: usize,
    /// Position of the tile in the target order.
    pub priority: i32,
}

/// An in-flight request that should be cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CancelRequest {
    /// Tile that left the target set.
    pub tile: TileId,
    /// Frame index.
    pub frame: usize,
    /// Request to cancel.
    pub request: RequestId,
}

/// Result of comparing the target set with the resident set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reconciliation {
    /// Frames to request, in load order.
    pub to_load: Vec<LoadCandidate>,
    /// In-flight frames of tiles no longer targeted.
    pub to_cancel: Vec<CancelRequest>,
}

/// Outcome of applying a completion.
#[derive(Clone, Debug)]
pub enum Applied {
    /// The frame changed state; the event describes how.
    Updated(TileEvent),
    /// The tile or request is gone. Nothing changed.
    Stale,
}

/// Tracks the displayed frame and decides which frames load in which order.
#[derive(Clone, Debug, Default)]
pub struct FrameManager {
    displayed: usize,
}

impl FrameManager {
    /// Create a manager displaying frame 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame currently on screen.
    pub fn displayed_frame(&self) -> usize {
        self.displayed
    }

    /// Change the frame on screen. Callers validate the index.
    pub fn set_displayed_frame(&mut self, frame: usize) {
        self.displayed = frame;
    }

    /// Eligible frames in the order they should load.
    ///
    /// With explicit priorities, higher values load first and negative values
    /// never load. Otherwise the displayed frame leads and the rest follow in
    /// index order. Nothing is eligible while frame loading is paused.
    pub fn frame_order(&self, params: &SamplingParams) -> Vec<usize> {
        if !params.allow_frame_loading {
            return Vec::new();
        }
        match &params.frame_priorities {
            Some(priorities) => {
                let mut frames: Vec<usize> = (0..params.num_frames)
                    .filter(|&f| priorities.get(f).is_some_and(|&p| p >= 0))
                    .collect();
                frames.sort_by_key(|&f| (std::cmp::Reverse(priorities[f]), f));
                frames
            }
            None => {
                let mut frames = Vec::with_capacity(params.num_frames);
                if self.displayed < params.num_frames {
                    frames.push(self.displayed);
                }
                frames.extend((0..params.num_frames).filter(|&f| f != self.displayed));
                frames
            }
        }
    }

    /// Decide what to load and what to cancel.
    ///
    /// Target tiles that are not resident yet contribute every eligible frame.
    /// Frames already loading, loaded or failed are left alone.
    pub fn reconcile(
        &self,
        target: &TargetSet,
        resident: &ResidentSet,
        params: &SamplingParams,
    ) -> Reconciliation {
        let order = self.frame_order(params);
        let mut out = Reconciliation::default();

        for (pos, tile) in target.iter().enumerate() {
            let node = resident.get(&tile.id);
            for &frame in &order {
                let status = node
                    .and_then(|n| n.frames.get(frame))
                    .map_or(LoadStatus::Empty, |f| f.status);
                if status == LoadStatus::Empty {
                    out.to_load.push(LoadCandidate {
                        tile: tile.id,
                        frame,
                        priority: i32::try_from(pos).unwrap_or(i32::MAX),
                    });
                }
            }
        }

        for id in resident.ids() {
            if target.contains(&id) {
                continue;
            }
            if let Some(node) = resident.get(&id) {
                out.to_cancel.extend(node.requests().map(|(frame, request)| CancelRequest {
                    tile: id,
                    frame,
                    request,
                }));
            }
        }

        out
    }

    /// Apply a fetch completion if its request is still the one the frame waits on.
    pub fn apply(&self, resident: &mut ResidentSet, completion: Completion) -> Applied {
        let Some(state) = resident
            .get_mut(&completion.tile)
            .and_then(|n| n.frames.get_mut(completion.frame))
        else {
            return Applied::Stale;
        };
        if state.status != LoadStatus::Loading || state.request != Some(completion.id) {
            return Applied::Stale;
        }

        state.request = None;
        let event = match completion.result {
            Ok(data) => {
                state.status = LoadStatus::Loaded;
                state.data = Some(data.clone());
                TileEvent::DidLoad {
                    tile: completion.tile,
                    frame: completion.frame,
                    data,
                }
            }
            Err(reason) => {
                // A cancelled request that was still wanted is simply retried.
                state.status = if reason == FetchFailure::Cancelled {
                    LoadStatus::Empty
                } else {
                    LoadStatus::Failed
                };
                state.data = None;
                TileEvent::DidNotLoad {
                    tile: completion.tile,
                    frame: completion.frame,
                    reason,
                }
            }
        };
        trace!(tile = %completion.tile, frame = completion.frame, status = ?state.status, "Applied completion");
        Applied::Updated(event)
    }

    /// Per-frame completeness over the target set. A frame is complete once every
    /// targeted tile has it loaded or failed. Resident tiles outside the target
    /// (kept for display while their replacements load) do not count. An empty
    /// target is never complete.
    pub fn frame_status(
        &self,
        target: &TargetSet,
        resident: &ResidentSet,
        num_frames: usize,
    ) -> Vec<FrameStatus> {
        let mut current = -1;
        (0..num_frames)
            .map(|frame| {
                let complete = !target.is_empty()
                    && target.iter().all(|t| {
                        resident
                            .get(&t.id)
                            .and_then(|n| n.frames.get(frame))
                            .is_some_and(|f| {
                                matches!(f.status, LoadStatus::Loaded | LoadStatus::Failed)
                            })
                    });
                if complete {
                    current = i32::try_from(frame).unwrap_or(i32::MAX);
                }
                FrameStatus {
                    complete,
                    current_frame: current,
                }
            })
            .collect()
    }

    /// Per-frame load progress over the target set.
    pub fn loaded_frames(
        &self,
        target: &TargetSet,
        resident: &ResidentSet,
        num_frames: usize,
    ) -> Vec<FrameLoadInfo> {
        (0..num_frames)
            .map(|frame| {
                let mut loading = false;
                let mut frames_loaded = 0;
                for t in target.iter() {
                    match resident
                        .get(&t.id)
                        .and_then(|n| n.frames.get(frame))
                        .map(|f| f.status)
                    {
                        Some(LoadStatus::Loading) => loading = true,
                        Some(LoadStatus::Loaded) => frames_loaded += 1,
                        _ => {}
                    }
                }
                FrameLoadInfo {
                    loading,
                    loaded: !target.is_empty() && frames_loaded == target.len(),
                    frames_loaded,
                }
            })
            .collect()
    }
}
