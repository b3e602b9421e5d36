//! Loading scheduler: reconciles the resident set with the target set once per step.
//!
//! A step runs in a fixed order:
//!
//! 1. drain fetch completions;
//! 2. reconcile, cancel in-flight loads of tiles that left the target, re-rank
//!    in-flight loads whose tile moved in the load order, and drop untargeted
//!    tiles holding no data;
//! 3. admit nodes for newly targeted tiles;
//! 4. evict down to `max_tiles`;
//! 5. issue loads in target order until `simultaneous_fetches` are in flight.
//!
//! No load is ever issued for a tile evicted in the same step.

use crossbeam_channel::Receiver;
use quadpager_lod::{SamplingParams, TargetSet};
use quadpager_tile::TileId;
use tracing::{debug, trace, warn};

use crate::eviction::select_evictions;
use crate::fetch::completion_channel;
use crate::frames::{Applied, FrameLoadInfo, FrameManager, FrameStatus, LoadCandidate};
use crate::{
    Change, ChangeSet, Completion, CompletionSender, DelegateRegistry, FetchExecutor, FetchFailure,
    FetchRequest, LoadStatus, ResidentSet, TileEvent,
};

/// What one step did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScheduleDecision {
    /// Completions applied to live frames.
    pub completed: usize,
    /// Completions discarded as stale.
    pub stale: usize,
    /// Requests cancelled because their tile left the target.
    pub cancelled: usize,
    /// In-flight requests given a new priority.
    pub reprioritized: usize,
    /// Untargeted tiles dropped because they held no data.
    pub dropped: Vec<TileId>,
    /// Tiles admitted this step.
    pub admitted: Vec<TileId>,
    /// Tiles evicted to meet the budget.
    pub evicted: Vec<TileId>,
    /// Loads issued this step, in issue order.
    pub issued: Vec<LoadCandidate>,
    /// Loads still wanted but not issued for lack of fetch slots.
    pub pending: usize,
}

impl ScheduleDecision {
    /// Whether the resident set or any frame state changed.
    pub fn changed(&self) -> bool {
        self.completed > 0
            || self.cancelled > 0
            || !self.dropped.is_empty()
            || !self.admitted.is_empty()
            || !self.evicted.is_empty()
            || !self.issued.is_empty()
    }
}

/// Running totals since the scheduler was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Loads issued.
    pub issued: u64,
    /// Frames that loaded.
    pub loaded: u64,
    /// Frames that failed.
    pub failed: u64,
    /// Completions discarded as stale.
    pub stale: u64,
    /// Requests cancelled.
    pub cancelled: u64,
    /// Tiles evicted or dropped.
    pub unloaded: u64,
}

/// Owns the resident set and drives loads through a [`FetchExecutor`].
pub struct LoadingScheduler {
    resident: ResidentSet,
    frames: FrameManager,
    completion_tx: CompletionSender,
    completion_rx: Receiver<Completion>,
    stats: SchedulerStats,
}

impl Default for LoadingScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadingScheduler {
    /// Create a scheduler with nothing resident.
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = completion_channel();
        Self {
            resident: ResidentSet::new(),
            frames: FrameManager::new(),
            completion_tx,
            completion_rx,
            stats: SchedulerStats::default(),
        }
    }

    /// The resident set.
    pub fn resident(&self) -> &ResidentSet {
        &self.resident
    }

    /// The frame manager.
    pub fn frames(&self) -> &FrameManager {
        &self.frames
    }

    /// Change the displayed frame.
    pub fn set_displayed_frame(&mut self, frame: usize) {
        self.frames.set_displayed_frame(frame);
    }

    /// Totals since creation.
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Frames currently in flight.
    pub fn in_flight(&self) -> usize {
        self.resident.in_flight()
    }

    /// Whether completions are waiting to be applied.
    pub fn has_completions(&self) -> bool {
        !self.completion_rx.is_empty()
    }

    /// Per-frame completeness over `target`.
    pub fn frame_status(&self, target: &TargetSet, num_frames: usize) -> Vec<FrameStatus> {
        self.frames.frame_status(target, &self.resident, num_frames)
    }

    /// Per-frame load progress over `target`.
    pub fn loaded_frames(&self, target: &TargetSet, num_frames: usize) -> Vec<FrameLoadInfo> {
        self.frames.loaded_frames(target, &self.resident, num_frames)
    }

    /// Run one scheduling pass.
    pub fn step(
        &mut self,
        target: &TargetSet,
        params: &SamplingParams,
        executor: &mut dyn FetchExecutor,
        delegates: &DelegateRegistry,
        changes: &mut ChangeSet,
    ) -> ScheduleDecision {
        let mut decision = ScheduleDecision::default();

        self.drain_completions(delegates, changes, &mut decision);
        self.resize_frames(params.num_frames, executor, changes);
        self.retarget(target);

        // Reconcile and cancel.
        let reconciliation = self.frames.reconcile(target, &self.resident, params);
        for cancel in &reconciliation.to_cancel {
            executor.cancel(cancel.request);
            if let Some(state) = self
                .resident
                .get_mut(&cancel.tile)
                .and_then(|n| n.frames.get_mut(cancel.frame))
            {
                state.reset();
            }
            trace!(tile = %cancel.tile, frame = cancel.frame, request = %cancel.request, "Cancel");
        }
        decision.cancelled = reconciliation.to_cancel.len();
        self.stats.cancelled += decision.cancelled as u64;
        decision.reprioritized = self.reprioritize(target, executor);

        for id in self.resident.ids() {
            let empty = self
                .resident
                .get(&id)
                .is_some_and(|n| !n.enabled && n.loaded_count() == 0);
            if empty {
                self.unload(id, executor, delegates, changes);
                decision.dropped.push(id);
            }
        }

        // Admit.
        for tile in target.iter() {
            if self.resident.admit(tile.id, tile.importance, params.num_frames) {
                trace!(tile = %tile.id, importance = tile.importance, "Admit");
                decision.admitted.push(tile.id);
            }
        }

        // Evict.
        let evictions = select_evictions(
            &self.resident,
            target,
            params.max_tiles,
            self.frames.displayed_frame(),
            params.near_completion,
        );
        for id in evictions {
            trace!(tile = %id, "Evict");
            self.unload(id, executor, delegates, changes);
            decision.evicted.push(id);
        }

        // Issue.
        let mut slots = params
            .simultaneous_fetches
            .saturating_sub(self.resident.in_flight());
        let mut batch: Vec<LoadCandidate> = Vec::new();
        for candidate in reconciliation.to_load {
            let still_empty = self
                .resident
                .get(&candidate.tile)
                .and_then(|n| n.frames.get(candidate.frame))
                .is_some_and(|f| f.status == LoadStatus::Empty);
            if !still_empty {
                continue;
            }
            if slots == 0 {
                decision.pending += 1;
                continue;
            }
            if batch.first().is_some_and(|b| b.tile != candidate.tile) {
                self.issue(&batch, executor, delegates);
                decision.issued.append(&mut batch);
            }
            batch.push(candidate);
            slots -= 1;
        }
        if !batch.is_empty() {
            self.issue(&batch, executor, delegates);
            decision.issued.append(&mut batch);
        }

        debug!(
            targeted = target.len(),
            resident = self.resident.len(),
            in_flight = self.resident.in_flight(),
            completed = decision.completed,
            stale = decision.stale,
            cancelled = decision.cancelled,
            reprioritized = decision.reprioritized,
            admitted = decision.admitted.len(),
            evicted = decision.evicted.len() + decision.dropped.len(),
            issued = decision.issued.len(),
            pending = decision.pending,
            "Scheduling step"
        );
        decision
    }

    /// Forget every frame's data and failures so the next step loads afresh.
    pub fn reload(&mut self, executor: &mut dyn FetchExecutor, changes: &mut ChangeSet) {
        for id in self.resident.ids() {
            let Some(node) = self.resident.get_mut(&id) else {
                continue;
            };
            for (frame, state) in node.frames.iter_mut().enumerate() {
                match state.status {
                    LoadStatus::Loading => {
                        if let Some(request) = state.request {
                            executor.cancel(request);
                        }
                    }
                    LoadStatus::Loaded => changes.push(Change::RemoveFrame { tile: id, frame }),
                    LoadStatus::Empty | LoadStatus::Failed => {}
                }
                state.reset();
            }
        }
        debug!(resident = self.resident.len(), "Reloading all tiles");
    }

    /// Unload every tile, cancelling all requests.
    pub fn clear(
        &mut self,
        executor: &mut dyn FetchExecutor,
        delegates: &DelegateRegistry,
        changes: &mut ChangeSet,
    ) {
        for id in self.resident.ids() {
            self.unload(id, executor, delegates, changes);
        }
        // Anything still queued refers to tiles that no longer exist.
        while self.completion_rx.try_recv().is_ok() {
            self.stats.stale += 1;
        }
    }

    fn drain_completions(
        &mut self,
        delegates: &DelegateRegistry,
        changes: &mut ChangeSet,
        decision: &mut ScheduleDecision,
    ) {
        while let Ok(completion) = self.completion_rx.try_recv() {
            let (tile, frame) = (completion.tile, completion.frame);
            match self.frames.apply(&mut self.resident, completion) {
                Applied::Stale => {
                    trace!(tile = %tile, frame, "Discard stale completion");
                    decision.stale += 1;
                    self.stats.stale += 1;
                }
                Applied::Updated(event) => {
                    decision.completed += 1;
                    match &event {
                        TileEvent::DidLoad { data, .. } => {
                            self.stats.loaded += 1;
                            changes.push(Change::AddTile {
                                tile,
                                frame,
                                data: data.clone(),
                            });
                        }
                        TileEvent::DidNotLoad { reason, .. } => {
                            if *reason != FetchFailure::Cancelled {
                                self.stats.failed += 1;
                                warn!(tile = %tile, frame, %reason, "Tile failed to load");
                            }
                        }
                        _ => {}
                    }
                    delegates.dispatch(&event);
                }
            }
        }
    }

    /// Bring every node to `num_frames` frames after an image depth change.
    fn resize_frames(
        &mut self,
        num_frames: usize,
        executor: &mut dyn FetchExecutor,
        changes: &mut ChangeSet,
    ) {
        for (id, node) in self.resident.iter_mut() {
            if node.frames.len() == num_frames {
                continue;
            }
            for (frame, state) in node.frames.iter().enumerate().skip(num_frames) {
                match state.status {
                    LoadStatus::Loading => {
                        if let Some(request) = state.request {
                            executor.cancel(request);
                        }
                    }
                    LoadStatus::Loaded => changes.push(Change::RemoveFrame { tile: *id, frame }),
                    LoadStatus::Empty | LoadStatus::Failed => {}
                }
            }
            node.frames.resize_with(num_frames, Default::default);
        }
    }

    /// Refresh `enabled` and importance from the new target. Tiles coming back
    /// into the target get their failed frames retried.
    fn retarget(&mut self, target: &TargetSet) {
        for (id, node) in self.resident.iter_mut() {
            match target.get(id) {
                Some(tile) => {
                    if !node.enabled {
                        for state in &mut node.frames {
                            if state.status == LoadStatus::Failed {
                                state.reset();
                            }
                        }
                    }
                    node.enabled = true;
                    node.importance = tile.importance;
                }
                None => node.enabled = false,
            }
        }
    }

    /// Hand the executor the current load order for frames still in flight.
    fn reprioritize(&mut self, target: &TargetSet, executor: &mut dyn FetchExecutor) -> usize {
        let mut updated = 0;
        for (pos, tile) in target.iter().enumerate() {
            let priority = i32::try_from(pos).unwrap_or(i32::MAX);
            let Some(node) = self.resident.get_mut(&tile.id) else {
                continue;
            };
            for (frame, state) in node.frames.iter_mut().enumerate() {
                if state.status != LoadStatus::Loading || state.priority == priority {
                    continue;
                }
                if let Some(request) = state.request {
                    executor.update_priority(request, priority);
                    trace!(tile = %tile.id, frame, request = %request, priority, "Reprioritize");
                    state.priority = priority;
                    updated += 1;
                }
            }
        }
        updated
    }

    fn issue(
        &mut self,
        batch: &[LoadCandidate],
        executor: &mut dyn FetchExecutor,
        delegates: &DelegateRegistry,
    ) {
        let Some(tile) = batch.first().map(|c| c.tile) else {
            return;
        };
        delegates.dispatch(&TileEvent::WillLoad {
            tile,
            frames: batch.iter().map(|c| c.frame).collect(),
        });
        for candidate in batch {
            let id = executor.request_load(
                FetchRequest {
                    tile,
                    frame: candidate.frame,
                    priority: candidate.priority,
                },
                self.completion_tx.clone(),
            );
            if let Some(node) = self.resident.get_mut(&tile) {
                node.announced = true;
                if let Some(state) = node.frames.get_mut(candidate.frame) {
                    state.status = LoadStatus::Loading;
                    state.priority = candidate.priority;
                    state.request = Some(id);
                }
            }
            trace!(tile = %tile, frame = candidate.frame, request = %id, "Issue load");
        }
        self.stats.issued += batch.len() as u64;
    }

    fn unload(
        &mut self,
        id: TileId,
        executor: &mut dyn FetchExecutor,
        delegates: &DelegateRegistry,
        changes: &mut ChangeSet,
    ) {
        let Some(node) = self.resident.remove(&id) else {
            return;
        };
        for (_, request) in node.requests() {
            executor.cancel(request);
        }
        if node.announced {
            delegates.dispatch(&TileEvent::WillUnload { tile: id });
        }
        if node.loaded_count() > 0 {
            changes.push(Change::RemoveTile { tile: id });
        }
        self.stats.unloaded += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EventLog, ScriptedExecutor};
    use glam::{DVec3, UVec2};
    use quadpager_lod::{QuadTreeWalker, TargetTile, ViewState};
    use quadpager_tile::CoordSystem;
    use std::sync::Arc;

    struct Harness {
        scheduler: LoadingScheduler,
        executor: ScriptedExecutor,
        delegates: DelegateRegistry,
        log: Arc<EventLog>,
        params: SamplingParams,
        changes: ChangeSet,
    }

    impl Harness {
        fn new(params: SamplingParams) -> Self {
            let delegates = DelegateRegistry::new();
            let log = EventLog::new();
            delegates.register(log.clone());
            Self {
                scheduler: LoadingScheduler::new(),
                executor: ScriptedExecutor::new(),
                delegates,
                log,
                params,
                changes: ChangeSet::new(),
            }
        }

        fn step(&mut self, target: &TargetSet) -> ScheduleDecision {
            self.scheduler.step(
                target,
                &self.params,
                &mut self.executor,
                &self.delegates,
                &mut self.changes,
            )
        }

        fn status(&self, tile: TileId, frame: usize) -> Option<LoadStatus> {
            self.scheduler
                .resident()
                .get(&tile)
                .map(|n| n.frames[frame].status)
        }
    }

    fn params(max_tiles: usize, fetches: usize) -> SamplingParams {
        SamplingParams {
            max_tiles,
            simultaneous_fetches: fetches,
            ..Default::default()
        }
    }

    fn tile(x: u32) -> TileId {
        TileId::new(3, x, 0)
    }

    fn target(tiles: &[(TileId, f64)]) -> TargetSet {
        TargetSet::ranked(
            tiles
                .iter()
                .map(|&(id, importance)| TargetTile { id, importance })
                .collect(),
            None,
        )
    }

    fn resident_ids(h: &Harness) -> Vec<TileId> {
        h.scheduler.resident().ids()
    }

    #[test]
    fn test_budget_example_evicts_before_admitting() {
        let (a, b, c, d, e) = (tile(0), tile(1), tile(2), tile(3), tile(4));
        let mut h = Harness::new(params(4, 8));

        let first = target(&[(a, 0.9), (b, 0.7), (c, 0.5), (d, 0.3), (e, 0.2)]);
        h.step(&first);
        assert_eq!(resident_ids(&h), vec![a, b, c, d]);
        assert_eq!(h.executor.complete_all(), 4);
        h.step(&first);
        h.log.clear();

        let second = target(&[(e, 0.95), (a, 0.8), (b, 0.6), (c, 0.4)]);
        let decision = h.step(&second);
        assert_eq!(decision.evicted, vec![d]);
        assert_eq!(resident_ids(&h), vec![a, b, c, e]);
        assert_eq!(
            h.log.lines(),
            vec![
                format!("will_unload {d}"),
                format!("will_load {e} [0]"),
            ]
        );
        assert!(h.changes.iter().any(|c| matches!(c, Change::RemoveTile { tile } if *tile == d)));
    }

    #[test]
    fn test_loading_tile_leaving_target_is_cancelled_and_dropped() {
        let (a, b) = (tile(0), tile(1));
        let mut h = Harness::new(params(4, 8));
        h.step(&target(&[(a, 2.0), (b, 1.0)]));
        let request_b = h.executor.request_for(b, 0).unwrap();

        let decision = h.step(&target(&[(a, 2.0)]));
        assert_eq!(decision.cancelled, 1);
        assert_eq!(decision.dropped, vec![b]);
        assert_eq!(h.executor.cancelled, vec![request_b]);
        assert!(h.log.lines().contains(&format!("will_unload {b}")));

        // The cancelled fetch completes anyway and is discarded.
        h.executor.complete(request_b, Ok(vec![9]));
        let decision = h.step(&target(&[(a, 2.0)]));
        assert_eq!(decision.stale, 1);
        assert!(!h.scheduler.resident().contains(&b));
        assert!(!h.log.lines().contains(&format!("did_load {b} 0")));
    }

    #[test]
    fn test_in_flight_loads_follow_the_new_load_order() {
        let (a, b) = (tile(0), tile(1));
        let mut h = Harness::new(params(4, 8));
        h.step(&target(&[(a, 2.0), (b, 1.0)]));
        let request_a = h.executor.request_for(a, 0).unwrap();
        let request_b = h.executor.request_for(b, 0).unwrap();
        assert!(h.executor.reprioritized.is_empty());

        let swapped = target(&[(b, 5.0), (a, 0.5)]);
        let decision = h.step(&swapped);
        assert_eq!(decision.reprioritized, 2);
        assert!(decision.issued.is_empty());
        assert_eq!(h.executor.reprioritized, vec![(request_b, 0), (request_a, 1)]);

        // Unchanged order sends nothing further.
        assert_eq!(h.step(&swapped).reprioritized, 0);
        assert_eq!(h.executor.reprioritized.len(), 2);
    }

    #[test]
    fn test_late_completion_after_eviction_changes_nothing() {
        let (a, b, c) = (tile(0), tile(1), tile(2));
        let mut h = Harness::new(SamplingParams {
            num_frames: 2,
            ..params(2, 8)
        });
        h.step(&target(&[(a, 3.0), (b, 2.0)]));
        // b has frame 0 loaded so it stays resident off-target until evicted.
        let b0 = h.executor.request_for(b, 0).unwrap();
        let b1 = h.executor.request_for(b, 1).unwrap();
        h.executor.complete(b0, Ok(vec![1]));
        h.step(&target(&[(a, 3.0), (b, 2.0)]));

        h.step(&target(&[(a, 3.0), (c, 1.0)]));
        assert!(!h.scheduler.resident().contains(&b));

        h.executor.complete(b1, Ok(vec![2]));
        let before = h.scheduler.stats().loaded;
        let decision = h.step(&target(&[(a, 3.0), (c, 1.0)]));
        assert_eq!(decision.stale, 1);
        assert_eq!(h.scheduler.stats().loaded, before);
        assert!(!h.scheduler.resident().contains(&b));
    }

    #[test]
    fn test_loads_limited_by_simultaneous_fetches_in_target_order() {
        let tiles: Vec<_> = (0..5).map(|x| (tile(x), 10.0 - x as f64)).collect();
        let t = target(&tiles);
        let mut h = Harness::new(params(8, 2));

        let decision = h.step(&t);
        let issued: Vec<_> = decision.issued.iter().map(|c| c.tile).collect();
        assert_eq!(issued, vec![tile(0), tile(1)]);
        assert_eq!(decision.pending, 3);
        assert_eq!(h.scheduler.in_flight(), 2);

        // Nothing changes until a slot frees up.
        assert!(h.step(&t).issued.is_empty());

        let first = h.executor.request_for(tile(0), 0).unwrap();
        h.executor.complete(first, Ok(vec![0]));
        let decision = h.step(&t);
        assert_eq!(decision.completed, 1);
        assert_eq!(decision.issued.len(), 1);
        assert_eq!(decision.issued[0].tile, tile(2));
        assert_eq!(decision.issued[0].priority, 2);
    }

    #[test]
    fn test_frames_issue_displayed_first_in_one_will_load() {
        let a = tile(0);
        let mut h = Harness::new(SamplingParams {
            num_frames: 3,
            ..params(4, 8)
        });
        h.scheduler.set_displayed_frame(1);
        h.step(&target(&[(a, 1.0)]));
        assert_eq!(h.log.lines(), vec![format!("will_load {a} [1, 0, 2]")]);
        let frames: Vec<_> = h.executor.issued.iter().map(|r| r.frame).collect();
        assert_eq!(frames, vec![1, 0, 2]);
    }

    #[test]
    fn test_failed_frames_wait_for_reload() {
        let a = tile(0);
        let mut h = Harness::new(SamplingParams {
            num_frames: 2,
            ..params(4, 8)
        });
        let t = target(&[(a, 1.0)]);
        h.step(&t);
        let f0 = h.executor.request_for(a, 0).unwrap();
        let f1 = h.executor.request_for(a, 1).unwrap();
        h.executor.complete(f0, Ok(vec![0]));
        h.executor.complete(f1, Err(FetchFailure::NotFound));

        let decision = h.step(&t);
        assert_eq!(decision.completed, 2);
        assert!(decision.issued.is_empty());
        assert_eq!(h.status(a, 1), Some(LoadStatus::Failed));
        assert!(h.log.lines().contains(&format!("did_not_load {a} 1")));
        assert!(h.step(&t).issued.is_empty());

        h.changes = ChangeSet::new();
        h.scheduler.reload(&mut h.executor, &mut h.changes);
        assert!(matches!(
            h.changes.iter().next(),
            Some(Change::RemoveFrame { frame: 0, .. })
        ));
        let decision = h.step(&t);
        assert_eq!(decision.issued.len(), 2);
    }

    #[test]
    fn test_failed_frames_retry_when_tile_is_retargeted() {
        let (a, b) = (tile(0), tile(1));
        let mut h = Harness::new(SamplingParams {
            num_frames: 2,
            ..params(4, 8)
        });
        h.step(&target(&[(a, 1.0)]));
        let f0 = h.executor.request_for(a, 0).unwrap();
        let f1 = h.executor.request_for(a, 1).unwrap();
        h.executor.complete(f0, Ok(vec![0]));
        h.executor.complete(f1, Err(FetchFailure::Source("timeout".into())));
        h.step(&target(&[(a, 1.0)]));

        // a stays resident off-target because frame 0 is loaded.
        h.step(&target(&[(b, 1.0)]));
        assert_eq!(h.status(a, 1), Some(LoadStatus::Failed));

        let decision = h.step(&target(&[(a, 1.0), (b, 0.5)]));
        assert!(decision.issued.iter().any(|c| c.tile == a && c.frame == 1));
    }

    #[test]
    fn test_image_depth_change_resizes_frames() {
        let a = tile(0);
        let mut h = Harness::new(SamplingParams {
            num_frames: 3,
            ..params(4, 8)
        });
        let t = target(&[(a, 1.0)]);
        h.step(&t);
        h.executor.complete_all();
        h.step(&t);
        h.changes = ChangeSet::new();

        h.params.num_frames = 1;
        h.step(&t);
        let removed: Vec<_> = h
            .changes
            .iter()
            .filter_map(|c| match c {
                Change::RemoveFrame { frame, .. } => Some(*frame),
                _ => None,
            })
            .collect();
        assert_eq!(removed, vec![1, 2]);
        assert_eq!(h.scheduler.resident().get(&a).unwrap().frames.len(), 1);
    }

    #[test]
    fn test_paused_frame_loading_issues_nothing() {
        let mut h = Harness::new(SamplingParams {
            allow_frame_loading: false,
            ..params(4, 8)
        });
        let decision = h.step(&target(&[(tile(0), 1.0)]));
        assert_eq!(decision.admitted, vec![tile(0)]);
        assert!(decision.issued.is_empty());
    }

    #[test]
    fn test_budget_holds_across_moving_views() {
        let coords = CoordSystem::unit();
        let mut walker = QuadTreeWalker::new();
        let mut h = Harness::new(SamplingParams {
            max_zoom: 8,
            num_frames: 2,
            ..params(12, 5)
        });

        for i in 0..60 {
            let t = i as f64 / 60.0;
            let view = ViewState::look_at(
                DVec3::new(0.2 + 0.6 * t, -0.1 + 0.3 * t, 0.4 - 0.3 * t),
                DVec3::new(0.5, 0.5 * t + 0.3, 0.0),
                DVec3::Z,
                1.0,
                UVec2::new(800, 600),
            );
            let target = walker.evaluate(&view, &h.params, &coords);
            let decision = h.step(&target);

            assert!(h.scheduler.resident().len() <= 12, "step {i}");
            if decision.evicted.iter().any(|id| target.contains(id)) {
                let non_target_left = h
                    .scheduler
                    .resident()
                    .iter()
                    .any(|(id, _)| !target.contains(id));
                assert!(!non_target_left, "step {i}: evicted target tile first");
            }

            // Complete every other outstanding request.
            for (n, (id, _)) in h.executor.pending().into_iter().enumerate() {
                if n % 2 == 0 {
                    h.executor.complete(id, Ok(vec![n as u8]));
                }
            }
        }
    }

    #[test]
    fn test_events_are_causal_per_tile() {
        let coords = CoordSystem::unit();
        let mut walker = QuadTreeWalker::new();
        let mut h = Harness::new(SamplingParams {
            max_zoom: 6,
            ..params(8, 3)
        });

        for i in 0..30 {
            let x = 0.1 + 0.8 * (i as f64 / 30.0);
            let view = ViewState::top_down(x, 0.5, 0.1, 1.2, UVec2::splat(512));
            let target = walker.evaluate(&view, &h.params, &coords);
            h.step(&target);
            if let Some((id, _)) = h.executor.pending().first() {
                h.executor.complete(*id, Ok(vec![1]));
            }
        }

        // Per tile: loads only between a will_load and the next will_unload.
        let mut open: rustc_hash::FxHashMap<TileId, bool> = Default::default();
        for event in h.log.events() {
            let live = open.entry(event.tile()).or_insert(false);
            match event {
                TileEvent::WillLoad { .. } => *live = true,
                TileEvent::DidLoad { tile, .. } | TileEvent::DidNotLoad { tile, .. } => {
                    assert!(*live, "completion for {tile} outside its load window");
                }
                TileEvent::WillUnload { tile } => {
                    assert!(*live, "unload of {tile} without a load");
                    *live = false;
                }
            }
        }
    }

    #[test]
    fn test_clear_unloads_everything() {
        let mut h = Harness::new(params(4, 8));
        h.step(&target(&[(tile(0), 1.0), (tile(1), 0.5)]));
        h.scheduler
            .clear(&mut h.executor, &h.delegates, &mut h.changes);
        assert!(h.scheduler.resident().is_empty());
        assert_eq!(h.executor.cancelled.len(), 2);
        assert_eq!(
            h.log.lines().iter().filter(|l| l.starts_with("will_unload")).count(),
            2
        );
    }
}
