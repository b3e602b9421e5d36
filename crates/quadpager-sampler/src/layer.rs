//! Sampling layer facade.
//!
//! Owns the sampling parameters, the current view and target set, the
//! scheduler and the delegate registry. The caller drives it with
//! [`view_update`](SamplingLayer::view_update) whenever the camera moves and
//! [`eval_step`](SamplingLayer::eval_step) once per tick.

use std::sync::Arc;

use quadpager_lod::{ParamError, QuadTreeWalker, SamplingParams, TargetSet, ViewState};
use quadpager_tile::{CoordSystem, Mbr};
use tracing::{debug, info, warn};

use crate::{
    ChangeSet, DelegateId, DelegateRegistry, FetchExecutor, FrameLoadInfo, FrameStatus,
    LoadingScheduler, SamplerError, SchedulerStats, ThreadPoolFetcher, TileEventSink, TileSource,
};

/// Life-cycle state of a [`SamplingLayer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerState {
    /// Created, not yet initialised.
    Uninitialized,
    /// Accepting view updates and steps.
    Running,
    /// Tearing down.
    ShuttingDown,
    /// Shut down. Every further operation is rejected.
    Stopped,
}

impl std::fmt::Display for LayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LayerState::Uninitialized => "uninitialized",
            LayerState::Running => "running",
            LayerState::ShuttingDown => "shutting down",
            LayerState::Stopped => "stopped",
        })
    }
}

/// Decides which tiles to load for a view, loads them through a
/// [`FetchExecutor`] and keeps the resident set within budget.
pub struct SamplingLayer<E: FetchExecutor> {
    state: LayerState,
    params: SamplingParams,
    coords: CoordSystem,
    walker: QuadTreeWalker,
    scheduler: LoadingScheduler,
    executor: E,
    delegates: DelegateRegistry,
    view: Option<ViewState>,
    target: TargetSet,
    target_stale: bool,
}

impl<E: FetchExecutor> SamplingLayer<E> {
    /// Create an uninitialised layer.
    pub fn new(params: SamplingParams, executor: E) -> Result<Self, SamplerError> {
        params.validate()?;
        Ok(Self {
            state: LayerState::Uninitialized,
            params,
            coords: CoordSystem::default(),
            walker: QuadTreeWalker::new(),
            scheduler: LoadingScheduler::new(),
            executor,
            delegates: DelegateRegistry::new(),
            view: None,
            target: TargetSet::default(),
            target_stale: true,
        })
    }

    fn require_running(&self, operation: &'static str) -> Result<(), SamplerError> {
        if self.state == LayerState::Running {
            return Ok(());
        }
        warn!(operation, state = %self.state, "Operation rejected");
        Err(SamplerError::Lifecycle {
            operation,
            state: self.state,
        })
    }

    fn require_live(&self, operation: &'static str) -> Result<(), SamplerError> {
        match self.state {
            LayerState::Uninitialized | LayerState::Running => Ok(()),
            state => {
                warn!(operation, %state, "Operation rejected");
                Err(SamplerError::Lifecycle { operation, state })
            }
        }
    }

    // --- Lifecycle ---

    /// Move to `Running` over the given pyramid with nothing resident.
    pub fn initialise(&mut self, coords: CoordSystem) -> Result<(), SamplerError> {
        if self.state != LayerState::Uninitialized {
            return Err(SamplerError::Lifecycle {
                operation: "initialise",
                state: self.state,
            });
        }
        self.coords = coords;
        self.state = LayerState::Running;
        self.target_stale = true;
        info!(bounds = ?self.coords.bounds(), "Sampling layer initialised");
        Ok(())
    }

    /// Restrict loading to `bounds` and the levels `min_level..=max_level`.
    pub fn start_layer(
        &mut self,
        bounds: Mbr,
        min_level: u32,
        max_level: u32,
    ) -> Result<(), SamplerError> {
        self.require_running("start_layer")?;
        self.update_params(|p| {
            p.min_zoom = min_level;
            p.max_zoom = max_level;
        })?;
        self.coords.clear_coverage();
        self.coords.add_coverage(bounds);
        info!(min_level, max_level, "Sampling layer started");
        Ok(())
    }

    /// Cancel every request, unload every tile, drop every delegate and stop.
    ///
    /// Valid from `Uninitialized` or `Running`; the layer is inert afterwards.
    pub fn shutdown(&mut self, changes: &mut ChangeSet) -> Result<(), SamplerError> {
        self.require_live("shutdown")?;
        self.state = LayerState::ShuttingDown;
        self.scheduler
            .clear(&mut self.executor, &self.delegates, changes);
        self.delegates.clear();
        self.target = TargetSet::default();
        self.view = None;
        self.state = LayerState::Stopped;
        info!(stats = ?self.scheduler.stats(), "Sampling layer stopped");
        Ok(())
    }

    // --- Steps ---

    /// Record a new camera. The next step re-evaluates the target set.
    pub fn view_update(&mut self, view: &ViewState) -> Result<(), SamplerError> {
        self.require_running("view_update")?;
        self.view = Some(view.clone());
        self.target_stale = true;
        Ok(())
    }

    /// Run one scheduling pass. Returns true while another call could make
    /// progress without outside events: completions are queued, or wanted
    /// loads are waiting on free fetch slots.
    pub fn eval_step(&mut self, changes: &mut ChangeSet) -> Result<bool, SamplerError> {
        self.require_running("eval_step")?;
        self.run_step(changes);
        Ok(self.has_more_work())
    }

    /// Re-evaluate the target for the last view and run a pass. Returns true
    /// if the target set or any tile state changed.
    pub fn refresh(&mut self, changes: &mut ChangeSet) -> Result<bool, SamplerError> {
        self.require_running("refresh")?;
        self.target_stale = true;
        let before: Vec<_> = self.target.iter().map(|t| t.id).collect();
        let changed = self.run_step(changes);
        let target_changed = !self.target.iter().map(|t| t.id).eq(before);
        Ok(changed || target_changed)
    }

    /// Drop all loaded data and failures so every targeted frame loads again.
    pub fn reload(&mut self, changes: &mut ChangeSet) -> Result<(), SamplerError> {
        self.require_running("reload")?;
        self.scheduler.reload(&mut self.executor, changes);
        self.target_stale = true;
        Ok(())
    }

    fn run_step(&mut self, changes: &mut ChangeSet) -> bool {
        if self.target_stale {
            self.target = match &self.view {
                Some(view) => self.walker.evaluate(view, &self.params, &self.coords),
                None => TargetSet::default(),
            };
            self.target_stale = false;
        }
        let decision = self.scheduler.step(
            &self.target,
            &self.params,
            &mut self.executor,
            &self.delegates,
            changes,
        );
        decision.changed()
    }

    fn has_more_work(&self) -> bool {
        if self.scheduler.has_completions() {
            return true;
        }
        let free = self.scheduler.in_flight() < self.params.simultaneous_fetches;
        free && self.wanted_loads() > 0
    }

    /// Loads the scheduler would issue given free slots.
    fn wanted_loads(&self) -> usize {
        self.scheduler
            .frames()
            .reconcile(&self.target, self.scheduler.resident(), &self.params)
            .to_load
            .len()
    }

    // --- Setters ---

    /// Apply `edit` to a copy of the parameters and keep it only if it validates.
    fn update_params(&mut self, edit: impl FnOnce(&mut SamplingParams)) -> Result<(), SamplerError> {
        self.require_live("set parameter")?;
        let mut next = self.params.clone();
        edit(&mut next);
        next.validate()?;
        if next != self.params {
            debug!(?next, "Sampling parameters changed");
            self.params = next;
            self.target_stale = true;
        }
        Ok(())
    }

    /// Set the number of frames per tile. Per-frame priorities of a different
    /// length are dropped and the displayed frame is clamped.
    pub fn set_image_depth(&mut self, depth: usize) -> Result<(), SamplerError> {
        self.update_params(|p| {
            p.num_frames = depth;
            if p.frame_priorities.as_ref().is_some_and(|f| f.len() != depth) {
                p.frame_priorities = None;
            }
        })?;
        let displayed = self.scheduler.frames().displayed_frame();
        if displayed >= depth {
            self.scheduler.set_displayed_frame(depth - 1);
        }
        Ok(())
    }

    /// Pause or resume issuing frame loads.
    pub fn set_allow_frame_loading(&mut self, allow: bool) -> Result<(), SamplerError> {
        self.update_params(|p| p.allow_frame_loading = allow)
    }

    /// Set per-frame load priorities (higher first, negative never), or
    /// `None` for the default displayed-frame-first order.
    pub fn set_frame_loading_priority(
        &mut self,
        priorities: Option<Vec<i32>>,
    ) -> Result<(), SamplerError> {
        self.update_params(|p| p.frame_priorities = priorities)
    }

    /// Choose the frame on screen. It loads first under the default order.
    pub fn set_current_frame(&mut self, frame: usize) -> Result<(), SamplerError> {
        self.require_live("set_current_frame")?;
        if frame >= self.params.num_frames {
            return Err(ParamError::FrameIndex {
                frame,
                depth: self.params.num_frames,
            }
            .into());
        }
        self.scheduler.set_displayed_frame(frame);
        Ok(())
    }

    /// Set the resident tile budget.
    pub fn set_max_tiles(&mut self, max_tiles: usize) -> Result<(), SamplerError> {
        self.update_params(|p| p.max_tiles = max_tiles)
    }

    /// Set the importance multiplier.
    pub fn set_importance_scale(&mut self, scale: f64) -> Result<(), SamplerError> {
        self.update_params(|p| p.importance_scale = scale)
    }

    /// Set the extra coarser levels loaded in single-level mode.
    pub fn set_multi_level_loads(&mut self, offsets: Vec<i32>) -> Result<(), SamplerError> {
        self.update_params(|p| p.multi_level_loads = offsets)
    }

    /// Switch single-level loading on or off.
    pub fn set_single_level_loading(&mut self, enabled: bool) -> Result<(), SamplerError> {
        self.update_params(|p| p.single_level = enabled)
    }

    /// Set the maximum number of in-flight fetches.
    pub fn set_simultaneous_fetches(&mut self, fetches: usize) -> Result<(), SamplerError> {
        self.update_params(|p| p.simultaneous_fetches = fetches)
    }

    /// Force the single-level target level, or `None` to pick it from the view.
    pub fn set_target_zoom_override(&mut self, zoom: Option<u32>) -> Result<(), SamplerError> {
        self.update_params(|p| p.target_zoom_override = zoom)
    }

    // --- Queries ---

    /// Current life-cycle state.
    pub fn state(&self) -> LayerState {
        self.state
    }

    /// Current parameters.
    pub fn params(&self) -> &SamplingParams {
        &self.params
    }

    /// The pyramid definition.
    pub fn coord_system(&self) -> &CoordSystem {
        &self.coords
    }

    /// Target set from the last evaluation.
    pub fn target(&self) -> &TargetSet {
        &self.target
    }

    /// Level of the current target set.
    pub fn target_zoom_level(&self) -> Option<u32> {
        self.target.target_level()
    }

    /// Per-frame completeness over the target set. Tiles kept resident outside
    /// the target are not counted.
    pub fn frame_status(&self) -> Vec<FrameStatus> {
        self.scheduler
            .frame_status(&self.target, self.params.num_frames)
    }

    /// Per-frame load progress over the target set.
    pub fn loaded_frames(&self) -> Vec<FrameLoadInfo> {
        self.scheduler
            .loaded_frames(&self.target, self.params.num_frames)
    }

    /// Number of resident tiles.
    pub fn resident_count(&self) -> usize {
        self.scheduler.resident().len()
    }

    /// Number of frames in flight.
    pub fn in_flight_count(&self) -> usize {
        self.scheduler.in_flight()
    }

    /// The scheduler, for inspecting resident tiles.
    pub fn scheduler(&self) -> &LoadingScheduler {
        &self.scheduler
    }

    /// Totals since creation.
    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    /// The fetch executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// The fetch executor, mutably.
    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    // --- Delegates ---

    /// Register a builder delegate.
    pub fn add_builder_delegate(
        &mut self,
        delegate: Arc<dyn TileEventSink>,
    ) -> Result<DelegateId, SamplerError> {
        self.require_live("add_builder_delegate")?;
        Ok(self.delegates.register(delegate))
    }

    /// Unregister a builder delegate. Returns false if it was not registered.
    pub fn remove_builder_delegate(&mut self, id: DelegateId) -> bool {
        self.delegates.unregister(id)
    }

    /// Shared handle to the delegate registry, for delegates that unregister
    /// themselves from inside a handler.
    pub fn delegates(&self) -> DelegateRegistry {
        self.delegates.clone()
    }
}

impl<S: TileSource> SamplingLayer<ThreadPoolFetcher<S>> {
    /// Create an uninitialised layer whose zoom range and tile size are the
    /// ones `fetcher`'s source serves.
    pub fn for_source(
        mut params: SamplingParams,
        fetcher: ThreadPoolFetcher<S>,
    ) -> Result<Self, SamplerError> {
        let source = fetcher.source();
        params.min_zoom = source.min_zoom();
        params.max_zoom = source.max_zoom();
        params.tile_size = source.tile_size();
        Self::new(params, fetcher)
    }
}
