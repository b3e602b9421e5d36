//! Tile loading for the quad pyramid: frame tracking, scheduling, eviction,
//! delegate notification and the sampling layer facade that drives them.

mod changes;
mod error;
mod eviction;
mod fetch;
mod frames;
mod layer;
mod notifier;
mod resident;
mod scheduler;

#[cfg(test)]
mod testing;

pub use changes::{Change, ChangeSet};
pub use error::{FetchFailure, SamplerError};
pub use eviction::{EvictionClass, classify, is_protected, select_evictions};
pub use fetch::{
    Completion, CompletionSender, FetchExecutor, FetchRequest, RequestId, ThreadPoolFetcher,
    TileData, TileSource,
};
pub use frames::{
    Applied, CancelRequest, FrameLoadInfo, FrameManager, FrameStatus, LoadCandidate,
    Reconciliation,
};
pub use layer::{LayerState, SamplingLayer};
pub use notifier::{DelegateId, DelegateRegistry, TileEvent, TileEventSink};
pub use resident::{FrameState, LoadStatus, ResidentSet, TileNode};
pub use scheduler::{LoadingScheduler, ScheduleDecision, SchedulerStats};
