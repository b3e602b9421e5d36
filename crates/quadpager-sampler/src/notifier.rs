//! Builder delegate notification.
//!
//! Delegates receive tile life-cycle events in causal order per tile:
//! `WillLoad`, then `DidLoad`/`DidNotLoad`, then `WillUnload`. The registry is
//! a cheap cloneable handle so a delegate can keep one and unregister itself
//! (or any other delegate) from inside its own handler.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use quadpager_tile::TileId;

use crate::{FetchFailure, TileData};

/// A tile life-cycle event.
#[derive(Clone, Debug)]
pub enum TileEvent {
    /// Loads are about to be issued for these frames of the tile.
    WillLoad {
        /// Tile being loaded.
        tile: TileId,
        /// Frames being requested, in load order.
        frames: Vec<usize>,
    },
    /// A frame finished loading.
    DidLoad {
        /// Tile the data belongs to.
        tile: TileId,
        /// Frame index.
        frame: usize,
        /// Loaded data.
        data: TileData,
    },
    /// A frame failed to load.
    DidNotLoad {
        /// Tile the request was for.
        tile: TileId,
        /// Frame index.
        frame: usize,
        /// Failure reported by the fetch.
        reason: FetchFailure,
    },
    /// The tile is about to be dropped from the resident set.
    WillUnload {
        /// Tile being unloaded.
        tile: TileId,
    },
}

impl TileEvent {
    /// Tile the event concerns.
    pub fn tile(&self) -> TileId {
        match self {
            TileEvent::WillLoad { tile, .. }
            | TileEvent::DidLoad { tile, .. }
            | TileEvent::DidNotLoad { tile, .. }
            | TileEvent::WillUnload { tile } => *tile,
        }
    }
}

/// Receives tile events. Called on the scheduling thread.
pub trait TileEventSink: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &TileEvent);
}

/// Identifies a registered delegate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DelegateId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    delegates: Vec<(DelegateId, Arc<dyn TileEventSink>)>,
}

/// Shared list of builder delegates, in registration order.
#[derive(Clone, Default)]
pub struct DelegateRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl DelegateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a delegate. It receives every event dispatched from now on.
    pub fn register(&self, sink: Arc<dyn TileEventSink>) -> DelegateId {
        let mut registry = self.lock();
        let id = DelegateId(registry.next_id);
        registry.next_id += 1;
        registry.delegates.push((id, sink));
        id
    }

    /// Remove a delegate. Safe to call from inside a handler; the delegate
    /// receives nothing further, including the rest of the current dispatch.
    pub fn unregister(&self, id: DelegateId) -> bool {
        let mut registry = self.lock();
        let before = registry.delegates.len();
        registry.delegates.retain(|(d, _)| *d != id);
        registry.delegates.len() != before
    }

    /// Whether `id` is still registered.
    pub fn contains(&self, id: DelegateId) -> bool {
        self.lock().delegates.iter().any(|(d, _)| *d == id)
    }

    /// Number of registered delegates.
    pub fn len(&self) -> usize {
        self.lock().delegates.len()
    }

    /// True when nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.lock().delegates.is_empty()
    }

    /// Drop every delegate.
    pub fn clear(&self) {
        self.lock().delegates.clear();
    }

    /// Deliver `event` to every registered delegate in registration order.
    ///
    /// Iterates over a snapshot taken without holding the lock across
    /// handlers, and skips delegates unregistered before their turn.
    pub fn dispatch(&self, event: &TileEvent) {
        let snapshot: Vec<_> = self.lock().delegates.clone();
        for (id, sink) in snapshot {
            if self.contains(id) {
                sink.on_event(event);
            }
        }
    }
}

impl std::fmt::Debug for DelegateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateRegistry")
            .field("delegates", &self.len())
            .finish()
    }
}
