//! Deterministic test doubles: an executor that completes only when told to,
//! and a delegate that records every event.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use quadpager_tile::TileId;

use crate::{
    Completion, CompletionSender, FetchExecutor, FetchFailure, FetchRequest, RequestId,
    TileEvent, TileEventSink,
};

/// Holds every request until the test completes it.
#[derive(Default)]
pub struct ScriptedExecutor {
    next_id: u64,
    pending: BTreeMap<RequestId, (FetchRequest, CompletionSender)>,
    pub issued: Vec<FetchRequest>,
    pub cancelled: Vec<RequestId>,
    pub reprioritized: Vec<(RequestId, i32)>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outstanding requests in issue order.
    pub fn pending(&self) -> Vec<(RequestId, FetchRequest)> {
        self.pending.iter().map(|(id, (r, _))| (*id, *r)).collect()
    }

    /// Outstanding request for a tile frame.
    pub fn request_for(&self, tile: TileId, frame: usize) -> Option<RequestId> {
        self.pending
            .iter()
            .find(|(_, (r, _))| r.tile == tile && r.frame == frame)
            .map(|(id, _)| *id)
    }

    pub fn complete(&mut self, id: RequestId, result: Result<Vec<u8>, FetchFailure>) {
        let (request, sender) = self.pending.remove(&id).expect("unknown request");
        sender.deliver(Completion {
            id,
            tile: request.tile,
            frame: request.frame,
            result: result.map(Arc::from),
        });
    }

    /// Complete every outstanding request successfully. Returns how many.
    pub fn complete_all(&mut self) -> usize {
        let ids: Vec<_> = self.pending.keys().copied().collect();
        for id in &ids {
            self.complete(*id, Ok(vec![1, 2, 3]));
        }
        ids.len()
    }
}

impl FetchExecutor for ScriptedExecutor {
    fn request_load(&mut self, request: FetchRequest, completions: CompletionSender) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.issued.push(request);
        self.pending.insert(id, (request, completions));
        id
    }

    fn cancel(&mut self, id: RequestId) {
        // Cancellation is advisory: the request stays completable.
        self.cancelled.push(id);
    }

    fn update_priority(&mut self, id: RequestId, priority: i32) {
        self.reprioritized.push((id, priority));
    }
}

/// Records events as short strings like `will_load (2: 1, 0) [0]`.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<TileEvent>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TileEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| match e {
                TileEvent::WillLoad { tile, frames } => format!("will_load {tile} {frames:?}"),
                TileEvent::DidLoad { tile, frame, .. } => format!("did_load {tile} {frame}"),
                TileEvent::DidNotLoad { tile, frame, .. } => {
                    format!("did_not_load {tile} {frame}")
                }
                TileEvent::WillUnload { tile } => format!("will_unload {tile}"),
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl TileEventSink for EventLog {
    fn on_event(&self, event: &TileEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
