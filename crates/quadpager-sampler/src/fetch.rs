//! Fetch execution: the executor interface the scheduler hands loads to, and a
//! thread-pool executor that runs a [`TileSource`] on background workers.
//!
//! Every accepted request completes exactly once through its
//! [`CompletionSender`]. Queued requests run in priority order and can be
//! re-ranked while they wait. Completions land in a channel that the scheduling
//! step drains, so fetch threads never touch scheduler state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};
use dashmap::DashMap;
use quadpager_tile::TileId;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::FetchFailure;

/// Opaque handle to fetched tile data.
pub type TileData = Arc<[u8]>;

/// Handle for one accepted fetch request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A request to load one frame of one tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Tile to load.
    pub tile: TileId,
    /// Frame index within the tile's image stack.
    pub frame: usize,
    /// Position of the tile in the current load order (0 = most important).
    pub priority: i32,
}

/// The single result of a fetch request.
#[derive(Clone, Debug)]
pub struct Completion {
    /// Request this completes.
    pub id: RequestId,
    /// Tile the request was for.
    pub tile: TileId,
    /// Frame the request was for.
    pub frame: usize,
    /// Loaded data or the failure reason.
    pub result: Result<TileData, FetchFailure>,
}

/// Thread-safe handoff for completions back to the scheduling thread.
#[derive(Clone, Debug)]
pub struct CompletionSender(Sender<Completion>);

impl CompletionSender {
    /// Deliver a completion. Dropped silently if the layer is gone.
    pub fn deliver(&self, completion: Completion) {
        let _ = self.0.send(completion);
    }
}

/// Creates the completion channel used by one sampling layer.
pub(crate) fn completion_channel() -> (CompletionSender, Receiver<Completion>) {
    let (tx, rx) = unbounded();
    (CompletionSender(tx), rx)
}

/// Runs fetches on behalf of the scheduler.
pub trait FetchExecutor: Send {
    /// Start loading `request`. Must eventually deliver exactly one
    /// [`Completion`] carrying the returned id through `completions`, from
    /// any thread.
    fn request_load(&mut self, request: FetchRequest, completions: CompletionSender) -> RequestId;

    /// Advisory cancellation. The request may still complete.
    fn cancel(&mut self, id: RequestId);

    /// The request's tile moved in the load order. Lower runs sooner. Requests
    /// already running or finished ignore this.
    fn update_priority(&mut self, id: RequestId, priority: i32);
}

/// A source of tile data, fetched synchronously on a worker thread.
pub trait TileSource: Send + Sync + 'static {
    /// Shallowest level with data.
    fn min_zoom(&self) -> u32;

    /// Deepest level with data.
    fn max_zoom(&self) -> u32;

    /// Pixels along one edge of a tile image.
    fn tile_size(&self) -> u32 {
        256
    }

    /// Whether the tile is worth fetching at all. Sparse pyramids return false
    /// for holes.
    fn valid_tile(&self, _tile: &TileId) -> bool {
        true
    }

    /// Whether the tile can be served without a network round trip. Local
    /// tiles jump the worker queue.
    fn tile_is_local(&self, _tile: &TileId) -> bool {
        false
    }

    /// Load one frame of a tile.
    fn fetch(&self, tile: &TileId, frame: usize) -> Result<TileData, FetchFailure>;
}

/// Internal job carrying the request and its cancellation flag.
struct FetchJob {
    id: RequestId,
    request: FetchRequest,
    cancelled: Arc<AtomicBool>,
    completions: CompletionSender,
}

/// Queue order: local tiles first, then priority, then arrival.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    remote: bool,
    priority: i32,
    id: RequestId,
}

/// Jobs waiting for a worker.
#[derive(Default)]
struct JobQueue {
    jobs: BTreeMap<QueueKey, FetchJob>,
    keys: FxHashMap<RequestId, QueueKey>,
}

impl JobQueue {
    fn push(&mut self, key: QueueKey, job: FetchJob) {
        self.keys.insert(key.id, key);
        self.jobs.insert(key, job);
    }

    fn pop(&mut self) -> Option<FetchJob> {
        let (key, job) = self.jobs.pop_first()?;
        self.keys.remove(&key.id);
        Some(job)
    }

    fn remove(&mut self, id: RequestId) -> Option<FetchJob> {
        let key = self.keys.remove(&id)?;
        self.jobs.remove(&key)
    }

    /// Re-rank a waiting job. Returns false if it already left the queue.
    fn reprioritize(&mut self, id: RequestId, priority: i32) -> bool {
        let Some(key) = self.keys.get(&id).copied() else {
            return false;
        };
        if let Some(job) = self.jobs.remove(&key) {
            self.push(QueueKey { priority, ..key }, job);
        }
        true
    }
}

type SharedQueue = Arc<Mutex<JobQueue>>;

fn lock(queue: &SharedQueue) -> std::sync::MutexGuard<'_, JobQueue> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Executes fetches from a [`TileSource`] on a pool of worker threads.
pub struct ThreadPoolFetcher<S: TileSource> {
    source: Arc<S>,
    queue: SharedQueue,
    /// One ticket per queued job; workers sleep on it.
    tickets: Sender<()>,
    /// Cancellation flag per request still queued or running.
    active: Arc<DashMap<RequestId, Arc<AtomicBool>>>,
    next_id: u64,
    in_flight: Arc<AtomicU64>,
}

impl<S: TileSource> ThreadPoolFetcher<S> {
    /// Spawn `thread_count` workers fetching from `source`.
    pub fn new(source: S, thread_count: usize) -> std::io::Result<Self> {
        let source = Arc::new(source);
        let queue = SharedQueue::default();
        let (tickets, ticket_receiver) = unbounded::<()>();
        let active: Arc<DashMap<RequestId, Arc<AtomicBool>>> = Arc::new(DashMap::new());
        let in_flight = Arc::new(AtomicU64::new(0));

        for i in 0..thread_count.max(1) {
            let source = Arc::clone(&source);
            let queue = Arc::clone(&queue);
            let ticket_receiver = ticket_receiver.clone();
            let active = Arc::clone(&active);
            let in_flight = Arc::clone(&in_flight);

            std::thread::Builder::new()
                .name(format!("tile-fetch-{i}"))
                .spawn(move || {
                    while ticket_receiver.recv().is_ok() {
                        let Some(job) = lock(&queue).pop() else {
                            continue;
                        };
                        let result = if job.cancelled.load(Ordering::Relaxed) {
                            Err(FetchFailure::Cancelled)
                        } else {
                            source.fetch(&job.request.tile, job.request.frame)
                        };
                        active.remove(&job.id);
                        in_flight.fetch_sub(1, Ordering::Relaxed);
                        job.completions.deliver(Completion {
                            id: job.id,
                            tile: job.request.tile,
                            frame: job.request.frame,
                            result,
                        });
                    }
                })?;
        }

        Ok(Self {
            source,
            queue,
            tickets,
            active,
            next_id: 0,
            in_flight,
        })
    }

    /// Spawn one worker per CPU, leaving one core for the caller.
    pub fn with_defaults(source: S) -> std::io::Result<Self> {
        let threads = num_cpus::get().saturating_sub(1).max(1);
        Self::new(source, threads)
    }

    /// The wrapped source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Requests queued or running.
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Whether `id` is still queued or running.
    pub fn is_pending(&self, id: RequestId) -> bool {
        self.active.contains_key(&id)
    }
}

impl<S: TileSource> FetchExecutor for ThreadPoolFetcher<S> {
    fn request_load(&mut self, request: FetchRequest, completions: CompletionSender) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;

        if !self.source.valid_tile(&request.tile) {
            trace!(tile = %request.tile, frame = request.frame, "Invalid tile, not fetching");
            completions.deliver(Completion {
                id,
                tile: request.tile,
                frame: request.frame,
                result: Err(FetchFailure::NotFound),
            });
            return id;
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        self.active.insert(id, Arc::clone(&cancelled));
        self.in_flight.fetch_add(1, Ordering::Relaxed);

        let key = QueueKey {
            remote: !self.source.tile_is_local(&request.tile),
            priority: request.priority,
            id,
        };
        lock(&self.queue).push(
            key,
            FetchJob {
                id,
                request,
                cancelled,
                completions,
            },
        );
        if self.tickets.send(()).is_err() {
            // Workers are gone; complete here so the request still resolves once.
            let Some(job) = lock(&self.queue).remove(id) else {
                return id;
            };
            self.active.remove(&id);
            self.in_flight.fetch_sub(1, Ordering::Relaxed);
            job.completions.deliver(Completion {
                id,
                tile: request.tile,
                frame: request.frame,
                result: Err(FetchFailure::Source("fetch workers stopped".into())),
            });
        }
        id
    }

    fn cancel(&mut self, id: RequestId) {
        if let Some((_, cancelled)) = self.active.remove(&id) {
            cancelled.store(true, Ordering::Relaxed);
        }
    }

    fn update_priority(&mut self, id: RequestId, priority: i32) {
        if lock(&self.queue).reprioritize(id, priority) {
            trace!(request = %id, priority, "Requeue");
        }
    }
}
