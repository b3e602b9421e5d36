//! Resident tile table: one [`TileNode`] per instantiated tile, keyed by id.
//!
//! Parent and child links are id lookups into the same table, so no node owns
//! another.

use quadpager_tile::TileId;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{RequestId, TileData};

/// Load state of one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    /// Nothing requested yet.
    Empty,
    /// A request is in flight.
    Loading,
    /// Data arrived.
    Loaded,
    /// The fetch failed. Retried only after a reload or a re-target.
    Failed,
}

/// Per-frame state of a resident tile.
#[derive(Clone, Debug)]
pub struct FrameState {
    /// Current load status.
    pub status: LoadStatus,
    /// Load priority last handed to the executor (position in load order).
    pub priority: i32,
    /// Request currently allowed to complete this frame.
    pub request: Option<RequestId>,
    /// Loaded data, when `status` is `Loaded`.
    pub data: Option<TileData>,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            status: LoadStatus::Empty,
            priority: 0,
            request: None,
            data: None,
        }
    }
}

impl FrameState {
    /// Forget any request or data.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A resident tile.
#[derive(Clone, Debug)]
pub struct TileNode {
    /// Importance from the last target set the tile appeared in.
    pub importance: f64,
    /// One entry per frame of the image stack.
    pub frames: Vec<FrameState>,
    /// Whether the tile is part of the current target set.
    pub enabled: bool,
    /// Resident children, by id.
    pub children: FxHashSet<TileId>,
    /// Admission order, used to break eviction ties oldest first.
    pub enqueued_seq: u64,
    /// Whether delegates have been told about this tile.
    pub(crate) announced: bool,
}

impl TileNode {
    fn new(importance: f64, num_frames: usize, enqueued_seq: u64) -> Self {
        Self {
            importance,
            frames: vec![FrameState::default(); num_frames],
            enabled: true,
            children: FxHashSet::default(),
            enqueued_seq,
            announced: false,
        }
    }

    /// Number of frames with data.
    pub fn loaded_count(&self) -> usize {
        self.count(LoadStatus::Loaded)
    }

    /// Number of frames with a request in flight.
    pub fn in_flight(&self) -> usize {
        self.count(LoadStatus::Loading)
    }

    fn count(&self, status: LoadStatus) -> usize {
        self.frames.iter().filter(|f| f.status == status).count()
    }

    /// Fraction of frames loaded.
    pub fn loaded_ratio(&self) -> f64 {
        if self.frames.is_empty() {
            return 0.0;
        }
        self.loaded_count() as f64 / self.frames.len() as f64
    }

    /// Whether `frame` has data to display.
    pub fn is_displayable(&self, frame: usize) -> bool {
        self.frames
            .get(frame)
            .is_some_and(|f| f.status == LoadStatus::Loaded)
    }

    /// In-flight requests as `(frame, request)`.
    pub fn requests(&self) -> impl Iterator<Item = (usize, RequestId)> + '_ {
        self.frames
            .iter()
            .enumerate()
            .filter(|(_, f)| f.status == LoadStatus::Loading)
            .filter_map(|(i, f)| f.request.map(|r| (i, r)))
    }
}

/// The set of instantiated tiles.
#[derive(Clone, Debug, Default)]
pub struct ResidentSet {
    nodes: FxHashMap<TileId, TileNode>,
    next_seq: u64,
}

impl ResidentSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resident tiles.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when nothing is resident.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` is resident.
    pub fn contains(&self, id: &TileId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Node for `id`.
    pub fn get(&self, id: &TileId) -> Option<&TileNode> {
        self.nodes.get(id)
    }

    /// Mutable node for `id`.
    pub fn get_mut(&mut self, id: &TileId) -> Option<&mut TileNode> {
        self.nodes.get_mut(id)
    }

    /// All resident tiles, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&TileId, &TileNode)> {
        self.nodes.iter()
    }

    /// All resident tiles, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&TileId, &mut TileNode)> {
        self.nodes.iter_mut()
    }

    /// Resident ids, sorted so callers iterate deterministically.
    pub fn ids(&self) -> Vec<TileId> {
        let mut ids: Vec<_> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Total frames in flight across every tile.
    pub fn in_flight(&self) -> usize {
        self.nodes.values().map(TileNode::in_flight).sum()
    }

    /// Instantiate a node for `id`, linking it to any resident parent and
    /// children. Returns false if the tile was already resident.
    pub fn admit(&mut self, id: TileId, importance: f64, num_frames: usize) -> bool {
        if self.nodes.contains_key(&id) {
            return false;
        }
        let mut node = TileNode::new(importance, num_frames, self.next_seq);
        self.next_seq += 1;
        if let Some(kids) = id.children() {
            node.children
                .extend(kids.into_iter().filter(|k| self.nodes.contains_key(k)));
        }
        if let Some(parent) = id.parent().and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.insert(id);
        }
        self.nodes.insert(id, node);
        true
    }

    /// Remove `id`, unlinking it from its parent.
    pub fn remove(&mut self, id: &TileId) -> Option<TileNode> {
        let node = self.nodes.remove(id)?;
        if let Some(parent) = id.parent().and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.remove(id);
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admit_links_parent_and_children() {
        let mut set = ResidentSet::new();
        let parent = TileId::new(1, 1, 0);
        let child = TileId::new(2, 3, 1);
        set.admit(child, 1.0, 2);
        set.admit(parent, 2.0, 2);
        assert!(set.get(&parent).unwrap().children.contains(&child));

        let sibling = TileId::new(2, 2, 0);
        set.admit(sibling, 1.0, 2);
        assert_eq!(set.get(&parent).unwrap().children.len(), 2);

        set.remove(&child);
        assert!(!set.get(&parent).unwrap().children.contains(&child));
    }

    #[test]
    fn test_admit_is_idempotent_and_sequenced() {
        let mut set = ResidentSet::new();
        let a = TileId::new(3, 0, 0);
        let b = TileId::new(3, 1, 0);
        assert!(set.admit(a, 1.0, 1));
        assert!(set.admit(b, 1.0, 1));
        assert!(!set.admit(a, 9.0, 1));
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(&a).unwrap().importance, 1.0);
        assert!(set.get(&a).unwrap().enqueued_seq < set.get(&b).unwrap().enqueued_seq);
    }

    #[test]
    fn test_frame_counters() {
        let mut set = ResidentSet::new();
        let id = TileId::ROOT;
        set.admit(id, 1.0, 4);
        let node = set.get_mut(&id).unwrap();
        node.frames[0].status = LoadStatus::Loaded;
        node.frames[1].status = LoadStatus::Loading;
        node.frames[1].request = Some(RequestId(7));
        node.frames[2].status = LoadStatus::Failed;

        let node = set.get(&id).unwrap();
        assert_eq!(node.loaded_count(), 1);
        assert_eq!(node.in_flight(), 1);
        assert_eq!(node.loaded_ratio(), 0.25);
        assert!(node.is_displayable(0));
        assert!(!node.is_displayable(2));
        assert!(!node.is_displayable(9));
        assert_eq!(node.requests().collect::<Vec<_>>(), vec![(1, RequestId(7))]);
        assert_eq!(set.in_flight(), 1);
    }

    #[test]
    fn test_ids_in_id_order() {
        let mut set = ResidentSet::new();
        set.admit(TileId::new(2, 1, 1), 1.0, 1);
        set.admit(TileId::ROOT, 1.0, 1);
        assert_eq!(set.ids(), vec![TileId::ROOT, TileId::new(2, 1, 1)]);
    }
}
