//! Bounded pool of blocks whose parent is not yet confirmed.
//!
//! The pool provides:
//! - O(1) lookup by block hash
//! - O(1) lookup of pending children by parent hash
//! - Arrival-ordered eviction: at capacity the oldest entry is dropped
//!
//! Branch queries ([`OrphanPool::trace_back`], [`OrphanPool::longest_descent`])
//! walk the parent/child links between pending blocks for the organizer.

use std::collections::{BTreeMap, HashMap, HashSet};

use chainkeep_core::constants::DEFAULT_ORPHAN_CAPACITY;
use chainkeep_core::types::{Block, Hash256};

#[derive(Debug, Clone)]
struct OrphanEntry {
    block: Block,
    /// Arrival sequence number; lower is older.
    seq: u64,
}

/// Pending blocks keyed by their own hash.
///
/// Not thread-safe; owned by the store's worker.
#[derive(Debug)]
pub struct OrphanPool {
    /// Primary storage: block hash → entry.
    entries: HashMap<Hash256, OrphanEntry>,
    /// Parent hash → pending children, in arrival order.
    by_parent: HashMap<Hash256, Vec<Hash256>>,
    /// Arrival order: `seq → hash`. First key is the oldest entry.
    by_arrival: BTreeMap<u64, Hash256>,
    capacity: usize,
    next_seq: u64,
}

impl OrphanPool {
    /// Create a pool holding at most `capacity` blocks (minimum one).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            by_parent: HashMap::new(),
            by_arrival: BTreeMap::new(),
            capacity: capacity.max(1),
            next_seq: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_ORPHAN_CAPACITY)
    }

    /// Add a block. Returns `false` if a block with the same hash is
    /// already pending. Evicts the oldest entry when full.
    pub fn add(&mut self, block: Block) -> bool {
        let hash = block.hash();
        if self.entries.contains_key(&hash) {
            return false;
        }

        while self.entries.len() >= self.capacity {
            let Some((_, oldest)) = self.by_arrival.pop_first() else {
                break;
            };
            if let Some(evicted) = self.detach(&oldest) {
                tracing::warn!(hash = %oldest, prev = %evicted.block.header.prev_hash, "orphan pool full, evicted oldest block");
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_parent
            .entry(block.header.prev_hash)
            .or_default()
            .push(hash);
        self.by_arrival.insert(seq, hash);
        self.entries.insert(hash, OrphanEntry { block, seq });
        true
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash256) -> Option<&Block> {
        self.entries.get(hash).map(|e| &e.block)
    }

    /// Remove a pending block, returning it.
    pub fn remove(&mut self, hash: &Hash256) -> Option<Block> {
        let entry = self.detach(hash)?;
        self.by_arrival.remove(&entry.seq);
        Some(entry.block)
    }

    /// Drop an entry from `entries` and `by_parent`, leaving `by_arrival`
    /// to the caller.
    fn detach(&mut self, hash: &Hash256) -> Option<OrphanEntry> {
        let entry = self.entries.remove(hash)?;
        let parent = entry.block.header.prev_hash;
        if let Some(children) = self.by_parent.get_mut(&parent) {
            children.retain(|h| h != hash);
            if children.is_empty() {
                self.by_parent.remove(&parent);
            }
        }
        Some(entry)
    }

    /// Pending children of `parent`, oldest first.
    pub fn children_of(&self, parent: &Hash256) -> &[Hash256] {
        self.by_parent.get(parent).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pending ancestors of `hash`, from the branch root up to and including
    /// `hash` itself. Empty if `hash` is not pending.
    pub fn trace_back(&self, hash: &Hash256) -> Vec<Hash256> {
        let mut branch = Vec::new();
        let mut cursor = *hash;
        while let Some(block) = self.get(&cursor) {
            // A pool can never hold a chain longer than itself.
            if branch.len() > self.entries.len() {
                break;
            }
            branch.push(cursor);
            cursor = block.header.prev_hash;
        }
        branch.reverse();
        branch
    }

    /// Deepest path of pending descendants below `hash`, nearest first.
    /// Among equally deep paths the one through the earliest-arrived child
    /// wins.
    pub fn longest_descent(&self, hash: &Hash256) -> Vec<Hash256> {
        let heights = self.subtree_heights(hash);
        let mut path = Vec::new();
        let mut cursor = *hash;
        while let Some(next) = self.tallest_child(&cursor, &heights) {
            if path.len() >= self.entries.len() {
                break;
            }
            path.push(next);
            cursor = next;
        }
        path
    }

    /// Height of every pending descendant of `root` (a leaf is 0).
    /// Iterative: a pending chain can be as long as the pool.
    fn subtree_heights(&self, root: &Hash256) -> HashMap<Hash256, usize> {
        let mut heights: HashMap<Hash256, usize> = HashMap::new();
        let mut expanded: HashSet<Hash256> = HashSet::new();
        let mut stack: Vec<(Hash256, bool)> = self
            .children_of(root)
            .iter()
            .map(|child| (*child, false))
            .collect();

        while let Some((node, children_done)) = stack.pop() {
            if children_done {
                let height = self
                    .children_of(&node)
                    .iter()
                    .filter_map(|child| heights.get(child))
                    .max()
                    .map_or(0, |h| h + 1);
                heights.insert(node, height);
            } else if expanded.insert(node) {
                stack.push((node, true));
                stack.extend(self.children_of(&node).iter().map(|child| (*child, false)));
            }
        }
        heights
    }

    /// First-arrived child of `parent` with the greatest height.
    fn tallest_child(
        &self,
        parent: &Hash256,
        heights: &HashMap<Hash256, usize>,
    ) -> Option<Hash256> {
        let mut best: Option<(Hash256, usize)> = None;
        for child in self.children_of(parent) {
            let Some(&height) = heights.get(child) else {
                continue;
            };
            if best.is_none_or(|(_, h)| height > h) {
                best = Some((*child, height));
            }
        }
        best.map(|(hash, _)| hash)
    }
}

impl Default for OrphanPool {
    fn default() -> Self {
        Self::with_defaults()
    }
}
