//! Attaching pending blocks to the chain and switching to longer branches.
//!
//! [`organize`] runs after every block arrival. It takes the longest pending
//! branch through the arrived block; if that branch hangs off a confirmed
//! block and ends strictly deeper than the current tip, the chain above the
//! fork is unconfirmed and the branch confirmed in its place.

use std::collections::HashMap;

use chainkeep_core::error::StoreError;
use chainkeep_core::types::{Block, Hash256};

use crate::orphans::OrphanPool;
use crate::publisher::ReorgEvent;

/// The confirmed chain as seen by the organizer.
pub trait ChainKeeper {
    /// Depth of a confirmed block, `None` if unknown.
    fn find_depth(&self, hash: &Hash256) -> Result<Option<u64>, StoreError>;

    /// Depth of the tip, `None` on an empty chain.
    fn last_depth(&self) -> Result<Option<u64>, StoreError>;

    /// Confirm `block` at `depth`, which must be one above the tip.
    fn confirm(&mut self, depth: u64, block: &Block) -> Result<(), StoreError>;

    /// Remove the tip and return it.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the chain is empty
    fn unconfirm_tip(&mut self) -> Result<Block, StoreError>;
}

/// Try to move the chain onto the best pending branch through `arrived`.
///
/// Returns the resulting chain change, or `None` if the blocks stay pending.
/// Blocks unconfirmed by a reorganization go back into `orphans`.
pub fn organize<K: ChainKeeper>(
    keeper: &mut K,
    orphans: &mut OrphanPool,
    arrived: &Hash256,
) -> Result<Option<ReorgEvent>, StoreError> {
    let mut branch = orphans.trace_back(arrived);
    if branch.is_empty() {
        return Ok(None);
    }
    branch.extend(orphans.longest_descent(arrived));

    let Some(root) = orphans.get(&branch[0]) else {
        return Ok(None);
    };
    let root_parent = root.header.prev_hash;
    let last = keeper.last_depth()?;

    let fork = match keeper.find_depth(&root_parent)? {
        Some(depth) => Some(depth),
        None if root_parent.is_zero() && last.is_none() => None,
        None => {
            tracing::debug!(hash = %arrived, missing = %root_parent, pending = orphans.len(), "parent unknown, block stays pending");
            return Ok(None);
        }
    };

    let first_depth = fork.map_or(0, |f| f + 1);
    let new_tip = first_depth + branch.len() as u64 - 1;
    if let Some(tip) = last {
        if new_tip <= tip {
            tracing::debug!(hash = %arrived, branch_tip = new_tip, tip, "side branch not longer than chain");
            return Ok(None);
        }
    }

    // Take the branch out first so re-pooling the losers below can never
    // evict it.
    let mut pending = Vec::with_capacity(branch.len());
    for hash in &branch {
        match orphans.remove(hash) {
            Some(block) => pending.push(block),
            None => {
                restore(orphans, pending);
                return Err(StoreError::OperationFailed(format!(
                    "pending block {hash} vanished while organizing"
                )));
            }
        }
    }

    let mut removed = Vec::new();
    if let (Some(tip), Some(fork_depth)) = (last, fork) {
        for _ in fork_depth..tip {
            match keeper.unconfirm_tip() {
                Ok(block) => removed.push(block),
                Err(e) => {
                    restore(orphans, removed.iter().cloned().chain(pending));
                    return Err(e);
                }
            }
        }
    }
    for block in &removed {
        orphans.add(block.clone());
    }

    let mut added = Vec::with_capacity(pending.len());
    let mut pending = pending.into_iter();
    let mut depth = first_depth;
    while let Some(block) = pending.next() {
        if let Err(e) = keeper.confirm(depth, &block) {
            tracing::error!(depth, hash = %block.hash(), "confirmation failed mid-branch: {e}");
            restore(orphans, std::iter::once(block).chain(pending));
            return Err(e);
        }
        tracing::info!(depth, hash = %block.hash(), "confirmed block");
        added.push(block);
        depth += 1;
    }

    let fork_depth = fork.unwrap_or(0);
    if !removed.is_empty() {
        tracing::info!(
            fork_depth,
            removed = removed.len(),
            added = added.len(),
            "chain reorganized"
        );
    }
    Ok(Some(ReorgEvent {
        fork_depth,
        removed,
        added,
    }))
}

/// Put blocks that left the pool during a failed organization back into it.
fn restore(orphans: &mut OrphanPool, blocks: impl IntoIterator<Item = Block>) {
    for block in blocks {
        orphans.add(block);
    }
}

/// In-memory [`ChainKeeper`] for exercising the organizer without storage.
#[derive(Debug, Default)]
pub struct MemoryKeeper {
    chain: Vec<Block>,
    depths: HashMap<Hash256, u64>,
}

impl MemoryKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Confirmed block hashes, genesis first.
    pub fn hashes(&self) -> Vec<Hash256> {
        self.chain.iter().map(Block::hash).collect()
    }

    pub fn block_at(&self, depth: u64) -> Option<&Block> {
        self.chain.get(usize::try_from(depth).ok()?)
    }
}

impl ChainKeeper for MemoryKeeper {
    fn find_depth(&self, hash: &Hash256) -> Result<Option<u64>, StoreError> {
        Ok(self.depths.get(hash).copied())
    }

    fn last_depth(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.chain.len().checked_sub(1).map(|d| d as u64))
    }

    fn confirm(&mut self, depth: u64, block: &Block) -> Result<(), StoreError> {
        if depth != self.chain.len() as u64 {
            return Err(StoreError::OperationFailed(format!(
                "depth {depth} does not extend chain of {}",
                self.chain.len()
            )));
        }
        self.depths.insert(block.hash(), depth);
        self.chain.push(block.clone());
        Ok(())
    }

    fn unconfirm_tip(&mut self) -> Result<Block, StoreError> {
        let block = self.chain.pop().ok_or(StoreError::NotFound)?;
        self.depths.remove(&block.hash());
        Ok(block)
    }
}
