//! Shared test helpers for scenario and property tests.

use tempfile::TempDir;

use chainkeep_core::merkle;
use chainkeep_core::types::*;
use chainkeep_store::{BlockchainStore, StoreConfig};

/// Simple pubkey hash from a seed byte.
pub fn pkh(seed: u8) -> ShortHash {
    ShortHash([seed; 20])
}

/// Create a coinbase transaction with a unique tag.
///
/// The tag lands in the input script so every coinbase built with a
/// different tag has a distinct hash.
pub fn make_coinbase(value: u64, pubkey_hash: ShortHash, tag: u64) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            script: tag.to_le_bytes().to_vec(),
            sequence: u32::MAX,
        }],
        outputs: vec![TxOutput {
            value,
            script: OutputScript::PubkeyHash(pubkey_hash),
        }],
        lock_time: 0,
    }
}

/// Create a simple spending transaction paying pubkey hashes.
pub fn make_tx(inputs: Vec<OutPoint>, outputs: Vec<(u64, ShortHash)>) -> Transaction {
    Transaction {
        version: 1,
        inputs: inputs
            .into_iter()
            .map(|op| TxInput {
                previous_output: op,
                script: vec![0; 72],
                sequence: u32::MAX,
            })
            .collect(),
        outputs: outputs
            .into_iter()
            .map(|(value, hash)| TxOutput {
                value,
                script: OutputScript::PubkeyHash(hash),
            })
            .collect(),
        lock_time: 0,
    }
}

/// Create a block with correct merkle root.
pub fn make_block(prev_hash: Hash256, timestamp: u32, txs: Vec<Transaction>) -> Block {
    let txids: Vec<Hash256> = txs.iter().map(|tx| tx.hash().unwrap()).collect();
    Block {
        header: BlockHeader {
            version: 1,
            prev_hash,
            merkle_root: merkle::merkle_root(&txids),
            timestamp,
            bits: 0x1d00ffff,
            nonce: 0,
        },
        transactions: txs,
    }
}

/// A chain of `len` coinbase-only blocks on top of `prev_hash`.
///
/// `salt` keeps chains built from the same parent distinct.
pub fn make_chain(prev_hash: Hash256, len: usize, salt: u64) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::with_capacity(len);
    let mut prev = prev_hash;
    for i in 0..len as u64 {
        let tag = salt * 1_000_000 + i;
        let cb = make_coinbase(50, pkh(0xAA), tag);
        let block = make_block(prev, 1_700_000_000 + i as u32 * 60, vec![cb]);
        prev = block.hash();
        blocks.push(block);
    }
    blocks
}

/// Outpoint of output `index` of `tx`.
pub fn outpoint(tx: &Transaction, index: u32) -> OutPoint {
    OutPoint {
        hash: tx.hash().unwrap(),
        index,
    }
}

/// Open a store in a fresh temporary directory.
///
/// The directory lives as long as the returned guard.
pub fn temp_store() -> (BlockchainStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = BlockchainStore::open(&StoreConfig::with_data_dir(dir.path())).unwrap();
    (store, dir)
}
