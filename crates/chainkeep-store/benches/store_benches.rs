//! Criterion benchmarks for chainkeep-store.
//!
//! Covers: block confirmation, organizing an out-of-order branch, and block
//! reassembly reads against RocksDB-backed tables.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::TempDir;

use chainkeep_core::merkle;
use chainkeep_core::types::{
    Block, BlockHeader, Hash256, OutPoint, OutputScript, ShortHash, Transaction, TxInput, TxOutput,
};
use chainkeep_store::index::{BlockLocator, ChainIndex};
use chainkeep_store::organizer::{organize, ChainKeeper};
use chainkeep_store::orphans::OrphanPool;
use chainkeep_store::StoreConfig;

fn coinbase(depth: u64) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            script: depth.to_le_bytes().to_vec(),
            sequence: u32::MAX,
        }],
        outputs: vec![TxOutput {
            value: 50,
            script: OutputScript::PubkeyHash(ShortHash([0xAA; 20])),
        }],
        lock_time: 0,
    }
}

fn build_block(prev_hash: Hash256, depth: u64) -> Block {
    let tx = coinbase(depth);
    let root = merkle::merkle_root(&[tx.hash().unwrap()]);
    Block {
        header: BlockHeader {
            version: 1,
            prev_hash,
            merkle_root: root,
            timestamp: 1_700_000_000 + depth as u32 * 60,
            bits: 0x1d00ffff,
            nonce: 0,
        },
        transactions: vec![tx],
    }
}

fn build_chain(len: u64) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut prev = Hash256::ZERO;
    for depth in 0..len {
        let b = build_block(prev, depth);
        prev = b.hash();
        blocks.push(b);
    }
    blocks
}

fn temp_index() -> (TempDir, ChainIndex) {
    let dir = TempDir::new().unwrap();
    let index = ChainIndex::open(&StoreConfig::with_data_dir(dir.path())).unwrap();
    (dir, index)
}

fn bench_confirm_block(c: &mut Criterion) {
    c.bench_function("confirm_block", |b| {
        b.iter_with_setup(
            || {
                let (dir, index) = temp_index();
                let blocks = build_chain(2);
                (dir, index, blocks)
            },
            |(_dir, mut index, blocks)| {
                index.confirm(0, black_box(&blocks[0])).unwrap();
                index.confirm(1, black_box(&blocks[1])).unwrap();
            },
        )
    });
}

fn bench_organize_reversed_arrival(c: &mut Criterion) {
    // Ten blocks arrive tip first; the last arrival (genesis) attaches all.
    c.bench_function("organize_reversed_10", |b| {
        b.iter_with_setup(
            || {
                let (dir, index) = temp_index();
                let mut pool = OrphanPool::new(20);
                let blocks = build_chain(10);
                for block in blocks[1..].iter().rev() {
                    pool.add(block.clone());
                }
                pool.add(blocks[0].clone());
                (dir, index, pool, blocks[0].hash())
            },
            |(_dir, mut index, mut pool, genesis)| {
                organize(&mut index, &mut pool, black_box(&genesis)).unwrap();
            },
        )
    });
}

fn bench_fetch_block(c: &mut Criterion) {
    let (_dir, mut index) = temp_index();
    for (depth, block) in build_chain(50).iter().enumerate() {
        index.confirm(depth as u64, block).unwrap();
    }

    c.bench_function("fetch_block_by_depth", |b| {
        b.iter(|| index.block(black_box(BlockLocator::Depth(25))).unwrap())
    });
}

criterion_group!(
    benches,
    bench_confirm_block,
    bench_organize_reversed_arrival,
    bench_fetch_block
);
criterion_main!(benches);
