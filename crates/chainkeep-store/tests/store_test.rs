//! Facade-level tests against a real on-disk store.

use tempfile::TempDir;

use chainkeep_core::address::PaymentAddress;
use chainkeep_core::error::StoreError;
use chainkeep_core::types::{
    Block, BlockHeader, Hash256, InputPoint, OutPoint, OutputScript, ShortHash, Transaction,
    TxInput, TxOutput,
};
use chainkeep_store::{BlockchainStore, StoreConfig, StoreOutcome, StoreStatus, TxPosition};

fn open_store() -> (BlockchainStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = BlockchainStore::open(&StoreConfig::with_data_dir(dir.path())).unwrap();
    (store, dir)
}

fn coinbase(tag: u64, to: u8) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: OutPoint::null(),
            script: tag.to_le_bytes().to_vec(),
            sequence: u32::MAX,
        }],
        outputs: vec![TxOutput {
            value: 50,
            script: OutputScript::PubkeyHash(ShortHash([to; 20])),
        }],
        lock_time: 0,
    }
}

fn block_on(prev: Hash256, tag: u64, txs: Vec<Transaction>) -> Block {
    let mut transactions = vec![coinbase(tag, 0xC0)];
    transactions.extend(txs);
    Block {
        header: BlockHeader {
            version: 1,
            prev_hash: prev,
            merkle_root: Hash256::ZERO,
            timestamp: 1_700_000_000 + tag as u32,
            bits: 0x1d00ffff,
            nonce: tag as u32,
        },
        transactions,
    }
}

fn chain_from(prev: Hash256, len: u64, salt: u64) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut prev = prev;
    for i in 0..len {
        let b = block_on(prev, salt * 1000 + i, vec![]);
        prev = b.hash();
        blocks.push(b);
    }
    blocks
}

#[tokio::test]
async fn genesis_twice_is_duplicate_at_zero() {
    let (store, _dir) = open_store();
    let genesis = block_on(Hash256::ZERO, 0, vec![]);

    assert_eq!(store.store(genesis.clone()).await.unwrap(), StoreOutcome::accepted(0));
    let again = store.store(genesis).await.unwrap();
    assert_eq!(again.status, StoreStatus::Duplicate);
    assert_eq!(again.depth, Some(0));
    assert_eq!(store.fetch_last_depth().await, Ok(0));
}

#[tokio::test]
async fn child_before_parent_confirms_after_parent() {
    let (store, _dir) = open_store();
    let blocks = chain_from(Hash256::ZERO, 3, 0);
    store.store(blocks[0].clone()).await.unwrap();

    let child = store.store(blocks[2].clone()).await.unwrap();
    assert_eq!(child, StoreOutcome::orphan());
    assert_eq!(
        store.fetch_block_depth(blocks[2].hash()).await,
        Err(StoreError::NotFound)
    );

    // Re-storing a pending orphan is a duplicate with no depth.
    assert_eq!(
        store.store(blocks[2].clone()).await.unwrap(),
        StoreOutcome::duplicate(None)
    );

    let parent = store.store(blocks[1].clone()).await.unwrap();
    assert_eq!(parent, StoreOutcome::accepted(1));
    assert_eq!(store.fetch_block_depth(blocks[2].hash()).await, Ok(2));
    assert_eq!(store.fetch_last_depth().await, Ok(2));
}

#[tokio::test]
async fn header_and_hashes_round_trip_by_depth_and_hash() {
    let (store, _dir) = open_store();
    let genesis = block_on(Hash256::ZERO, 0, vec![]);
    let pay = Transaction {
        version: 2,
        inputs: vec![TxInput {
            previous_output: OutPoint {
                hash: genesis.transactions[0].hash().unwrap(),
                index: 0,
            },
            script: vec![1, 2, 3],
            sequence: 7,
        }],
        outputs: vec![TxOutput {
            value: 20,
            script: OutputScript::Raw(vec![0x6a]),
        }],
        lock_time: 0,
    };
    let next = block_on(genesis.hash(), 1, vec![pay]);
    store.store(genesis).await.unwrap();
    store.store(next.clone()).await.unwrap();

    let expected_hashes = next.transaction_hashes().unwrap();
    assert_eq!(store.fetch_block_header(1u64).await.unwrap(), next.header);
    assert_eq!(store.fetch_block_header(next.hash()).await.unwrap(), next.header);
    assert_eq!(
        store.fetch_block_transaction_hashes(1u64).await.unwrap(),
        expected_hashes
    );
    assert_eq!(
        store.fetch_block_transaction_hashes(next.hash()).await.unwrap(),
        expected_hashes
    );
    assert_eq!(store.fetch_block(next.hash()).await.unwrap(), next);
}

#[tokio::test]
async fn transaction_spend_and_address_queries() {
    let (store, _dir) = open_store();
    let genesis = block_on(Hash256::ZERO, 0, vec![]);
    let funding = OutPoint {
        hash: genesis.transactions[0].hash().unwrap(),
        index: 0,
    };
    let pay = Transaction {
        version: 1,
        inputs: vec![TxInput {
            previous_output: funding,
            script: vec![],
            sequence: 0,
        }],
        outputs: vec![
            TxOutput {
                value: 30,
                script: OutputScript::PubkeyHash(ShortHash([0x11; 20])),
            },
            TxOutput {
                value: 20,
                script: OutputScript::PubkeyHash(ShortHash([0x11; 20])),
            },
        ],
        lock_time: 0,
    };
    let pay_hash = pay.hash().unwrap();
    let next = block_on(genesis.hash(), 1, vec![pay.clone()]);
    store.store(genesis).await.unwrap();
    store.store(next).await.unwrap();

    assert_eq!(store.fetch_transaction(pay_hash).await.unwrap(), pay);
    assert_eq!(
        store.fetch_transaction_index(pay_hash).await.unwrap(),
        TxPosition { depth: 1, index: 1 }
    );
    assert_eq!(
        store.fetch_spend(funding).await.unwrap(),
        InputPoint { hash: pay_hash, index: 0 }
    );
    assert_eq!(
        store
            .fetch_spend(OutPoint { hash: pay_hash, index: 0 })
            .await,
        Err(StoreError::UnspentOutput)
    );

    let outputs = store
        .fetch_outputs(PaymentAddress::pubkey_hash(ShortHash([0x11; 20])))
        .await
        .unwrap();
    assert_eq!(
        outputs,
        vec![
            OutPoint { hash: pay_hash, index: 0 },
            OutPoint { hash: pay_hash, index: 1 },
        ]
    );
    assert_eq!(
        store
            .fetch_outputs(PaymentAddress::pubkey_hash(ShortHash([0x22; 20])))
            .await,
        Err(StoreError::NotFound)
    );
    assert_eq!(
        store.fetch_transaction(Hash256([0x99; 32])).await,
        Err(StoreError::NotFound)
    );
}

#[tokio::test]
async fn unsupported_address_kinds_fail_fast() {
    let (store, _dir) = open_store();
    let script = PaymentAddress::script_hash(ShortHash([1; 20]));
    let unknown = PaymentAddress::new(0x42, ShortHash([1; 20]));
    assert_eq!(
        store.fetch_outputs(script).await,
        Err(StoreError::UnsupportedPaymentType)
    );
    assert_eq!(
        store.fetch_outputs(unknown).await,
        Err(StoreError::UnsupportedPaymentType)
    );
}

#[tokio::test]
async fn reorganization_publishes_one_event() {
    let (store, _dir) = open_store();
    let main = chain_from(Hash256::ZERO, 3, 0);
    for b in &main {
        store.store(b.clone()).await.unwrap();
    }

    let side = chain_from(main[0].hash(), 3, 5);
    store.store(side[0].clone()).await.unwrap();
    store.store(side[1].clone()).await.unwrap();

    let subscription = store.subscribe_reorganize();
    let outcome = store.store(side[2].clone()).await.unwrap();
    assert_eq!(outcome, StoreOutcome::accepted(3));

    let event = subscription.recv().await.unwrap();
    assert_eq!(event.fork_depth, 0);
    assert_eq!(event.removed, vec![main[2].clone(), main[1].clone()]);
    assert_eq!(event.added, side);
    assert_eq!(store.fetch_last_depth().await, Ok(3));
    assert_eq!(
        store.fetch_block_depth(main[1].hash()).await,
        Err(StoreError::NotFound)
    );
}

#[tokio::test]
async fn subscription_fires_once() {
    let (store, _dir) = open_store();
    let blocks = chain_from(Hash256::ZERO, 2, 0);

    let first = store.subscribe_reorganize();
    store.store(blocks[0].clone()).await.unwrap();
    let event = first.recv().await.unwrap();
    assert_eq!(event.added, vec![blocks[0].clone()]);

    let second = store.subscribe_reorganize();
    store.store(blocks[1].clone()).await.unwrap();
    assert_eq!(second.recv().await.unwrap().fork_depth, 0);
}

#[tokio::test]
async fn import_then_store_continues_chain() {
    let (store, _dir) = open_store();
    let blocks = chain_from(Hash256::ZERO, 4, 0);
    for (depth, b) in blocks[..3].iter().enumerate() {
        store.import(b.clone(), depth as u64).await.unwrap();
    }
    assert_eq!(store.fetch_last_depth().await, Ok(2));
    assert_eq!(
        store.store(blocks[3].clone()).await.unwrap(),
        StoreOutcome::accepted(3)
    );
    assert_eq!(
        store.import(blocks[0].clone(), 9).await,
        Err(StoreError::Duplicate)
    );
}

#[tokio::test]
async fn chain_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::with_data_dir(dir.path());
    let blocks = chain_from(Hash256::ZERO, 3, 0);
    {
        let store = BlockchainStore::open(&config).unwrap();
        for b in &blocks {
            store.store(b.clone()).await.unwrap();
        }
        store.stop().await.unwrap();
    }
    let store = BlockchainStore::open(&config).unwrap();
    assert_eq!(store.fetch_last_depth().await, Ok(2));
    assert_eq!(store.fetch_block(2u64).await.unwrap(), blocks[2]);
    store.stop().await.unwrap();
}
