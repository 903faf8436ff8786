//! Reorganization scenarios through the public store handle.
//!
//! Every index a confirmed block writes (depth, transactions, spends,
//! addresses) must follow the chain when a competing branch wins.

use chainkeep_core::address::PaymentAddress;
use chainkeep_core::error::StoreError;
use chainkeep_core::types::*;
use chainkeep_store::{BlockchainStore, StoreConfig, StoreOutcome, StoreStatus};
use chainkeep_tests::helpers::*;

/// Genesis paying `pkh(0x01)`, returned with its coinbase.
fn genesis() -> (Block, Transaction) {
    let cb = make_coinbase(50, pkh(0x01), 0);
    (make_block(Hash256::ZERO, 1_700_000_000, vec![cb.clone()]), cb)
}

// ---------------------------------------------------------------------------
// Indexes follow the winning branch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn spends_and_addresses_follow_reorganization() {
    let (store, _dir) = temp_store();
    let (g, g_cb) = genesis();
    store.store(g.clone()).await.unwrap();

    // Main branch: depth 1 spends the genesis coinbase to pkh(0x11).
    let main_spend = make_tx(vec![outpoint(&g_cb, 0)], vec![(50, pkh(0x11))]);
    let m1 = make_block(
        g.hash(),
        1_700_000_060,
        vec![make_coinbase(50, pkh(0xAA), 101), main_spend.clone()],
    );
    let m2 = make_chain(m1.hash(), 1, 2).remove(0);
    store.store(m1.clone()).await.unwrap();
    store.store(m2.clone()).await.unwrap();

    assert_eq!(
        store.fetch_spend(outpoint(&g_cb, 0)).await.unwrap().hash,
        main_spend.hash().unwrap()
    );

    // Side branch: depth 1 spends the same coin to pkh(0x22), and is longer.
    let side_spend = make_tx(vec![outpoint(&g_cb, 0)], vec![(50, pkh(0x22))]);
    let s1 = make_block(
        g.hash(),
        1_700_000_061,
        vec![make_coinbase(50, pkh(0xAA), 201), side_spend.clone()],
    );
    let rest = make_chain(s1.hash(), 2, 3);
    let sub = store.subscribe_reorganize();
    assert_eq!(store.store(s1.clone()).await.unwrap(), StoreOutcome::orphan());
    assert_eq!(store.store(rest[0].clone()).await.unwrap(), StoreOutcome::orphan());
    assert_eq!(
        store.store(rest[1].clone()).await.unwrap(),
        StoreOutcome::accepted(3)
    );

    let event = sub.recv().await.unwrap();
    assert_eq!(event.fork_depth, 0);
    assert_eq!(event.removed, vec![m2.clone(), m1.clone()]);
    assert_eq!(event.added, vec![s1.clone(), rest[0].clone(), rest[1].clone()]);

    // Spend now points at the side branch's transaction.
    assert_eq!(
        store.fetch_spend(outpoint(&g_cb, 0)).await.unwrap(),
        InputPoint {
            hash: side_spend.hash().unwrap(),
            index: 0
        }
    );
    assert_eq!(
        store.fetch_transaction(main_spend.hash().unwrap()).await,
        Err(StoreError::NotFound)
    );
    assert_eq!(
        store.fetch_transaction_index(side_spend.hash().unwrap()).await.unwrap().depth,
        1
    );
    assert_eq!(
        store
            .fetch_outputs(PaymentAddress::pubkey_hash(pkh(0x11)))
            .await,
        Err(StoreError::NotFound)
    );
    assert_eq!(
        store
            .fetch_outputs(PaymentAddress::pubkey_hash(pkh(0x22)))
            .await
            .unwrap(),
        vec![outpoint(&side_spend, 0)]
    );
    // Genesis coin survives: it is below the fork.
    assert_eq!(
        store
            .fetch_outputs(PaymentAddress::pubkey_hash(pkh(0x01)))
            .await
            .unwrap(),
        vec![outpoint(&g_cb, 0)]
    );
}

#[tokio::test]
async fn losing_branch_can_win_back() {
    let (store, _dir) = temp_store();
    let (g, _) = genesis();
    store.store(g.clone()).await.unwrap();

    let main = make_chain(g.hash(), 2, 1);
    for b in &main {
        store.store(b.clone()).await.unwrap();
    }
    let side = make_chain(g.hash(), 3, 2);
    for b in &side {
        store.store(b.clone()).await.unwrap();
    }
    assert_eq!(store.fetch_block_depth(side[2].hash()).await, Ok(3));

    // The displaced main blocks are still pending; two more on top win.
    let more = make_chain(main[1].hash(), 2, 3);
    assert_eq!(store.store(more[0].clone()).await.unwrap(), StoreOutcome::orphan());
    let sub = store.subscribe_reorganize();
    assert_eq!(
        store.store(more[1].clone()).await.unwrap(),
        StoreOutcome::accepted(4)
    );

    let event = sub.recv().await.unwrap();
    assert_eq!(event.removed, side.iter().rev().cloned().collect::<Vec<_>>());
    let added: Vec<Hash256> = event.added.iter().map(Block::hash).collect();
    let expected: Vec<Hash256> = main.iter().chain(&more).map(Block::hash).collect();
    assert_eq!(added, expected);

    for (depth, b) in main.iter().chain(&more).enumerate() {
        assert_eq!(
            store.fetch_block_header(depth as u64 + 1).await.unwrap(),
            b.header
        );
    }
}

// ---------------------------------------------------------------------------
// Duplicates and the orphan pool bound
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_store_leaves_chain_untouched() {
    let (store, _dir) = temp_store();
    let (g, _) = genesis();
    store.store(g.clone()).await.unwrap();
    let chain = make_chain(g.hash(), 3, 1);
    for b in &chain {
        store.store(b.clone()).await.unwrap();
    }

    let sub = store.subscribe_reorganize();
    let again = store.store(chain[0].clone()).await.unwrap();
    assert_eq!(again, StoreOutcome::duplicate(Some(1)));
    assert_eq!(store.fetch_last_depth().await, Ok(3));

    // No chain change was published; stopping fires the pending listener.
    store.stop().await.unwrap();
    assert_eq!(sub.recv().await, Err(StoreError::ServiceStopped));
}

#[tokio::test]
async fn evicted_orphans_need_resubmission() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = StoreConfig::with_data_dir(dir.path());
    config.orphan_capacity = 3;
    let store = BlockchainStore::open(&config).unwrap();

    let (g, _) = genesis();
    store.store(g.clone()).await.unwrap();
    let chain = make_chain(g.hash(), 6, 1);

    // Depths 3..=6 arrive first; the pool keeps only the newest three.
    for b in &chain[2..] {
        assert_eq!(store.store(b.clone()).await.unwrap().status, StoreStatus::Orphan);
    }
    assert_eq!(store.store(chain[0].clone()).await.unwrap(), StoreOutcome::accepted(1));
    assert_eq!(store.store(chain[1].clone()).await.unwrap(), StoreOutcome::accepted(2));
    assert_eq!(store.fetch_last_depth().await, Ok(2));

    // Resubmitting the evicted blocks lets the rest cascade.
    assert_eq!(store.store(chain[2].clone()).await.unwrap(), StoreOutcome::accepted(3));
    assert_eq!(store.store(chain[3].clone()).await.unwrap(), StoreOutcome::accepted(4));
    assert_eq!(store.fetch_last_depth().await, Ok(6));
    assert_eq!(store.fetch_block_depth(chain[5].hash()).await, Ok(6));
}
