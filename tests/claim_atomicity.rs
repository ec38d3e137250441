// tests/claim_atomicity.rs
//
// At-most-one-claim: across any number of concurrent claimers, at most one
// caller ever observes the `waiting → claimed` transition for an item.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;

use common::enqueue_for;
use evoqueue::store::{MemoryStore, QueuePolicy, SqliteStore, TagFilter, WorkQueue};
use evoqueue_test_utils::init_tracing;

#[test]
fn concurrent_claimers_never_share_an_item_memory() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());

    const ITEMS: usize = 50;
    const WORKERS: usize = 8;

    for i in 0..ITEMS {
        enqueue_for(store.as_ref(), i as f64, "create");
    }

    let handles: Vec<_> = (0..WORKERS)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let worker = format!("worker-{w}");
                let mut claimed = Vec::new();
                while let Some(item) = store.claim(&worker, &TagFilter::any()).unwrap() {
                    assert_eq!(item.claimed_by.as_deref(), Some(worker.as_str()));
                    claimed.push(item.id);
                }
                claimed
            })
        })
        .collect();

    let mut all_claims = Vec::new();
    for handle in handles {
        all_claims.extend(handle.join().expect("claimer thread panicked"));
    }

    let distinct: HashSet<_> = all_claims.iter().cloned().collect();
    assert_eq!(all_claims.len(), ITEMS, "every item claimed exactly once");
    assert_eq!(distinct.len(), ITEMS, "no item claimed twice");
}

#[test]
fn concurrent_claimers_never_share_an_item_sqlite() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteStore::open(dir.path().join("queue.db"), QueuePolicy::default())
        .expect("open store");

    const ITEMS: usize = 24;
    const WORKERS: usize = 4;

    for i in 0..ITEMS {
        enqueue_for(&store, i as f64, "create");
    }

    let handles: Vec<_> = (0..WORKERS)
        .map(|w| {
            // Each thread gets its own handle, like a separate process
            // opening the same database file.
            let store = store.clone();
            thread::spawn(move || {
                let worker = format!("worker-{w}");
                let mut claimed = Vec::new();
                let mut transient_errors = 0;
                loop {
                    match store.claim(&worker, &TagFilter::any()) {
                        Ok(Some(item)) => claimed.push(item.id),
                        Ok(None) => break,
                        Err(_) if transient_errors < 100 => {
                            // Contention on the shared file; back off briefly.
                            transient_errors += 1;
                            thread::sleep(std::time::Duration::from_millis(5));
                        }
                        Err(e) => panic!("claim kept failing: {e}"),
                    }
                }
                claimed
            })
        })
        .collect();

    let mut all_claims = Vec::new();
    for handle in handles {
        all_claims.extend(handle.join().expect("claimer thread panicked"));
    }

    let distinct: HashSet<_> = all_claims.iter().cloned().collect();
    assert_eq!(all_claims.len(), ITEMS, "every item claimed exactly once");
    assert_eq!(distinct.len(), ITEMS, "no item claimed twice");
}

proptest! {
    // Interleaved claims from several workers, in an arbitrary order, must
    // hand out each item exactly once.
    #[test]
    fn interleaved_claims_hand_out_each_item_once(
        n_items in 1usize..40,
        n_workers in 1usize..6,
        order in proptest::collection::vec(0usize..6, 0..120),
    ) {
        let store = MemoryStore::new();
        for i in 0..n_items {
            enqueue_for(&store, i as f64, "create");
        }

        let mut seen = HashSet::new();
        for pick in order {
            let worker = format!("worker-{}", pick % n_workers);
            if let Some(item) = store.claim(&worker, &TagFilter::any()).unwrap() {
                prop_assert!(seen.insert(item.id), "item handed out twice");
            }
        }
        // Drain whatever the random interleaving left behind.
        while let Some(item) = store.claim("worker-final", &TagFilter::any()).unwrap() {
            prop_assert!(seen.insert(item.id), "item handed out twice");
        }
        prop_assert_eq!(seen.len(), n_items);
    }
}
