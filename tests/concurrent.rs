//! Multi-threaded use through `SharedBPlusTree`.

mod common;

use btreedb::{Error, SharedBPlusTree};
use common::{key, open_small, value};
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use tempfile::tempdir;

const THREADS: u64 = 4;
const PER_THREAD: u64 = 150;

#[test]
fn test_concurrent_writers_on_disjoint_ranges() {
    let dir = tempdir().unwrap();
    let shared = SharedBPlusTree::new(open_small(&dir.path().join("writers.db"), 5));
    let barrier = Arc::new(Barrier::new(THREADS as usize));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let shared = shared.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let base = t * 10_000;
                for i in 0..PER_THREAD {
                    shared.put(&key(base + i), &value(base + i)).unwrap();
                }
                // Drop every other key again
                for i in (0..PER_THREAD).step_by(2) {
                    assert_eq!(
                        shared.delete(&key(base + i)).unwrap(),
                        value(base + i).to_vec()
                    );
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(shared.len(), THREADS * PER_THREAD / 2);
    for t in 0..THREADS {
        for i in 0..PER_THREAD {
            let k = t * 10_000 + i;
            let expected = (i % 2 == 1).then(|| value(k).to_vec());
            assert_eq!(shared.get(&key(k)).unwrap(), expected);
        }
    }
    shared.check().unwrap();
}

#[test]
fn test_readers_see_complete_entries_during_writes() {
    let dir = tempdir().unwrap();
    let shared = SharedBPlusTree::new(open_small(&dir.path().join("readers.db"), 4));
    for i in 0..100 {
        shared.put(&key(i), &value(i)).unwrap();
    }

    let writer = {
        let shared = shared.clone();
        thread::spawn(move || {
            for i in 100..400 {
                shared.put(&key(i), &value(i)).unwrap();
            }
            for i in 0..100 {
                shared.delete(&key(i)).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let shared = shared.clone();
            thread::spawn(move || {
                for round in 0..5u64 {
                    for i in 0..400 {
                        // Either absent or the exact value ever written
                        if let Some(v) = shared.get(&key(i)).unwrap() {
                            assert_eq!(v, value(i).to_vec(), "round {}", round);
                        }
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }

    assert_eq!(shared.len(), 300);
    let report = shared.check().unwrap();
    assert_eq!(report.key_count, 300);
}

#[test]
fn test_with_tree_groups_operations() {
    let dir = tempdir().unwrap();
    let shared = SharedBPlusTree::new(open_small(&dir.path().join("group.db"), 4));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let shared = shared.clone();
            thread::spawn(move || {
                // Check-then-insert is atomic under with_tree
                shared.with_tree(|tree| {
                    let next = tree.len();
                    tree.put(&key(next), &value(next))
                })
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap().unwrap();
    }
    assert_eq!(shared.len(), THREADS);
    for i in 0..THREADS {
        assert!(shared.contains_key(&key(i)).unwrap());
    }
    assert!(matches!(shared.delete(&key(THREADS)), Err(Error::KeyNotFound)));

    let tree = shared.into_inner().unwrap();
    tree.close().unwrap();
}
