//! Integration tests for the B+-tree.
//!
//! These run whole workloads through the public API and reopen files to
//! verify what actually reached the disk.

mod common;

use btreedb::{BPlusTree, Error, TreeOptions};
use common::{init_tracing, key, open_small, small_options, value};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::tempdir;

/// 4 KiB pages with 8 byte keys: insert 1..=1000, delete 500..=999.
#[test]
fn test_insert_thousand_delete_half() {
    init_tracing();
    let dir = tempdir().unwrap();
    let options = TreeOptions::default()
        .with_page_size(4096)
        .with_max_key_size(8)
        .with_max_value_size(8);
    let mut tree = BPlusTree::open(dir.path().join("scenario.db"), options).unwrap();

    for i in 1..=1000 {
        tree.put(&key(i), &value(i)).unwrap();
    }
    assert_eq!(tree.len(), 1000);
    assert_eq!(tree.depth(), 2);
    let nodes_before = tree.node_count().unwrap();
    let free_before = tree.free_page_count();

    for i in 500..=999 {
        assert_eq!(tree.delete(&key(i)).unwrap(), value(i).to_vec());
    }

    assert_eq!(tree.len(), 500);
    assert!(tree.depth() <= 2);
    let nodes_after = tree.node_count().unwrap();
    assert!(nodes_after < nodes_before, "{} -> {}", nodes_before, nodes_after);
    assert!(tree.free_page_count() > free_before);
    assert_eq!(
        nodes_after + tree.free_page_count() as usize,
        nodes_before + free_before as usize
    );
    for i in 1..=1000 {
        let expected = (!(500..=999).contains(&i)).then(|| value(i).to_vec());
        assert_eq!(tree.get(&key(i)).unwrap(), expected, "key {}", i);
    }
    assert_eq!(tree.get(&key(0)).unwrap(), None);
    assert_eq!(tree.get(&key(1001)).unwrap(), None);

    let report = tree.check().unwrap();
    assert_eq!(report.key_count, 500);
    assert_eq!(report.depth, tree.depth());
}

#[test]
fn test_duplicate_put_keeps_first_value() {
    let dir = tempdir().unwrap();
    let mut tree = open_small(&dir.path().join("dup.db"), 4);

    for i in 0..50 {
        tree.put(&key(i), &value(i)).unwrap();
    }
    let size = tree.file_size();

    for i in 0..50 {
        assert!(matches!(
            tree.put(&key(i), b"other"),
            Err(Error::KeyExists)
        ));
    }

    assert_eq!(tree.len(), 50);
    assert_eq!(tree.file_size(), size);
    for i in 0..50 {
        assert_eq!(tree.get(&key(i)).unwrap(), Some(value(i).to_vec()));
    }
    tree.check().unwrap();
}

#[test]
fn test_contents_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reopen.db");

    let (depth, nodes) = {
        let mut tree = open_small(&path, 4);
        for i in 0..300 {
            tree.put(&key(i), &value(i)).unwrap();
        }
        for i in (0..300).step_by(4) {
            tree.delete(&key(i)).unwrap();
        }
        let depth = tree.depth();
        let nodes = tree.node_count().unwrap();
        tree.close().unwrap();
        (depth, nodes)
    };

    let mut tree = open_small(&path, 4);
    assert_eq!(tree.len(), 225);
    assert_eq!(tree.depth(), depth);
    assert_eq!(tree.node_count().unwrap(), nodes);
    for i in 0..300 {
        let expected = (i % 4 != 0).then(|| value(i).to_vec());
        assert_eq!(tree.get(&key(i)).unwrap(), expected);
    }
    tree.check().unwrap();
}

#[test]
fn test_drop_without_close_keeps_acknowledged_writes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("drop.db");

    {
        let mut tree = open_small(&path, 4);
        for i in 0..40 {
            tree.put(&key(i), &value(i)).unwrap();
        }
        tree.delete(&key(7)).unwrap();
        // Dropped without close
    }

    let mut tree = open_small(&path, 4);
    assert_eq!(tree.len(), 39);
    assert_eq!(tree.get(&key(7)).unwrap(), None);
    assert_eq!(tree.get(&key(8)).unwrap(), Some(value(8).to_vec()));
    tree.check().unwrap();
}

#[test]
fn test_free_list_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("free.db");

    let (size, free) = {
        let mut tree = open_small(&path, 4);
        for i in 0..200 {
            tree.put(&key(i), &value(i)).unwrap();
        }
        for i in 0..200 {
            tree.delete(&key(i)).unwrap();
        }
        let state = (tree.file_size(), tree.free_page_count());
        tree.close().unwrap();
        state
    };
    assert!(free > 0);

    let mut tree = open_small(&path, 4);
    assert_eq!(tree.free_page_count(), free);
    for i in 0..200 {
        tree.put(&key(i), &value(i)).unwrap();
    }
    assert_eq!(tree.file_size(), size);
    assert_eq!(tree.stats().snapshot().pages_allocated, 0);
    tree.check().unwrap();
}

/// Refilling a drained tree in the same order must not grow the file.
#[test]
fn test_space_is_reclaimed_across_rounds() {
    let dir = tempdir().unwrap();
    let mut tree = open_small(&dir.path().join("rounds.db"), 5);
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    let mut insert_order: Vec<u64> = (0..400).collect();
    insert_order.shuffle(&mut rng);
    let mut delete_order = insert_order.clone();
    let mut high_water = 0;

    for round in 0..5 {
        for &k in &insert_order {
            tree.put(&key(k), &value(k)).unwrap();
        }
        if round == 0 {
            high_water = tree.file_size();
        }
        assert_eq!(tree.file_size(), high_water, "round {}", round);

        delete_order.shuffle(&mut rng);
        for &k in &delete_order {
            tree.delete(&key(k)).unwrap();
        }
        let report = tree.check().unwrap();
        assert_eq!(report.key_count, 0);
        assert_eq!(report.node_count, 1);
        assert_eq!(tree.file_size(), high_water);
    }
    assert!(tree.stats().reuse_rate() > 0.5);
}

/// Random puts and deletes checked against `BTreeMap`.
#[test]
fn test_random_workload_matches_model() {
    init_tracing();
    let dir = tempdir().unwrap();
    let mut tree = open_small(&dir.path().join("model.db"), 4);
    let mut model = BTreeMap::new();
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    for step in 0..4000 {
        let k = rng.gen_range(0..600u64);
        if rng.gen_bool(0.6) {
            let v = rng.gen::<u64>();
            let result = tree.put(&key(k), &v.to_le_bytes());
            if let std::collections::btree_map::Entry::Vacant(slot) = model.entry(k) {
                result.unwrap();
                slot.insert(v);
            } else {
                assert!(matches!(result, Err(Error::KeyExists)), "step {}", step);
            }
        } else {
            match model.remove(&k) {
                Some(v) => assert_eq!(tree.delete(&key(k)).unwrap(), v.to_le_bytes().to_vec()),
                None => assert!(matches!(tree.delete(&key(k)), Err(Error::KeyNotFound))),
            }
        }

        if step % 500 == 0 {
            tree.check().unwrap();
        }
    }

    assert_eq!(tree.len(), model.len() as u64);
    let items: Vec<(Vec<u8>, Vec<u8>)> = tree.iter().collect::<Result<_, _>>().unwrap();
    let expected: Vec<(Vec<u8>, Vec<u8>)> = model
        .iter()
        .map(|(&k, &v)| (key(k).to_vec(), v.to_le_bytes().to_vec()))
        .collect();
    assert_eq!(items, expected);
    tree.check().unwrap();
}

#[test]
fn test_variable_length_keys() {
    let dir = tempdir().unwrap();
    let mut tree = open_small(&dir.path().join("varlen.db"), 4);
    let words = [
        "", "a", "ab", "abc", "b", "ba", "zz", "zzzzzzzz", "m", "mm", "mmm", "q",
    ];

    for (i, w) in words.iter().enumerate() {
        tree.put(w.as_bytes(), &[i as u8]).unwrap();
    }

    let keys: Vec<Vec<u8>> = tree.iter().map(|item| item.unwrap().0).collect();
    let mut sorted: Vec<Vec<u8>> = words.iter().map(|w| w.as_bytes().to_vec()).collect();
    sorted.sort();
    assert_eq!(keys, sorted);

    for (i, w) in words.iter().enumerate() {
        assert_eq!(tree.get(w.as_bytes()).unwrap(), Some(vec![i as u8]));
    }
    tree.check().unwrap();
}

#[test]
fn test_damaged_node_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("damaged.db");

    let root = {
        let mut tree = open_small(&path, 4);
        for i in 0..3 {
            tree.put(&key(i), &value(i)).unwrap();
        }
        let root = tree.root_page();
        tree.close().unwrap();
        root
    };

    // Flip one byte in the root leaf's entries
    flip_byte(&path, root.offset(1024) + 40);

    let mut tree = open_small(&path, 4);
    assert!(matches!(tree.get(&key(0)), Err(Error::Corruption(_))));
    assert!(matches!(
        tree.put(&key(10), &value(10)),
        Err(Error::Corruption(_))
    ));
    assert!(matches!(tree.check(), Err(Error::Corruption(_))));
}

#[test]
fn test_damaged_header_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("header.db");
    open_small(&path, 4).close().unwrap();

    // Key count field
    flip_byte(&path, 28);

    let result = BPlusTree::open(&path, small_options(4));
    assert!(matches!(result, Err(Error::Corruption(_))));
}

#[test]
fn test_truncated_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("short.db");
    open_small(&path, 4).close().unwrap();

    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(1024 + 100).unwrap();
    drop(file);

    let result = BPlusTree::open(&path, small_options(4));
    assert!(matches!(result, Err(Error::Corruption(_))));
}

fn flip_byte(path: &std::path::Path, offset: u64) {
    let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.read_exact(&mut byte).unwrap();
    byte[0] ^= 0xFF;
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&byte).unwrap();
}
