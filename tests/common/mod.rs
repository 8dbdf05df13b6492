//! Helpers shared by the integration tests.

#![allow(dead_code)]

use btreedb::{BPlusTree, TreeOptions};
use std::path::Path;
use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber once per test binary. Filter with
/// `RUST_LOG`, e.g. `RUST_LOG=btreedb=debug`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("btreedb=warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

/// 1 KiB pages, 8 byte keys and values, and a small order so that a few
/// dozen keys already build a multi-level tree.
pub fn small_options(order: usize) -> TreeOptions {
    TreeOptions::default()
        .with_page_size(1024)
        .with_max_key_size(8)
        .with_max_value_size(8)
        .with_max_order(order)
}

pub fn open_small(path: &Path, order: usize) -> BPlusTree {
    init_tracing();
    BPlusTree::open(path, small_options(order)).unwrap()
}

/// Fixed-width big-endian key, so byte order equals numeric order.
pub fn key(i: u64) -> [u8; 8] {
    i.to_be_bytes()
}

pub fn value(i: u64) -> [u8; 8] {
    i.wrapping_mul(0x9E37_79B9_7F4A_7C15).to_le_bytes()
}
