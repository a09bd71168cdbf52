//! Index Shard Module
//!
//! An index is partitioned into shards, each owned by exactly one node and
//! carrying a lifecycle status. Shards marked corrupt are reported and
//! skipped, never searched; deleted shards are invisible to searches.
//!
//! ## Submodules
//! - **`types`**: shard/index metadata and the stored document shape.
//! - **`store`**: the injected index store holding metadata and shard data.
//! - **`cache`**: the shared, capacity-bounded cache of open shard searchers.
//! - **`producer`**: the per-node task that searches assigned shards and
//!   feeds matched raw rows into the bounded transfer queue.

pub mod cache;
pub mod producer;
pub mod store;
pub mod types;
