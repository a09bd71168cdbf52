//! Cluster Search Module
//!
//! The source-node side of a distributed search. The coordinator resolves
//! target nodes, partitions index shards by owning node and dispatches one
//! search task per node; the collector merges the incremental result
//! messages streaming back into a shared result store and tracks per-node
//! completion; a poll loop watches for cancellation, completion, early exit
//! and stalled nodes, and broadcasts cluster-wide termination when any of
//! them holds.
//!
//! ## Submodules
//! - **`coordinator`**: target resolution, shard partitioning, dispatch and
//!   the completion poll loop.
//! - **`collector`**: NodeResult merging, per-node error sets, completion
//!   tracking, and the bounded collector cache.
//! - **`store`**: the queryable merged accumulation of payload deltas.
//! - **`completion`**: the one-way completion latch.
//! - **`dispatch`**: the transport seam plus an in-process dispatcher.

pub mod collector;
pub mod completion;
pub mod coordinator;
pub mod dispatch;
pub mod store;
