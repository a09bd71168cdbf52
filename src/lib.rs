//! Distributed Cluster Search Library
//!
//! This library crate defines the core modules of a cluster-wide search over
//! sharded indexes. It serves as the foundation for the binary executable
//! (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of loosely coupled subsystems:
//!
//! - **`cluster`**: The source-node side of a search. Fans work out across the
//!   cluster, merges the incremental results streaming back and supervises
//!   completion, cancellation and early exit.
//! - **`worker`**: The target-node side. Executes one dispatched search task:
//!   runs the shard/extraction pipeline and ships result messages back on a
//!   fixed frequency.
//! - **`shard`**: Index metadata, shard searchers, the bounded searcher cache
//!   and the producer that scans shards concurrently.
//! - **`extraction`**: The bounded consumer stage that re-extracts matched
//!   rows through pipelines and feeds coprocessors.
//! - **`coprocessor`**: Per-component result builders: table aggregation and
//!   event-reference collection, producing mergeable payload deltas.
//! - **`query`**: Expression model, parameter binding, query compilation and
//!   the positional field index map.
//! - **`node`**: Cluster member metadata and the target-node registry.
//! - **`task`**: Task identity, cooperative termination contexts and the
//!   shared error queue.
//! - **`config`**: Tunables for queue bounds, concurrency and frequencies.

pub mod cluster;
pub mod config;
pub mod coprocessor;
pub mod extraction;
pub mod node;
pub mod query;
pub mod shard;
pub mod task;
pub mod worker;
