//! Query Model & Compilation Module
//!
//! An immutable [`types::Query`] describes one search: a data-source
//! reference, a boolean expression tree over named fields and bound
//! parameters. Compilation turns the expression into a
//! [`compile::CompiledQuery`] predicate evaluated per matching document.
//!
//! Queries are compiled once per shard format version the first time a node
//! task encounters that version; the compiled form is cached for the life of
//! the task only (amortised, not memoized across tasks).
//!
//! ## Submodules
//! - **`types`**: the query data model (expression tree, params, refs).
//! - **`compile`**: parameter binding, clause counting, predicate evaluation.
//! - **`field_index`**: the shared name-to-slot map for positional rows.

pub mod compile;
pub mod field_index;
pub mod types;
