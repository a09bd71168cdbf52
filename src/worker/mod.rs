//! Node Search Execution Module
//!
//! Runs the local portion of a distributed search on one node: builds
//! coprocessors from the dispatched settings, drives the shard and
//! extraction producers, and streams incremental result messages back to the
//! requesting node at the configured frequency.
//!
//! The search work and the send-data loop run concurrently; termination of
//! the parent task stops both at their next loop iteration. If delivering a
//! result back to the requesting node fails (typically because that node has
//! already terminated the search), the local task is terminated rather than
//! retried.
//!
//! ## Submodules
//! - **`handler`**: node task entry point and producer wiring.
//! - **`sender`**: the independent send-data loop.
//! - **`types`**: dispatch/result message shapes and the callback contract.

pub mod handler;
pub mod sender;
pub mod types;

#[cfg(test)]
mod tests;
