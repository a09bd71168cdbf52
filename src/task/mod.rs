//! Task Lifecycle Module
//!
//! Cooperative cancellation for the search task tree. Every unit of search
//! work carries an explicit [`context::TaskContext`] token and re-checks it at
//! each loop iteration; there is no ambient terminated-flag state. Node-local
//! tasks register with a [`context::TaskManager`] so that a cluster-wide
//! terminate-by-ancestor broadcast can reach every descendant of the
//! originating search task.

pub mod context;
pub mod errors;
pub mod types;
