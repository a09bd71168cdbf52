//! Cluster Node Registry Module
//!
//! Tracks the set of nodes known to the cluster and whether each is eligible
//! to receive search work. A node must be both *enabled* (administratively
//! allowed to run searches) and *active* (currently reachable) to be part of
//! the target set for a cluster search.
//!
//! The registry is an injected service; membership changes come from
//! whatever discovery mechanism the surrounding platform uses. The search
//! core only reads it when resolving targets at search start.

pub mod registry;
pub mod types;
