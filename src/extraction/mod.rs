//! Extraction Module
//!
//! Between the shard producer and the coprocessors sits an optional
//! extraction step: matched raw rows are grouped by their source stream and
//! run through an extraction pipeline that maps stored values into the field
//! slots the coprocessors expect. Components that need no extraction are fed
//! raw rows directly (the direct-transfer path); both paths share one
//! consumer loop over the bounded transfer queue.
//!
//! ## Submodules
//! - **`pipeline`**: the opaque pipeline contract plus the field-mapping
//!   default implementation.
//! - **`producer`**: the transfer loop, stream grouping and the bounded
//!   extraction worker pool.

pub mod pipeline;
pub mod producer;

#[cfg(test)]
mod tests;
