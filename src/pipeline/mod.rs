//! Batch pipeline stages.
//!
//! Each stage takes its inputs and the cache handle explicitly; `batch`
//! wires them together into one run.

pub mod batch;
pub mod daily;
pub mod freshness;
pub mod summary;
pub mod weekly;
