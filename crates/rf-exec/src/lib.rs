//! rf-exec - Plan executor for Ruleflow
//!
//! Streams the primary source in bounded batches, folds rows into per-group
//! accumulators, computes derived and rank columns over the finished groups,
//! and upserts the result into the target in a single atomic write.

pub mod error;
pub mod executor;
pub mod rank;

pub use error::{ExecResult, ExecutionError};
pub use executor::PlanExecutor;
pub use rank::assign_ranks;
