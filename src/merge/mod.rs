//! Merge engines for workload configuration overrides
//!
//! Pure, deterministic merge functions used by the manifest hook pipeline:
//!
//! - [`merge_args`] / [`merge_env`] / [`merge_labels`]: key-based
//!   last-write-wins merges for command-line arguments, environment
//!   variables, and label maps
//! - [`merge_resources`] / [`merge_scheduling`]: per-key merges for
//!   CPU/memory quotas and pod placement constraints
//!
//! Argument and environment output is always sorted: sorted output makes
//! the merge idempotent and diff-stable across reconcile passes, so the
//! apply step never sees a spurious change from map iteration order.

mod args;
mod resources;

pub use args::{merge_args, merge_env, merge_labels, parse_args};
pub use resources::{merge_resources, merge_scheduling};
