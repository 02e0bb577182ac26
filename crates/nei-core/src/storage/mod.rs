//! # Storage Module
//!
//! Durable storage of simulation runs.

pub mod redb_runs;

pub use redb_runs::{RunId, RunStore, RunSummary};
