//! # Formats Module
//!
//! Serialization formats for simulation records.
//!
//! File I/O operations are in the app layer.

pub mod persistence;

pub use persistence::{MAX_PERSISTENCE_PAYLOAD_SIZE, PersistenceHeader, run_from_bytes, run_to_bytes};
