//! # nei - THE BINARY
//!
//! Library half of the `nei` application, shared by `main.rs` and the
//! integration tests.
//!
//! - [`config`]: TOML run configuration
//! - [`cli`]: clap commands over the run database
//! - [`api`]: axum REST API

pub mod api;
pub mod cli;
pub mod config;
