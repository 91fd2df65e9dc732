//! Core types and trait definitions for the dimvault dimension store.
//!
//! This crate is deliberately free of database and CLI dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod attr;
pub mod chain;
pub mod error;
pub mod profile;
pub mod store;
pub mod version;

pub use error::{Error, Result};
