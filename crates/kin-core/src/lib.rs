//! Core domain types, storage traits, and engines for the relationship
//! graph: identity resolution, merge/split, and interaction-strength
//! scoring.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Concrete backends (`kin-store-sqlite`, `kin-store-json`) implement the
//! traits in [`store`]; `kin-cli` wires a backend and the engines here
//! together at startup.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod config;
pub mod error;
pub mod interaction;
pub mod link_override;
pub mod merge_engine;
pub mod name;
pub mod nickname;
pub mod person;
pub mod relationship;
pub mod resolver;
pub mod review_queue;
pub mod source_entity;
pub mod store;
pub mod strength;

pub use error::{Error, Result};
