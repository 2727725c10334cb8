//! SQLite backend for source entities, relationships, interactions, link
//! overrides, and the review queue. `Person` itself lives in
//! `kin-store-json` — see that crate for the canonical-identity half of the
//! storage layer.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
