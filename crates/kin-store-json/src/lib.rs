//! JSON-file-backed `PersonStore`: the canonical-identity half of the
//! storage layer. `SourceEntity`, `Relationship`, `Interaction`,
//! `LinkOverride`, and the review queue all live in `kin-store-sqlite`
//! instead — see that crate.

mod snapshot;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::JsonPersonStore;

#[cfg(test)]
mod tests;
