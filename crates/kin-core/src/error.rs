//! Error types for `kin-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// A resolver/merge/split operation referenced an id that does not
  /// resolve (through the merge chain) to an existing record.
  #[error("not found: {0}")]
  NotFound(Uuid),

  /// Attempted to merge a person into itself, or a write violated a
  /// uniqueness constraint (e.g. duplicate relationship pair).
  #[error("conflict: {0}")]
  Conflict(String),

  /// Attempted to attach an identifier that is on the blocklist.
  #[error("blocked identifier: {0}")]
  Blocked(String),

  /// A safe-write detected a record-count drop beyond the corruption
  /// threshold; the write was aborted and the previous snapshot stands.
  #[error("corruption guard tripped: {0}")]
  CorruptionGuard(String),

  /// Adapter/database I/O failure. The core does not retry internally;
  /// the caller retries with backoff.
  #[error("transient error: {0}")]
  Transient(String),

  /// The resolver's disambiguation path found no clear winner. Not
  /// surfaced as a failure state to the adapter — the caller decides
  /// whether to create, enqueue for review, or drop the observation.
  #[error("ambiguous match: {0}")]
  Ambiguous(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("config error: {0}")]
  Config(#[from] config::ConfigError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
