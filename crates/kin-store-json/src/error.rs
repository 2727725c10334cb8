//! Error type for `kin-store-json`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] kin_core::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A safe write would have dropped the record count by more than the
  /// corruption threshold; the write was aborted.
  #[error("corruption guard tripped: {0}")]
  CorruptionGuard(String),

  #[error("not found: {0}")]
  NotFound(Uuid),
}

impl From<Error> for kin_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(inner) => inner,
      Error::NotFound(id) => kin_core::Error::NotFound(id),
      Error::CorruptionGuard(msg) => kin_core::Error::CorruptionGuard(msg),
      other => kin_core::Error::Transient(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
