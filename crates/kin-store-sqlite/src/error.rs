//! Error type for `kin-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] kin_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown enum value: {0}")]
  UnknownEnumValue(String),

  #[error("not found: {0}")]
  NotFound(uuid::Uuid),
}

impl From<Error> for kin_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(inner) => inner,
      Error::NotFound(id) => kin_core::Error::NotFound(id),
      other => kin_core::Error::Transient(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
