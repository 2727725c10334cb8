//! `ReviewQueue` — pending human decisions (spec §4.10, SPEC_FULL.md §12).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReviewType {
  Duplicate,
  NonHuman,
  OverMerged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReviewStatus {
  Pending,
  Merged,
  Skipped,
  Hidden,
  Kept,
  Split,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewCandidate {
  pub id: Uuid,
  pub review_type: ReviewType,

  pub person_a_id: Uuid,
  pub person_a_name: String,
  pub person_b_id: Option<Uuid>,
  pub person_b_name: Option<String>,

  pub confidence: f64,
  pub reason: String,
  pub evidence: Option<Value>,

  pub status: ReviewStatus,
  pub reviewed_at: Option<DateTime<Utc>>,
  pub batch_id: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl ReviewCandidate {
  pub fn duplicate(a_id: Uuid, a_name: impl Into<String>, b_id: Uuid, b_name: impl Into<String>, confidence: f64, reason: impl Into<String>) -> Self {
    Self {
      id: Uuid::new_v4(),
      review_type: ReviewType::Duplicate,
      person_a_id: a_id,
      person_a_name: a_name.into(),
      person_b_id: Some(b_id),
      person_b_name: Some(b_name.into()),
      confidence,
      reason: reason.into(),
      evidence: None,
      status: ReviewStatus::Pending,
      reviewed_at: None,
      batch_id: None,
      created_at: Utc::now(),
    }
  }

  pub fn single(review_type: ReviewType, person_id: Uuid, person_name: impl Into<String>, confidence: f64, reason: impl Into<String>) -> Self {
    Self {
      id: Uuid::new_v4(),
      review_type,
      person_a_id: person_id,
      person_a_name: person_name.into(),
      person_b_id: None,
      person_b_name: None,
      confidence,
      reason: reason.into(),
      evidence: None,
      status: ReviewStatus::Pending,
      reviewed_at: None,
      batch_id: None,
      created_at: Utc::now(),
    }
  }

  /// Whether this pending duplicate candidate already covers the
  /// unordered pair `(a, b)` — duplicate insertion is idempotent over it.
  pub fn covers_pair(&self, a: Uuid, b: Uuid) -> bool {
    self.review_type == ReviewType::Duplicate
      && self.status == ReviewStatus::Pending
      && ((self.person_a_id == a && self.person_b_id == Some(b))
        || (self.person_a_id == b && self.person_b_id == Some(a)))
  }
}
