//! `SourceEntity` — an immutable observation of a person from one source
//! (spec §3.2, supplemented by SPEC_FULL.md §10).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The fixed set of data sources an observation can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceType {
  Gmail,
  Calendar,
  Slack,
  Imessage,
  Whatsapp,
  Signal,
  Contacts,
  PhoneContacts,
  Linkedin,
  Vault,
  Granola,
  PhoneCall,
  Phone,
  Photos,
}

impl SourceType {
  pub const ALL: [SourceType; 14] = [
    SourceType::Gmail,
    SourceType::Calendar,
    SourceType::Slack,
    SourceType::Imessage,
    SourceType::Whatsapp,
    SourceType::Signal,
    SourceType::Contacts,
    SourceType::PhoneContacts,
    SourceType::Linkedin,
    SourceType::Vault,
    SourceType::Granola,
    SourceType::PhoneCall,
    SourceType::Phone,
    SourceType::Photos,
  ];
}

/// Aggregate counts for an operator-facing summary (SPEC_FULL.md §10).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceEntityStatistics {
  pub total_entities: usize,
  pub linked_entities: usize,
  pub by_source_type: HashMap<SourceType, usize>,
  pub by_link_status: HashMap<LinkStatus, usize>,
}

/// Whether a link between a `SourceEntity` and a `Person` has been
/// reviewed. Modeled as a tagged variant per spec §9 rather than a bare
/// string, since `Auto` alone carries a confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LinkStatus {
  Auto,
  Confirmed,
  Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntity {
  pub id: Uuid,
  pub source_type: SourceType,
  pub source_id: Option<String>,

  pub observed_name: Option<String>,
  pub observed_email: Option<String>,
  pub observed_phone: Option<String>,

  pub metadata: HashMap<String, Value>,

  pub canonical_person_id: Option<Uuid>,
  pub link_confidence: f64,
  pub link_status: LinkStatus,
  pub linked_at: Option<DateTime<Utc>>,

  pub observed_at: DateTime<Utc>,
  pub created_at: DateTime<Utc>,

  pub match_attempted_at: Option<DateTime<Utc>>,
  pub match_attempt_count: u32,
}

impl SourceEntity {
  pub fn new(source_type: SourceType, source_id: Option<String>) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4(),
      source_type,
      source_id,
      observed_name: None,
      observed_email: None,
      observed_phone: None,
      metadata: HashMap::new(),
      canonical_person_id: None,
      link_confidence: 0.0,
      link_status: LinkStatus::Auto,
      linked_at: None,
      observed_at: now,
      created_at: now,
      match_attempted_at: None,
      match_attempt_count: 0,
    }
  }

  pub fn is_linked(&self) -> bool {
    self.canonical_person_id.is_some() && self.link_status != LinkStatus::Rejected
  }

  pub fn is_confirmed(&self) -> bool {
    self.link_status == LinkStatus::Confirmed
  }
}
