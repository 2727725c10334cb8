//! `Interaction` — an append-only timestamped event (spec §3.4). Serves as
//! the ground truth from which `Person` and `Relationship` counts are
//! recomputed (spec §4.9); rollups never add to counts, they recompute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::source_entity::SourceType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
  pub id: Uuid,
  pub person_id: Uuid,
  pub timestamp: DateTime<Utc>,
  pub source_type: SourceType,
  pub title: Option<String>,
  pub snippet: Option<String>,
  pub source_link: Option<String>,
  /// Dedup key alongside `source_type`: `add_if_not_exists` is idempotent
  /// on `(source_type, source_id)` (spec §6.4).
  pub source_id: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl Interaction {
  pub fn new(person_id: Uuid, timestamp: DateTime<Utc>, source_type: SourceType) -> Self {
    Self {
      id: Uuid::new_v4(),
      person_id,
      timestamp,
      source_type,
      title: None,
      snippet: None,
      source_link: None,
      source_id: None,
      created_at: Utc::now(),
    }
  }
}

/// Recomputed `Person.counts` fields, derived by scanning a person's
/// interactions. Never stored incrementally — always derived (spec §4.9).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollupCounts {
  pub meeting_count: u64,
  pub email_count: u64,
  pub mention_count: u64,
  pub message_count: u64,
  pub slack_message_count: u64,
}

impl RollupCounts {
  /// Folds a slice of interactions into rollup counts. `calendar` maps to
  /// meetings, `gmail` to emails, `vault`/`granola` to mentions, `slack`
  /// to slack messages, and `imessage`/`whatsapp`/`signal`/`phone_call` to
  /// generic messages, mirroring the Python aggregator's source→field
  /// mapping.
  pub fn from_interactions<'a>(interactions: impl IntoIterator<Item = &'a Interaction>) -> Self {
    let mut counts = RollupCounts::default();
    for interaction in interactions {
      match interaction.source_type {
        SourceType::Calendar => counts.meeting_count += 1,
        SourceType::Gmail => counts.email_count += 1,
        SourceType::Vault | SourceType::Granola => counts.mention_count += 1,
        SourceType::Slack => counts.slack_message_count += 1,
        SourceType::Imessage | SourceType::Whatsapp | SourceType::Signal | SourceType::PhoneCall => {
          counts.message_count += 1
        }
        SourceType::Contacts
        | SourceType::PhoneContacts
        | SourceType::Linkedin
        | SourceType::Phone
        | SourceType::Photos => {}
      }
    }
    counts
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rollup_classifies_by_source_type() {
    let p = Uuid::new_v4();
    let now = Utc::now();
    let interactions = vec![
      Interaction::new(p, now, SourceType::Gmail),
      Interaction::new(p, now, SourceType::Gmail),
      Interaction::new(p, now, SourceType::Calendar),
      Interaction::new(p, now, SourceType::Slack),
      Interaction::new(p, now, SourceType::Vault),
    ];
    let counts = RollupCounts::from_interactions(&interactions);
    assert_eq!(counts.email_count, 2);
    assert_eq!(counts.meeting_count, 1);
    assert_eq!(counts.slack_message_count, 1);
    assert_eq!(counts.mention_count, 1);
  }
}
