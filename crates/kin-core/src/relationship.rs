//! `Relationship` — an undirected edge between two persons (spec §3.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RelationshipType {
  Coworker,
  Friend,
  Family,
  Inferred,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelCounters {
  pub shared_events_count: u64,
  pub shared_threads_count: u64,
  pub shared_messages_count: u64,
  pub shared_whatsapp_count: u64,
  pub shared_slack_count: u64,
  pub shared_phone_calls_count: u64,
  pub shared_photos_count: u64,
}

impl ChannelCounters {
  pub fn total(&self) -> u64 {
    self.shared_events_count
      + self.shared_threads_count
      + self.shared_messages_count
      + self.shared_whatsapp_count
      + self.shared_slack_count
      + self.shared_phone_calls_count
      + self.shared_photos_count
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
  pub id: Uuid,
  pub person_a_id: Uuid,
  pub person_b_id: Uuid,
  pub relationship_type: RelationshipType,
  pub shared_contexts: Vec<String>,
  pub counters: ChannelCounters,
  pub is_linkedin_connection: bool,
  pub first_seen_together: Option<DateTime<Utc>>,
  pub last_seen_together: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Relationship {
  /// Constructs a new edge, swapping `a`/`b` so `person_a_id < person_b_id`
  /// lexicographically — this is the uniqueness key (spec §3.3).
  pub fn new(a: Uuid, b: Uuid, relationship_type: RelationshipType) -> Self {
    let (person_a_id, person_b_id) = normalize_pair(a, b);
    let now = Utc::now();
    Self {
      id: Uuid::new_v4(),
      person_a_id,
      person_b_id,
      relationship_type,
      shared_contexts: Vec::new(),
      counters: ChannelCounters::default(),
      is_linkedin_connection: false,
      first_seen_together: None,
      last_seen_together: None,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn involves(&self, person_id: Uuid) -> bool {
    self.person_a_id == person_id || self.person_b_id == person_id
  }

  pub fn other_person(&self, person_id: Uuid) -> Option<Uuid> {
    if self.person_a_id == person_id {
      Some(self.person_b_id)
    } else if self.person_b_id == person_id {
      Some(self.person_a_id)
    } else {
      None
    }
  }

  pub fn total_shared_interactions(&self) -> u64 {
    self.counters.total()
  }

  fn add_shared_context(&mut self, ctx: Option<&str>) {
    if let Some(ctx) = ctx
      && !self.shared_contexts.iter().any(|c| c == ctx)
    {
      self.shared_contexts.push(ctx.to_string());
    }
  }

  fn touch(&mut self, at: DateTime<Utc>, ctx: Option<&str>) {
    self.first_seen_together = Some(match self.first_seen_together {
      Some(existing) => existing.min(at),
      None => at,
    });
    self.last_seen_together = Some(match self.last_seen_together {
      Some(existing) => existing.max(at),
      None => at,
    });
    self.add_shared_context(ctx);
    self.updated_at = Utc::now();
  }

  pub fn increment_shared_event(&mut self, at: DateTime<Utc>, ctx: Option<&str>) {
    self.counters.shared_events_count += 1;
    self.touch(at, ctx);
  }

  pub fn increment_shared_thread(&mut self, at: DateTime<Utc>, ctx: Option<&str>) {
    self.counters.shared_threads_count += 1;
    self.touch(at, ctx);
  }

  pub fn increment_shared_message(&mut self, at: DateTime<Utc>, ctx: Option<&str>) {
    self.counters.shared_messages_count += 1;
    self.touch(at, ctx);
  }

  pub fn increment_shared_whatsapp(&mut self, at: DateTime<Utc>, ctx: Option<&str>) {
    self.counters.shared_whatsapp_count += 1;
    self.touch(at, ctx);
  }

  pub fn increment_shared_slack(&mut self, at: DateTime<Utc>, ctx: Option<&str>) {
    self.counters.shared_slack_count += 1;
    self.touch(at, ctx);
  }

  pub fn increment_shared_phone_call(&mut self, at: DateTime<Utc>, ctx: Option<&str>) {
    self.counters.shared_phone_calls_count += 1;
    self.touch(at, ctx);
  }

  pub fn increment_shared_photo(&mut self, at: DateTime<Utc>, ctx: Option<&str>) {
    self.counters.shared_photos_count += 1;
    self.touch(at, ctx);
  }

  /// Merges `other` into `self` when the same pair appears twice after a
  /// rewrite (spec §4.5.1 step 7): counters sum, contexts union, bounds
  /// widen, LinkedIn flag ORs.
  pub fn merge_from(&mut self, other: &Relationship) {
    self.counters.shared_events_count += other.counters.shared_events_count;
    self.counters.shared_threads_count += other.counters.shared_threads_count;
    self.counters.shared_messages_count += other.counters.shared_messages_count;
    self.counters.shared_whatsapp_count += other.counters.shared_whatsapp_count;
    self.counters.shared_slack_count += other.counters.shared_slack_count;
    self.counters.shared_phone_calls_count += other.counters.shared_phone_calls_count;
    self.counters.shared_photos_count += other.counters.shared_photos_count;

    for ctx in &other.shared_contexts {
      self.add_shared_context(Some(ctx));
    }

    self.first_seen_together = earliest(self.first_seen_together, other.first_seen_together);
    self.last_seen_together = latest(self.last_seen_together, other.last_seen_together);
    self.is_linkedin_connection = self.is_linkedin_connection || other.is_linkedin_connection;
    self.updated_at = Utc::now();
  }
}

/// Orders a pair so the lexicographically smaller id is `a` — the store's
/// uniqueness key (spec §3.3).
pub fn normalize_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
  if a < b { (a, b) } else { (b, a) }
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
  match (a, b) {
    (Some(a), Some(b)) => Some(a.min(b)),
    (Some(a), None) => Some(a),
    (None, Some(b)) => Some(b),
    (None, None) => None,
  }
}

fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
  match (a, b) {
    (Some(a), Some(b)) => Some(a.max(b)),
    (Some(a), None) => Some(a),
    (None, Some(b)) => Some(b),
    (None, None) => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_normalizes_pair_order() {
    let a = Uuid::max();
    let b = Uuid::nil();
    let r = Relationship::new(a, b, RelationshipType::Friend);
    assert_eq!(r.person_a_id, b);
    assert_eq!(r.person_b_id, a);
    assert!(r.person_a_id < r.person_b_id);
  }

  #[test]
  fn merge_from_sums_counters_and_unions_contexts() {
    let mut a = Relationship::new(Uuid::nil(), Uuid::max(), RelationshipType::Inferred);
    a.counters.shared_events_count = 2;
    a.shared_contexts.push("Work/".into());

    let mut b = Relationship::new(Uuid::nil(), Uuid::max(), RelationshipType::Inferred);
    b.counters.shared_events_count = 3;
    b.shared_contexts.push("Personal/".into());

    a.merge_from(&b);
    assert_eq!(a.counters.shared_events_count, 5);
    assert_eq!(a.shared_contexts, vec!["Work/", "Personal/"]);
  }
}
