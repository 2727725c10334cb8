//! The canonical `Person` record (spec §3.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Derived classification of a person, used to weight merge priority and
/// to split the Dunbar-circle ranking pass into work / non-work pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Category {
  /// The owner of the graph themself.
  #[strum(serialize = "self")]
  #[serde(rename = "self")]
  Myself,
  Family,
  Work,
  Personal,
  Unknown,
}

impl Category {
  /// Lower number wins merge ties, per spec §4.5.1 step 3.
  pub fn merge_priority(self) -> u8 {
    match self {
      Category::Myself => 0,
      Category::Family => 1,
      Category::Work => 2,
      Category::Personal => 3,
      Category::Unknown => 4,
    }
  }
}

impl Default for Category {
  fn default() -> Self {
    Category::Unknown
  }
}

/// Cached rollups over the `InteractionStore` (spec §4.9). Never
/// incrementally adjusted — always recomputed from the event log after any
/// operation that rewrites `person_id` on an interaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
  pub meeting_count: u64,
  pub email_count: u64,
  pub mention_count: u64,
  pub message_count: u64,
  pub slack_message_count: u64,
  pub source_entity_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
  pub id: Uuid,
  pub canonical_name: String,
  pub display_name: String,

  /// Insertion-order-preserved logical set; first element is primary.
  /// Per spec §9 "Collection semantics" this is not reordered by
  /// normalization.
  pub emails: Vec<String>,
  /// Insertion-order-preserved logical set of E.164 numbers.
  pub phone_numbers: Vec<String>,
  pub phone_primary: Option<String>,

  pub company: Option<String>,
  pub position: Option<String>,
  pub linkedin_url: Option<String>,

  pub category: Category,

  pub vault_contexts: Vec<String>,
  pub sources: Vec<String>,
  pub aliases: Vec<String>,

  pub first_seen: Option<DateTime<Utc>>,
  pub last_seen: Option<DateTime<Utc>>,

  pub counts: Counts,

  pub tags: Vec<String>,
  pub notes: Option<String>,
  /// `MM-DD`.
  pub birthday: Option<String>,

  pub hidden: bool,
  pub hidden_at: Option<DateTime<Utc>>,
  pub hidden_reason: Option<String>,

  pub confidence_score: f64,
  pub relationship_strength: f64,
  pub is_peripheral_contact: bool,
  pub dunbar_circle: Option<u8>,
}

impl Person {
  pub fn new(canonical_name: impl Into<String>) -> Self {
    let canonical_name = canonical_name.into();
    let now = Utc::now();
    Self {
      id: Uuid::new_v4(),
      display_name: canonical_name.clone(),
      canonical_name,
      emails: Vec::new(),
      phone_numbers: Vec::new(),
      phone_primary: None,
      company: None,
      position: None,
      linkedin_url: None,
      category: Category::Unknown,
      vault_contexts: Vec::new(),
      sources: Vec::new(),
      aliases: Vec::new(),
      first_seen: Some(now),
      last_seen: Some(now),
      counts: Counts::default(),
      tags: Vec::new(),
      notes: None,
      birthday: None,
      hidden: false,
      hidden_at: None,
      hidden_reason: None,
      confidence_score: 1.0,
      relationship_strength: 0.0,
      is_peripheral_contact: false,
      dunbar_circle: None,
    }
  }

  pub fn primary_email(&self) -> Option<&str> {
    self.emails.first().map(String::as_str)
  }

  /// `clamp`s the setter so `relationship_strength` never leaves `[0, 100]`.
  pub fn set_relationship_strength(&mut self, value: f64) {
    self.relationship_strength = value.clamp(0.0, 100.0);
  }

  pub fn has_email(&self, email: &str) -> bool {
    let email = email.to_lowercase();
    self.emails.iter().any(|e| e.eq_ignore_ascii_case(&email))
  }

  /// Inserts a lowercased email if not already present, preserving order.
  pub fn add_email(&mut self, email: &str) {
    let email = email.to_lowercase();
    if !self.has_email(&email) {
      self.emails.push(email);
    }
  }

  pub fn has_phone(&self, phone: &str) -> bool {
    self.phone_numbers.iter().any(|p| p == phone)
  }

  pub fn add_phone(&mut self, phone: &str) {
    if !self.has_phone(phone) {
      self.phone_numbers.push(phone.to_string());
      if self.phone_primary.is_none() {
        self.phone_primary = Some(phone.to_string());
      }
    }
  }

  pub fn add_tag(&mut self, tag: &str) {
    let tag = tag.to_lowercase();
    if !self.tags.contains(&tag) {
      self.tags.push(tag);
    }
  }

  pub fn remove_tag(&mut self, tag: &str) {
    let tag = tag.to_lowercase();
    self.tags.retain(|t| t != &tag);
  }

  /// Merges `other` (the secondary) into `self` (the primary) in place.
  /// Field-by-field rules per spec §4.5.1 step 2-3.
  ///
  /// Does not touch interactions, source entities, relationships, the
  /// merge chain, or counts — those are the caller's (`MergeEngine`)
  /// responsibility, since they require store access this method does not
  /// have.
  pub fn absorb(&mut self, other: &Person) {
    for email in &other.emails {
      self.add_email(email);
    }
    for phone in &other.phone_numbers {
      self.add_phone(phone);
    }
    if self.phone_primary.is_none() {
      self.phone_primary = other.phone_primary.clone();
    }

    push_unique(&mut self.aliases, &other.canonical_name);
    for alias in &other.aliases {
      push_unique(&mut self.aliases, alias);
    }

    for source in &other.sources {
      push_unique(&mut self.sources, source);
    }
    for tag in &other.tags {
      self.add_tag(tag);
    }
    for ctx in &other.vault_contexts {
      push_unique(&mut self.vault_contexts, ctx);
    }

    if self.company.is_none() {
      self.company = other.company.clone();
    }
    if self.position.is_none() {
      self.position = other.position.clone();
    }
    if self.linkedin_url.is_none() {
      self.linkedin_url = other.linkedin_url.clone();
    }
    if self.birthday.is_none() {
      self.birthday = other.birthday.clone();
    }

    match (&self.notes, &other.notes) {
      (Some(a), Some(b)) if a != b => {
        self.notes = Some(format!("{a}\n\n---\n\n{b}"));
      }
      (None, Some(b)) => self.notes = Some(b.clone()),
      _ => {}
    }

    // Category resolution by priority: keep primary unless secondary is
    // strictly higher priority (lower number).
    if other.category.merge_priority() < self.category.merge_priority() {
      self.category = other.category;
    }

    self.confidence_score = ((self.confidence_score + other.confidence_score) / 2.0) * 0.95;

    self.first_seen = earliest(self.first_seen, other.first_seen);
    self.last_seen = latest(self.last_seen, other.last_seen);
  }
}

fn push_unique(vec: &mut Vec<String>, item: &str) {
  if !vec.iter().any(|existing| existing.eq_ignore_ascii_case(item)) {
    vec.push(item.to_string());
  }
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
  fn absorb_unions_emails_preserving_order() {
    let mut primary = Person::new("Alex Johnson");
    primary.add_email("alex@work.example.com");
    let mut secondary = Person::new("Alex J.");
    secondary.add_email("alex@personal.example.com");
    secondary.add_email("ALEX@WORK.EXAMPLE.COM");

    primary.absorb(&secondary);

    assert_eq!(
      primary.emails,
      vec!["alex@work.example.com", "alex@personal.example.com"]
    );
  }

  #[test]
  fn absorb_prefers_higher_priority_category() {
    let mut primary = Person::new("A");
    primary.category = Category::Unknown;
    let mut secondary = Person::new("B");
    secondary.category = Category::Family;

    primary.absorb(&secondary);
    assert_eq!(primary.category, Category::Family);
  }

  #[test]
  fn absorb_keeps_primary_category_when_secondary_lower_priority() {
    let mut primary = Person::new("A");
    primary.category = Category::Work;
    let mut secondary = Person::new("B");
    secondary.category = Category::Personal;

    primary.absorb(&secondary);
    assert_eq!(primary.category, Category::Work);
  }

  #[test]
  fn absorb_concatenates_distinct_notes() {
    let mut primary = Person::new("A");
    primary.notes = Some("first note".into());
    let mut secondary = Person::new("B");
    secondary.notes = Some("second note".into());

    primary.absorb(&secondary);
    assert_eq!(primary.notes.as_deref(), Some("first note\n\n---\n\nsecond note"));
  }
}
