//! `LinkOverride` — a rule pinning future resolutions for a name/source/
//! context pattern to a chosen person (spec §4.7, SPEC_FULL.md §11).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkOverride {
  pub id: Uuid,
  pub name_pattern: String,
  pub source_type: Option<String>,
  pub context_pattern: Option<String>,
  pub preferred_person_id: Uuid,
  pub rejected_person_id: Option<Uuid>,
  pub reason: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl LinkOverride {
  pub fn new(name_pattern: impl Into<String>, preferred_person_id: Uuid) -> Self {
    Self {
      id: Uuid::new_v4(),
      name_pattern: name_pattern.into(),
      source_type: None,
      context_pattern: None,
      preferred_person_id,
      rejected_person_id: None,
      reason: None,
      created_at: Utc::now(),
    }
  }

  pub fn matches(&self, name: &str, source_type: Option<&str>, context_path: Option<&str>) -> bool {
    if !self.name_pattern.eq_ignore_ascii_case(name) {
      return false;
    }
    if let (Some(want), Some(got)) = (&self.source_type, source_type)
      && !want.eq_ignore_ascii_case(got)
    {
      return false;
    }
    if let (Some(pattern), Some(path)) = (&self.context_pattern, context_path)
      && !path.to_lowercase().contains(&pattern.to_lowercase())
    {
      return false;
    }
    true
  }

  /// Number of optional fields populated on this rule; used to pick the
  /// most specific match when several rules match (spec §4.7).
  pub fn specificity(&self) -> u8 {
    self.source_type.is_some() as u8 + self.context_pattern.is_some() as u8
  }
}

/// Picks the most specific matching override, ties broken by most recent
/// `created_at`. `overrides` is expected to already be sorted
/// `created_at DESC` (as the store returns them), so a stable sort on
/// specificity preserves recency among ties.
pub fn find_matching<'a>(
  overrides: &'a [LinkOverride],
  name: &str,
  source_type: Option<&str>,
  context_path: Option<&str>,
) -> Option<&'a LinkOverride> {
  // `max_by_key` returns the *last* element on ties, but `overrides` is
  // sorted `created_at DESC`, so the first tied element is the most
  // recent one and must win. Fold manually instead.
  overrides
    .iter()
    .filter(|o| o.matches(name, source_type, context_path))
    .fold(None, |best: Option<&LinkOverride>, candidate| match best {
      Some(b) if b.specificity() >= candidate.specificity() => Some(b),
      _ => Some(candidate),
    })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn most_specific_rule_wins() {
    let p1 = Uuid::new_v4();
    let p2 = Uuid::new_v4();
    let mut general = LinkOverride::new("Sarah", p1);
    general.created_at = Utc::now();

    let mut specific = LinkOverride::new("Sarah", p2);
    specific.context_pattern = Some("Work/".into());
    specific.created_at = Utc::now();

    let overrides = vec![specific.clone(), general.clone()];
    let found = find_matching(&overrides, "sarah", None, Some("/vault/Work/notes.md")).unwrap();
    assert_eq!(found.id, specific.id);
  }

  #[test]
  fn name_mismatch_excludes_rule() {
    let rule = LinkOverride::new("Sarah", Uuid::new_v4());
    assert!(!rule.matches("Sam", None, None));
  }
}
