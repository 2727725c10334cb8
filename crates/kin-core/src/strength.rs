//! `StrengthEngine` — recency/frequency/diversity scoring for people and
//! relationship pairs, and the global Dunbar-circle ranking pass
//! (spec §4.8).

use chrono::{DateTime, Utc};

use crate::config::StrengthSettings;
use crate::person::{Category, Person};
use crate::relationship::{Relationship, RelationshipType};

pub struct StrengthEngine<'a> {
  settings: &'a StrengthSettings,
}

impl<'a> StrengthEngine<'a> {
  pub fn new(settings: &'a StrengthSettings) -> Self {
    Self { settings }
  }

  /// Time-decay recency component in `[0, 100]`. A `last_interaction` in
  /// the future (clock skew, bad source data) is clamped to zero days
  /// rather than producing a score above 100. Contacts with fewer than
  /// `min_interactions_for_full_recency` total interactions are dampened
  /// by `zero_interaction_recency_multiplier` — a single old email
  /// shouldn't read as "recently close".
  pub fn recency_score(&self, last_interaction: Option<DateTime<Utc>>, total_interactions: u64, now: DateTime<Utc>) -> f64 {
    let Some(last_interaction) = last_interaction else {
      return 0.0;
    };
    let days = (now - last_interaction).num_days().max(0) as f64;
    let window = self.settings.recency_window_days.max(1) as f64;
    let mut score = ((1.0 - days / window).clamp(0.0, 1.0)) * 100.0;
    if total_interactions < self.settings.min_interactions_for_full_recency {
      score *= self.settings.zero_interaction_recency_multiplier;
    }
    score
  }

  /// Hybrid recent/lifetime frequency, each log-scaled against its own
  /// target ceiling so a handful of early heavy users don't dominate
  /// everyone else's scale. Inputs are channel-weighted sums (spec
  /// §4.8.1's `Wrecent`/`Wlife`), not raw interaction counts.
  pub fn frequency_score(&self, recent_weighted: f64, lifetime_weighted: f64) -> f64 {
    let recent = log_scaled(recent_weighted, self.settings.frequency_target);
    let lifetime = log_scaled(lifetime_weighted, self.settings.lifetime_frequency_target);
    (recent * self.settings.recent_frequency_weight + lifetime * self.settings.lifetime_frequency_weight).clamp(0.0, 100.0)
  }

  /// Ratio of distinct channels touched to channels available, in `[0, 100]`.
  /// `unique_sources` is `f64` rather than a count because `pair_strength`
  /// credits LinkedIn-connected edges half a diversity slot (spec §4.8.2).
  pub fn diversity_score(&self, unique_sources: f64, total_sources: usize) -> f64 {
    if total_sources == 0 {
      return 0.0;
    }
    ((unique_sources / total_sources as f64) * 100.0).clamp(0.0, 100.0)
  }

  pub fn combine(&self, recency: f64, frequency: f64, diversity: f64) -> f64 {
    (recency * self.settings.recency_weight + frequency * self.settings.frequency_weight + diversity * self.settings.diversity_weight)
      .clamp(0.0, 100.0)
  }

  /// Full per-person strength computation from rollup inputs (spec §4.8.1).
  /// Step 5's relationship-with-self adjustment only applies when `P` isn't
  /// the graph owner and a pair edge with the owner exists — that edge is
  /// passed in as `input.self_relationship`.
  pub fn person_strength(&self, input: &PersonStrengthInput<'_>) -> f64 {
    let recency = self.recency_score(input.last_interaction, input.total_interactions, input.now);
    let frequency = self.frequency_score(input.recent_weighted, input.lifetime_weighted);
    let diversity = self.diversity_score(input.unique_sources as f64, input.total_sources);
    let base = self.combine(recency, frequency, diversity);

    let multiplier = match input.self_relationship {
      Some(edge) if edge.is_linkedin_connection => self.settings.self_linkedin_multiplier,
      Some(edge) if edge.relationship_type == RelationshipType::Family => self.settings.self_family_multiplier,
      _ => 1.0,
    };
    (base * multiplier).clamp(0.0, 100.0)
  }

  /// Pair strength between two people sharing a `Relationship`, using the
  /// same recency/frequency/diversity shape with the edge's own counters.
  /// LinkedIn-connected edges get half a diversity slot credited on top of
  /// their shared contexts (spec §4.8.2).
  pub fn pair_strength(&self, relationship: &Relationship, now: DateTime<Utc>) -> f64 {
    let total = relationship.total_shared_interactions();
    let recency = self.recency_score(relationship.last_seen_together, total, now);
    let frequency = self.frequency_score(total as f64, total as f64);
    let mut unique_sources = relationship.shared_contexts.len() as f64;
    if relationship.is_linkedin_connection {
      unique_sources += 0.5;
    }
    let diversity = self.diversity_score(unique_sources, self.settings.channel_weights.len().max(1));
    self.combine(recency, frequency, diversity)
  }

  /// Whether a person falls below the "close contact" floor.
  pub fn is_peripheral(&self, strength: f64) -> bool {
    strength < self.settings.peripheral_threshold
  }

  /// Global ranking pass assigning Dunbar circles (spec §4.8.3).
  ///
  /// Peripheral contacts (below `PERIPHERAL_THRESHOLD`) are pulled out to
  /// circle 7 before ranking. The rest are partitioned into work/non-work;
  /// non-work is ranked by effective strength and walked against the
  /// cumulative threshold list, recording the lowest effective strength
  /// that filled each circle as that circle's cutoff. Work contacts are
  /// then placed by matching their own effective strength against those
  /// cutoffs rather than ranked independently — work and personal circles
  /// share one scale. Persons in the override map skip the rank counter
  /// entirely (their override always wins and costs the pool no slot).
  pub fn assign_circles(&self, people: &mut [Person], effective_strength: impl Fn(uuid::Uuid, f64) -> f64, circle_override: impl Fn(uuid::Uuid) -> Option<u8>) {
    for person in people.iter_mut() {
      if person.hidden {
        person.dunbar_circle = None;
        continue;
      }
      person.is_peripheral_contact = self.is_peripheral(person.relationship_strength);
    }

    let effective: std::collections::HashMap<uuid::Uuid, f64> =
      people.iter().filter(|p| !p.hidden).map(|p| (p.id, effective_strength(p.id, p.relationship_strength))).collect();

    let mut work_ids: Vec<uuid::Uuid> = Vec::new();
    let mut other_ids: Vec<uuid::Uuid> = Vec::new();
    for person in people.iter() {
      if person.hidden || person.is_peripheral_contact {
        continue;
      }
      if person.category == Category::Work {
        work_ids.push(person.id);
      } else {
        other_ids.push(person.id);
      }
    }
    other_ids.sort_by(|a, b| effective[b].partial_cmp(&effective[a]).unwrap());

    let mut circle_by_id: std::collections::HashMap<uuid::Uuid, u8> = std::collections::HashMap::new();
    let mut cutoffs: Vec<f64> = vec![f64::INFINITY; self.settings.circle_thresholds.len()];
    let mut rank = 0u32;
    for id in &other_ids {
      if circle_override(*id).is_some() {
        continue;
      }
      rank += 1;
      if let Some(idx) = self.settings.circle_thresholds.iter().position(|threshold| rank <= *threshold) {
        circle_by_id.insert(*id, (idx + 1) as u8);
        cutoffs[idx] = cutoffs[idx].min(effective[id]);
      }
    }

    for id in &work_ids {
      if circle_override(*id).is_some() {
        continue;
      }
      let strength = effective[id];
      let circle = cutoffs
        .iter()
        .position(|cutoff| cutoff.is_finite() && strength >= *cutoff)
        .map(|idx| (idx + 1) as u8)
        .unwrap_or(6);
      circle_by_id.insert(*id, circle);
    }

    for person in people.iter_mut() {
      if person.hidden {
        continue;
      }
      if person.is_peripheral_contact {
        person.dunbar_circle = circle_override(person.id).or(Some(7));
        continue;
      }
      person.dunbar_circle = circle_override(person.id).or_else(|| circle_by_id.get(&person.id).copied());
    }
  }
}

pub struct PersonStrengthInput<'a> {
  pub last_interaction: Option<DateTime<Utc>>,
  pub now: DateTime<Utc>,
  /// Total (unweighted) interaction count, used only to gate the
  /// sparse-history recency dampener.
  pub total_interactions: u64,
  /// `Σ channel_weight × count` within the recency window.
  pub recent_weighted: f64,
  /// `Σ channel_weight × count` over all time.
  pub lifetime_weighted: f64,
  pub unique_sources: usize,
  pub total_sources: usize,
  /// The pair edge between this person and the graph owner, if one exists
  /// and this person isn't the owner themself (spec §4.8.1 step 5).
  pub self_relationship: Option<&'a Relationship>,
}

fn log_scaled(weighted: f64, target: f64) -> f64 {
  let target = target.max(1.0);
  (weighted.max(0.0).ln_1p() / target.ln_1p() * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn recency_decays_to_zero_outside_window() {
    let settings = StrengthSettings::default();
    let engine = StrengthEngine::new(&settings);
    let now = Utc::now();
    let long_ago = now - Duration::days(settings.recency_window_days * 2);
    assert_eq!(engine.recency_score(Some(long_ago), 10, now), 0.0);
  }

  #[test]
  fn future_timestamp_clamps_instead_of_exceeding_max() {
    let settings = StrengthSettings::default();
    let engine = StrengthEngine::new(&settings);
    let now = Utc::now();
    let future = now + Duration::days(30);
    let score = engine.recency_score(Some(future), 10, now);
    assert!((0.0..=100.0).contains(&score));
  }

  #[test]
  fn sparse_history_is_dampened() {
    let settings = StrengthSettings::default();
    let engine = StrengthEngine::new(&settings);
    let now = Utc::now();
    let recent = now - Duration::days(1);
    let full = engine.recency_score(Some(recent), 10, now);
    let dampened = engine.recency_score(Some(recent), 1, now);
    assert!(dampened < full);
  }

  #[test]
  fn frequency_is_log_scaled_not_linear() {
    let settings = StrengthSettings::default();
    let engine = StrengthEngine::new(&settings);
    let low = engine.frequency_score(5.0, 5.0);
    let high = engine.frequency_score(500.0, 500.0);
    assert!(high > low);
    assert!(high <= 100.0);
  }

  #[test]
  fn linkedin_connection_gets_a_small_bonus() {
    let settings = StrengthSettings::default();
    let engine = StrengthEngine::new(&settings);
    let now = Utc::now();
    let mut r = Relationship::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), RelationshipType::Inferred);
    r.last_seen_together = Some(now);
    r.counters.shared_events_count = 3;
    let plain = engine.pair_strength(&r, now);
    r.is_linkedin_connection = true;
    let boosted = engine.pair_strength(&r, now);
    assert!(boosted >= plain);
  }

  #[test]
  fn self_relationship_multiplier_only_applies_when_edge_present() {
    let settings = StrengthSettings::default();
    let engine = StrengthEngine::new(&settings);
    let now = Utc::now();

    fn input(now: DateTime<Utc>, self_relationship: Option<&Relationship>) -> PersonStrengthInput<'_> {
      PersonStrengthInput {
        last_interaction: Some(now),
        now,
        total_interactions: 10,
        recent_weighted: 20.0,
        lifetime_weighted: 40.0,
        unique_sources: 2,
        total_sources: 4,
        self_relationship,
      }
    }

    let plain = engine.person_strength(&input(now, None));

    let mut edge = Relationship::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), RelationshipType::Family);
    let with_family_edge = engine.person_strength(&input(now, Some(&edge)));
    assert!(with_family_edge > plain);

    edge.relationship_type = RelationshipType::Inferred;
    edge.is_linkedin_connection = true;
    let with_linkedin_edge = engine.person_strength(&input(now, Some(&edge)));
    assert!(with_linkedin_edge > plain);
    assert!(with_family_edge > with_linkedin_edge);
  }
}
