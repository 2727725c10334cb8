//! `EntityResolver` — three-pass matching of an observed identity to an
//! existing `Person`, or a decision to create one (spec §4.6).

use chrono::{DateTime, Utc};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use crate::config::{ConfigRegistry, EntityResolutionSettings};
use crate::name::{ParsedName, parse_name};
use crate::person::Person;
use uuid::Uuid;

/// What was observed about a person on a single source record, stripped
/// of anything backend-specific. Built by the caller from a
/// `SourceEntity` before resolution.
#[derive(Debug, Clone, Default)]
pub struct ObservedIdentity {
  pub name: Option<String>,
  pub email: Option<String>,
  pub phone: Option<String>,
  pub context_path: Option<String>,
  pub observed_at: Option<DateTime<Utc>>,
}

/// Points awarded for each matched component, kept separate so the review
/// UI can show why a candidate scored the way it did (spec §9 "Name
/// scoring": "expose a breakdown for any decision").
#[derive(Debug, Clone, Copy)]
pub struct ScoreBreakdown {
  pub last_name: f64,
  pub first_name: f64,
  pub cross_match: f64,
  pub middle_name: f64,
  pub alias_bonus: f64,
  pub context_boost: f64,
  pub recency_boost: f64,
  pub relationship_boost: f64,
  pub ambiguity_bonus: f64,
}

impl ScoreBreakdown {
  pub fn total(&self) -> f64 {
    (self.last_name
      + self.first_name
      + self.cross_match
      + self.middle_name
      + self.alias_bonus
      + self.context_boost
      + self.recency_boost
      + self.relationship_boost
      + self.ambiguity_bonus)
      .clamp(0.0, 100.0)
  }
}

/// A "small bonus" per spec §4.6.2's first-name-only ambiguity resolution;
/// not configuration, since §13's settings list does not name it.
const UNIQUE_MATCH_BONUS: f64 = 5.0;
const SCORE_DOMINANT_BONUS: f64 = 5.0;
const SCORE_DOMINANT_MARGIN: f64 = 20.0;
const CLOSE_STRENGTH_THRESHOLD: f64 = 30.0;
const CLOSE_STRENGTH_MARGIN: f64 = 25.0;
const RELATIONSHIP_BOOST_WEIGHT: f64 = 0.1;
const RELATIONSHIP_BOOST_CAP: f64 = 15.0;
const FIRST_NAME_ONLY_BOOST_MULTIPLIER: f64 = 1.5;
const FUZZY_MATCH_THRESHOLD: f64 = 85.0;

#[derive(Debug, Clone, Copy)]
pub struct Candidate {
  pub person_id: Uuid,
  pub score: ScoreBreakdown,
}

#[derive(Debug, Clone)]
pub enum ResolutionOutcome {
  /// A single confident match, by exact anchor (email/phone) or by a
  /// fuzzy name score clear of every other candidate.
  Matched { person_id: Uuid, score: f64 },
  /// Two or more candidates scored within `close_candidate_strength_margin`
  /// of each other above the disambiguation threshold — a human call.
  Ambiguous { candidates: Vec<Candidate> },
  /// Nothing scored above `min_match_score`; the caller should create a
  /// new `Person`.
  NoMatch,
}

pub struct EntityResolver<'a> {
  config: &'a ConfigRegistry,
}

impl<'a> EntityResolver<'a> {
  pub fn new(config: &'a ConfigRegistry) -> Self {
    Self { config }
  }

  /// Pass 1: exact anchor match on email or phone. Anchors are treated as
  /// disqualifying-proof: a shared verified email or phone always wins,
  /// without running the fuzzy name pass at all.
  pub fn resolve_by_anchor(&self, observed: &ObservedIdentity, candidates: &[Person]) -> Option<Uuid> {
    if let Some(email) = observed.email.as_deref() {
      if let Some(person) = candidates.iter().find(|p| p.has_email(email)) {
        return Some(person.id);
      }
    }
    if let Some(phone) = observed.phone.as_deref() {
      if let Some(person) = candidates.iter().find(|p| p.has_phone(phone)) {
        return Some(person.id);
      }
    }
    None
  }

  /// Pass 2 + 3: structured fuzzy name match with hard disqualifiers and
  /// additive scoring, followed by disambiguation.
  pub fn resolve_by_name(&self, observed: &ObservedIdentity, candidates: &[Person]) -> ResolutionOutcome {
    let Some(name) = observed.name.as_deref() else {
      return ResolutionOutcome::NoMatch;
    };
    let settings = &self.config.settings.entity_resolution;
    let query = parse_name(name);
    let first_name_only = query.last.is_none();

    let scored: Vec<Candidate> = candidates
      .iter()
      .filter_map(|candidate| {
        self
          .score_candidate(&query, observed, candidate)
          .map(|score| Candidate { person_id: candidate.id, score })
      })
      .collect();

    if first_name_only {
      return self.resolve_first_name_only(candidates, scored, settings);
    }

    let mut scored = scored;
    scored.retain(|c| c.score.total() >= settings.min_match_score);
    scored.sort_by(|a, b| b.score.total().partial_cmp(&a.score.total()).unwrap());

    match scored.as_slice() {
      [] => ResolutionOutcome::NoMatch,
      [only] => ResolutionOutcome::Matched { person_id: only.person_id, score: only.score.total() },
      [best, rest @ ..] => {
        if best.score.total() - rest[0].score.total() >= settings.disambiguation_threshold {
          ResolutionOutcome::Matched { person_id: best.person_id, score: best.score.total() }
        } else {
          let margin = settings.close_candidate_strength_margin;
          let mut contenders: Vec<Candidate> = rest.iter().filter(|c| best.score.total() - c.score.total() < margin).copied().collect();
          contenders.insert(0, *best);
          ResolutionOutcome::Ambiguous { candidates: contenders }
        }
      }
    }
  }

  /// §4.6.2's separate ambiguity-resolution path for first-name-only
  /// queries: a unique survivor or a dominant leader wins outright; a
  /// near-tie is broken by relationship strength; otherwise no match.
  fn resolve_first_name_only(&self, candidates: &[Person], scored: Vec<Candidate>, settings: &EntityResolutionSettings) -> ResolutionOutcome {
    let mut above: Vec<Candidate> = scored.into_iter().filter(|c| c.score.total() >= settings.min_match_score).collect();
    if above.is_empty() {
      return ResolutionOutcome::NoMatch;
    }
    above.sort_by(|a, b| b.score.total().partial_cmp(&a.score.total()).unwrap());

    if above.len() == 1 {
      let mut winner = above[0];
      winner.score.ambiguity_bonus += UNIQUE_MATCH_BONUS;
      return ResolutionOutcome::Matched { person_id: winner.person_id, score: winner.score.total() };
    }

    if above[0].score.total() - above[1].score.total() >= SCORE_DOMINANT_MARGIN {
      let mut winner = above[0];
      winner.score.ambiguity_bonus += SCORE_DOMINANT_BONUS;
      return ResolutionOutcome::Matched { person_id: winner.person_id, score: winner.score.total() };
    }

    let strength_of = |id: Uuid| candidates.iter().find(|p| p.id == id).map(|p| p.relationship_strength).unwrap_or(0.0);
    let mut close: Vec<Candidate> = above.iter().copied().filter(|c| strength_of(c.person_id) > CLOSE_STRENGTH_THRESHOLD).collect();
    close.sort_by(|a, b| strength_of(b.person_id).partial_cmp(&strength_of(a.person_id)).unwrap());

    match close.as_slice() {
      [only] => ResolutionOutcome::Matched { person_id: only.person_id, score: only.score.total() },
      [best, next, ..] if strength_of(best.person_id) - strength_of(next.person_id) >= CLOSE_STRENGTH_MARGIN => {
        ResolutionOutcome::Matched { person_id: best.person_id, score: best.score.total() }
      }
      _ => ResolutionOutcome::NoMatch,
    }
  }

  /// Runs pass 1 then falls back to pass 2/3.
  pub fn resolve(&self, observed: &ObservedIdentity, candidates: &[Person]) -> ResolutionOutcome {
    if let Some(person_id) = self.resolve_by_anchor(observed, candidates) {
      return ResolutionOutcome::Matched { person_id, score: 100.0 };
    }
    self.resolve_by_name(observed, candidates)
  }

  /// Returns `None` if the hard last-name disqualifier fires, or the score
  /// floor (20 points) is not cleared, else the additive score breakdown
  /// (spec §4.6.2).
  fn score_candidate(&self, query: &ParsedName, observed: &ObservedIdentity, candidate: &Person) -> Option<ScoreBreakdown> {
    let first_name_only = query.last.is_none();
    let query_first = query.first_lower();
    let candidate_parsed = parse_name(&candidate.canonical_name);
    let candidate_first = candidate_parsed.first_lower();

    if let Some(query_last) = query.last_lower() {
      if !first_name_only {
        let last_matches = |last: String| self.last_name_tier(&query_last, &last) > 0.0 || self.config.nicknames.are_variants(&query_last, &last);
        let canonical_ok = candidate_parsed.last_lower().is_some_and(last_matches);
        let alias_ok = candidate.aliases.iter().filter_map(|a| parse_name(a).last_lower()).any(last_matches);
        if !canonical_ok && !alias_ok {
          return None;
        }
      }
    }

    let last_name = query.last_lower().and_then(|q| candidate_parsed.last_lower().map(|c| self.last_name_tier(&q, &c))).unwrap_or(0.0);

    let (first_name, mut first_matched) = self.first_name_tier(&query_first, &candidate_first);

    let cross_match = if first_matched {
      0.0
    } else {
      self.cross_match_score(&query_first, &query.middles, &candidate_first, &candidate_parsed.middles)
    };
    if cross_match > 0.0 {
      first_matched = true;
    }

    let middle_name = self.middle_name_score(&query.middles, &candidate_parsed.middles);

    let best_alias_tier = candidate
      .aliases
      .iter()
      .map(|alias| self.first_name_tier(&query_first, &parse_name(alias).first_lower()).0)
      .fold(0.0_f64, f64::max);
    let alias_bonus = if first_matched { 0.0 } else { best_alias_tier };
    if alias_bonus > 0.0 {
      first_matched = true;
    }

    // Full-name and first-name-only queries both require a first-name hit —
    // it's what stops "John Smith" from stealing "Jane Smith" once the last
    // name alone clears the disqualifier.
    if !first_matched {
      return None;
    }

    let settings = &self.config.settings.entity_resolution;
    let weight = settings.name_similarity_weight;

    let context_boost = match observed.context_path.as_deref() {
      Some(path) if candidate.vault_contexts.iter().any(|ctx| path.to_lowercase().contains(&ctx.to_lowercase())) => {
        settings.context_boost_points
      }
      _ => 0.0,
    };

    let recency_boost = match (observed.observed_at, candidate.last_seen) {
      (Some(observed_at), Some(last_seen)) => {
        let days = (observed_at - last_seen).num_days().abs();
        if days <= settings.recency_boost_threshold_days { settings.recency_boost_points } else { 0.0 }
      }
      _ => 0.0,
    };

    let boost_multiplier = if first_name_only { FIRST_NAME_ONLY_BOOST_MULTIPLIER } else { 1.0 };
    let relationship_boost = (candidate.relationship_strength * RELATIONSHIP_BOOST_WEIGHT).min(RELATIONSHIP_BOOST_CAP) * boost_multiplier;

    let breakdown = ScoreBreakdown {
      last_name: last_name * weight,
      first_name: first_name * weight,
      cross_match: cross_match * weight,
      middle_name: middle_name * weight,
      alias_bonus: alias_bonus * weight,
      context_boost,
      recency_boost,
      relationship_boost,
      ambiguity_bonus: 0.0,
    };

    if breakdown.total() < 20.0 {
      return None;
    }
    Some(breakdown)
  }

  /// Last-name tier: exact +50, single-initial prefix +35, fuzzy ≥85 +25.
  fn last_name_tier(&self, query_last: &str, candidate_last: &str) -> f64 {
    if query_last == candidate_last {
      return 50.0;
    }
    if query_last.chars().count() == 1 && candidate_last.starts_with(query_last) {
      return 35.0;
    }
    if fuzzy_ratio(query_last, candidate_last) >= FUZZY_MATCH_THRESHOLD {
      return 25.0;
    }
    0.0
  }

  /// First-name tier: exact +25, nickname variant +20, fuzzy ≥85 +20,
  /// single-initial prefix (either direction) +10. Checked in that order
  /// so the best applicable tier wins, not the first condition tried.
  fn first_name_tier(&self, query_first: &str, candidate_first: &str) -> (f64, bool) {
    if query_first == candidate_first {
      return (25.0, true);
    }
    if self.config.nicknames.are_variants(query_first, candidate_first) {
      return (20.0, true);
    }
    if fuzzy_ratio(query_first, candidate_first) >= FUZZY_MATCH_THRESHOLD {
      return (20.0, true);
    }
    let initial_prefix = (query_first.chars().count() == 1 && candidate_first.starts_with(query_first))
      || (candidate_first.chars().count() == 1 && query_first.starts_with(candidate_first));
    if initial_prefix {
      return (10.0, true);
    }
    (0.0, false)
  }

  /// Query-first-as-candidate-middle or query-middle-as-candidate-first:
  /// exact +15, fuzzy ≥85 +12.
  fn cross_match_score(&self, query_first: &str, query_middles: &[String], candidate_first: &str, candidate_middles: &[String]) -> f64 {
    let exact = candidate_middles.iter().any(|m| m.to_lowercase() == query_first) || query_middles.iter().any(|m| m.to_lowercase() == candidate_first);
    if exact {
      return 15.0;
    }
    let fuzzy_hit = candidate_middles.iter().any(|m| fuzzy_ratio(query_first, &m.to_lowercase()) >= FUZZY_MATCH_THRESHOLD)
      || query_middles.iter().any(|m| fuzzy_ratio(&m.to_lowercase(), candidate_first) >= FUZZY_MATCH_THRESHOLD);
    if fuzzy_hit { 12.0 } else { 0.0 }
  }

  /// Any query middle against any candidate middle: exact +10, fuzzy ≥85 +7.
  fn middle_name_score(&self, query_middles: &[String], candidate_middles: &[String]) -> f64 {
    if query_middles.is_empty() || candidate_middles.is_empty() {
      return 0.0;
    }
    let exact = query_middles.iter().any(|q| candidate_middles.iter().any(|c| q.eq_ignore_ascii_case(c)));
    if exact {
      return 10.0;
    }
    let fuzzy_hit = query_middles.iter().any(|q| candidate_middles.iter().any(|c| fuzzy_ratio(&q.to_lowercase(), &c.to_lowercase()) >= FUZZY_MATCH_THRESHOLD));
    if fuzzy_hit { 7.0 } else { 0.0 }
  }
}

/// Normalized string similarity in `[0, 100]`. `SkimMatcherV2` is tuned for
/// fuzzy path/command matching rather than general edit distance, but its
/// ordering is stable enough for short name tokens once scaled by length.
fn fuzzy_ratio(a: &str, b: &str) -> f64 {
  if a.is_empty() || b.is_empty() {
    return if a == b { 100.0 } else { 0.0 };
  }
  let matcher = SkimMatcherV2::default();
  let raw = matcher.fuzzy_match(a, b).unwrap_or(0) as f64;
  let ceiling = (a.len().max(b.len()) as f64) * 10.0;
  (raw / ceiling * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn observed(name: &str) -> ObservedIdentity {
    ObservedIdentity { name: Some(name.to_string()), ..Default::default() }
  }

  #[test]
  fn anchor_match_wins_on_shared_email() {
    let config = ConfigRegistry::default();
    let mut p = Person::new("Jane Doe");
    p.add_email("jane@example.com");
    let resolver = EntityResolver::new(&config);
    let mut obs = observed("J. Doe");
    obs.email = Some("jane@example.com".into());
    let outcome = resolver.resolve(&obs, &[p.clone()]);
    assert!(matches!(outcome, ResolutionOutcome::Matched { person_id, .. } if person_id == p.id));
  }

  #[test]
  fn distinct_last_names_disqualify_without_nickname_link() {
    let config = ConfigRegistry::default();
    let candidate = Person::new("Sarah Johnson");
    let resolver = EntityResolver::new(&config);
    let outcome = resolver.resolve_by_name(&observed("Sarah Smith"), &[candidate]);
    assert!(matches!(outcome, ResolutionOutcome::NoMatch));
  }

  #[test]
  fn identical_name_matches_confidently() {
    let config = ConfigRegistry::default();
    let candidate = Person::new("Marcus Bell");
    let resolver = EntityResolver::new(&config);
    let outcome = resolver.resolve_by_name(&observed("Marcus Bell"), &[candidate.clone()]);
    assert!(matches!(outcome, ResolutionOutcome::Matched { person_id, .. } if person_id == candidate.id));
  }

  #[test]
  fn two_equally_good_candidates_are_ambiguous() {
    let config = ConfigRegistry::default();
    let a = Person::new("Chris Parker");
    let b = Person::new("Chris Parker");
    let resolver = EntityResolver::new(&config);
    let outcome = resolver.resolve_by_name(&observed("Chris Parker"), &[a, b]);
    assert!(matches!(outcome, ResolutionOutcome::Ambiguous { .. }));
  }
}
