//! `EngineHandle` — the explicit context struct that replaces the
//! original's module-level singletons (spec §9 "mutable singletons").
//! Bundles a loaded `ConfigRegistry` with the two concrete stores and
//! exposes the operator-facing operations `kin-cli`'s subcommands call.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use kin_core::config::{ConfigPaths, ConfigRegistry};
use kin_core::error::{Error, Result};
use kin_core::interaction::{Interaction, RollupCounts};
use kin_core::link_override::find_matching;
use kin_core::merge_engine::MergeEngine;
use kin_core::person::{Category, Person};
use kin_core::relationship::Relationship;
use kin_core::resolver::{EntityResolver, ObservedIdentity, ResolutionOutcome};
use kin_core::review_queue::{ReviewCandidate, ReviewStatus, ReviewType};
use kin_core::source_entity::SourceType;
use kin_core::store::{
  InteractionStore, LinkOverrideStore, PersonStore, RelationshipStore, ReviewQueueStore, SourceEntityStore,
};
use kin_core::strength::{PersonStrengthInput, StrengthEngine};
use kin_store_json::JsonPersonStore;
use kin_store_sqlite::SqliteStore;
use uuid::Uuid;

pub struct EngineHandle {
  pub config: ConfigRegistry,
  pub persons: JsonPersonStore,
  pub store: SqliteStore,
  config_paths: ConfigPaths,
}

/// Outcome of a single `resolve` call, reported back to the operator.
#[derive(Debug)]
pub enum ResolveOutcome {
  Matched { person: Person, confidence: f64, match_type: &'static str, disambiguation_applied: bool },
  Created { person: Person, confidence: f64, disambiguated: bool },
  Ambiguous { candidates: Vec<Uuid> },
  NoMatch,
  Blocked(String),
}

impl EngineHandle {
  pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
    let data_dir = data_dir.as_ref();
    std::fs::create_dir_all(data_dir)?;
    let config_paths = ConfigPaths::under(data_dir);
    let config = ConfigRegistry::load(&config_paths)?;
    let persons = JsonPersonStore::open(data_dir.join("people")).await.map_err(Error::from)?;
    let store = SqliteStore::open(data_dir.join("kin.sqlite3")).await.map_err(Error::from)?;
    Ok(Self { config, persons, store, config_paths })
  }

  pub fn reload_config(&mut self) -> Result<()> {
    self.config = ConfigRegistry::load(&self.config_paths)?;
    Ok(())
  }

  fn merge_engine(&self) -> MergeEngine<'_, JsonPersonStore, SqliteStore, SqliteStore, SqliteStore, SqliteStore> {
    MergeEngine::new(&self.persons, &self.store, &self.store, &self.store, &self.store)
  }

  // ---------------------------------------------------------------
  // Resolution (spec §4.6, full three-pass contract plus repair).
  // ---------------------------------------------------------------

  pub async fn resolve(&self, observed: ObservedIdentity, create_if_missing: bool) -> Result<ResolveOutcome> {
    if let Some(email) = observed.email.as_deref() {
      if self.persons.is_blocked(email).await.map_err(Error::from)? {
        tracing::info!(email, "resolve: identifier is blocklisted, skipping");
        return Ok(ResolveOutcome::Blocked(email.to_string()));
      }
    }
    if let Some(phone) = observed.phone.as_deref() {
      if self.persons.is_blocked(phone).await.map_err(Error::from)? {
        tracing::info!(phone, "resolve: identifier is blocklisted, skipping");
        return Ok(ResolveOutcome::Blocked(phone.to_string()));
      }
    }

    let candidates = self.persons.get_all(false).await.map_err(Error::from)?;
    let resolver = EntityResolver::new(&self.config);

    if let Some(person_id) = resolver.resolve_by_anchor(&observed, &candidates) {
      let person = self.apply_repair(person_id, &observed).await?;
      return Ok(ResolveOutcome::Matched { person, confidence: 1.0, match_type: "anchor", disambiguation_applied: false });
    }

    if let Some(name) = observed.name.as_deref() {
      if let Some(person) = self.persons.get_by_name(name).await.map_err(Error::from)? {
        let person = self.apply_repair(person.id, &observed).await?;
        return Ok(ResolveOutcome::Matched { person, confidence: 1.0, match_type: "name_exact", disambiguation_applied: false });
      }
    }

    if let Some(name) = observed.name.as_deref() {
      let overrides = LinkOverrideStore::get_all(&self.store).await.map_err(Error::from)?;
      if let Some(rule) = find_matching(&overrides, name, None, observed.context_path.as_deref()) {
        let person_id = self.persons.get_canonical_id(rule.preferred_person_id).await.map_err(Error::from)?;
        if let Some(person) = self.persons.get_by_id(person_id).await.map_err(Error::from)? {
          let person = self.apply_repair(person.id, &observed).await?;
          tracing::debug!(rule_id = %rule.id, "resolve: matched via link override");
          return Ok(ResolveOutcome::Matched { person, confidence: 1.0, match_type: "link_override", disambiguation_applied: false });
        }
      }
    }

    match resolver.resolve_by_name(&observed, &candidates) {
      ResolutionOutcome::Matched { person_id, score } => {
        let person = self.apply_repair(person_id, &observed).await?;
        let confidence = (score / 100.0).clamp(0.0, 1.0);
        Ok(ResolveOutcome::Matched { person, confidence, match_type: "name", disambiguation_applied: false })
      }
      ResolutionOutcome::Ambiguous { candidates: contenders } => {
        if create_if_missing {
          let person = self.create_disambiguated(&observed).await?;
          Ok(ResolveOutcome::Created { person, confidence: 0.7, disambiguated: true })
        } else if let Some(top) = contenders.first() {
            if let Some(person) = self.persons.get_by_id(top.person_id).await.map_err(Error::from)? {
              Ok(ResolveOutcome::Matched {
                person,
                confidence: (top.score.total() / 100.0 * 0.7).clamp(0.0, 1.0),
                match_type: "name",
                disambiguation_applied: true,
              })
            } else {
              Ok(ResolveOutcome::Ambiguous { candidates: contenders.iter().map(|c| c.person_id).collect() })
            }
        } else {
          Ok(ResolveOutcome::Ambiguous { candidates: contenders.iter().map(|c| c.person_id).collect() })
        }
      }
      ResolutionOutcome::NoMatch => {
        if !create_if_missing {
          return Ok(ResolveOutcome::NoMatch);
        }
        // Defend against index staleness under concurrent writers: if only
        // an email was observed and nothing matched, re-check `by_email`
        // once more before minting a new record (spec §4.6.4).
        if observed.name.is_none() {
          if let Some(email) = observed.email.as_deref() {
            if let Some(existing) = self.persons.get_by_email(email).await.map_err(Error::from)? {
              let person = self.apply_repair(existing.id, &observed).await?;
              return Ok(ResolveOutcome::Matched { person, confidence: 1.0, match_type: "email_exact_late", disambiguation_applied: false });
            }
          }
        }
        let person = self.create_new_person(&observed).await?;
        Ok(ResolveOutcome::Created { person, confidence: 0.5, disambiguated: false })
      }
    }
  }

  /// Adds any newly-observed email/phone to the matched person and, if a
  /// new identifier was actually learned, triggers the retroactive
  /// link pass for previously orphaned `SourceEntity`s carrying it
  /// (spec §4.6.4).
  async fn apply_repair(&self, person_id: Uuid, observed: &ObservedIdentity) -> Result<Person> {
    let mut person = self.persons.get_by_id(person_id).await.map_err(Error::from)?.ok_or(Error::NotFound(person_id))?;
    let mut learned_email = None;
    let mut learned_phone = None;

    if let Some(email) = observed.email.as_deref() {
      if !person.has_email(email) {
        person.add_email(email);
        learned_email = Some(email.to_lowercase());
      }
    }
    if let Some(phone) = observed.phone.as_deref() {
      if !person.has_phone(phone) {
        person.add_phone(phone);
        learned_phone = Some(phone.to_string());
      }
    }

    let person = if learned_email.is_some() || learned_phone.is_some() {
      self.persons.update(person).await.map_err(Error::from)?
    } else {
      person
    };

    if let Some(email) = learned_email {
      let linked = self.store.link_unlinked_by_email(&email, person.id, 0.8).await.map_err(Error::from)?;
      if linked > 0 {
        tracing::info!(person_id = %person.id, linked, "retroactively linked source entities by email");
      }
    }
    if let Some(phone) = learned_phone {
      let linked = self.store.link_unlinked_by_phone(&phone, person.id, 0.8).await.map_err(Error::from)?;
      if linked > 0 {
        tracing::info!(person_id = %person.id, linked, "retroactively linked source entities by phone");
      }
    }

    Ok(person)
  }

  fn infer_new_person_fields(&self, observed: &ObservedIdentity) -> (Vec<String>, Category, Option<String>) {
    let mut vault_contexts = Vec::new();
    let mut category = Category::Unknown;
    let mut company = None;

    if let Some(domain) = observed.email.as_deref().and_then(email_domain) {
      vault_contexts.extend(self.config.vault_contexts_for_domain(&domain));
      company = self.config.company_for_domain(&domain);
      category = Category::from_str(&self.config.category_for_domain(&domain)).unwrap_or(Category::Unknown);
    }
    if let Some(path) = observed.context_path.as_deref() {
      let already_covered = vault_contexts.iter().any(|ctx| path.to_lowercase().contains(&ctx.to_lowercase()));
      if !already_covered {
        if let Some(segment) = path.split('/').find(|s| !s.is_empty()) {
          vault_contexts.push(format!("{segment}/"));
        }
      }
    }
    // Family membership outranks the domain-derived category (spec §3.1,
    // mirroring the original's self > family > work > personal priority).
    if let Some(name) = observed.name.as_deref() {
      if self.config.is_family_member(name) {
        category = Category::Family;
      }
    }
    (vault_contexts, category, company)
  }

  async fn create_new_person(&self, observed: &ObservedIdentity) -> Result<Person> {
    let name = observed.name.clone().unwrap_or_else(|| "Unknown".to_string());
    let mut person = Person::new(name);
    self.seed_new_person(&mut person, observed);
    person.confidence_score = 0.5;
    Ok(self.persons.add(person).await.map_err(Error::from)?)
  }

  /// Creates a new `Person` with a context-qualified display name so it
  /// does not silently collapse into the ambiguous top candidate (spec
  /// §4.6.3).
  async fn create_disambiguated(&self, observed: &ObservedIdentity) -> Result<Person> {
    let name = observed.name.clone().unwrap_or_else(|| "Unknown".to_string());
    let mut person = Person::new(name);
    self.seed_new_person(&mut person, observed);
    if let Some(suffix) = disambiguation_suffix(person.company.as_deref(), observed.context_path.as_deref()) {
      person.display_name = format!("{} ({suffix})", person.display_name);
    }
    person.confidence_score = 0.7;
    Ok(self.persons.add(person).await.map_err(Error::from)?)
  }

  fn seed_new_person(&self, person: &mut Person, observed: &ObservedIdentity) {
    if let Some(email) = observed.email.as_deref() {
      person.add_email(email);
    }
    if let Some(phone) = observed.phone.as_deref() {
      person.add_phone(phone);
    }
    let (vault_contexts, category, company) = self.infer_new_person_fields(observed);
    person.vault_contexts = vault_contexts;
    person.category = category;
    person.company = company;
  }

  // ---------------------------------------------------------------
  // Source entity ingest (spec §6.4, SPEC_FULL.md §10).
  // ---------------------------------------------------------------

  /// `SourceEntityStore::add_or_update` has no access to the person
  /// store, so the canonical_person_id validation spec §3.2 and §6.4
  /// require — resolving through the merge chain and downgrading to
  /// unlinked when the target person doesn't exist — happens here.
  pub async fn add_or_update_source_entity(
    &self,
    mut entity: kin_core::source_entity::SourceEntity,
  ) -> Result<(kin_core::source_entity::SourceEntity, bool)> {
    if let Some(person_id) = entity.canonical_person_id {
      let resolved = self.persons.get_canonical_id(person_id).await.map_err(Error::from)?;
      match self.persons.get_by_id(resolved).await.map_err(Error::from)? {
        Some(_) => entity.canonical_person_id = Some(resolved),
        None => {
          tracing::warn!(person_id = %person_id, "add_or_update: canonical_person_id has no matching person, downgrading to unlinked");
          entity.canonical_person_id = None;
          entity.link_confidence = 0.0;
          entity.linked_at = None;
        }
      }
    }
    self.store.add_or_update(entity).await.map_err(Error::from)
  }

  // ---------------------------------------------------------------
  // Match-attempt bookkeeping (spec §4.6.5).
  // ---------------------------------------------------------------

  pub async fn rematch_batch(&self, source_type: Option<SourceType>, limit: usize) -> Result<(usize, usize)> {
    let settings = &self.config.settings;
    let candidates = self
      .store
      .get_unlinked_for_rematching(source_type, settings.min_days_since_match_attempt, settings.max_match_attempts, limit)
      .await
      .map_err(Error::from)?;

    let (mut linked, mut attempted) = (0usize, 0usize);
    for entity in candidates {
      if let Some(email) = entity.observed_email.as_deref() {
        if self.persons.is_blocked(email).await.map_err(Error::from)? {
          continue;
        }
      }
      let observed = ObservedIdentity {
        name: entity.observed_name.clone(),
        email: entity.observed_email.clone(),
        phone: entity.observed_phone.clone(),
        context_path: None,
        observed_at: Some(entity.observed_at),
      };
      attempted += 1;
      match self.resolve(observed, false).await? {
        ResolveOutcome::Matched { person, .. } => {
          self.store.link_to_person(entity.id, person.id, 0.8, kin_core::source_entity::LinkStatus::Auto).await.map_err(Error::from)?;
          linked += 1;
        }
        _ => {
          self.store.record_match_attempt(entity.id).await.map_err(Error::from)?;
        }
      }
    }
    Ok((linked, attempted))
  }

  // ---------------------------------------------------------------
  // Merge / split.
  // ---------------------------------------------------------------

  pub async fn merge(&self, primary_id: Uuid, secondary_id: Uuid) -> Result<Person> {
    self.merge_engine().merge(primary_id, secondary_id).await
  }

  /// `MergeEngine` has no `LinkOverrideStore` reference, so the rule
  /// creation spec §4.5.2 step 6 describes ("future sources matching the
  /// moved patterns link to B rather than A") happens here: one rule per
  /// moved source type, keyed on A's canonical name.
  pub async fn split(&self, person_id: Uuid, source_types: &[SourceType], new_canonical_name: impl Into<String>) -> Result<Person> {
    let canonical_id = self.persons.get_canonical_id(person_id).await.map_err(Error::from)?;
    let original = self.persons.get_by_id(canonical_id).await.map_err(Error::from)?.ok_or(Error::NotFound(canonical_id))?;

    let new_person = self.merge_engine().split(canonical_id, source_types, new_canonical_name).await?;

    for &source_type in source_types {
      let mut rule = kin_core::link_override::LinkOverride::new(original.canonical_name.clone(), new_person.id);
      rule.source_type = Some(source_type.to_string());
      rule.reason = Some("split".to_string());
      LinkOverrideStore::add(&self.store, rule).await.map_err(Error::from)?;
    }

    Ok(new_person)
  }

  // ---------------------------------------------------------------
  // Hide.
  // ---------------------------------------------------------------

  /// `PersonStore::hide` has no access to the review queue, so the
  /// cross-store cleanup spec §4.10 describes happens here.
  pub async fn hide(&self, person_id: Uuid, reason: &str) -> Result<()> {
    let person_id = self.persons.get_canonical_id(person_id).await.map_err(Error::from)?;
    self.persons.hide(person_id, reason).await.map_err(Error::from)?;
    let removed = self.store.remove_for_person(person_id).await.map_err(Error::from)?;
    if removed > 0 {
      tracing::info!(person_id = %person_id, removed, "hide: cleared pending review-queue items");
    }
    Ok(())
  }

  // ---------------------------------------------------------------
  // Relationship bump helpers (spec §6.4).
  // ---------------------------------------------------------------

  async fn bump(&self, a: Uuid, b: Uuid, apply: impl FnOnce(&mut Relationship)) -> Result<Relationship> {
    match self.store.get_between(a, b).await.map_err(Error::from)? {
      Some(mut existing) => {
        apply(&mut existing);
        RelationshipStore::update(&self.store, existing).await.map_err(Error::from)
      }
      None => {
        let mut relationship = Relationship::new(a, b, kin_core::relationship::RelationshipType::Inferred);
        apply(&mut relationship);
        RelationshipStore::add(&self.store, relationship).await.map_err(Error::from)
      }
    }
  }

  pub async fn increment_shared_event(&self, a: Uuid, b: Uuid, at: DateTime<Utc>, ctx: Option<&str>) -> Result<Relationship> {
    self.bump(a, b, |r| r.increment_shared_event(at, ctx)).await
  }

  pub async fn increment_shared_thread(&self, a: Uuid, b: Uuid, at: DateTime<Utc>, ctx: Option<&str>) -> Result<Relationship> {
    self.bump(a, b, |r| r.increment_shared_thread(at, ctx)).await
  }

  pub async fn increment_shared_message(&self, a: Uuid, b: Uuid, at: DateTime<Utc>, ctx: Option<&str>) -> Result<Relationship> {
    self.bump(a, b, |r| r.increment_shared_message(at, ctx)).await
  }

  pub async fn increment_shared_whatsapp(&self, a: Uuid, b: Uuid, at: DateTime<Utc>, ctx: Option<&str>) -> Result<Relationship> {
    self.bump(a, b, |r| r.increment_shared_whatsapp(at, ctx)).await
  }

  pub async fn increment_shared_slack(&self, a: Uuid, b: Uuid, at: DateTime<Utc>, ctx: Option<&str>) -> Result<Relationship> {
    self.bump(a, b, |r| r.increment_shared_slack(at, ctx)).await
  }

  pub async fn increment_shared_phone_call(&self, a: Uuid, b: Uuid, at: DateTime<Utc>, ctx: Option<&str>) -> Result<Relationship> {
    self.bump(a, b, |r| r.increment_shared_phone_call(at, ctx)).await
  }

  pub async fn increment_shared_photo(&self, a: Uuid, b: Uuid, at: DateTime<Utc>, ctx: Option<&str>) -> Result<Relationship> {
    self.bump(a, b, |r| r.increment_shared_photo(at, ctx)).await
  }

  // ---------------------------------------------------------------
  // Interaction ingest (spec §6.4).
  // ---------------------------------------------------------------

  pub async fn add_interaction_if_not_exists(&self, interaction: Interaction) -> Result<bool> {
    self.store.add_if_not_exists(interaction).await.map_err(Error::from)
  }

  // ---------------------------------------------------------------
  // Recompute (counts + strength) and circle assignment (spec §4.8, §4.9).
  // ---------------------------------------------------------------

  pub async fn recompute(&self) -> Result<usize> {
    let people = self.persons.get_all(true).await.map_err(Error::from)?;
    let strength_settings = &self.config.settings.relationship_strength;
    let engine = StrengthEngine::new(strength_settings);
    let now = Utc::now();
    let mut updated = 0usize;
    let owner_id = self.config.settings.overrides.owner_person_id;

    for mut person in people {
      if person.hidden {
        continue;
      }
      let interactions = InteractionStore::get_for_person(&self.store, person.id).await.map_err(Error::from)?;
      let rollup = RollupCounts::from_interactions(&interactions);
      person.counts.meeting_count = rollup.meeting_count;
      person.counts.email_count = rollup.email_count;
      person.counts.mention_count = rollup.mention_count;
      person.counts.message_count = rollup.message_count;
      person.counts.slack_message_count = rollup.slack_message_count;
      person.counts.source_entity_count = InteractionStore::count_for_person(&self.store, person.id).await.map_err(Error::from)? as u64;

      person.first_seen = interactions.iter().map(|i| i.timestamp).min().or(person.first_seen);
      person.last_seen = interactions.iter().map(|i| i.timestamp).max();

      let recent_cutoff = now - chrono::Duration::days(strength_settings.frequency_window_days);
      let mut recent_weighted = 0.0;
      let mut lifetime_weighted = 0.0;
      let mut sources_touched = std::collections::HashSet::new();
      for interaction in &interactions {
        let weight = self.config.channel_weight(interaction.source_type.to_string().as_str());
        lifetime_weighted += weight;
        if interaction.timestamp >= recent_cutoff {
          recent_weighted += weight;
        }
        sources_touched.insert(interaction.source_type);
      }

      let self_relationship = match owner_id {
        Some(owner) if owner != person.id => self.store.get_between(person.id, owner).await.map_err(Error::from)?,
        _ => None,
      };

      let strength = engine.person_strength(&PersonStrengthInput {
        last_interaction: person.last_seen,
        now,
        total_interactions: interactions.len() as u64,
        recent_weighted,
        lifetime_weighted,
        unique_sources: sources_touched.len(),
        total_sources: SourceType::ALL.len(),
        self_relationship: self_relationship.as_ref(),
      });
      person.set_relationship_strength(strength);

      self.persons.update(person).await.map_err(Error::from)?;
      updated += 1;
    }

    self.assign_circles().await?;
    Ok(updated)
  }

  /// Global ranking pass (spec §4.8.3). `StrengthEngine` has no access to
  /// `Overrides.tags_by_id`, so the tag-override union happens here after
  /// circles are assigned.
  pub async fn assign_circles(&self) -> Result<()> {
    let mut people = self.persons.get_all(true).await.map_err(Error::from)?;
    let strength_settings = &self.config.settings.relationship_strength;
    let engine = StrengthEngine::new(strength_settings);
    let overrides = &self.config.settings.overrides;

    engine.assign_circles(
      &mut people,
      |id, computed| overrides.strength_by_id.get(&id).copied().unwrap_or(computed),
      |id| overrides.circle_by_id.get(&id).copied(),
    );

    for person in &mut people {
      if let Some(extra_tags) = overrides.tags_by_id.get(&person.id) {
        for tag in extra_tags {
          person.add_tag(tag);
        }
      }
    }

    for person in people {
      self.persons.update(person).await.map_err(Error::from)?;
    }
    Ok(())
  }

  // ---------------------------------------------------------------
  // Review queue.
  // ---------------------------------------------------------------

  pub async fn review_list(&self, review_type: Option<ReviewType>, limit: usize, offset: usize) -> Result<Vec<ReviewCandidate>> {
    self.store.get_pending(review_type, limit, offset).await.map_err(Error::from)
  }

  pub async fn review_mark(&self, id: Uuid, status: ReviewStatus) -> Result<Option<ReviewCandidate>> {
    self.store.mark_reviewed(id, status).await.map_err(Error::from)
  }

  pub async fn source_statistics(&self) -> Result<kin_core::source_entity::SourceEntityStatistics> {
    self.store.get_statistics().await.map_err(Error::from)
  }
}

fn email_domain(email: &str) -> Option<String> {
  email.rsplit_once('@').map(|(_, domain)| domain.to_lowercase())
}

/// First word of the company name, or the last path segment of the
/// context path, used to qualify a disambiguated display name (spec
/// §4.6.3's `"Name (WorkCompanyFirstWord)"` example).
fn disambiguation_suffix(company: Option<&str>, context_path: Option<&str>) -> Option<String> {
  if let Some(company) = company {
    if let Some(word) = company.split_whitespace().next() {
      return Some(word.to_string());
    }
  }
  let path = context_path?;
  path.split('/').filter(|s| !s.is_empty()).last().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
  use kin_core::review_queue::ReviewType;

  use super::*;

  async fn handle() -> (tempfile::TempDir, EngineHandle) {
    let dir = tempfile::tempdir().unwrap();
    let config_paths = ConfigPaths::under(dir.path());
    let config = ConfigRegistry::load(&config_paths).unwrap();
    let persons = JsonPersonStore::open(dir.path().join("people")).await.unwrap();
    let store = SqliteStore::open_in_memory().await.unwrap();
    (dir, EngineHandle { config, persons, store, config_paths })
  }

  fn observed(name: Option<&str>, email: Option<&str>) -> ObservedIdentity {
    ObservedIdentity {
      name: name.map(String::from),
      email: email.map(String::from),
      phone: None,
      context_path: None,
      observed_at: Some(Utc::now()),
    }
  }

  #[tokio::test]
  async fn resolve_matches_by_exact_email_anchor() {
    let (_dir, engine) = handle().await;
    let mut person = Person::new("Ada Lovelace");
    person.add_email("ada@example.com");
    let person = engine.persons.add(person).await.unwrap();

    match engine.resolve(observed(None, Some("ada@example.com")), false).await.unwrap() {
      ResolveOutcome::Matched { person: matched, match_type, .. } => {
        assert_eq!(matched.id, person.id);
        assert_eq!(match_type, "anchor");
      }
      other => panic!("expected anchor match, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn resolve_creates_new_person_when_no_match_and_create_requested() {
    let (_dir, engine) = handle().await;
    match engine.resolve(observed(Some("Grace Hopper"), Some("grace@example.com")), true).await.unwrap() {
      ResolveOutcome::Created { person, confidence, disambiguated } => {
        assert_eq!(person.display_name, "Grace Hopper");
        assert_eq!(confidence, 0.5);
        assert!(!disambiguated);
      }
      other => panic!("expected a created person, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn resolve_without_create_returns_no_match() {
    let (_dir, engine) = handle().await;
    match engine.resolve(observed(Some("Nobody Here"), None), false).await.unwrap() {
      ResolveOutcome::NoMatch => {}
      other => panic!("expected no match, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn resolve_skips_blocklisted_email() {
    let (_dir, engine) = handle().await;
    engine
      .persons
      .add_to_blocklist(kin_core::store::BlocklistEntry {
        identifier: "spam@example.com".into(),
        identifier_kind: kin_core::store::IdentifierKind::Email,
        person_name: "Spam Bot".into(),
        reason: "newsletter".into(),
        created_at: Utc::now(),
      })
      .await
      .unwrap();

    match engine.resolve(observed(Some("Spam Bot"), Some("spam@example.com")), true).await.unwrap() {
      ResolveOutcome::Blocked(identifier) => assert_eq!(identifier, "spam@example.com"),
      other => panic!("expected blocked, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn apply_repair_links_orphaned_source_entities_by_new_email() {
    let (_dir, engine) = handle().await;
    let mut person = Person::new("Ada Lovelace");
    person.add_phone("+15551234567");
    let person = engine.persons.add(person).await.unwrap();

    let mut orphan = kin_core::source_entity::SourceEntity::new(SourceType::Gmail, Some("gmail-1".to_string()));
    orphan.observed_email = Some("ada@example.com".to_string());
    SourceEntityStore::add(&engine.store, orphan).await.unwrap();

    engine.apply_repair(person.id, &observed(None, Some("ada@example.com"))).await.unwrap();

    let for_person = SourceEntityStore::get_for_person(&engine.store, person.id, None, None).await.unwrap();
    assert_eq!(for_person.len(), 1);
    assert_eq!(for_person[0].canonical_person_id, Some(person.id));
  }

  #[tokio::test]
  async fn hide_clears_pending_review_queue_items_for_person() {
    let (_dir, engine) = handle().await;
    let a = engine.persons.add(Person::new("Alice")).await.unwrap();
    let b = engine.persons.add(Person::new("Alicia")).await.unwrap();

    engine.store.add_duplicate(a.id, &a.canonical_name, b.id, &b.canonical_name, 0.9, "similar names", None).await.unwrap();

    engine.hide(a.id, "no longer relevant").await.unwrap();

    let pending = engine.store.get_pending(Some(ReviewType::Duplicate), 10, 0).await.unwrap();
    assert!(pending.is_empty());

    let reloaded = engine.persons.get_by_id(a.id).await.unwrap().unwrap();
    assert!(reloaded.hidden);
  }

  #[tokio::test]
  async fn increment_shared_event_creates_relationship_on_first_bump() {
    let (_dir, engine) = handle().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let relationship = engine.increment_shared_event(a, b, Utc::now(), Some("team-standup")).await.unwrap();
    assert!(relationship.involves(a) && relationship.involves(b));
    assert_eq!(relationship.counters.shared_events_count, 1);

    let bumped = engine.increment_shared_event(a, b, Utc::now(), Some("team-standup")).await.unwrap();
    assert_eq!(bumped.counters.shared_events_count, 2);
  }

  #[tokio::test]
  async fn add_or_update_source_entity_downgrades_dangling_canonical_person_id() {
    let (_dir, engine) = handle().await;
    let mut entity = kin_core::source_entity::SourceEntity::new(SourceType::Gmail, Some("gmail-1".to_string()));
    entity.canonical_person_id = Some(Uuid::new_v4());
    entity.link_confidence = 0.9;
    entity.link_status = kin_core::source_entity::LinkStatus::Auto;

    let (saved, created) = engine.add_or_update_source_entity(entity).await.unwrap();
    assert!(created);
    assert!(saved.canonical_person_id.is_none());
    assert_eq!(saved.link_confidence, 0.0);
  }

  #[tokio::test]
  async fn add_or_update_source_entity_keeps_valid_canonical_person_id() {
    let (_dir, engine) = handle().await;
    let person = engine.persons.add(Person::new("Real Person")).await.unwrap();
    let mut entity = kin_core::source_entity::SourceEntity::new(SourceType::Gmail, Some("gmail-2".to_string()));
    entity.canonical_person_id = Some(person.id);

    let (saved, _) = engine.add_or_update_source_entity(entity).await.unwrap();
    assert_eq!(saved.canonical_person_id, Some(person.id));
  }

  #[tokio::test]
  async fn resolve_matches_existing_name_exactly_before_fuzzy_scoring() {
    let (_dir, engine) = handle().await;
    let person = engine.persons.add(Person::new("Chris Parker")).await.unwrap();

    match engine.resolve(observed(Some("Chris Parker"), None), false).await.unwrap() {
      ResolveOutcome::Matched { person: matched, match_type, confidence, .. } => {
        assert_eq!(matched.id, person.id);
        assert_eq!(match_type, "name_exact");
        assert_eq!(confidence, 1.0);
      }
      other => panic!("expected an exact name-index match, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn new_person_gets_family_category_from_last_name_override() {
    let (_dir, mut engine) = handle().await;
    engine.config.settings.overrides.family_last_names = vec!["parker".to_string()];

    match engine.resolve(observed(Some("Sam Parker"), None), true).await.unwrap() {
      ResolveOutcome::Created { person, .. } => assert_eq!(person.category, Category::Family),
      other => panic!("expected a created person, got {other:?}"),
    }
  }

  #[tokio::test]
  async fn split_moves_only_matching_source_types_and_creates_override() {
    let (_dir, engine) = handle().await;
    let person = engine.persons.add(Person::new("Chris Parker")).await.unwrap();

    let mut gmail = kin_core::source_entity::SourceEntity::new(SourceType::Gmail, Some("g-1".to_string()));
    gmail.canonical_person_id = Some(person.id);
    SourceEntityStore::add(&engine.store, gmail).await.unwrap();

    let mut vault = kin_core::source_entity::SourceEntity::new(SourceType::Vault, Some("v-1".to_string()));
    vault.canonical_person_id = Some(person.id);
    SourceEntityStore::add(&engine.store, vault).await.unwrap();

    let new_person = engine.split(person.id, &[SourceType::Vault], "Chris Parker (Vault)").await.unwrap();

    let moved = SourceEntityStore::get_for_person(&engine.store, new_person.id, Some(SourceType::Vault), None).await.unwrap();
    assert_eq!(moved.len(), 1);
    let stayed = SourceEntityStore::get_for_person(&engine.store, person.id, Some(SourceType::Gmail), None).await.unwrap();
    assert_eq!(stayed.len(), 1);

    let reloaded_new = engine.persons.get_by_id(new_person.id).await.unwrap().unwrap();
    assert_eq!(reloaded_new.sources, vec!["vault".to_string()]);

    let overrides = LinkOverrideStore::get_all(&engine.store).await.unwrap();
    assert!(overrides.iter().any(|o| o.preferred_person_id == new_person.id && o.source_type.as_deref() == Some("vault")));
  }

  #[tokio::test]
  async fn recompute_sets_strength_and_assigns_circles() {
    let (_dir, engine) = handle().await;
    let mut person = Person::new("Busy Bee");
    person.add_email("bee@example.com");
    let person = engine.persons.add(person).await.unwrap();

    for _ in 0..5 {
      engine.add_interaction_if_not_exists(Interaction::new(person.id, Utc::now(), SourceType::Gmail)).await.unwrap();
    }

    engine.recompute().await.unwrap();

    let reloaded = engine.persons.get_by_id(person.id).await.unwrap().unwrap();
    assert!(reloaded.relationship_strength > 0.0);
    assert!(reloaded.dunbar_circle.is_some());
  }
}
