//! `MergeEngine` — orchestrates merge and split across every store that
//! references a person id (spec §4.5). Kept a thin coordinator: all the
//! field-level merge logic lives on `Person::absorb`; this module owns the
//! cross-store bookkeeping `absorb` cannot reach on its own.

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::interaction::RollupCounts;
use crate::person::Person;
use crate::relationship::Relationship;
use crate::source_entity::SourceType;
use crate::store::{InteractionStore, PersonStore, RelationshipStore, ReviewQueueStore, SourceEntityStore};

pub struct MergeEngine<'a, P, SE, R, I, Q> {
  pub persons: &'a P,
  pub source_entities: &'a SE,
  pub relationships: &'a R,
  pub interactions: &'a I,
  pub review_queue: &'a Q,
}

impl<'a, P, SE, R, I, Q> MergeEngine<'a, P, SE, R, I, Q>
where
  P: PersonStore,
  SE: SourceEntityStore,
  R: RelationshipStore,
  I: InteractionStore,
  Q: ReviewQueueStore,
  P::Error: Into<Error>,
  SE::Error: Into<Error>,
  R::Error: Into<Error>,
  I::Error: Into<Error>,
  Q::Error: Into<Error>,
{
  pub fn new(persons: &'a P, source_entities: &'a SE, relationships: &'a R, interactions: &'a I, review_queue: &'a Q) -> Self {
    Self { persons, source_entities, relationships, interactions, review_queue }
  }

  /// Merges `secondary_id` into `primary_id`. Both ids are resolved
  /// through the merge chain first, so merging an already-merged id is a
  /// no-op on the chain rather than a dangling write (spec §4.5.1).
  pub async fn merge(&self, primary_id: Uuid, secondary_id: Uuid) -> Result<Person> {
    let primary_id = self.persons.get_canonical_id(primary_id).await.map_err(Into::into)?;
    let secondary_id = self.persons.get_canonical_id(secondary_id).await.map_err(Into::into)?;
    if primary_id == secondary_id {
      return Err(Error::Conflict("cannot merge a person into itself".into()));
    }

    let mut primary = self.persons.get_by_id(primary_id).await.map_err(Into::into)?.ok_or(Error::NotFound(primary_id))?;
    let secondary = self.persons.get_by_id(secondary_id).await.map_err(Into::into)?.ok_or(Error::NotFound(secondary_id))?;

    primary.absorb(&secondary);

    self.source_entities.reassign_person(secondary_id, primary_id, None).await.map_err(Into::into)?;
    self.interactions.reassign_person(secondary_id, primary_id, None).await.map_err(Into::into)?;
    self.reassign_relationships(secondary_id, primary_id).await?;

    let interactions = self.interactions.get_for_person(primary_id).await.map_err(Into::into)?;
    let rollup = RollupCounts::from_interactions(&interactions);
    primary.counts.meeting_count = rollup.meeting_count;
    primary.counts.email_count = rollup.email_count;
    primary.counts.mention_count = rollup.mention_count;
    primary.counts.message_count = rollup.message_count;
    primary.counts.slack_message_count = rollup.slack_message_count;
    primary.counts.source_entity_count = self.source_entities.count_for_person(primary_id).await.map_err(Into::into)? as u64;

    let primary = self.persons.update(primary).await.map_err(Into::into)?;

    self.review_queue.remove_for_person(secondary_id).await.map_err(Into::into)?;
    self.persons.record_merge(secondary_id, primary_id).await.map_err(Into::into)?;
    self.persons.delete(secondary_id).await.map_err(Into::into)?;

    Ok(primary)
  }

  /// Rewrites every relationship touching `from` onto `to`. Where `to`
  /// already has an edge to the same third party, the two edges are
  /// combined via `Relationship::merge_from` rather than left duplicated.
  async fn reassign_relationships(&self, from: Uuid, to: Uuid) -> Result<()> {
    let affected = self.relationships.get_for_person(from).await.map_err(Into::into)?;
    for old in affected {
      let Some(other_id) = old.other_person(from) else { continue };
      self.relationships.delete(old.id).await.map_err(Into::into)?;

      if other_id == to {
        // The merged people already had a direct edge; dropping it is
        // correct, there is no longer a second party to connect to.
        continue;
      }

      match self.relationships.get_between(to, other_id).await.map_err(Into::into)? {
        Some(mut existing) => {
          existing.merge_from(&old);
          self.relationships.update(existing).await.map_err(Into::into)?;
        }
        None => {
          let mut rebuilt = Relationship::new(to, other_id, old.relationship_type);
          rebuilt.merge_from(&old);
          self.relationships.add(rebuilt).await.map_err(Into::into)?;
        }
      }
    }
    Ok(())
  }

  /// Moves every `SourceEntity`/`Interaction` of `person_id` matching
  /// `source_types` onto a new `Person`, correcting an earlier over-merge
  /// (spec §4.5.2). The input is a set of source types to move, not a
  /// pre-enumerated list of entity ids — every entity of a moved type
  /// follows automatically.
  pub async fn split(&self, person_id: Uuid, source_types: &[SourceType], new_canonical_name: impl Into<String>) -> Result<Person> {
    let person_id = self.persons.get_canonical_id(person_id).await.map_err(Into::into)?;
    self.persons.get_by_id(person_id).await.map_err(Into::into)?.ok_or(Error::NotFound(person_id))?;

    let mut new_person = Person::new(new_canonical_name.into());
    let new_person_id = new_person.id;

    let mut moved_source_types = Vec::new();
    for &source_type in source_types {
      let entities = self.source_entities.get_for_person(person_id, Some(source_type), None).await.map_err(Into::into)?;
      if entities.is_empty() {
        continue;
      }
      for entity in entities {
        self
          .source_entities
          .link_to_person(entity.id, new_person_id, 1.0, crate::source_entity::LinkStatus::Confirmed)
          .await
          .map_err(Into::into)?;
      }
      moved_source_types.push(source_type);
    }
    moved_source_types.sort_by_key(|t| t.to_string());
    moved_source_types.dedup();

    if !moved_source_types.is_empty() {
      self
        .interactions
        .reassign_person(person_id, new_person_id, Some(&moved_source_types))
        .await
        .map_err(Into::into)?;
    }

    let new_interactions = self.interactions.get_for_person(new_person_id).await.map_err(Into::into)?;
    let new_rollup = RollupCounts::from_interactions(&new_interactions);
    new_person.counts.meeting_count = new_rollup.meeting_count;
    new_person.counts.email_count = new_rollup.email_count;
    new_person.counts.mention_count = new_rollup.mention_count;
    new_person.counts.message_count = new_rollup.message_count;
    new_person.counts.slack_message_count = new_rollup.slack_message_count;
    new_person.counts.source_entity_count = self.source_entities.count_for_person(new_person_id).await.map_err(Into::into)? as u64;
    let new_person = self.persons.add(new_person).await.map_err(Into::into)?;

    self.refresh_sources(person_id).await?;
    self.refresh_sources(new_person_id).await?;

    Ok(new_person)
  }

  /// Recomputes `Person.sources` for a person whose source-entity set
  /// just changed, so a split doesn't leave a stale tag behind.
  async fn refresh_sources(&self, person_id: Uuid) -> Result<()> {
    let mut person = self.persons.get_by_id(person_id).await.map_err(Into::into)?.ok_or(Error::NotFound(person_id))?;
    let source_types = self.source_entities.source_types_for_person(person_id).await.map_err(Into::into)?;
    person.sources = source_types.into_iter().map(|t: SourceType| t.to_string()).collect();

    let interactions = self.interactions.get_for_person(person_id).await.map_err(Into::into)?;
    let rollup = RollupCounts::from_interactions(&interactions);
    person.counts.meeting_count = rollup.meeting_count;
    person.counts.email_count = rollup.email_count;
    person.counts.mention_count = rollup.mention_count;
    person.counts.message_count = rollup.message_count;
    person.counts.slack_message_count = rollup.slack_message_count;
    person.counts.source_entity_count = self.source_entities.count_for_person(person_id).await.map_err(Into::into)? as u64;

    self.persons.update(person).await.map_err(Into::into)?;
    Ok(())
  }
}
