//! Storage-backend trait abstractions. Each trait separates this crate's
//! domain logic (resolver, strength engine, merge engine) from the
//! concrete backend (`kin-store-json` for `Person`, `kin-store-sqlite` for
//! everything else), following kith-core's `ContactStore` pattern.
//!
//! Traits use native `async fn` (see `lib.rs`'s `#![allow(async_fn_in_trait)]`)
//! rather than `async_trait`, matching the teacher crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interaction::Interaction;
use crate::link_override::LinkOverride;
use crate::person::Person;
use crate::relationship::Relationship;
use crate::review_queue::{ReviewCandidate, ReviewStatus, ReviewType};
use crate::source_entity::{LinkStatus, SourceEntity, SourceEntityStatistics, SourceType};

/// Identifier kind recorded on the blocklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IdentifierKind {
  Email,
  Phone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocklistEntry {
  pub identifier: String,
  pub identifier_kind: IdentifierKind,
  pub person_name: String,
  pub reason: String,
  pub created_at: DateTime<Utc>,
}

/// Durable set of `Person` records, secondary indexes, the merge chain,
/// and the blocklist (spec §4.4).
pub trait PersonStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  async fn add(&self, person: Person) -> Result<Person, Self::Error>;
  async fn update(&self, person: Person) -> Result<Person, Self::Error>;
  /// Removes the record from `by_id` and all secondary indexes. Used only
  /// by `MergeEngine` after a merge completes.
  async fn delete(&self, id: Uuid) -> Result<(), Self::Error>;

  /// Looks up by id, following the merge chain transitively with a
  /// visited-set cycle guard (spec §4.4's merge-chain semantics).
  async fn get_by_id(&self, id: Uuid) -> Result<Option<Person>, Self::Error>;
  async fn get_by_email(&self, email: &str) -> Result<Option<Person>, Self::Error>;
  async fn get_by_phone(&self, phone: &str) -> Result<Option<Person>, Self::Error>;
  async fn get_by_name(&self, name: &str) -> Result<Option<Person>, Self::Error>;

  /// Substring search over canonical name, display name, emails, and
  /// aliases; sorted `(last_seen desc, canonical_name asc)` per spec
  /// §4.4 (the literal spec text, not the original's fully-reversed sort —
  /// see DESIGN.md).
  async fn search(
    &self,
    query: &str,
    limit: usize,
    include_hidden: bool,
    include_merged: bool,
  ) -> Result<Vec<Person>, Self::Error>;

  async fn get_all(&self, include_hidden: bool) -> Result<Vec<Person>, Self::Error>;
  async fn count(&self) -> Result<usize, Self::Error>;

  /// Sets `hidden`, records the reason/time, adds every identifier on the
  /// record to the blocklist, and removes pending review-queue items
  /// referencing the person.
  async fn hide(&self, id: Uuid, reason: &str) -> Result<(), Self::Error>;

  /// Follows `MergeChain[x]` to a fixed point with a visited-set guard.
  /// On cycle detection, logs a single warning and returns the first
  /// visited id (spec §9).
  async fn get_canonical_id(&self, id: Uuid) -> Result<Uuid, Self::Error>;

  /// Records `secondary -> primary` durably in the merge chain.
  async fn record_merge(&self, secondary: Uuid, primary: Uuid) -> Result<(), Self::Error>;

  async fn is_blocked(&self, identifier: &str) -> Result<bool, Self::Error>;
  async fn add_to_blocklist(&self, entry: BlocklistEntry) -> Result<(), Self::Error>;
}

/// Durable set of `SourceEntity` records (spec §3.2, SPEC_FULL.md §10).
pub trait SourceEntityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  async fn add(&self, entity: SourceEntity) -> Result<SourceEntity, Self::Error>;
  /// Upserts keyed on `(source_type, source_id)`, preserving `id` and
  /// `created_at` across updates. Returns `(entity, was_created)`.
  async fn add_or_update(&self, entity: SourceEntity) -> Result<(SourceEntity, bool), Self::Error>;
  async fn update(&self, entity: SourceEntity) -> Result<SourceEntity, Self::Error>;

  async fn link_to_person(
    &self,
    id: Uuid,
    person_id: Uuid,
    confidence: f64,
    status: LinkStatus,
  ) -> Result<bool, Self::Error>;
  async fn unlink(&self, id: Uuid) -> Result<bool, Self::Error>;

  async fn get_by_id(&self, id: Uuid) -> Result<Option<SourceEntity>, Self::Error>;
  async fn get_by_source(&self, source_type: SourceType, source_id: &str) -> Result<Option<SourceEntity>, Self::Error>;
  async fn get_for_person(
    &self,
    person_id: Uuid,
    source_type: Option<SourceType>,
    limit: Option<usize>,
  ) -> Result<Vec<SourceEntity>, Self::Error>;
  async fn get_unlinked(&self, source_type: Option<SourceType>, limit: usize) -> Result<Vec<SourceEntity>, Self::Error>;
  async fn get_by_email(&self, email: &str) -> Result<Vec<SourceEntity>, Self::Error>;
  async fn get_by_phone(&self, phone: &str) -> Result<Vec<SourceEntity>, Self::Error>;
  async fn get_unlinked_by_email(&self, email: &str) -> Result<Vec<SourceEntity>, Self::Error>;
  async fn get_unlinked_by_phone(&self, phone: &str) -> Result<Vec<SourceEntity>, Self::Error>;

  async fn get_low_confidence(&self, min: f64, max: f64, limit: usize) -> Result<Vec<SourceEntity>, Self::Error>;
  async fn count_low_confidence(&self, min: f64, max: f64) -> Result<usize, Self::Error>;

  /// Attaches previously orphaned unlinked entities carrying `email` to
  /// `person_id`, skipping rows whose link is already confirmed. Returns
  /// the count linked.
  async fn link_unlinked_by_email(&self, email: &str, person_id: Uuid, confidence: f64) -> Result<usize, Self::Error>;
  async fn link_unlinked_by_phone(&self, phone: &str, person_id: Uuid, confidence: f64) -> Result<usize, Self::Error>;

  async fn record_match_attempt(&self, id: Uuid) -> Result<bool, Self::Error>;
  async fn get_unlinked_for_rematching(
    &self,
    source_type: Option<SourceType>,
    min_days_since_attempt: i64,
    max_attempts: u32,
    limit: usize,
  ) -> Result<Vec<SourceEntity>, Self::Error>;

  /// Rewrites `canonical_person_id` from `from` to `to` on every matching
  /// row (spec §4.5.1 step 5 / §4.5.2 step 1).
  async fn reassign_person(&self, from: Uuid, to: Uuid, source_types: Option<&[SourceType]>) -> Result<usize, Self::Error>;

  async fn delete(&self, id: Uuid) -> Result<bool, Self::Error>;
  async fn delete_for_person(&self, person_id: Uuid) -> Result<usize, Self::Error>;
  async fn count(&self) -> Result<usize, Self::Error>;
  async fn count_for_person(&self, person_id: Uuid) -> Result<usize, Self::Error>;
  /// Distinct source tags observed for a person — feeds `Person.sources`
  /// refresh after split (spec §4.5.2 step 3).
  async fn source_types_for_person(&self, person_id: Uuid) -> Result<Vec<SourceType>, Self::Error>;

  /// Operator-facing aggregate counts (SPEC_FULL.md §10).
  async fn get_statistics(&self) -> Result<SourceEntityStatistics, Self::Error>;
}

/// Durable set of symmetric `Relationship` records keyed on the normalized
/// pair (spec §3.3).
pub trait RelationshipStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  async fn add(&self, relationship: Relationship) -> Result<Relationship, Self::Error>;
  async fn update(&self, relationship: Relationship) -> Result<Relationship, Self::Error>;
  async fn get_by_id(&self, id: Uuid) -> Result<Option<Relationship>, Self::Error>;
  async fn get_between(&self, a: Uuid, b: Uuid) -> Result<Option<Relationship>, Self::Error>;
  async fn get_for_person(&self, person_id: Uuid) -> Result<Vec<Relationship>, Self::Error>;
  /// Batch-fetch optimization: one IN-clause query, grouped per person.
  async fn get_for_people_batch(&self, person_ids: &[Uuid]) -> Result<Vec<Relationship>, Self::Error>;
  async fn get_all(&self) -> Result<Vec<Relationship>, Self::Error>;
  async fn delete(&self, id: Uuid) -> Result<bool, Self::Error>;
  async fn delete_for_person(&self, person_id: Uuid) -> Result<usize, Self::Error>;
  async fn count(&self) -> Result<usize, Self::Error>;
}

/// Append-only log of `Interaction` events (spec §3.4).
pub trait InteractionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Deduplicated on `(source_type, source_id)`.
  async fn add_if_not_exists(&self, interaction: Interaction) -> Result<bool, Self::Error>;
  async fn get_for_person(&self, person_id: Uuid) -> Result<Vec<Interaction>, Self::Error>;
  async fn get_for_person_and_types(&self, person_id: Uuid, source_types: &[SourceType]) -> Result<Vec<Interaction>, Self::Error>;
  async fn get_for_person_since(&self, person_id: Uuid, since: DateTime<Utc>) -> Result<Vec<Interaction>, Self::Error>;
  /// Rewrites `person_id` from `from` to `to`, optionally filtered to
  /// `source_types` (spec §4.5.1 step 4 / §4.5.2 step 2).
  async fn reassign_person(&self, from: Uuid, to: Uuid, source_types: Option<&[SourceType]>) -> Result<usize, Self::Error>;
  async fn count_for_person(&self, person_id: Uuid) -> Result<usize, Self::Error>;
}

pub trait LinkOverrideStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  async fn add(&self, rule: LinkOverride) -> Result<LinkOverride, Self::Error>;
  async fn get_all(&self) -> Result<Vec<LinkOverride>, Self::Error>;
  async fn find_matching(&self, name: &str, source_type: Option<&str>, context_path: Option<&str>) -> Result<Option<LinkOverride>, Self::Error>;
  async fn get_for_person(&self, person_id: Uuid) -> Result<Vec<LinkOverride>, Self::Error>;
  async fn delete(&self, id: Uuid) -> Result<bool, Self::Error>;
}

pub trait ReviewQueueStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  async fn add_duplicate(
    &self,
    a_id: Uuid,
    a_name: &str,
    b_id: Uuid,
    b_name: &str,
    confidence: f64,
    reason: &str,
    batch_id: Option<&str>,
  ) -> Result<ReviewCandidate, Self::Error>;

  async fn add_single(
    &self,
    review_type: ReviewType,
    person_id: Uuid,
    person_name: &str,
    confidence: f64,
    reason: &str,
    batch_id: Option<&str>,
  ) -> Result<ReviewCandidate, Self::Error>;

  async fn get_by_id(&self, id: Uuid) -> Result<Option<ReviewCandidate>, Self::Error>;
  async fn get_pending(&self, review_type: Option<ReviewType>, limit: usize, offset: usize) -> Result<Vec<ReviewCandidate>, Self::Error>;
  async fn mark_reviewed(&self, id: Uuid, status: ReviewStatus) -> Result<Option<ReviewCandidate>, Self::Error>;
  async fn clear_pending(&self, review_type: Option<ReviewType>) -> Result<usize, Self::Error>;
  async fn remove_for_person(&self, person_id: Uuid) -> Result<usize, Self::Error>;
}
