//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::Utc;
use kin_core::interaction::Interaction;
use kin_core::link_override::LinkOverride;
use kin_core::relationship::{Relationship, RelationshipType};
use kin_core::review_queue::{ReviewStatus, ReviewType};
use kin_core::source_entity::{LinkStatus, SourceEntity, SourceType};
use kin_core::store::{InteractionStore, LinkOverrideStore, RelationshipStore, ReviewQueueStore, SourceEntityStore};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.expect("open in-memory store")
}

fn gmail_entity(email: &str, name: &str) -> SourceEntity {
  let mut e = SourceEntity::new(SourceType::Gmail, Some(format!("gmail-{email}")));
  e.observed_email = Some(email.to_string());
  e.observed_name = Some(name.to_string());
  e
}

#[tokio::test]
async fn add_and_get_source_entity_by_id() {
  let store = store().await;
  let entity = gmail_entity("sam@example.com", "Sam Altman");
  let added = SourceEntityStore::add(&store, entity.clone()).await.unwrap();
  let fetched = SourceEntityStore::get_by_id(&store, added.id).await.unwrap().unwrap();
  assert_eq!(fetched.observed_email.as_deref(), Some("sam@example.com"));
}

#[tokio::test]
async fn add_or_update_preserves_id_and_created_at_on_repeat() {
  let store = store().await;
  let entity = gmail_entity("sam@example.com", "Sam Altman");
  let (first, created) = store.add_or_update(entity.clone()).await.unwrap();
  assert!(created);

  let mut resubmitted = gmail_entity("sam@example.com", "Samuel Altman");
  resubmitted.source_id = entity.source_id.clone();
  let (second, created_again) = store.add_or_update(resubmitted).await.unwrap();
  assert!(!created_again);
  assert_eq!(second.id, first.id);
  assert_eq!(second.created_at, first.created_at);
  assert_eq!(second.observed_name.as_deref(), Some("Samuel Altman"));
}

#[tokio::test]
async fn link_to_person_refuses_to_overwrite_confirmed_with_auto() {
  let store = store().await;
  let entity = SourceEntityStore::add(&store, gmail_entity("a@example.com", "A")).await.unwrap();
  let person_id = Uuid::new_v4();
  let other_person = Uuid::new_v4();

  assert!(store.link_to_person(entity.id, person_id, 1.0, LinkStatus::Confirmed).await.unwrap());
  assert!(!store.link_to_person(entity.id, other_person, 0.6, LinkStatus::Auto).await.unwrap());

  let fetched = SourceEntityStore::get_by_id(&store, entity.id).await.unwrap().unwrap();
  assert_eq!(fetched.canonical_person_id, Some(person_id));
  assert_eq!(fetched.link_status, LinkStatus::Confirmed);
}

#[tokio::test]
async fn unlink_clears_canonical_person() {
  let store = store().await;
  let entity = SourceEntityStore::add(&store, gmail_entity("a@example.com", "A")).await.unwrap();
  let person_id = Uuid::new_v4();
  store.link_to_person(entity.id, person_id, 0.8, LinkStatus::Auto).await.unwrap();
  assert!(store.unlink(entity.id).await.unwrap());

  let fetched = SourceEntityStore::get_by_id(&store, entity.id).await.unwrap().unwrap();
  assert!(fetched.canonical_person_id.is_none());
}

#[tokio::test]
async fn get_unlinked_by_email_is_case_insensitive() {
  let store = store().await;
  SourceEntityStore::add(&store, gmail_entity("Sam@Example.com", "Sam")).await.unwrap();
  let found = store.get_unlinked_by_email("sam@example.com").await.unwrap();
  assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn link_unlinked_by_email_skips_confirmed_rows() {
  let store = store().await;
  let confirmed = SourceEntityStore::add(&store, gmail_entity("sam@example.com", "Sam")).await.unwrap();
  store.link_to_person(confirmed.id, Uuid::new_v4(), 1.0, LinkStatus::Confirmed).await.unwrap();

  let mut second = gmail_entity("sam@example.com", "Sam");
  second.source_id = Some("gmail-sam-2".into());
  SourceEntityStore::add(&store, second).await.unwrap();

  let person_id = Uuid::new_v4();
  let linked = store.link_unlinked_by_email("sam@example.com", person_id, 0.7).await.unwrap();
  assert_eq!(linked, 1);
}

#[tokio::test]
async fn record_match_attempt_increments_count_only_while_unlinked() {
  let store = store().await;
  let entity = SourceEntityStore::add(&store, gmail_entity("a@example.com", "A")).await.unwrap();
  assert!(store.record_match_attempt(entity.id).await.unwrap());
  let fetched = SourceEntityStore::get_by_id(&store, entity.id).await.unwrap().unwrap();
  assert_eq!(fetched.match_attempt_count, 1);

  store.link_to_person(entity.id, Uuid::new_v4(), 0.9, LinkStatus::Auto).await.unwrap();
  assert!(!store.record_match_attempt(entity.id).await.unwrap());
}

#[tokio::test]
async fn reassign_person_moves_matching_rows() {
  let store = store().await;
  let from = Uuid::new_v4();
  let to = Uuid::new_v4();
  let entity = SourceEntityStore::add(&store, gmail_entity("a@example.com", "A")).await.unwrap();
  store.link_to_person(entity.id, from, 0.9, LinkStatus::Auto).await.unwrap();

  let moved = SourceEntityStore::reassign_person(&store, from, to, None).await.unwrap();
  assert_eq!(moved, 1);
  let fetched = SourceEntityStore::get_by_id(&store, entity.id).await.unwrap().unwrap();
  assert_eq!(fetched.canonical_person_id, Some(to));
}

#[tokio::test]
async fn delete_for_person_removes_all_linked_source_entities() {
  let store = store().await;
  let person_id = Uuid::new_v4();
  let e1 = SourceEntityStore::add(&store, gmail_entity("a@example.com", "A")).await.unwrap();
  store.link_to_person(e1.id, person_id, 0.9, LinkStatus::Auto).await.unwrap();

  let deleted = SourceEntityStore::delete_for_person(&store, person_id).await.unwrap();
  assert_eq!(deleted, 1);
  assert_eq!(SourceEntityStore::count(&store).await.unwrap(), 0);
}

#[tokio::test]
async fn add_and_get_relationship_between_normalizes_pair() {
  let store = store().await;
  let a = Uuid::new_v4();
  let b = Uuid::new_v4();
  let relationship = Relationship::new(a, b, RelationshipType::Coworker);
  RelationshipStore::add(&store, relationship.clone()).await.unwrap();

  let fetched = store.get_between(b, a).await.unwrap().unwrap();
  assert_eq!(fetched.id, relationship.id);
}

#[tokio::test]
async fn get_for_person_finds_relationship_on_either_side() {
  let store = store().await;
  let a = Uuid::new_v4();
  let b = Uuid::new_v4();
  RelationshipStore::add(&store, Relationship::new(a, b, RelationshipType::Friend)).await.unwrap();

  assert_eq!(RelationshipStore::get_for_person(&store, a).await.unwrap().len(), 1);
  assert_eq!(RelationshipStore::get_for_person(&store, b).await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_for_person_removes_their_relationships() {
  let store = store().await;
  let a = Uuid::new_v4();
  let b = Uuid::new_v4();
  RelationshipStore::add(&store, Relationship::new(a, b, RelationshipType::Friend)).await.unwrap();

  let deleted = RelationshipStore::delete_for_person(&store, a).await.unwrap();
  assert_eq!(deleted, 1);
  assert_eq!(RelationshipStore::count(&store).await.unwrap(), 0);
}

#[tokio::test]
async fn add_if_not_exists_deduplicates_on_source_id() {
  let store = store().await;
  let person_id = Uuid::new_v4();
  let mut i1 = Interaction::new(person_id, Utc::now(), SourceType::Gmail);
  i1.source_id = Some("msg-1".into());

  assert!(store.add_if_not_exists(i1.clone()).await.unwrap());

  let mut i2 = Interaction::new(person_id, Utc::now(), SourceType::Gmail);
  i2.source_id = Some("msg-1".into());
  assert!(!store.add_if_not_exists(i2).await.unwrap());

  assert_eq!(InteractionStore::count_for_person(&store, person_id).await.unwrap(), 1);
}

#[tokio::test]
async fn reassign_person_on_interactions_filters_by_source_type() {
  let store = store().await;
  let from = Uuid::new_v4();
  let to = Uuid::new_v4();

  let mut gmail = Interaction::new(from, Utc::now(), SourceType::Gmail);
  gmail.source_id = Some("g1".into());
  store.add_if_not_exists(gmail).await.unwrap();

  let mut slack = Interaction::new(from, Utc::now(), SourceType::Slack);
  slack.source_id = Some("s1".into());
  store.add_if_not_exists(slack).await.unwrap();

  let moved = InteractionStore::reassign_person(&store, from, to, Some(&[SourceType::Gmail])).await.unwrap();
  assert_eq!(moved, 1);
  assert_eq!(InteractionStore::count_for_person(&store, to).await.unwrap(), 1);
  assert_eq!(InteractionStore::count_for_person(&store, from).await.unwrap(), 1);
}

#[tokio::test]
async fn link_override_find_matching_prefers_most_specific() {
  let store = store().await;
  let general = LinkOverride::new("Sarah", Uuid::new_v4());
  LinkOverrideStore::add(&store, general).await.unwrap();

  let mut specific = LinkOverride::new("Sarah", Uuid::new_v4());
  specific.context_pattern = Some("Work/".into());
  let specific_id = specific.preferred_person_id;
  LinkOverrideStore::add(&store, specific).await.unwrap();

  let found = store.find_matching("sarah", None, Some("/vault/Work/notes.md")).await.unwrap().unwrap();
  assert_eq!(found.preferred_person_id, specific_id);
}

#[tokio::test]
async fn add_duplicate_review_is_idempotent_over_the_pair() {
  let store = store().await;
  let a = Uuid::new_v4();
  let b = Uuid::new_v4();

  let first = store.add_duplicate(a, "Alice", b, "Bob", 0.8, "fuzzy name match", None).await.unwrap();
  let second = store.add_duplicate(b, "Bob", a, "Alice", 0.9, "fuzzy name match", None).await.unwrap();
  assert_eq!(first.id, second.id);

  let pending = store.get_pending(Some(ReviewType::Duplicate), 10, 0).await.unwrap();
  assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn get_pending_orders_by_confidence_desc() {
  let store = store().await;
  store.add_single(ReviewType::NonHuman, Uuid::new_v4(), "Newsletter Bot", 0.4, "bulk sender", None).await.unwrap();
  store.add_single(ReviewType::NonHuman, Uuid::new_v4(), "Support Bot", 0.9, "bulk sender", None).await.unwrap();

  let pending = store.get_pending(Some(ReviewType::NonHuman), 10, 0).await.unwrap();
  assert_eq!(pending.len(), 2);
  assert!(pending[0].confidence >= pending[1].confidence);
}

#[tokio::test]
async fn mark_reviewed_sets_status_and_timestamp() {
  let store = store().await;
  let candidate = store.add_single(ReviewType::OverMerged, Uuid::new_v4(), "Merged Person", 0.7, "two companies", None).await.unwrap();

  let reviewed = store.mark_reviewed(candidate.id, ReviewStatus::Split).await.unwrap().unwrap();
  assert_eq!(reviewed.status, ReviewStatus::Split);
  assert!(reviewed.reviewed_at.is_some());

  let pending = store.get_pending(Some(ReviewType::OverMerged), 10, 0).await.unwrap();
  assert!(pending.is_empty());
}

#[tokio::test]
async fn remove_for_person_clears_pending_entries_referencing_them() {
  let store = store().await;
  let a = Uuid::new_v4();
  let b = Uuid::new_v4();
  store.add_duplicate(a, "Alice", b, "Bob", 0.8, "fuzzy name match", None).await.unwrap();

  let removed = store.remove_for_person(b).await.unwrap();
  assert_eq!(removed, 1);
  assert!(store.get_pending(Some(ReviewType::Duplicate), 10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn get_statistics_counts_total_linked_and_by_source() {
  let store = store().await;
  let linked = SourceEntityStore::add(&store, gmail_entity("linked@example.com", "Linked")).await.unwrap();
  store.link_to_person(linked.id, Uuid::new_v4(), 0.9, LinkStatus::Confirmed).await.unwrap();
  SourceEntityStore::add(&store, gmail_entity("unlinked@example.com", "Unlinked")).await.unwrap();

  let stats = store.get_statistics().await.unwrap();
  assert_eq!(stats.total_entities, 2);
  assert_eq!(stats.linked_entities, 1);
  assert_eq!(stats.by_source_type.get(&SourceType::Gmail).copied(), Some(2));
  assert_eq!(stats.by_link_status.get(&LinkStatus::Confirmed).copied(), Some(1));
}
