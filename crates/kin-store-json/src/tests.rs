use kin_core::person::Person;
use kin_core::store::{BlocklistEntry, IdentifierKind, PersonStore};
use uuid::Uuid;

use crate::JsonPersonStore;

async fn store() -> (tempfile::TempDir, JsonPersonStore) {
  let dir = tempfile::tempdir().unwrap();
  let store = JsonPersonStore::open(dir.path()).await.unwrap();
  (dir, store)
}

fn person_with_email(name: &str, email: &str) -> Person {
  let mut p = Person::new(name);
  p.add_email(email);
  p
}

#[tokio::test]
async fn add_and_get_by_id_roundtrips() {
  let (_dir, store) = store().await;
  let person = person_with_email("Ada Lovelace", "ada@example.com");
  let added = store.add(person.clone()).await.unwrap();
  let fetched = store.get_by_id(added.id).await.unwrap().unwrap();
  assert_eq!(fetched.canonical_name, "Ada Lovelace");
}

#[tokio::test]
async fn add_rejects_blocklisted_email() {
  let (_dir, store) = store().await;
  store
    .add_to_blocklist(BlocklistEntry {
      identifier: "spam@example.com".into(),
      identifier_kind: IdentifierKind::Email,
      person_name: "Spam Bot".into(),
      reason: "newsletter sender".into(),
      created_at: chrono::Utc::now(),
    })
    .await
    .unwrap();

  let person = person_with_email("Spam Bot", "spam@example.com");
  let result = store.add(person).await;
  assert!(result.is_err());
}

#[tokio::test]
async fn get_by_email_is_case_insensitive() {
  let (_dir, store) = store().await;
  let person = person_with_email("Ada Lovelace", "ada@example.com");
  store.add(person).await.unwrap();

  let found = store.get_by_email("ADA@EXAMPLE.COM").await.unwrap();
  assert!(found.is_some());
}

#[tokio::test]
async fn update_persists_and_reindexes() {
  let (_dir, store) = store().await;
  let mut person = person_with_email("Ada Lovelace", "ada@example.com");
  person = store.add(person).await.unwrap();

  person.add_email("ada@newdomain.com");
  store.update(person.clone()).await.unwrap();

  let found = store.get_by_email("ada@newdomain.com").await.unwrap();
  assert_eq!(found.unwrap().id, person.id);
}

#[tokio::test]
async fn hide_adds_identifiers_to_blocklist() {
  let (_dir, store) = store().await;
  let person = person_with_email("Spam Bot", "spam@example.com");
  let added = store.add(person).await.unwrap();

  store.hide(added.id, "bulk sender").await.unwrap();

  let fetched = store.get_by_id(added.id).await.unwrap().unwrap();
  assert!(fetched.hidden);
  assert!(store.is_blocked("spam@example.com").await.unwrap());
}

#[tokio::test]
async fn search_excludes_hidden_by_default() {
  let (_dir, store) = store().await;
  let person = person_with_email("Spam Bot", "spam@example.com");
  let added = store.add(person).await.unwrap();
  store.hide(added.id, "bulk sender").await.unwrap();

  let results = store.search("spam", 10, false, false).await.unwrap();
  assert!(results.is_empty());

  let results_incl = store.search("spam", 10, true, false).await.unwrap();
  assert_eq!(results_incl.len(), 1);
}

#[tokio::test]
async fn get_canonical_id_follows_merge_chain_transitively() {
  let (_dir, store) = store().await;
  let a = Uuid::new_v4();
  let b = Uuid::new_v4();
  let c = Uuid::new_v4();
  store.record_merge(a, b).await.unwrap();
  store.record_merge(b, c).await.unwrap();

  assert_eq!(store.get_canonical_id(a).await.unwrap(), c);
}

#[tokio::test]
async fn get_canonical_id_survives_a_cycle() {
  let (_dir, store) = store().await;
  let a = Uuid::new_v4();
  let b = Uuid::new_v4();
  store.record_merge(a, b).await.unwrap();
  store.record_merge(b, a).await.unwrap();

  // Must terminate rather than loop forever; returns the id it started from.
  assert_eq!(store.get_canonical_id(a).await.unwrap(), a);
}

#[tokio::test]
async fn state_survives_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let id = {
    let store = JsonPersonStore::open(dir.path()).await.unwrap();
    let person = person_with_email("Ada Lovelace", "ada@example.com");
    store.add(person).await.unwrap().id
  };

  let reopened = JsonPersonStore::open(dir.path()).await.unwrap();
  assert!(reopened.get_by_id(id).await.unwrap().is_some());
}

#[tokio::test]
async fn corruption_guard_rejects_a_large_record_drop() {
  let dir = tempfile::tempdir().unwrap();
  let people_path = dir.path().join("people_entities.json");
  let backup_dir = dir.path().join("backups");

  let initial: Vec<Person> = (0..10).map(|i| Person::new(format!("Person {i}"))).collect();
  crate::snapshot::write_people_safely(&people_path, &backup_dir, &initial, false).unwrap();

  let shrunk: Vec<Person> = initial.into_iter().take(2).collect();
  let result = crate::snapshot::write_people_safely(&people_path, &backup_dir, &shrunk, false);
  assert!(result.is_err());

  // The original file is untouched.
  let on_disk: Vec<Person> = serde_json::from_slice(&std::fs::read(&people_path).unwrap()).unwrap();
  assert_eq!(on_disk.len(), 10);
}

#[tokio::test]
async fn explicit_purge_bypasses_the_corruption_guard() {
  let dir = tempfile::tempdir().unwrap();
  let people_path = dir.path().join("people_entities.json");
  let backup_dir = dir.path().join("backups");

  let initial: Vec<Person> = (0..10).map(|i| Person::new(format!("Person {i}"))).collect();
  crate::snapshot::write_people_safely(&people_path, &backup_dir, &initial, false).unwrap();

  let shrunk: Vec<Person> = initial.into_iter().take(2).collect();
  crate::snapshot::write_people_safely(&people_path, &backup_dir, &shrunk, true).unwrap();

  let on_disk: Vec<Person> = serde_json::from_slice(&std::fs::read(&people_path).unwrap()).unwrap();
  assert_eq!(on_disk.len(), 2);
}
