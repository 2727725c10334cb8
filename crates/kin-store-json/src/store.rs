//! [`JsonPersonStore`] — the JSON-file-backed `PersonStore`.
//!
//! Holds the full set of `Person` records plus the merge chain and
//! blocklist side tables. Writes to the primary snapshot go through the
//! safe-write protocol in [`crate::snapshot`]; the core is single-writer,
//! many-reader, so every mutation takes the write half of an
//! in-process `RwLock` around the whole in-memory state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use kin_core::person::Person;
use kin_core::store::{BlocklistEntry, PersonStore};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::snapshot::{read_or_default, write_people_safely, write_side_table};
use crate::{Error, Result};

struct State {
  people: HashMap<Uuid, Person>,
  by_email: HashMap<String, Uuid>,
  by_phone: HashMap<String, Uuid>,
  by_name: HashMap<String, Uuid>,
  merge_chain: HashMap<Uuid, Uuid>,
  blocklist: Vec<BlocklistEntry>,
}

impl State {
  fn rebuild_indexes(&mut self) {
    self.by_email.clear();
    self.by_phone.clear();
    self.by_name.clear();
    for person in self.people.values() {
      for email in &person.emails {
        self.by_email.insert(email.to_lowercase(), person.id);
      }
      for phone in &person.phone_numbers {
        self.by_phone.insert(phone.clone(), person.id);
      }
      self.by_name.insert(person.canonical_name.to_lowercase(), person.id);
      for alias in &person.aliases {
        self.by_name.insert(alias.to_lowercase(), person.id);
      }
    }
  }

  fn is_blocked(&self, identifier: &str) -> bool {
    let identifier = identifier.to_lowercase();
    self.blocklist.iter().any(|e| e.identifier == identifier)
  }
}

pub struct JsonPersonStore {
  state: RwLock<State>,
  people_path: PathBuf,
  merge_chain_path: PathBuf,
  blocklist_path: PathBuf,
  backup_dir: PathBuf,
}

impl JsonPersonStore {
  pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
    let root = root.as_ref().to_path_buf();
    std::fs::create_dir_all(&root)?;

    let people_path = root.join("people_entities.json");
    let merge_chain_path = root.join("merged_person_ids.json");
    let blocklist_path = root.join("blocklist.json");
    let backup_dir = root.join("backups");

    let people: Vec<Person> = read_or_default(&people_path)?;
    let merge_chain: HashMap<Uuid, Uuid> = read_or_default(&merge_chain_path)?;
    let blocklist: Vec<BlocklistEntry> = read_or_default(&blocklist_path)?;

    let mut state = State {
      people: people.into_iter().map(|p| (p.id, p)).collect(),
      by_email: HashMap::new(),
      by_phone: HashMap::new(),
      by_name: HashMap::new(),
      merge_chain,
      blocklist,
    };
    state.rebuild_indexes();

    Ok(Self { state: RwLock::new(state), people_path, merge_chain_path, blocklist_path, backup_dir })
  }

  fn persist_people(&self, state: &State) -> Result<()> {
    let people: Vec<Person> = state.people.values().cloned().collect();
    write_people_safely(&self.people_path, &self.backup_dir, &people, false)
  }

  fn persist_merge_chain(&self, state: &State) -> Result<()> {
    write_side_table(&self.merge_chain_path, &state.merge_chain)
  }

  fn persist_blocklist(&self, state: &State) -> Result<()> {
    write_side_table(&self.blocklist_path, &state.blocklist)
  }
}

fn resolve_canonical(state: &State, id: Uuid) -> Uuid {
  let mut current = id;
  let mut visited = std::collections::HashSet::new();
  visited.insert(current);
  while let Some(&next) = state.merge_chain.get(&current) {
    if !visited.insert(next) {
      tracing::warn!(start = %id, "merge chain cycle detected, returning first visited id");
      return id;
    }
    current = next;
  }
  current
}

impl PersonStore for JsonPersonStore {
  type Error = Error;

  async fn add(&self, person: Person) -> Result<Person> {
    let mut state = self.state.write().await;
    for email in &person.emails {
      if state.is_blocked(email) {
        return Err(kin_core::Error::Blocked(email.clone()).into());
      }
    }
    for phone in &person.phone_numbers {
      if state.is_blocked(phone) {
        return Err(kin_core::Error::Blocked(phone.clone()).into());
      }
    }
    state.people.insert(person.id, person.clone());
    state.rebuild_indexes();
    self.persist_people(&state)?;
    Ok(person)
  }

  async fn update(&self, person: Person) -> Result<Person> {
    let mut state = self.state.write().await;
    if !state.people.contains_key(&person.id) {
      return Err(Error::NotFound(person.id));
    }
    state.people.insert(person.id, person.clone());
    state.rebuild_indexes();
    self.persist_people(&state)?;
    Ok(person)
  }

  async fn delete(&self, id: Uuid) -> Result<()> {
    let mut state = self.state.write().await;
    state.people.remove(&id);
    state.rebuild_indexes();
    self.persist_people(&state)?;
    Ok(())
  }

  async fn get_by_id(&self, id: Uuid) -> Result<Option<Person>> {
    let state = self.state.read().await;
    let canonical = resolve_canonical(&state, id);
    Ok(state.people.get(&canonical).cloned())
  }

  async fn get_by_email(&self, email: &str) -> Result<Option<Person>> {
    let state = self.state.read().await;
    let Some(&id) = state.by_email.get(&email.to_lowercase()) else { return Ok(None) };
    let canonical = resolve_canonical(&state, id);
    Ok(state.people.get(&canonical).cloned())
  }

  async fn get_by_phone(&self, phone: &str) -> Result<Option<Person>> {
    let state = self.state.read().await;
    let Some(&id) = state.by_phone.get(phone) else { return Ok(None) };
    let canonical = resolve_canonical(&state, id);
    Ok(state.people.get(&canonical).cloned())
  }

  async fn get_by_name(&self, name: &str) -> Result<Option<Person>> {
    let state = self.state.read().await;
    let Some(&id) = state.by_name.get(&name.to_lowercase()) else { return Ok(None) };
    let canonical = resolve_canonical(&state, id);
    Ok(state.people.get(&canonical).cloned())
  }

  async fn search(&self, query: &str, limit: usize, include_hidden: bool, _include_merged: bool) -> Result<Vec<Person>> {
    let state = self.state.read().await;
    let query = query.to_lowercase();
    let mut matches: Vec<Person> = state
      .people
      .values()
      .filter(|p| include_hidden || !p.hidden)
      .filter(|p| {
        p.canonical_name.to_lowercase().contains(&query)
          || p.display_name.to_lowercase().contains(&query)
          || p.emails.iter().any(|e| e.to_lowercase().contains(&query))
          || p.aliases.iter().any(|a| a.to_lowercase().contains(&query))
      })
      .cloned()
      .collect();

    matches.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.canonical_name.cmp(&b.canonical_name)));
    matches.truncate(limit);
    Ok(matches)
  }

  async fn get_all(&self, include_hidden: bool) -> Result<Vec<Person>> {
    let state = self.state.read().await;
    Ok(state.people.values().filter(|p| include_hidden || !p.hidden).cloned().collect())
  }

  async fn count(&self) -> Result<usize> {
    let state = self.state.read().await;
    Ok(state.people.len())
  }

  async fn hide(&self, id: Uuid, reason: &str) -> Result<()> {
    let mut state = self.state.write().await;
    let canonical = resolve_canonical(&state, id);
    let person = state.people.get_mut(&canonical).ok_or(Error::NotFound(id))?;
    person.hidden = true;
    person.hidden_at = Some(chrono::Utc::now());
    person.hidden_reason = Some(reason.to_string());

    let name = person.canonical_name.clone();
    let emails = person.emails.clone();
    let phones = person.phone_numbers.clone();

    for email in emails {
      state.blocklist.push(BlocklistEntry {
        identifier: email.to_lowercase(),
        identifier_kind: kin_core::store::IdentifierKind::Email,
        person_name: name.clone(),
        reason: reason.to_string(),
        created_at: chrono::Utc::now(),
      });
    }
    for phone in phones {
      state.blocklist.push(BlocklistEntry {
        identifier: phone.to_lowercase(),
        identifier_kind: kin_core::store::IdentifierKind::Phone,
        person_name: name.clone(),
        reason: reason.to_string(),
        created_at: chrono::Utc::now(),
      });
    }

    self.persist_people(&state)?;
    self.persist_blocklist(&state)?;
    Ok(())
  }

  async fn get_canonical_id(&self, id: Uuid) -> Result<Uuid> {
    let state = self.state.read().await;
    Ok(resolve_canonical(&state, id))
  }

  async fn record_merge(&self, secondary: Uuid, primary: Uuid) -> Result<()> {
    let mut state = self.state.write().await;
    state.merge_chain.insert(secondary, primary);
    self.persist_merge_chain(&state)?;
    Ok(())
  }

  async fn is_blocked(&self, identifier: &str) -> Result<bool> {
    let state = self.state.read().await;
    Ok(state.is_blocked(identifier))
  }

  async fn add_to_blocklist(&self, mut entry: BlocklistEntry) -> Result<()> {
    entry.identifier = entry.identifier.to_lowercase();
    let mut state = self.state.write().await;
    state.blocklist.push(entry);
    self.persist_blocklist(&state)?;
    Ok(())
  }
}
