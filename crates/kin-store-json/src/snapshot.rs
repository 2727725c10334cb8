//! The safe-write protocol for the `Person` snapshot file: write to a
//! temp file in the same directory, re-parse and verify the record count,
//! retain a short rolling backup, then atomically rename over the target.
//!
//! A write that would drop the record count by more than half is rejected
//! as likely corruption unless the caller explicitly allows shrinking
//! (used by the CLI's `purge` path, not by normal mutation).

use std::path::{Path, PathBuf};

use chrono::Utc;
use kin_core::person::Person;

use crate::{Error, Result};

const CORRUPTION_DROP_RATIO: f64 = 0.5;
const BACKUPS_TO_KEEP: usize = 2;

pub fn write_people_safely(path: &Path, backup_dir: &Path, people: &[Person], allow_shrink: bool) -> Result<()> {
  let serialized = serde_json::to_vec_pretty(people)?;

  let tmp_path = path.with_extension("json.tmp");
  std::fs::write(&tmp_path, &serialized)?;

  let reparsed: Vec<Person> = serde_json::from_slice(&std::fs::read(&tmp_path)?)?;
  if reparsed.len() != people.len() {
    let _ = std::fs::remove_file(&tmp_path);
    return Err(Error::CorruptionGuard(format!(
      "re-parsed record count {} does not match written count {}",
      reparsed.len(),
      people.len()
    )));
  }

  if path.exists() {
    let previous_count = count_existing(path)?;
    if !allow_shrink && previous_count > 0 && (people.len() as f64) < (previous_count as f64) * CORRUPTION_DROP_RATIO {
      let _ = std::fs::remove_file(&tmp_path);
      return Err(Error::CorruptionGuard(format!(
        "write would drop record count from {previous_count} to {} (> 50%); aborting",
        people.len()
      )));
    }
    backup_existing(path, backup_dir)?;
  }

  std::fs::rename(&tmp_path, path)?;
  Ok(())
}

fn count_existing(path: &Path) -> Result<usize> {
  let bytes = std::fs::read(path)?;
  if bytes.is_empty() {
    return Ok(0);
  }
  let existing: Vec<Person> = serde_json::from_slice(&bytes)?;
  Ok(existing.len())
}

fn backup_existing(path: &Path, backup_dir: &Path) -> Result<()> {
  std::fs::create_dir_all(backup_dir)?;
  let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("people_entities");
  let backup_path = backup_dir.join(format!("{stem}.{}.json", Utc::now().timestamp_millis()));
  std::fs::copy(path, &backup_path)?;
  prune_backups(backup_dir, stem)?;
  Ok(())
}

fn prune_backups(backup_dir: &Path, stem: &str) -> Result<()> {
  let mut backups: Vec<PathBuf> = std::fs::read_dir(backup_dir)?
    .filter_map(|entry| entry.ok())
    .map(|entry| entry.path())
    .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with(stem) && n.ends_with(".json")))
    .collect();
  backups.sort();
  while backups.len() > BACKUPS_TO_KEEP {
    let oldest = backups.remove(0);
    let _ = std::fs::remove_file(oldest);
  }
  Ok(())
}

/// A plain atomic write (temp file + rename) for the merge-chain and
/// blocklist side tables. These are not record-count guarded — they are
/// small, append-mostly maps rather than the primary snapshot.
pub fn write_side_table<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
  let tmp_path = path.with_extension("json.tmp");
  std::fs::write(&tmp_path, serde_json::to_vec_pretty(value)?)?;
  std::fs::rename(&tmp_path, path)?;
  Ok(())
}

pub fn read_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T> {
  if !path.exists() {
    return Ok(T::default());
  }
  let bytes = std::fs::read(path)?;
  if bytes.is_empty() {
    return Ok(T::default());
  }
  Ok(serde_json::from_slice(&bytes)?)
}
