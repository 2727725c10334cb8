//! `NicknameIndex` (spec §4.3): bidirectional lookup of known first-name
//! variants, loaded from a `(formal, nickname)` CSV
//! (SPEC_FULL.md §13, grounded on `nickname_lookup.py`).

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct NicknameIndex {
  formal_to_nicknames: HashMap<String, HashSet<String>>,
  nickname_to_formal: HashMap<String, HashSet<String>>,
  all_variants: HashMap<String, HashSet<String>>,
}

impl NicknameIndex {
  /// Builds the index from `(formal, nickname)` pairs — one row per
  /// `relationship == "has_nickname"` line in the source CSV.
  pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
    let mut formal_to_nicknames: HashMap<String, HashSet<String>> = HashMap::new();
    let mut nickname_to_formal: HashMap<String, HashSet<String>> = HashMap::new();
    let mut all_variants: HashMap<String, HashSet<String>> = HashMap::new();

    for (formal, nickname) in pairs {
      let formal = formal.trim().to_lowercase();
      let nickname = nickname.trim().to_lowercase();
      if formal.is_empty() || nickname.is_empty() {
        continue;
      }
      formal_to_nicknames.entry(formal.clone()).or_default().insert(nickname.clone());
      nickname_to_formal.entry(nickname.clone()).or_default().insert(formal.clone());
      all_variants.entry(formal.clone()).or_default().insert(nickname.clone());
      all_variants.entry(nickname).or_default().insert(formal);
    }

    // One hop of sibling expansion: nicknames sharing a formal root become
    // variants of each other, without cascading further.
    for nicknames in formal_to_nicknames.values() {
      for nick in nicknames {
        let siblings = all_variants.entry(nick.clone()).or_default();
        for other in nicknames {
          if other != nick {
            siblings.insert(other.clone());
          }
        }
      }
    }

    Self {
      formal_to_nicknames,
      nickname_to_formal,
      all_variants,
    }
  }

  pub fn get_name_variants(&self, name: &str) -> HashSet<String> {
    self.all_variants.get(&name.to_lowercase()).cloned().unwrap_or_default()
  }

  pub fn get_nicknames(&self, formal_name: &str) -> HashSet<String> {
    self.formal_to_nicknames.get(&formal_name.to_lowercase()).cloned().unwrap_or_default()
  }

  pub fn get_formal_names(&self, nickname: &str) -> HashSet<String> {
    self.nickname_to_formal.get(&nickname.to_lowercase()).cloned().unwrap_or_default()
  }

  /// Parses the `name1,name2,relationship` CSV format, keeping only rows
  /// where `relationship == "has_nickname"`. No quoting support — the
  /// source data is plain first names.
  pub fn from_csv_str(contents: &str) -> Self {
    let pairs = contents.lines().skip(1).filter_map(|line| {
      let mut fields = line.splitn(3, ',');
      let name1 = fields.next()?.trim();
      let name2 = fields.next()?.trim();
      let relationship = fields.next()?.trim();
      (relationship == "has_nickname").then(|| (name1.to_string(), name2.to_string()))
    });
    Self::from_pairs(pairs)
  }

  /// True iff `a == b` (case-insensitive) or `b` is a known variant of `a`.
  pub fn are_variants(&self, a: &str, b: &str) -> bool {
    if a.eq_ignore_ascii_case(b) {
      return true;
    }
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    self
      .all_variants
      .get(&a_lower)
      .map(|variants| variants.contains(&b_lower))
      .unwrap_or(false)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> NicknameIndex {
    NicknameIndex::from_pairs(vec![
      ("benjamin".into(), "ben".into()),
      ("benjamin".into(), "benji".into()),
      ("michael".into(), "mike".into()),
    ])
  }

  #[test]
  fn direct_variant_matches() {
    let idx = sample();
    assert!(idx.are_variants("Ben", "Benjamin"));
    assert!(idx.are_variants("Mike", "Michael"));
  }

  #[test]
  fn sibling_via_shared_formal_matches() {
    let idx = sample();
    assert!(idx.are_variants("Ben", "Benji"));
  }

  #[test]
  fn unrelated_names_do_not_match() {
    let idx = sample();
    assert!(!idx.are_variants("John", "Michael"));
  }

  #[test]
  fn identical_names_are_variants_even_when_unknown() {
    let idx = NicknameIndex::default();
    assert!(idx.are_variants("Anyone", "anyone"));
  }
}
