//! `NameParser` (spec §4.2): strips credentials/prefixes/suffixes and
//! splits a display string into first/middle/last tokens.

const NAME_PREFIXES: &[&str] = &["dr", "mr", "mrs", "ms", "prof", "rev"];
const NAME_SUFFIXES: &[&str] = &[
  "md", "phd", "jr", "sr", "ii", "iii", "iv", "v", "esq", "mph",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
  pub first: String,
  pub middles: Vec<String>,
  pub last: Option<String>,
  pub original: String,
}

impl ParsedName {
  pub fn last_lower(&self) -> Option<String> {
    self.last.as_ref().map(|s| s.to_lowercase())
  }

  pub fn first_lower(&self) -> String {
    self.first.to_lowercase()
  }
}

fn strip_dots(token: &str) -> String {
  token.chars().filter(|c| *c != '.').collect::<String>().to_lowercase()
}

/// Parses a raw display string per spec §4.2's four-step procedure.
pub fn parse_name(raw: &str) -> ParsedName {
  let original = raw.to_string();
  let trimmed = raw.trim();

  // 1. Drop anything after the first comma (credentials like ", PhD, CLC").
  let before_comma = trimmed.split(',').next().unwrap_or("").trim();

  // 2. Tokenize on whitespace.
  let mut tokens: Vec<&str> = before_comma.split_whitespace().collect();

  // 3. Strip leading prefix tokens.
  while let Some(first) = tokens.first() {
    if NAME_PREFIXES.contains(&strip_dots(first).as_str()) {
      tokens.remove(0);
    } else {
      break;
    }
  }
  // Strip trailing suffix tokens.
  while let Some(last) = tokens.last() {
    if NAME_SUFFIXES.contains(&strip_dots(last).as_str()) {
      tokens.pop();
    } else {
      break;
    }
  }

  // 4. Branch on remaining token count.
  match tokens.len() {
    0 => ParsedName {
      first: before_comma.to_string(),
      middles: Vec::new(),
      last: None,
      original,
    },
    1 => ParsedName {
      first: tokens[0].to_string(),
      middles: Vec::new(),
      last: None,
      original,
    },
    2 => ParsedName {
      first: tokens[0].to_string(),
      middles: Vec::new(),
      last: Some(tokens[1].to_string()),
      original,
    },
    n => ParsedName {
      first: tokens[0].to_string(),
      middles: tokens[1..n - 1].iter().map(|s| s.to_string()).collect(),
      last: Some(tokens[n - 1].to_string()),
      original,
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn drops_credentials_after_comma() {
    let p = parse_name("Jane Smith, PhD, CLC");
    assert_eq!(p.first, "Jane");
    assert_eq!(p.last.as_deref(), Some("Smith"));
  }

  #[test]
  fn strips_prefix_and_suffix() {
    let p = parse_name("Dr. John Q. Public Jr.");
    assert_eq!(p.first, "John");
    assert_eq!(p.middles, vec!["Q."]);
    assert_eq!(p.last.as_deref(), Some("Public"));
  }

  #[test]
  fn single_token_is_first_only() {
    let p = parse_name("Cher");
    assert_eq!(p.first, "Cher");
    assert_eq!(p.last, None);
  }

  #[test]
  fn empty_name_has_no_last() {
    let p = parse_name("");
    assert_eq!(p.last, None);
  }

  #[test]
  fn three_tokens_yields_middle() {
    let p = parse_name("Mary Katherine Palmer");
    assert_eq!(p.first, "Mary");
    assert_eq!(p.middles, vec!["Katherine"]);
    assert_eq!(p.last.as_deref(), Some("Palmer"));
  }
}
