//! `ConfigRegistry` (spec §4.1, SPEC_FULL.md §13): immutable-at-runtime
//! weights, thresholds, and mapping tables. Loaded once at startup;
//! mutated only by an explicit `reload()` call, never by a lazily-cached
//! global (spec §9 "mutable singletons").

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;
use crate::nickname::NicknameIndex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainMapping {
  pub company: Option<String>,
  #[serde(default)]
  pub vault_contexts: Vec<String>,
  #[serde(default = "default_category")]
  pub category: String,
}

fn default_category() -> String {
  "unknown".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyNormalization {
  #[serde(default)]
  pub domains: Vec<String>,
  #[serde(default)]
  pub vault_contexts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mappings {
  #[serde(default)]
  pub domain_mappings: HashMap<String, DomainMapping>,
  #[serde(default)]
  pub company_normalization: HashMap<String, CompanyNormalization>,
}

impl Default for Mappings {
  fn default() -> Self {
    let defaults = [
      ("gmail.com", "Personal/"),
      ("icloud.com", "Personal/"),
      ("outlook.com", "Personal/"),
      ("hotmail.com", "Personal/"),
      ("yahoo.com", "Personal/"),
    ];
    let domain_mappings = defaults
      .into_iter()
      .map(|(domain, ctx)| {
        (
          domain.to_string(),
          DomainMapping {
            company: None,
            vault_contexts: vec![ctx.to_string()],
            category: "personal".to_string(),
          },
        )
      })
      .collect();
    Self {
      domain_mappings,
      company_normalization: HashMap::new(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityResolutionSettings {
  pub min_match_score: f64,
  pub disambiguation_threshold: f64,
  pub context_boost_points: f64,
  pub recency_boost_points: f64,
  pub recency_boost_threshold_days: i64,
  pub name_similarity_weight: f64,
  pub close_candidate_threshold: f64,
  pub close_candidate_strength_margin: f64,
}

impl Default for EntityResolutionSettings {
  fn default() -> Self {
    Self {
      min_match_score: 50.0,
      disambiguation_threshold: 15.0,
      context_boost_points: 20.0,
      recency_boost_points: 10.0,
      recency_boost_threshold_days: 30,
      name_similarity_weight: 1.0,
      close_candidate_threshold: 30.0,
      close_candidate_strength_margin: 25.0,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrengthSettings {
  pub recency_weight: f64,
  pub frequency_weight: f64,
  pub diversity_weight: f64,
  pub recency_window_days: i64,
  pub recent_frequency_weight: f64,
  pub lifetime_frequency_weight: f64,
  pub frequency_target: f64,
  pub lifetime_frequency_target: f64,
  pub frequency_window_days: i64,
  pub lifetime_window_days: i64,
  pub min_interactions_for_full_recency: u64,
  pub zero_interaction_recency_multiplier: f64,
  pub peripheral_threshold: f64,
  pub channel_weights: HashMap<String, f64>,
  pub circle_thresholds: Vec<u32>,
  pub self_linkedin_multiplier: f64,
  pub self_family_multiplier: f64,
}

impl Default for StrengthSettings {
  fn default() -> Self {
    let channel_weights = [
      ("imessage", 1.5),
      ("whatsapp", 1.5),
      ("signal", 1.5),
      ("phone_call", 2.0),
      ("slack", 1.2),
      ("calendar", 1.0),
      ("gmail", 0.8),
      ("vault", 0.7),
      ("granola", 0.7),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    Self {
      recency_weight: 0.40,
      frequency_weight: 0.45,
      diversity_weight: 0.15,
      recency_window_days: 365,
      recent_frequency_weight: 0.6,
      lifetime_frequency_weight: 0.4,
      frequency_target: 50.0,
      lifetime_frequency_target: 500.0,
      frequency_window_days: 90,
      lifetime_window_days: 3650,
      min_interactions_for_full_recency: 3,
      zero_interaction_recency_multiplier: 0.3,
      peripheral_threshold: 3.0,
      channel_weights,
      circle_thresholds: vec![5, 20, 70, 220, 720, 2220],
      self_linkedin_multiplier: 1.03,
      self_family_multiplier: 1.05,
    }
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Overrides {
  #[serde(default)]
  pub strength_by_id: HashMap<Uuid, f64>,
  #[serde(default)]
  pub circle_by_id: HashMap<Uuid, u8>,
  #[serde(default)]
  pub tags_by_id: HashMap<Uuid, Vec<String>>,
  pub owner_person_id: Option<Uuid>,
  pub partner_person_id: Option<Uuid>,
  #[serde(default)]
  pub family_last_names: Vec<String>,
  #[serde(default)]
  pub family_exact_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
  #[serde(default)]
  pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
  #[serde(default)]
  pub entity_resolution: EntityResolutionSettings,
  #[serde(default)]
  pub relationship_strength: StrengthSettings,
  #[serde(default)]
  pub overrides: Overrides,
  #[serde(default)]
  pub sources: HashMap<String, SourceConfig>,
  pub min_days_since_match_attempt: i64,
  pub max_match_attempts: u32,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      entity_resolution: EntityResolutionSettings::default(),
      relationship_strength: StrengthSettings::default(),
      overrides: Overrides::default(),
      sources: HashMap::new(),
      min_days_since_match_attempt: 30,
      max_match_attempts: 3,
    }
  }
}

/// Static weights, the nickname dictionary, the domain/company mapping
/// tables, and override maps. Constructed once and handed to every
/// component that needs it (spec §9's mutable-singleton redesign).
#[derive(Debug, Clone)]
pub struct ConfigRegistry {
  pub mappings: Mappings,
  pub settings: Settings,
  pub nicknames: NicknameIndex,
}

impl Default for ConfigRegistry {
  fn default() -> Self {
    Self {
      mappings: Mappings::default(),
      settings: Settings::default(),
      nicknames: NicknameIndex::default(),
    }
  }
}

impl ConfigRegistry {
  pub fn new(mappings: Mappings, settings: Settings, nicknames: NicknameIndex) -> Self {
    Self { mappings, settings, nicknames }
  }

  pub fn domain_mapping(&self, domain: &str) -> Option<&DomainMapping> {
    self.mappings.domain_mappings.get(&domain.to_lowercase())
  }

  pub fn vault_contexts_for_domain(&self, domain: &str) -> Vec<String> {
    self.domain_mapping(domain).map(|m| m.vault_contexts.clone()).unwrap_or_default()
  }

  pub fn company_for_domain(&self, domain: &str) -> Option<String> {
    self.domain_mapping(domain).and_then(|m| m.company.clone())
  }

  pub fn category_for_domain(&self, domain: &str) -> String {
    self.domain_mapping(domain).map(|m| m.category.clone()).unwrap_or_else(default_category)
  }

  pub fn company_normalization(&self, company: &str) -> Option<&CompanyNormalization> {
    self.mappings.company_normalization.get(company)
  }

  pub fn domains_for_company(&self, company: &str) -> Vec<String> {
    self.company_normalization(company).map(|c| c.domains.clone()).unwrap_or_default()
  }

  pub fn vault_contexts_for_company(&self, company: &str) -> Vec<String> {
    self.company_normalization(company).map(|c| c.vault_contexts.clone()).unwrap_or_default()
  }

  pub fn channel_weight(&self, source_type: &str) -> f64 {
    self.settings.relationship_strength.channel_weights.get(source_type).copied().unwrap_or(1.0)
  }

  pub fn is_source_enabled(&self, source_name: &str) -> bool {
    self.settings.sources.get(source_name).map(|c| c.enabled).unwrap_or(false)
  }

  pub fn effective_strength(&self, person_id: Uuid, computed: f64) -> f64 {
    self.settings.overrides.strength_by_id.get(&person_id).copied().unwrap_or(computed)
  }

  pub fn circle_override(&self, person_id: Uuid) -> Option<u8> {
    self.settings.overrides.circle_by_id.get(&person_id).copied()
  }

  /// Whether `name` matches the family override lists: an exact full-name
  /// hit, or a last-word match against `family_last_names`, both
  /// case-insensitive. Used to derive `Category::Family` for a name the
  /// domain map has no opinion on.
  pub fn is_family_member(&self, name: &str) -> bool {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
      return false;
    }
    let overrides = &self.settings.overrides;
    if overrides.family_exact_names.iter().any(|n| n.to_lowercase() == name) {
      return true;
    }
    match name.split_whitespace().last() {
      Some(last) => overrides.family_last_names.iter().any(|n| n.to_lowercase() == last),
      None => false,
    }
  }

  /// Reads `mappings.yaml`, `settings.yaml`, and `nicknames.csv` from
  /// `paths`. Missing files fall back to their `Default` (mappings keeps
  /// the built-in webmail-domain table, settings/nicknames come up empty).
  pub fn load(paths: &ConfigPaths) -> Result<Self> {
    let mut mappings = Mappings::default();
    if paths.mappings.exists() {
      let loaded: Mappings = config::Config::builder()
        .add_source(config::File::from(paths.mappings.as_path()))
        .build()?
        .try_deserialize()?;
      // Loaded entries take precedence; built-in webmail defaults fill in
      // any domain the file doesn't mention.
      for (domain, mapping) in loaded.domain_mappings {
        mappings.domain_mappings.insert(domain, mapping);
      }
      mappings.company_normalization = loaded.company_normalization;
    }

    let settings = if paths.settings.exists() {
      config::Config::builder()
        .add_source(config::File::from(paths.settings.as_path()))
        .build()?
        .try_deserialize()?
    } else {
      Settings::default()
    };

    let nicknames = if paths.nicknames.exists() {
      NicknameIndex::from_csv_str(&std::fs::read_to_string(&paths.nicknames)?)
    } else {
      NicknameIndex::default()
    };

    Ok(Self { mappings, settings, nicknames })
  }

  /// Re-reads the same files and returns a fresh instance. Explicit, not
  /// automatic — spec §9's mutable-singleton redesign replaces a
  /// lazily-refreshed global with this one-shot call.
  pub fn reload(paths: &ConfigPaths) -> Result<Self> {
    Self::load(paths)
  }
}

/// File locations backing a loaded `ConfigRegistry` (SPEC_FULL.md §13).
#[derive(Debug, Clone)]
pub struct ConfigPaths {
  pub mappings: PathBuf,
  pub settings: PathBuf,
  pub nicknames: PathBuf,
}

impl ConfigPaths {
  pub fn under(dir: impl AsRef<Path>) -> Self {
    let dir = dir.as_ref();
    Self {
      mappings: dir.join("mappings.yaml"),
      settings: dir.join("settings.yaml"),
      nicknames: dir.join("nicknames.csv"),
    }
  }
}
