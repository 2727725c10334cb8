//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, enum-like values as their
//! lowercase/snake_case string form (round-tripped through `strum`), and
//! UUIDs as hyphenated lowercase strings.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use kin_core::interaction::Interaction;
use kin_core::link_override::LinkOverride;
use kin_core::relationship::{ChannelCounters, Relationship, RelationshipType};
use kin_core::review_queue::{ReviewCandidate, ReviewStatus, ReviewType};
use kin_core::source_entity::{LinkStatus, SourceEntity, SourceType};
use uuid::Uuid;

use crate::{Error, Result};

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(Uuid::parse_str).transpose().map_err(Error::from)
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

fn decode_enum<T: FromStr>(s: &str) -> Result<T> {
  T::from_str(s).map_err(|_| Error::UnknownEnumValue(s.to_string()))
}

// ─── SourceEntity ────────────────────────────────────────────────────────

pub struct RawSourceEntity {
  pub id: String,
  pub source_type: String,
  pub source_id: Option<String>,
  pub observed_name: Option<String>,
  pub observed_email: Option<String>,
  pub observed_phone: Option<String>,
  pub metadata_json: String,
  pub canonical_person_id: Option<String>,
  pub link_confidence: f64,
  pub link_status: String,
  pub linked_at: Option<String>,
  pub observed_at: String,
  pub created_at: String,
  pub match_attempted_at: Option<String>,
  pub match_attempt_count: u32,
}

impl RawSourceEntity {
  pub fn into_domain(self) -> Result<SourceEntity> {
    Ok(SourceEntity {
      id: decode_uuid(&self.id)?,
      source_type: decode_enum(&self.source_type)?,
      source_id: self.source_id,
      observed_name: self.observed_name,
      observed_email: self.observed_email,
      observed_phone: self.observed_phone,
      metadata: serde_json::from_str::<HashMap<String, serde_json::Value>>(&self.metadata_json)?,
      canonical_person_id: decode_opt_uuid(self.canonical_person_id)?,
      link_confidence: self.link_confidence,
      link_status: decode_enum(&self.link_status)?,
      linked_at: decode_opt_dt(self.linked_at)?,
      observed_at: decode_dt(&self.observed_at)?,
      created_at: decode_dt(&self.created_at)?,
      match_attempted_at: decode_opt_dt(self.match_attempted_at)?,
      match_attempt_count: self.match_attempt_count,
    })
  }
}

pub struct EncodedSourceEntity {
  pub id: String,
  pub source_type: String,
  pub source_id: Option<String>,
  pub observed_name: Option<String>,
  pub observed_email: Option<String>,
  pub observed_phone: Option<String>,
  pub metadata_json: String,
  pub canonical_person_id: Option<String>,
  pub link_confidence: f64,
  pub link_status: String,
  pub linked_at: Option<String>,
  pub observed_at: String,
  pub created_at: String,
  pub match_attempted_at: Option<String>,
  pub match_attempt_count: u32,
}

pub fn encode_source_entity(e: &SourceEntity) -> Result<EncodedSourceEntity> {
  Ok(EncodedSourceEntity {
    id: encode_uuid(e.id),
    source_type: e.source_type.to_string(),
    source_id: e.source_id.clone(),
    observed_name: e.observed_name.clone(),
    observed_email: e.observed_email.clone(),
    observed_phone: e.observed_phone.clone(),
    metadata_json: serde_json::to_string(&e.metadata)?,
    canonical_person_id: e.canonical_person_id.map(encode_uuid),
    link_confidence: e.link_confidence,
    link_status: e.link_status.to_string(),
    linked_at: e.linked_at.map(encode_dt),
    observed_at: encode_dt(e.observed_at),
    created_at: encode_dt(e.created_at),
    match_attempted_at: e.match_attempted_at.map(encode_dt),
    match_attempt_count: e.match_attempt_count,
  })
}

// ─── Relationship ────────────────────────────────────────────────────────

pub struct RawRelationship {
  pub id: String,
  pub person_a_id: String,
  pub person_b_id: String,
  pub relationship_type: String,
  pub shared_contexts_json: String,
  pub shared_events_count: u64,
  pub shared_threads_count: u64,
  pub shared_messages_count: u64,
  pub shared_whatsapp_count: u64,
  pub shared_slack_count: u64,
  pub shared_phone_calls_count: u64,
  pub shared_photos_count: u64,
  pub is_linkedin_connection: bool,
  pub first_seen_together: Option<String>,
  pub last_seen_together: Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

impl RawRelationship {
  pub fn into_domain(self) -> Result<Relationship> {
    let relationship_type: RelationshipType = decode_enum(&self.relationship_type)?;
    Ok(Relationship {
      id: decode_uuid(&self.id)?,
      person_a_id: decode_uuid(&self.person_a_id)?,
      person_b_id: decode_uuid(&self.person_b_id)?,
      relationship_type,
      shared_contexts: serde_json::from_str(&self.shared_contexts_json)?,
      counters: ChannelCounters {
        shared_events_count: self.shared_events_count,
        shared_threads_count: self.shared_threads_count,
        shared_messages_count: self.shared_messages_count,
        shared_whatsapp_count: self.shared_whatsapp_count,
        shared_slack_count: self.shared_slack_count,
        shared_phone_calls_count: self.shared_phone_calls_count,
        shared_photos_count: self.shared_photos_count,
      },
      is_linkedin_connection: self.is_linkedin_connection,
      first_seen_together: decode_opt_dt(self.first_seen_together)?,
      last_seen_together: decode_opt_dt(self.last_seen_together)?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub struct EncodedRelationship {
  pub id: String,
  pub person_a_id: String,
  pub person_b_id: String,
  pub relationship_type: String,
  pub shared_contexts_json: String,
  pub c: ChannelCounters,
  pub is_linkedin_connection: bool,
  pub first_seen_together: Option<String>,
  pub last_seen_together: Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

pub fn encode_relationship(r: &Relationship) -> Result<EncodedRelationship> {
  Ok(EncodedRelationship {
    id: encode_uuid(r.id),
    person_a_id: encode_uuid(r.person_a_id),
    person_b_id: encode_uuid(r.person_b_id),
    relationship_type: r.relationship_type.to_string(),
    shared_contexts_json: serde_json::to_string(&r.shared_contexts)?,
    c: r.counters.clone(),
    is_linkedin_connection: r.is_linkedin_connection,
    first_seen_together: r.first_seen_together.map(encode_dt),
    last_seen_together: r.last_seen_together.map(encode_dt),
    created_at: encode_dt(r.created_at),
    updated_at: encode_dt(r.updated_at),
  })
}

// ─── Interaction ─────────────────────────────────────────────────────────

pub struct RawInteraction {
  pub id: String,
  pub person_id: String,
  pub timestamp: String,
  pub source_type: String,
  pub title: Option<String>,
  pub snippet: Option<String>,
  pub source_link: Option<String>,
  pub source_id: Option<String>,
  pub created_at: String,
}

impl RawInteraction {
  pub fn into_domain(self) -> Result<Interaction> {
    Ok(Interaction {
      id: decode_uuid(&self.id)?,
      person_id: decode_uuid(&self.person_id)?,
      timestamp: decode_dt(&self.timestamp)?,
      source_type: decode_enum(&self.source_type)?,
      title: self.title,
      snippet: self.snippet,
      source_link: self.source_link,
      source_id: self.source_id,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

// ─── LinkOverride ────────────────────────────────────────────────────────

pub struct RawLinkOverride {
  pub id: String,
  pub name_pattern: String,
  pub source_type: Option<String>,
  pub context_pattern: Option<String>,
  pub preferred_person_id: String,
  pub rejected_person_id: Option<String>,
  pub reason: Option<String>,
  pub created_at: String,
}

impl RawLinkOverride {
  pub fn into_domain(self) -> Result<LinkOverride> {
    Ok(LinkOverride {
      id: decode_uuid(&self.id)?,
      name_pattern: self.name_pattern,
      source_type: self.source_type,
      context_pattern: self.context_pattern,
      preferred_person_id: decode_uuid(&self.preferred_person_id)?,
      rejected_person_id: decode_opt_uuid(self.rejected_person_id)?,
      reason: self.reason,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

// ─── ReviewCandidate ─────────────────────────────────────────────────────

pub struct RawReviewCandidate {
  pub id: String,
  pub review_type: String,
  pub person_a_id: String,
  pub person_a_name: String,
  pub person_b_id: Option<String>,
  pub person_b_name: Option<String>,
  pub confidence: f64,
  pub reason: String,
  pub evidence_json: Option<String>,
  pub status: String,
  pub reviewed_at: Option<String>,
  pub batch_id: Option<String>,
  pub created_at: String,
}

impl RawReviewCandidate {
  pub fn into_domain(self) -> Result<ReviewCandidate> {
    let review_type: ReviewType = decode_enum(&self.review_type)?;
    let status: ReviewStatus = decode_enum(&self.status)?;
    Ok(ReviewCandidate {
      id: decode_uuid(&self.id)?,
      review_type,
      person_a_id: decode_uuid(&self.person_a_id)?,
      person_a_name: self.person_a_name,
      person_b_id: decode_opt_uuid(self.person_b_id)?,
      person_b_name: self.person_b_name,
      confidence: self.confidence,
      reason: self.reason,
      evidence: self.evidence_json.as_deref().map(serde_json::from_str).transpose()?,
      status,
      reviewed_at: decode_opt_dt(self.reviewed_at)?,
      batch_id: self.batch_id,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
