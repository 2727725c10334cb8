//! [`SqliteStore`] — the SQLite implementation of every `kin-core` store
//! trait except `PersonStore` (which lives in `kin-store-json`; see
//! SPEC_FULL.md §0).

use std::path::Path;

use chrono::{Duration, Utc};
use kin_core::interaction::Interaction;
use kin_core::link_override::{self, LinkOverride};
use kin_core::relationship::{normalize_pair, Relationship};
use kin_core::review_queue::{ReviewCandidate, ReviewStatus, ReviewType};
use kin_core::source_entity::{LinkStatus, SourceEntity, SourceEntityStatistics, SourceType};
use kin_core::store::{InteractionStore, LinkOverrideStore, RelationshipStore, ReviewQueueStore, SourceEntityStore};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::encode::{
  decode_dt, decode_uuid, encode_dt, encode_relationship, encode_source_entity, encode_uuid, RawInteraction, RawLinkOverride,
  RawRelationship, RawReviewCandidate, RawSourceEntity,
};
use crate::schema::SCHEMA;
use crate::{Error, Result};

/// A relationship-graph store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialization.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

fn row_to_raw_source_entity(row: &rusqlite::Row) -> rusqlite::Result<RawSourceEntity> {
  Ok(RawSourceEntity {
    id: row.get(0)?,
    source_type: row.get(1)?,
    source_id: row.get(2)?,
    observed_name: row.get(3)?,
    observed_email: row.get(4)?,
    observed_phone: row.get(5)?,
    metadata_json: row.get(6)?,
    canonical_person_id: row.get(7)?,
    link_confidence: row.get(8)?,
    link_status: row.get(9)?,
    linked_at: row.get(10)?,
    observed_at: row.get(11)?,
    created_at: row.get(12)?,
    match_attempted_at: row.get(13)?,
    match_attempt_count: row.get(14)?,
  })
}

const SOURCE_ENTITY_COLUMNS: &str = "id, source_type, source_id, observed_name, observed_email, observed_phone,
   metadata_json, canonical_person_id, link_confidence, link_status, linked_at,
   observed_at, created_at, match_attempted_at, match_attempt_count";

// ─── SourceEntityStore ───────────────────────────────────────────────────

impl SourceEntityStore for SqliteStore {
  type Error = Error;

  async fn add(&self, entity: SourceEntity) -> Result<SourceEntity> {
    let e = encode_source_entity(&entity)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO source_entities ({SOURCE_ENTITY_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
          ),
          rusqlite::params![
            e.id,
            e.source_type,
            e.source_id,
            e.observed_name,
            e.observed_email,
            e.observed_phone,
            e.metadata_json,
            e.canonical_person_id,
            e.link_confidence,
            e.link_status,
            e.linked_at,
            e.observed_at,
            e.created_at,
            e.match_attempted_at,
            e.match_attempt_count,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(entity)
  }

  async fn add_or_update(&self, mut entity: SourceEntity) -> Result<(SourceEntity, bool)> {
    let source_type = entity.source_type.to_string();
    let source_id = entity.source_id.clone();

    let existing: Option<(String, String)> = self
      .conn
      .call({
        let source_type = source_type.clone();
        let source_id = source_id.clone();
        move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT id, created_at FROM source_entities WHERE source_type = ?1 AND source_id IS ?2",
                rusqlite::params![source_type, source_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
              )
              .optional()?,
          )
        }
      })
      .await?;

    let was_created = existing.is_none();
    if let Some((id, created_at)) = existing {
      entity.id = decode_uuid(&id)?;
      entity.created_at = decode_dt(&created_at)?;
      let updated = SourceEntityStore::update(self, entity).await?;
      Ok((updated, false))
    } else {
      let added = SourceEntityStore::add(self, entity).await?;
      Ok((added, was_created))
    }
  }

  async fn update(&self, entity: SourceEntity) -> Result<SourceEntity> {
    let e = encode_source_entity(&entity)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE source_entities SET
             source_type = ?2, source_id = ?3, observed_name = ?4, observed_email = ?5,
             observed_phone = ?6, metadata_json = ?7, canonical_person_id = ?8,
             link_confidence = ?9, link_status = ?10, linked_at = ?11, observed_at = ?12,
             match_attempted_at = ?13, match_attempt_count = ?14
           WHERE id = ?1",
          rusqlite::params![
            e.id,
            e.source_type,
            e.source_id,
            e.observed_name,
            e.observed_email,
            e.observed_phone,
            e.metadata_json,
            e.canonical_person_id,
            e.link_confidence,
            e.link_status,
            e.linked_at,
            e.observed_at,
            e.match_attempted_at,
            e.match_attempt_count,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(entity)
  }

  async fn link_to_person(&self, id: Uuid, person_id: Uuid, confidence: f64, status: LinkStatus) -> Result<bool> {
    let id_str = encode_uuid(id);
    let person_str = encode_uuid(person_id);
    let status_str = status.to_string();
    let now = encode_dt(Utc::now());

    let current_status: Option<String> = self
      .conn
      .call({
        let id_str = id_str.clone();
        move |conn| {
          Ok(
            conn
              .query_row("SELECT link_status FROM source_entities WHERE id = ?1", rusqlite::params![id_str], |r| r.get(0))
              .optional()?,
          )
        }
      })
      .await?;

    // A confirmed link is never silently overwritten by a non-confirmed one
    // (spec §3.2).
    if current_status.as_deref() == Some("confirmed") && status != LinkStatus::Confirmed {
      tracing::debug!(%id, "refusing to overwrite confirmed link with {status_str}");
      return Ok(false);
    }

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE source_entities SET canonical_person_id = ?2, link_confidence = ?3, link_status = ?4, linked_at = ?5
           WHERE id = ?1",
          rusqlite::params![id_str, person_str, confidence, status_str, now],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn unlink(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE source_entities SET canonical_person_id = NULL, link_confidence = 0.0, link_status = 'auto', linked_at = NULL
           WHERE id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn get_by_id(&self, id: Uuid) -> Result<Option<SourceEntity>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawSourceEntity> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {SOURCE_ENTITY_COLUMNS} FROM source_entities WHERE id = ?1"),
              rusqlite::params![id_str],
              row_to_raw_source_entity,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawSourceEntity::into_domain).transpose()
  }

  async fn get_by_source(&self, source_type: SourceType, source_id: &str) -> Result<Option<SourceEntity>> {
    let source_type = source_type.to_string();
    let source_id = source_id.to_string();
    let raw: Option<RawSourceEntity> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {SOURCE_ENTITY_COLUMNS} FROM source_entities WHERE source_type = ?1 AND source_id = ?2"),
              rusqlite::params![source_type, source_id],
              row_to_raw_source_entity,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawSourceEntity::into_domain).transpose()
  }

  async fn get_for_person(&self, person_id: Uuid, source_type: Option<SourceType>, limit: Option<usize>) -> Result<Vec<SourceEntity>> {
    let person_str = encode_uuid(person_id);
    let source_type = source_type.map(|t| t.to_string());
    let limit = limit.unwrap_or(i64::MAX as usize) as i64;
    let raws: Vec<RawSourceEntity> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {SOURCE_ENTITY_COLUMNS} FROM source_entities
           WHERE canonical_person_id = ?1 AND (?2 IS NULL OR source_type = ?2)
           ORDER BY observed_at DESC LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![person_str, source_type, limit], row_to_raw_source_entity)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSourceEntity::into_domain).collect()
  }

  async fn get_unlinked(&self, source_type: Option<SourceType>, limit: usize) -> Result<Vec<SourceEntity>> {
    let source_type = source_type.map(|t| t.to_string());
    let limit = limit as i64;
    let raws: Vec<RawSourceEntity> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {SOURCE_ENTITY_COLUMNS} FROM source_entities
           WHERE canonical_person_id IS NULL AND (?1 IS NULL OR source_type = ?1)
           ORDER BY observed_at DESC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![source_type, limit], row_to_raw_source_entity)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSourceEntity::into_domain).collect()
  }

  async fn get_by_email(&self, email: &str) -> Result<Vec<SourceEntity>> {
    let email = email.to_lowercase();
    let raws: Vec<RawSourceEntity> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {SOURCE_ENTITY_COLUMNS} FROM source_entities WHERE LOWER(observed_email) = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![email], row_to_raw_source_entity)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSourceEntity::into_domain).collect()
  }

  async fn get_by_phone(&self, phone: &str) -> Result<Vec<SourceEntity>> {
    let phone = phone.to_string();
    let raws: Vec<RawSourceEntity> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {SOURCE_ENTITY_COLUMNS} FROM source_entities WHERE observed_phone = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![phone], row_to_raw_source_entity)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSourceEntity::into_domain).collect()
  }

  async fn get_unlinked_by_email(&self, email: &str) -> Result<Vec<SourceEntity>> {
    let email = email.to_lowercase();
    let raws: Vec<RawSourceEntity> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {SOURCE_ENTITY_COLUMNS} FROM source_entities WHERE canonical_person_id IS NULL AND LOWER(observed_email) = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![email], row_to_raw_source_entity)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSourceEntity::into_domain).collect()
  }

  async fn get_unlinked_by_phone(&self, phone: &str) -> Result<Vec<SourceEntity>> {
    let phone = phone.to_string();
    let raws: Vec<RawSourceEntity> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {SOURCE_ENTITY_COLUMNS} FROM source_entities WHERE canonical_person_id IS NULL AND observed_phone = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![phone], row_to_raw_source_entity)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSourceEntity::into_domain).collect()
  }

  async fn get_low_confidence(&self, min: f64, max: f64, limit: usize) -> Result<Vec<SourceEntity>> {
    let limit = limit as i64;
    let raws: Vec<RawSourceEntity> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {SOURCE_ENTITY_COLUMNS} FROM source_entities
           WHERE canonical_person_id IS NOT NULL AND link_status != 'confirmed'
             AND link_confidence >= ?1 AND link_confidence <= ?2
           ORDER BY link_confidence ASC LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![min, max, limit], row_to_raw_source_entity)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSourceEntity::into_domain).collect()
  }

  async fn count_low_confidence(&self, min: f64, max: f64) -> Result<usize> {
    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM source_entities
           WHERE canonical_person_id IS NOT NULL AND link_status != 'confirmed'
             AND link_confidence >= ?1 AND link_confidence <= ?2",
          rusqlite::params![min, max],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(count as usize)
  }

  async fn link_unlinked_by_email(&self, email: &str, person_id: Uuid, confidence: f64) -> Result<usize> {
    let email = email.to_lowercase();
    let person_str = encode_uuid(person_id);
    let now = encode_dt(Utc::now());
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE source_entities SET canonical_person_id = ?2, link_confidence = ?3, link_status = 'auto', linked_at = ?4
           WHERE canonical_person_id IS NULL AND LOWER(observed_email) = ?1",
          rusqlite::params![email, person_str, confidence, now],
        )?)
      })
      .await?;
    Ok(changed)
  }

  async fn link_unlinked_by_phone(&self, phone: &str, person_id: Uuid, confidence: f64) -> Result<usize> {
    let phone = phone.to_string();
    let person_str = encode_uuid(person_id);
    let now = encode_dt(Utc::now());
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE source_entities SET canonical_person_id = ?2, link_confidence = ?3, link_status = 'auto', linked_at = ?4
           WHERE canonical_person_id IS NULL AND observed_phone = ?1",
          rusqlite::params![phone, person_str, confidence, now],
        )?)
      })
      .await?;
    Ok(changed)
  }

  async fn record_match_attempt(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let now = encode_dt(Utc::now());
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE source_entities SET match_attempt_count = match_attempt_count + 1, match_attempted_at = ?2
           WHERE id = ?1 AND canonical_person_id IS NULL",
          rusqlite::params![id_str, now],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn get_unlinked_for_rematching(
    &self,
    source_type: Option<SourceType>,
    min_days_since_attempt: i64,
    max_attempts: u32,
    limit: usize,
  ) -> Result<Vec<SourceEntity>> {
    let source_type = source_type.map(|t| t.to_string());
    let cutoff = encode_dt(Utc::now() - Duration::days(min_days_since_attempt));
    let limit = limit as i64;
    let raws: Vec<RawSourceEntity> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {SOURCE_ENTITY_COLUMNS} FROM source_entities
           WHERE canonical_person_id IS NULL
             AND match_attempt_count < ?1
             AND (match_attempted_at IS NULL OR match_attempted_at <= ?2)
             AND (?3 IS NULL OR source_type = ?3)
           ORDER BY observed_at ASC LIMIT ?4"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![max_attempts, cutoff, source_type, limit], row_to_raw_source_entity)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawSourceEntity::into_domain).collect()
  }

  async fn reassign_person(&self, from: Uuid, to: Uuid, source_types: Option<&[SourceType]>) -> Result<usize> {
    let from_str = encode_uuid(from);
    let to_str = encode_uuid(to);
    let types: Option<Vec<String>> = source_types.map(|ts| ts.iter().map(|t| t.to_string()).collect());
    let changed = self
      .conn
      .call(move |conn| {
        Ok(match types {
          None => conn.execute(
            "UPDATE source_entities SET canonical_person_id = ?2 WHERE canonical_person_id = ?1",
            rusqlite::params![from_str, to_str],
          )?,
          Some(types) => {
            let placeholders = types.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!("UPDATE source_entities SET canonical_person_id = ?2 WHERE canonical_person_id = ?1 AND source_type IN ({placeholders})");
            let mut params: Vec<&dyn rusqlite::ToSql> = vec![&from_str, &to_str];
            for t in &types {
              params.push(t);
            }
            conn.execute(&sql, params.as_slice())?
          }
        })
      })
      .await?;
    Ok(changed)
  }

  async fn delete(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let changed = self.conn.call(move |conn| Ok(conn.execute("DELETE FROM source_entities WHERE id = ?1", rusqlite::params![id_str])?)).await?;
    Ok(changed > 0)
  }

  async fn delete_for_person(&self, person_id: Uuid) -> Result<usize> {
    let person_str = encode_uuid(person_id);
    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute("DELETE FROM source_entities WHERE canonical_person_id = ?1", rusqlite::params![person_str])?))
      .await?;
    Ok(changed)
  }

  async fn count(&self) -> Result<usize> {
    let count: i64 = self.conn.call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM source_entities", [], |r| r.get(0))?)).await?;
    Ok(count as usize)
  }

  async fn count_for_person(&self, person_id: Uuid) -> Result<usize> {
    let person_str = encode_uuid(person_id);
    let count: i64 = self
      .conn
      .call(move |conn| Ok(conn.query_row("SELECT COUNT(*) FROM source_entities WHERE canonical_person_id = ?1", rusqlite::params![person_str], |r| r.get(0))?))
      .await?;
    Ok(count as usize)
  }

  async fn source_types_for_person(&self, person_id: Uuid) -> Result<Vec<SourceType>> {
    let person_str = encode_uuid(person_id);
    let raw: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare("SELECT DISTINCT source_type FROM source_entities WHERE canonical_person_id = ?1")?;
        let rows = stmt.query_map(rusqlite::params![person_str], |r| r.get(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raw.iter().map(|s| s.parse().map_err(|_| Error::UnknownEnumValue(s.clone()))).collect()
  }

  async fn get_statistics(&self) -> Result<SourceEntityStatistics> {
    let (total, linked, by_source_rows, by_status_rows): (i64, i64, Vec<(String, i64)>, Vec<(String, i64)>) = self
      .conn
      .call(|conn| {
        let total = conn.query_row("SELECT COUNT(*) FROM source_entities", [], |r| r.get(0))?;
        let linked = conn.query_row("SELECT COUNT(*) FROM source_entities WHERE canonical_person_id IS NOT NULL", [], |r| r.get(0))?;

        let mut by_source_stmt = conn.prepare("SELECT source_type, COUNT(*) FROM source_entities GROUP BY source_type")?;
        let by_source_rows = by_source_stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?.collect::<rusqlite::Result<Vec<_>>>()?;

        let mut by_status_stmt = conn.prepare("SELECT link_status, COUNT(*) FROM source_entities WHERE link_status IS NOT NULL GROUP BY link_status")?;
        let by_status_rows = by_status_stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((total, linked, by_source_rows, by_status_rows))
      })
      .await?;

    let mut by_source_type = std::collections::HashMap::new();
    for (raw, count) in by_source_rows {
      let source_type: SourceType = raw.parse().map_err(|_| Error::UnknownEnumValue(raw))?;
      by_source_type.insert(source_type, count as usize);
    }
    let mut by_link_status = std::collections::HashMap::new();
    for (raw, count) in by_status_rows {
      let status: LinkStatus = raw.parse().map_err(|_| Error::UnknownEnumValue(raw))?;
      by_link_status.insert(status, count as usize);
    }

    Ok(SourceEntityStatistics {
      total_entities: total as usize,
      linked_entities: linked as usize,
      by_source_type,
      by_link_status,
    })
  }
}

// ─── RelationshipStore ───────────────────────────────────────────────────

fn row_to_raw_relationship(row: &rusqlite::Row) -> rusqlite::Result<RawRelationship> {
  Ok(RawRelationship {
    id: row.get(0)?,
    person_a_id: row.get(1)?,
    person_b_id: row.get(2)?,
    relationship_type: row.get(3)?,
    shared_contexts_json: row.get(4)?,
    shared_events_count: row.get(5)?,
    shared_threads_count: row.get(6)?,
    shared_messages_count: row.get(7)?,
    shared_whatsapp_count: row.get(8)?,
    shared_slack_count: row.get(9)?,
    shared_phone_calls_count: row.get(10)?,
    shared_photos_count: row.get(11)?,
    is_linkedin_connection: row.get(12)?,
    first_seen_together: row.get(13)?,
    last_seen_together: row.get(14)?,
    created_at: row.get(15)?,
    updated_at: row.get(16)?,
  })
}

const RELATIONSHIP_COLUMNS: &str = "id, person_a_id, person_b_id, relationship_type, shared_contexts_json,
   shared_events_count, shared_threads_count, shared_messages_count, shared_whatsapp_count,
   shared_slack_count, shared_phone_calls_count, shared_photos_count, is_linkedin_connection,
   first_seen_together, last_seen_together, created_at, updated_at";

impl RelationshipStore for SqliteStore {
  type Error = Error;

  async fn add(&self, relationship: Relationship) -> Result<Relationship> {
    let r = encode_relationship(&relationship)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO relationships ({RELATIONSHIP_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
          ),
          rusqlite::params![
            r.id,
            r.person_a_id,
            r.person_b_id,
            r.relationship_type,
            r.shared_contexts_json,
            r.c.shared_events_count,
            r.c.shared_threads_count,
            r.c.shared_messages_count,
            r.c.shared_whatsapp_count,
            r.c.shared_slack_count,
            r.c.shared_phone_calls_count,
            r.c.shared_photos_count,
            r.is_linkedin_connection,
            r.first_seen_together,
            r.last_seen_together,
            r.created_at,
            r.updated_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(relationship)
  }

  async fn update(&self, relationship: Relationship) -> Result<Relationship> {
    let r = encode_relationship(&relationship)?;
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE relationships SET
             relationship_type = ?2, shared_contexts_json = ?3, shared_events_count = ?4,
             shared_threads_count = ?5, shared_messages_count = ?6, shared_whatsapp_count = ?7,
             shared_slack_count = ?8, shared_phone_calls_count = ?9, shared_photos_count = ?10,
             is_linkedin_connection = ?11, first_seen_together = ?12, last_seen_together = ?13,
             updated_at = ?14
           WHERE id = ?1",
          rusqlite::params![
            r.id,
            r.relationship_type,
            r.shared_contexts_json,
            r.c.shared_events_count,
            r.c.shared_threads_count,
            r.c.shared_messages_count,
            r.c.shared_whatsapp_count,
            r.c.shared_slack_count,
            r.c.shared_phone_calls_count,
            r.c.shared_photos_count,
            r.is_linkedin_connection,
            r.first_seen_together,
            r.last_seen_together,
            r.updated_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(relationship)
  }

  async fn get_by_id(&self, id: Uuid) -> Result<Option<Relationship>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawRelationship> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&format!("SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE id = ?1"), rusqlite::params![id_str], row_to_raw_relationship)
            .optional()?,
        )
      })
      .await?;
    raw.map(RawRelationship::into_domain).transpose()
  }

  async fn get_between(&self, a: Uuid, b: Uuid) -> Result<Option<Relationship>> {
    let (a, b) = normalize_pair(a, b);
    let a_str = encode_uuid(a);
    let b_str = encode_uuid(b);
    let raw: Option<RawRelationship> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE person_a_id = ?1 AND person_b_id = ?2"),
              rusqlite::params![a_str, b_str],
              row_to_raw_relationship,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawRelationship::into_domain).transpose()
  }

  async fn get_for_person(&self, person_id: Uuid) -> Result<Vec<Relationship>> {
    let person_str = encode_uuid(person_id);
    let raws: Vec<RawRelationship> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!("SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE person_a_id = ?1 OR person_b_id = ?1"))?;
        let rows = stmt.query_map(rusqlite::params![person_str], row_to_raw_relationship)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawRelationship::into_domain).collect()
  }

  async fn get_for_people_batch(&self, person_ids: &[Uuid]) -> Result<Vec<Relationship>> {
    if person_ids.is_empty() {
      return Ok(Vec::new());
    }
    let ids: Vec<String> = person_ids.iter().map(|id| encode_uuid(*id)).collect();
    let raws: Vec<RawRelationship> = self
      .conn
      .call(move |conn| {
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
          "SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE person_a_id IN ({placeholders}) OR person_b_id IN ({placeholders})"
        );
        let params: Vec<&dyn rusqlite::ToSql> = ids.iter().chain(ids.iter()).map(|s| s as &dyn rusqlite::ToSql).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), row_to_raw_relationship)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawRelationship::into_domain).collect()
  }

  async fn get_all(&self) -> Result<Vec<Relationship>> {
    let raws: Vec<RawRelationship> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT {RELATIONSHIP_COLUMNS} FROM relationships"))?;
        let rows = stmt.query_map([], row_to_raw_relationship)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawRelationship::into_domain).collect()
  }

  async fn delete(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let changed = self.conn.call(move |conn| Ok(conn.execute("DELETE FROM relationships WHERE id = ?1", rusqlite::params![id_str])?)).await?;
    Ok(changed > 0)
  }

  async fn delete_for_person(&self, person_id: Uuid) -> Result<usize> {
    let person_str = encode_uuid(person_id);
    let changed = self
      .conn
      .call(move |conn| Ok(conn.execute("DELETE FROM relationships WHERE person_a_id = ?1 OR person_b_id = ?1", rusqlite::params![person_str])?))
      .await?;
    Ok(changed)
  }

  async fn count(&self) -> Result<usize> {
    let count: i64 = self.conn.call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM relationships", [], |r| r.get(0))?)).await?;
    Ok(count as usize)
  }
}

// ─── InteractionStore ────────────────────────────────────────────────────

fn row_to_raw_interaction(row: &rusqlite::Row) -> rusqlite::Result<RawInteraction> {
  Ok(RawInteraction {
    id: row.get(0)?,
    person_id: row.get(1)?,
    timestamp: row.get(2)?,
    source_type: row.get(3)?,
    title: row.get(4)?,
    snippet: row.get(5)?,
    source_link: row.get(6)?,
    source_id: row.get(7)?,
    created_at: row.get(8)?,
  })
}

const INTERACTION_COLUMNS: &str = "id, person_id, timestamp, source_type, title, snippet, source_link, source_id, created_at";

impl InteractionStore for SqliteStore {
  type Error = Error;

  async fn add_if_not_exists(&self, interaction: Interaction) -> Result<bool> {
    let id = encode_uuid(interaction.id);
    let person_id = encode_uuid(interaction.person_id);
    let timestamp = encode_dt(interaction.timestamp);
    let source_type = interaction.source_type.to_string();
    let title = interaction.title.clone();
    let snippet = interaction.snippet.clone();
    let source_link = interaction.source_link.clone();
    let source_id = interaction.source_id.clone();
    let created_at = encode_dt(interaction.created_at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          &format!(
            "INSERT OR IGNORE INTO interactions ({INTERACTION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
          ),
          rusqlite::params![id, person_id, timestamp, source_type, title, snippet, source_link, source_id, created_at],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn get_for_person(&self, person_id: Uuid) -> Result<Vec<Interaction>> {
    let person_str = encode_uuid(person_id);
    let raws: Vec<RawInteraction> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!("SELECT {INTERACTION_COLUMNS} FROM interactions WHERE person_id = ?1"))?;
        let rows = stmt.query_map(rusqlite::params![person_str], row_to_raw_interaction)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawInteraction::into_domain).collect()
  }

  async fn get_for_person_and_types(&self, person_id: Uuid, source_types: &[SourceType]) -> Result<Vec<Interaction>> {
    if source_types.is_empty() {
      return Ok(Vec::new());
    }
    let person_str = encode_uuid(person_id);
    let types: Vec<String> = source_types.iter().map(|t| t.to_string()).collect();
    let raws: Vec<RawInteraction> = self
      .conn
      .call(move |conn| {
        let placeholders = types.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT {INTERACTION_COLUMNS} FROM interactions WHERE person_id = ? AND source_type IN ({placeholders})");
        let mut params: Vec<&dyn rusqlite::ToSql> = vec![&person_str];
        for t in &types {
          params.push(t);
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), row_to_raw_interaction)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawInteraction::into_domain).collect()
  }

  async fn get_for_person_since(&self, person_id: Uuid, since: chrono::DateTime<Utc>) -> Result<Vec<Interaction>> {
    let person_str = encode_uuid(person_id);
    let since_str = encode_dt(since);
    let raws: Vec<RawInteraction> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!("SELECT {INTERACTION_COLUMNS} FROM interactions WHERE person_id = ?1 AND timestamp >= ?2"))?;
        let rows = stmt.query_map(rusqlite::params![person_str, since_str], row_to_raw_interaction)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawInteraction::into_domain).collect()
  }

  async fn reassign_person(&self, from: Uuid, to: Uuid, source_types: Option<&[SourceType]>) -> Result<usize> {
    let from_str = encode_uuid(from);
    let to_str = encode_uuid(to);
    let types: Option<Vec<String>> = source_types.map(|ts| ts.iter().map(|t| t.to_string()).collect());
    let changed = self
      .conn
      .call(move |conn| {
        Ok(match types {
          None => conn.execute("UPDATE interactions SET person_id = ?2 WHERE person_id = ?1", rusqlite::params![from_str, to_str])?,
          Some(types) => {
            let placeholders = types.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!("UPDATE interactions SET person_id = ?2 WHERE person_id = ?1 AND source_type IN ({placeholders})");
            let mut params: Vec<&dyn rusqlite::ToSql> = vec![&from_str, &to_str];
            for t in &types {
              params.push(t);
            }
            conn.execute(&sql, params.as_slice())?
          }
        })
      })
      .await?;
    Ok(changed)
  }

  async fn count_for_person(&self, person_id: Uuid) -> Result<usize> {
    let person_str = encode_uuid(person_id);
    let count: i64 = self
      .conn
      .call(move |conn| Ok(conn.query_row("SELECT COUNT(*) FROM interactions WHERE person_id = ?1", rusqlite::params![person_str], |r| r.get(0))?))
      .await?;
    Ok(count as usize)
  }
}

// ─── LinkOverrideStore ───────────────────────────────────────────────────

fn row_to_raw_link_override(row: &rusqlite::Row) -> rusqlite::Result<RawLinkOverride> {
  Ok(RawLinkOverride {
    id: row.get(0)?,
    name_pattern: row.get(1)?,
    source_type: row.get(2)?,
    context_pattern: row.get(3)?,
    preferred_person_id: row.get(4)?,
    rejected_person_id: row.get(5)?,
    reason: row.get(6)?,
    created_at: row.get(7)?,
  })
}

const LINK_OVERRIDE_COLUMNS: &str = "id, name_pattern, source_type, context_pattern, preferred_person_id, rejected_person_id, reason, created_at";

impl LinkOverrideStore for SqliteStore {
  type Error = Error;

  async fn add(&self, mut rule: LinkOverride) -> Result<LinkOverride> {
    if rule.id.is_nil() {
      rule.id = Uuid::new_v4();
    }
    let id = encode_uuid(rule.id);
    let preferred = encode_uuid(rule.preferred_person_id);
    let rejected = rule.rejected_person_id.map(encode_uuid);
    let created_at = encode_dt(rule.created_at);
    let (name_pattern, source_type, context_pattern, reason) =
      (rule.name_pattern.clone(), rule.source_type.clone(), rule.context_pattern.clone(), rule.reason.clone());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO link_overrides ({LINK_OVERRIDE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
          ),
          rusqlite::params![id, name_pattern, source_type, context_pattern, preferred, rejected, reason, created_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(rule)
  }

  async fn get_all(&self) -> Result<Vec<LinkOverride>> {
    let raws: Vec<RawLinkOverride> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT {LINK_OVERRIDE_COLUMNS} FROM link_overrides ORDER BY created_at DESC"))?;
        let rows = stmt.query_map([], row_to_raw_link_override)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawLinkOverride::into_domain).collect()
  }

  async fn find_matching(&self, name: &str, source_type: Option<&str>, context_path: Option<&str>) -> Result<Option<LinkOverride>> {
    let all = LinkOverrideStore::get_all(self).await?;
    Ok(link_override::find_matching(&all, name, source_type, context_path).cloned())
  }

  async fn get_for_person(&self, person_id: Uuid) -> Result<Vec<LinkOverride>> {
    let person_str = encode_uuid(person_id);
    let raws: Vec<RawLinkOverride> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn
          .prepare(&format!("SELECT {LINK_OVERRIDE_COLUMNS} FROM link_overrides WHERE preferred_person_id = ?1 OR rejected_person_id = ?1"))?;
        let rows = stmt.query_map(rusqlite::params![person_str], row_to_raw_link_override)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawLinkOverride::into_domain).collect()
  }

  async fn delete(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let changed = self.conn.call(move |conn| Ok(conn.execute("DELETE FROM link_overrides WHERE id = ?1", rusqlite::params![id_str])?)).await?;
    Ok(changed > 0)
  }
}

// ─── ReviewQueueStore ────────────────────────────────────────────────────

fn row_to_raw_review_candidate(row: &rusqlite::Row) -> rusqlite::Result<RawReviewCandidate> {
  Ok(RawReviewCandidate {
    id: row.get(0)?,
    review_type: row.get(1)?,
    person_a_id: row.get(2)?,
    person_a_name: row.get(3)?,
    person_b_id: row.get(4)?,
    person_b_name: row.get(5)?,
    confidence: row.get(6)?,
    reason: row.get(7)?,
    evidence_json: row.get(8)?,
    status: row.get(9)?,
    reviewed_at: row.get(10)?,
    batch_id: row.get(11)?,
    created_at: row.get(12)?,
  })
}

const REVIEW_QUEUE_COLUMNS: &str =
  "id, review_type, person_a_id, person_a_name, person_b_id, person_b_name, confidence, reason, evidence_json, status, reviewed_at, batch_id, created_at";

impl SqliteStore {
  async fn insert_review_candidate(&self, candidate: ReviewCandidate) -> Result<ReviewCandidate> {
    let id = encode_uuid(candidate.id);
    let review_type = candidate.review_type.to_string();
    let a_id = encode_uuid(candidate.person_a_id);
    let a_name = candidate.person_a_name.clone();
    let b_id = candidate.person_b_id.map(encode_uuid);
    let b_name = candidate.person_b_name.clone();
    let confidence = candidate.confidence;
    let reason = candidate.reason.clone();
    let evidence_json = candidate.evidence.as_ref().map(serde_json::to_string).transpose()?;
    let status = candidate.status.to_string();
    let batch_id = candidate.batch_id.clone();
    let created_at = encode_dt(candidate.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!("INSERT INTO review_queue ({REVIEW_QUEUE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, ?11, ?12)"),
          rusqlite::params![id, review_type, a_id, a_name, b_id, b_name, confidence, reason, evidence_json, status, batch_id, created_at],
        )?;
        Ok(())
      })
      .await?;
    Ok(candidate)
  }
}

impl ReviewQueueStore for SqliteStore {
  type Error = Error;

  async fn add_duplicate(
    &self,
    a_id: Uuid,
    a_name: &str,
    b_id: Uuid,
    b_name: &str,
    confidence: f64,
    reason: &str,
    batch_id: Option<&str>,
  ) -> Result<ReviewCandidate> {
    let pending = self.get_pending(Some(ReviewType::Duplicate), usize::MAX, 0).await?;
    if let Some(existing) = pending.into_iter().find(|c| c.covers_pair(a_id, b_id)) {
      return Ok(existing);
    }
    let mut candidate = ReviewCandidate::duplicate(a_id, a_name, b_id, b_name, confidence, reason);
    candidate.batch_id = batch_id.map(str::to_string);
    self.insert_review_candidate(candidate).await
  }

  async fn add_single(
    &self,
    review_type: ReviewType,
    person_id: Uuid,
    person_name: &str,
    confidence: f64,
    reason: &str,
    batch_id: Option<&str>,
  ) -> Result<ReviewCandidate> {
    let pending = self.get_pending(Some(review_type), usize::MAX, 0).await?;
    if let Some(existing) = pending.into_iter().find(|c| c.person_a_id == person_id && c.person_b_id.is_none()) {
      return Ok(existing);
    }
    let mut candidate = ReviewCandidate::single(review_type, person_id, person_name, confidence, reason);
    candidate.batch_id = batch_id.map(str::to_string);
    self.insert_review_candidate(candidate).await
  }

  async fn get_by_id(&self, id: Uuid) -> Result<Option<ReviewCandidate>> {
    let id_str = encode_uuid(id);
    let raw: Option<RawReviewCandidate> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&format!("SELECT {REVIEW_QUEUE_COLUMNS} FROM review_queue WHERE id = ?1"), rusqlite::params![id_str], row_to_raw_review_candidate)
            .optional()?,
        )
      })
      .await?;
    raw.map(RawReviewCandidate::into_domain).transpose()
  }

  async fn get_pending(&self, review_type: Option<ReviewType>, limit: usize, offset: usize) -> Result<Vec<ReviewCandidate>> {
    let review_type = review_type.map(|t| t.to_string());
    let limit = limit.min(i64::MAX as usize) as i64;
    let offset = offset as i64;
    let raws: Vec<RawReviewCandidate> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {REVIEW_QUEUE_COLUMNS} FROM review_queue
           WHERE status = 'pending' AND (?1 IS NULL OR review_type = ?1)
           ORDER BY confidence DESC, created_at ASC LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![review_type, limit, offset], row_to_raw_review_candidate)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawReviewCandidate::into_domain).collect()
  }

  async fn mark_reviewed(&self, id: Uuid, status: ReviewStatus) -> Result<Option<ReviewCandidate>> {
    let id_str = encode_uuid(id);
    let status_str = status.to_string();
    let now = encode_dt(Utc::now());
    self
      .conn
      .call({
        let id_str = id_str.clone();
        move |conn| {
          conn.execute(
            "UPDATE review_queue SET status = ?2, reviewed_at = ?3 WHERE id = ?1",
            rusqlite::params![id_str, status_str, now],
          )?;
          Ok(())
        }
      })
      .await?;
    ReviewQueueStore::get_by_id(self, decode_uuid(&id_str)?).await
  }

  async fn clear_pending(&self, review_type: Option<ReviewType>) -> Result<usize> {
    let review_type = review_type.map(|t| t.to_string());
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM review_queue WHERE status = 'pending' AND (?1 IS NULL OR review_type = ?1)",
          rusqlite::params![review_type],
        )?)
      })
      .await?;
    Ok(changed)
  }

  async fn remove_for_person(&self, person_id: Uuid) -> Result<usize> {
    let person_str = encode_uuid(person_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM review_queue WHERE status = 'pending' AND (person_a_id = ?1 OR person_b_id = ?1)",
          rusqlite::params![person_str],
        )?)
      })
      .await?;
    Ok(changed)
  }
}
