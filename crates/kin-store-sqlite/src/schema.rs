//! SQL schema for the relationship-graph SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number. `Person` itself is not
//! part of this schema — it lives in the JSON file store — so every table
//! here keys off `person_id` as a bare `TEXT` column with no foreign key.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = OFF;

CREATE TABLE IF NOT EXISTS source_entities (
    id                  TEXT PRIMARY KEY,
    source_type         TEXT NOT NULL,
    source_id           TEXT,
    observed_name       TEXT,
    observed_email      TEXT,
    observed_phone      TEXT,
    metadata_json       TEXT NOT NULL DEFAULT '{}',
    canonical_person_id TEXT,
    link_confidence     REAL NOT NULL DEFAULT 0.0,
    link_status         TEXT NOT NULL DEFAULT 'auto',
    linked_at           TEXT,
    observed_at         TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    match_attempted_at  TEXT,
    match_attempt_count INTEGER NOT NULL DEFAULT 0,
    UNIQUE (source_type, source_id)
);

CREATE INDEX IF NOT EXISTS source_entities_person_idx ON source_entities(canonical_person_id);
CREATE INDEX IF NOT EXISTS source_entities_email_idx  ON source_entities(observed_email);
CREATE INDEX IF NOT EXISTS source_entities_phone_idx  ON source_entities(observed_phone);

CREATE TABLE IF NOT EXISTS relationships (
    id                     TEXT PRIMARY KEY,
    person_a_id            TEXT NOT NULL,
    person_b_id            TEXT NOT NULL,
    relationship_type      TEXT NOT NULL,
    shared_contexts_json   TEXT NOT NULL DEFAULT '[]',
    shared_events_count    INTEGER NOT NULL DEFAULT 0,
    shared_threads_count   INTEGER NOT NULL DEFAULT 0,
    shared_messages_count  INTEGER NOT NULL DEFAULT 0,
    shared_whatsapp_count  INTEGER NOT NULL DEFAULT 0,
    shared_slack_count     INTEGER NOT NULL DEFAULT 0,
    shared_phone_calls_count INTEGER NOT NULL DEFAULT 0,
    shared_photos_count    INTEGER NOT NULL DEFAULT 0,
    is_linkedin_connection INTEGER NOT NULL DEFAULT 0,
    first_seen_together    TEXT,
    last_seen_together     TEXT,
    created_at             TEXT NOT NULL,
    updated_at             TEXT NOT NULL,
    CHECK (person_a_id < person_b_id),
    UNIQUE (person_a_id, person_b_id)
);

CREATE INDEX IF NOT EXISTS relationships_a_idx ON relationships(person_a_id);
CREATE INDEX IF NOT EXISTS relationships_b_idx ON relationships(person_b_id);

CREATE TABLE IF NOT EXISTS interactions (
    id          TEXT PRIMARY KEY,
    person_id   TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    source_type TEXT NOT NULL,
    title       TEXT,
    snippet     TEXT,
    source_link TEXT,
    source_id   TEXT,
    created_at  TEXT NOT NULL,
    UNIQUE (source_type, source_id)
);

CREATE INDEX IF NOT EXISTS interactions_person_idx    ON interactions(person_id);
CREATE INDEX IF NOT EXISTS interactions_timestamp_idx ON interactions(timestamp);

CREATE TABLE IF NOT EXISTS link_overrides (
    id                   TEXT PRIMARY KEY,
    name_pattern         TEXT NOT NULL,
    source_type          TEXT,
    context_pattern      TEXT,
    preferred_person_id  TEXT NOT NULL,
    rejected_person_id   TEXT,
    reason               TEXT,
    created_at           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS link_overrides_name_idx     ON link_overrides(name_pattern);
CREATE INDEX IF NOT EXISTS link_overrides_preferred_idx ON link_overrides(preferred_person_id);

CREATE TABLE IF NOT EXISTS review_queue (
    id             TEXT PRIMARY KEY,
    review_type    TEXT NOT NULL,
    person_a_id    TEXT NOT NULL,
    person_a_name  TEXT NOT NULL,
    person_b_id    TEXT,
    person_b_name  TEXT,
    confidence     REAL NOT NULL DEFAULT 0.0,
    reason         TEXT NOT NULL DEFAULT '',
    evidence_json  TEXT,
    status         TEXT NOT NULL DEFAULT 'pending',
    reviewed_at    TEXT,
    batch_id       TEXT,
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS review_queue_status_idx ON review_queue(status, review_type);
CREATE INDEX IF NOT EXISTS review_queue_a_idx      ON review_queue(person_a_id);
CREATE INDEX IF NOT EXISTS review_queue_b_idx      ON review_queue(person_b_id);

PRAGMA user_version = 1;
";
