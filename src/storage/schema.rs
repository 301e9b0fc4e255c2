//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the harvest index.

/// SQL schema for the index database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per normalized record; (archive, source_id) is the record key.
-- json holds the serialized dataset line so the dataset file can be
-- rewritten from the index after merges.
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    archive TEXT NOT NULL,
    source_id TEXT NOT NULL,
    title TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    json TEXT NOT NULL,
    first_run INTEGER NOT NULL REFERENCES runs(id),
    last_run INTEGER NOT NULL REFERENCES runs(id),
    UNIQUE(archive, source_id)
);

CREATE INDEX IF NOT EXISTS idx_records_archive ON records(archive);

-- Content-addressed image files
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_hash TEXT NOT NULL UNIQUE,
    local_path TEXT NOT NULL,
    byte_count INTEGER NOT NULL,
    stored_run INTEGER NOT NULL REFERENCES runs(id)
);

-- Which images belong to which records
CREATE TABLE IF NOT EXISTS record_images (
    record_id INTEGER NOT NULL REFERENCES records(id),
    image_id INTEGER NOT NULL REFERENCES images(id),
    UNIQUE(record_id, image_id)
);

CREATE INDEX IF NOT EXISTS idx_record_images_record ON record_images(record_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
