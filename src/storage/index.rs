//! SQLite harvest index
//!
//! The index is the authority on what has already been harvested: which
//! `(archive, source_id)` records exist, which content hashes are stored,
//! and which runs produced them. Dedup lookups on resume and dataset
//! compaction both read from here.

use crate::model::Record;
use crate::storage::schema::initialize_schema;
use crate::storage::{RunStatus, StorageError, StorageResult, WriteStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// SQLite-backed dedup and resume index
pub struct HarvestIndex {
    conn: Connection,
}

impl HarvestIndex {
    /// Opens or creates the index database at the given path
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory index (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    // ===== Run Management =====

    /// Creates a new run row and returns its id
    pub fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Closes a run row with its final status
    pub fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    /// Removes all harvested data, keeping run history
    ///
    /// Used by fresh (non-resume) runs so prior records cannot alias new ones.
    pub fn clear_harvest_data(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(
            "
            DELETE FROM record_images;
            DELETE FROM images;
            DELETE FROM records;
        ",
        )?;
        Ok(())
    }

    // ===== Record Management =====

    /// Inserts a record, or updates the existing row for its key
    ///
    /// `json` is the serialized dataset line, kept so the dataset file can be
    /// rewritten from the index.
    pub fn upsert_record(
        &mut self,
        record: &Record,
        json: &str,
        run_id: i64,
    ) -> StorageResult<(i64, WriteStatus)> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM records WHERE archive = ?1 AND source_id = ?2",
                params![record.archive, record.source_id],
                |row| row.get(0),
            )
            .optional()?;

        let fetched_at = record.fetched_at.to_rfc3339();

        match existing {
            Some(id) => {
                self.conn.execute(
                    "UPDATE records SET title = ?1, fetched_at = ?2, json = ?3, last_run = ?4
                     WHERE id = ?5",
                    params![record.title, fetched_at, json, run_id, id],
                )?;
                Ok((id, WriteStatus::Updated))
            }
            None => {
                self.conn.execute(
                    "INSERT INTO records (archive, source_id, title, fetched_at, json, first_run, last_run)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        record.archive,
                        record.source_id,
                        record.title,
                        fetched_at,
                        json,
                        run_id,
                        run_id
                    ],
                )?;
                Ok((self.conn.last_insert_rowid(), WriteStatus::Inserted))
            }
        }
    }

    /// All serialized dataset lines in insertion order
    pub fn dataset_lines(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT json FROM records ORDER BY id")?;
        let lines = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(lines)
    }

    // ===== Image Management =====

    /// Looks up the storage path for a content hash, if already stored
    pub fn find_image(&self, content_hash: &str) -> StorageResult<Option<PathBuf>> {
        let path: Option<String> = self
            .conn
            .query_row(
                "SELECT local_path FROM images WHERE content_hash = ?1",
                params![content_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(path.map(PathBuf::from))
    }

    /// Records a newly stored image file
    pub fn insert_image(
        &mut self,
        content_hash: &str,
        local_path: &Path,
        byte_count: usize,
        run_id: i64,
    ) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO images (content_hash, local_path, byte_count, stored_run)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                content_hash,
                local_path.to_string_lossy(),
                byte_count as i64,
                run_id
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Links a record to a stored image; repeats are ignored
    pub fn link_record_image(&mut self, record_id: i64, content_hash: &str) -> StorageResult<()> {
        let image_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM images WHERE content_hash = ?1",
                params![content_hash],
                |row| row.get(0),
            )
            .optional()?;

        let Some(image_id) = image_id else {
            return Err(StorageError::ImageNotIndexed(content_hash.to_string()));
        };

        self.conn.execute(
            "INSERT OR IGNORE INTO record_images (record_id, image_id) VALUES (?1, ?2)",
            params![record_id, image_id],
        )?;
        Ok(())
    }

    // ===== Statistics =====

    /// Summary counts for the --stats mode
    pub fn statistics(&self) -> StorageResult<IndexStatistics> {
        let runs: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        let records: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        let images: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        let image_bytes: u64 = self.conn.query_row(
            "SELECT COALESCE(SUM(byte_count), 0) FROM images",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT archive, COUNT(*) FROM records GROUP BY archive ORDER BY COUNT(*) DESC",
        )?;
        let records_by_archive = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, u64)>, _>>()?;

        let last_run = self
            .conn
            .query_row(
                "SELECT started_at, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(IndexStatistics {
            runs,
            records,
            images,
            image_bytes,
            records_by_archive,
            last_run,
        })
    }
}

/// Summary counts loaded from the index
#[derive(Debug, Clone)]
pub struct IndexStatistics {
    pub runs: u64,
    pub records: u64,
    pub images: u64,
    pub image_bytes: u64,

    /// Record counts per archive, largest first
    pub records_by_archive: Vec<(String, u64)>,

    /// Start time and status of the most recent run
    pub last_run: Option<(String, String)>,
}
