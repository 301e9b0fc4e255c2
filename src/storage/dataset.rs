//! JSONL dataset file
//!
//! One self-contained JSON object per line, one line per record. Appends are
//! flushed line-at-a-time so an interrupted run never leaves a partial line.
//! When a run merges into existing records, the file is rewritten from the
//! index at finalize instead of accumulating duplicate lines.

use crate::model::Record;
use crate::storage::StorageResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// The dataset line shape: `archive, source_id, title, description,
/// attributes, image_paths, fetched_at`
#[derive(Debug, Serialize)]
pub struct DatasetLine<'a> {
    pub archive: &'a str,
    pub source_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub attributes: &'a BTreeMap<String, Vec<String>>,
    pub image_paths: Vec<String>,
    pub fetched_at: String,
}

impl<'a> DatasetLine<'a> {
    /// Projects a record onto the dataset line shape
    ///
    /// Only downloaded images contribute paths; pending or failed refs are
    /// represented by their absence.
    pub fn from_record(record: &'a Record) -> Self {
        let image_paths = record
            .image_refs
            .iter()
            .filter_map(|image| image.local_path.as_ref())
            .map(|path| path.to_string_lossy().into_owned())
            .collect();

        Self {
            archive: &record.archive,
            source_id: &record.source_id,
            title: &record.title,
            description: &record.description,
            attributes: &record.attributes,
            image_paths,
            fetched_at: record.fetched_at.to_rfc3339(),
        }
    }
}

/// Append-only writer for the dataset file
pub struct DatasetWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl DatasetWriter {
    /// Opens the dataset file, appending under resume, truncating otherwise
    pub fn open(path: &Path, resume: bool) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(resume)
            .write(true)
            .truncate(!resume)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Appends one serialized line and flushes it to disk
    pub fn append(&mut self, json: &str) -> StorageResult<()> {
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Replaces the file contents with the given lines
    ///
    /// Writes a sibling temp file and renames it into place, so readers never
    /// observe a half-rewritten dataset.
    pub fn rewrite(&mut self, lines: &[String]) -> StorageResult<()> {
        let temp_path = self.path.with_extension("jsonl.tmp");
        {
            let mut temp = BufWriter::new(File::create(&temp_path)?);
            for line in lines {
                writeln!(temp, "{}", line)?;
            }
            temp.flush()?;
        }

        self.writer.flush()?;
        std::fs::rename(&temp_path, &self.path)?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
