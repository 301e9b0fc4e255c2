//! Deduplicating persistence facade
//!
//! Single entry point for everything the run writes: dataset lines, image
//! files, and index rows. The orchestrator keeps one `Persistence` behind a
//! lock, so concurrent task completions are serialized here and the dataset
//! never interleaves. Failures at this layer are fatal to the run; a half
//! written output directory is worse than a stopped harvest.

use crate::model::{ImageRef, ImageStatus, Record};
use crate::storage::dataset::{DatasetLine, DatasetWriter};
use crate::storage::images::ImageStore;
use crate::storage::index::HarvestIndex;
use crate::storage::{RunStatus, StorageError, StorageResult, StoreStatus, WriteStatus};
use std::path::Path;

/// Writes records and images idempotently under one output directory
pub struct Persistence {
    index: HarvestIndex,
    dataset: DatasetWriter,
    images: ImageStore,
    run_id: i64,

    /// Set when a write merged into an existing record; triggers dataset
    /// compaction at finalize
    merged: bool,
}

impl Persistence {
    /// Opens the output directory: index database, dataset file, image store
    ///
    /// Under `resume` the dataset is appended to and prior records stay
    /// visible for dedup; otherwise prior harvest data is cleared and the
    /// dataset truncated.
    pub fn open(output_dir: &Path, config_hash: &str, resume: bool) -> StorageResult<Self> {
        std::fs::create_dir_all(output_dir)?;

        let mut index = HarvestIndex::open(&output_dir.join("harvest.db"))?;
        if !resume {
            index.clear_harvest_data()?;
        }
        let run_id = index.create_run(config_hash)?;

        let dataset = DatasetWriter::open(&output_dir.join("dataset.jsonl"), resume)?;
        let images = ImageStore::open(&output_dir.join("images"))?;

        Ok(Self {
            index,
            dataset,
            images,
            run_id,
            merged: false,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Writes one record: new keys append a dataset line, known keys merge
    ///
    /// Downloaded images are linked to the record in the index either way.
    pub fn write(&mut self, record: &Record) -> StorageResult<WriteStatus> {
        let json = serde_json::to_string(&DatasetLine::from_record(record))?;
        let (record_id, status) = self.index.upsert_record(record, &json, self.run_id)?;

        match status {
            WriteStatus::Inserted => self.dataset.append(&json)?,
            WriteStatus::Updated => {
                tracing::debug!(
                    "Record {}/{} already present, merged",
                    record.archive,
                    record.source_id
                );
                self.merged = true;
            }
        }

        for image in &record.image_refs {
            if let Some(hash) = &image.content_hash {
                self.index.link_record_image(record_id, hash)?;
            }
        }

        Ok(status)
    }

    /// Stores downloaded bytes for a resolved ref, content-addressed
    ///
    /// Identical bytes already on disk are not rewritten; the ref is linked
    /// to the existing file instead.
    pub fn store_image(
        &mut self,
        bytes: &[u8],
        image: &mut ImageRef,
    ) -> StorageResult<StoreStatus> {
        if image.status != ImageStatus::Resolved {
            return Err(StorageError::ImageState(image.status));
        }

        let hash = ImageStore::content_hash(bytes);

        if let Some(existing) = self.index.find_image(&hash)? {
            image
                .mark_downloaded(hash, existing)
                .map_err(|_| StorageError::ImageState(image.status))?;
            return Ok(StoreStatus::Deduplicated);
        }

        let source = image
            .resolved_url
            .as_deref()
            .unwrap_or_default()
            .to_string();
        let path = self.images.path_for(&hash, &source);
        self.images.store(&path, bytes)?;
        self.index
            .insert_image(&hash, &path, bytes.len(), self.run_id)?;

        image
            .mark_downloaded(hash, path)
            .map_err(|_| StorageError::ImageState(image.status))?;
        Ok(StoreStatus::Stored)
    }

    /// Closes the run: compacts the dataset if any merges happened
    ///
    /// Returns true when a compaction rewrite was performed.
    pub fn finalize(&mut self, status: RunStatus) -> StorageResult<bool> {
        let compacted = if self.merged {
            let lines = self.index.dataset_lines()?;
            tracing::info!("Compacting dataset ({} records)", lines.len());
            self.dataset.rewrite(&lines)?;
            self.merged = false;
            true
        } else {
            false
        };

        self.index.finish_run(self.run_id, status)?;
        Ok(compacted)
    }
}
