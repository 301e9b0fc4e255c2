use crate::model::ImageRef;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One cultural-heritage object's normalized metadata
///
/// `(archive, source_id)` is globally unique across the dataset; writing a
/// record whose key already exists overwrites the earlier entry instead of
/// appending a duplicate.
#[derive(Debug, Clone)]
pub struct Record {
    /// Name of the originating archive (record namespace)
    pub archive: String,

    /// Stable identifier within the originating archive
    pub source_id: String,

    /// Object title, may be empty
    pub title: String,

    /// Object description, may be empty
    pub description: String,

    /// Multi-valued metadata fields, deterministic key order
    pub attributes: BTreeMap<String, Vec<String>>,

    /// Images belonging to this record
    pub image_refs: Vec<ImageRef>,

    /// When the source page/row was fetched
    pub fetched_at: DateTime<Utc>,
}

impl Record {
    /// Creates an empty record for the given archive and native id
    pub fn new(archive: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            archive: archive.into(),
            source_id: source_id.into(),
            title: String::new(),
            description: String::new(),
            attributes: BTreeMap::new(),
            image_refs: Vec::new(),
            fetched_at: Utc::now(),
        }
    }

    /// Appends a value to a multi-valued attribute, preserving insertion order
    ///
    /// Empty values are dropped; repeated identical values for the same key
    /// are collapsed.
    pub fn push_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            return;
        }
        let values = self.attributes.entry(key.into()).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }
}
