//! Adapter for archives published as a downloadable tabular export
//!
//! The seed is a CSV file (local path or URL); each row with a usable image
//! URL becomes one record. Which columns feed which record fields is
//! declared in the archive's `[archive.columns]` map.

use crate::archives::{Adapter, ParseContext, ParseError, ParseOutput, ParseResult};
use crate::fetch::FetchedPage;
use crate::model::{ImageRef, Record};

pub struct CsvExportAdapter;

impl Adapter for CsvExportAdapter {
    fn parse(&self, page: &FetchedPage, ctx: &ParseContext<'_>) -> ParseResult<ParseOutput> {
        let columns = ctx.archive.columns.as_ref().ok_or_else(|| {
            ParseError::Mismatch {
                url: ctx.url.to_string(),
                message: "csv-export archive has no column map".to_string(),
            }
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(page.bytes.as_slice());

        let headers = reader.headers()?.clone();
        let position =
            |name: &str| headers.iter().position(|h| h.trim() == name);

        let id_index = position(&columns.id).ok_or_else(|| ParseError::Mismatch {
            url: ctx.url.to_string(),
            message: format!("id column '{}' not found in header", columns.id),
        })?;
        let image_index = position(&columns.image).ok_or_else(|| ParseError::Mismatch {
            url: ctx.url.to_string(),
            message: format!("image column '{}' not found in header", columns.image),
        })?;
        let title_index = columns.title.as_deref().and_then(position);
        let description_index = columns.description.as_deref().and_then(position);

        // Attribute columns that are absent from the header are ignored
        // rather than fatal; exports vary between downloads.
        let attribute_indices: Vec<(usize, &str)> = columns
            .attributes
            .iter()
            .filter_map(|(column, key)| Some((position(column)?, key.as_str())))
            .collect();

        let mut output = ParseOutput::default();

        for row in reader.records() {
            let row = row?;

            let source_id = row.get(id_index).unwrap_or("").trim();
            let image_url = row.get(image_index).unwrap_or("").trim();

            // Rows without an id or a fetchable image are skipped, counted
            if source_id.is_empty() || !image_url.starts_with("http") {
                output.skipped += 1;
                continue;
            }

            let mut record = Record::new(&ctx.archive.name, source_id);
            if let Some(i) = title_index {
                record.title = row.get(i).unwrap_or("").trim().to_string();
            }
            if let Some(i) = description_index {
                record.description = row.get(i).unwrap_or("").trim().to_string();
            }
            for (index, key) in &attribute_indices {
                record.push_attribute(*key, row.get(*index).unwrap_or("").trim());
            }

            record.image_refs.push(ImageRef::new(vec![image_url.to_string()]));
            output.records.push(record);
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArchiveConfig, ArchiveKind, ColumnMap, SelectorMap};
    use crate::model::TaskRole;
    use std::collections::BTreeMap;
    use url::Url;

    fn museum_archive() -> ArchiveConfig {
        let mut attributes = BTreeMap::new();
        attributes.insert("Object type".to_string(), "object_type".to_string());
        attributes.insert("Materials".to_string(), "materials".to_string());

        ArchiveConfig {
            name: "museum".to_string(),
            kind: ArchiveKind::CsvExport,
            base_url: "https://museum.example.com/collection".to_string(),
            seed: "./museum.csv".to_string(),
            selectors: SelectorMap::default(),
            columns: Some(ColumnMap {
                id: "Museum number".to_string(),
                title: Some("Title".to_string()),
                description: Some("Description".to_string()),
                image: "Image".to_string(),
                attributes,
            }),
        }
    }

    fn fixture_page(csv: &str) -> FetchedPage {
        FetchedPage {
            final_url: "file://museum.csv".to_string(),
            status: 200,
            content_type: "text/csv".to_string(),
            bytes: csv.as_bytes().to_vec(),
        }
    }

    fn context(archive: &ArchiveConfig) -> ParseContext<'_> {
        ParseContext {
            archive,
            url: Url::parse("https://museum.example.com/collection").unwrap(),
            role: TaskRole::Detail,
        }
    }

    const FIXTURE: &str = "\
Museum number,Title,Description,Object type,Materials,Image
Af1934.01,Carved figure,A carved wooden figure,figure,wood,https://media.example.com/a1.jpg
Af1934.02,,No image row,mask,,not-a-url
Af1934.03,Mask,An elaborate mask,mask,raffia,https://media.example.com/a3.jpg
";

    #[test]
    fn test_rows_become_records() {
        let archive = museum_archive();
        let output = CsvExportAdapter
            .parse(&fixture_page(FIXTURE), &context(&archive))
            .unwrap();

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.skipped, 1);
        assert!(output.follow_ups.is_empty());

        let first = &output.records[0];
        assert_eq!(first.archive, "museum");
        assert_eq!(first.source_id, "Af1934.01");
        assert_eq!(first.title, "Carved figure");
        assert_eq!(first.description, "A carved wooden figure");
        assert_eq!(
            first.attributes.get("object_type").unwrap(),
            &vec!["figure".to_string()]
        );
        assert_eq!(first.image_refs.len(), 1);
        assert_eq!(
            first.image_refs[0].best_candidate(),
            Some("https://media.example.com/a1.jpg")
        );
    }

    #[test]
    fn test_missing_id_column_is_mismatch() {
        let mut archive = museum_archive();
        archive.columns.as_mut().unwrap().id = "Accession".to_string();

        let result = CsvExportAdapter.parse(&fixture_page(FIXTURE), &context(&archive));
        assert!(matches!(result, Err(ParseError::Mismatch { .. })));
    }

    #[test]
    fn test_absent_attribute_column_is_ignored() {
        let mut archive = museum_archive();
        archive
            .columns
            .as_mut()
            .unwrap()
            .attributes
            .insert("Production date".to_string(), "production_date".to_string());

        let output = CsvExportAdapter
            .parse(&fixture_page(FIXTURE), &context(&archive))
            .unwrap();
        assert_eq!(output.records.len(), 2);
        assert!(!output.records[0].attributes.contains_key("production_date"));
    }

    #[test]
    fn test_empty_export_yields_no_records() {
        let archive = museum_archive();
        let output = CsvExportAdapter
            .parse(
                &fixture_page("Museum number,Title,Description,Object type,Materials,Image\n"),
                &context(&archive),
            )
            .unwrap();
        assert!(output.records.is_empty());
        assert_eq!(output.skipped, 0);
    }
}
