//! Adapter for gallery archives
//!
//! Shape: a category index page links out to gallery pages, each holding a
//! grid of items that pair a full-resolution image link with a caption. The
//! item, image-link and caption selectors come from configuration.

use crate::archives::{
    parse_selector, resolve_link, slug, Adapter, ParseContext, ParseError, ParseOutput,
    ParseResult,
};
use crate::fetch::FetchedPage;
use crate::model::{FetchTask, ImageRef, Record, TaskKind, TaskRole};
use scraper::Html;
use std::collections::HashSet;
use url::Url;

pub struct GalleryAdapter;

impl Adapter for GalleryAdapter {
    fn parse(&self, page: &FetchedPage, ctx: &ParseContext<'_>) -> ParseResult<ParseOutput> {
        let document = Html::parse_document(&page.text());
        match ctx.role {
            TaskRole::Listing => parse_index(&document, ctx),
            TaskRole::Detail => parse_gallery(&document, ctx),
        }
    }
}

/// Collects category links from the index page
///
/// A link qualifies when it stays on the archive's host, addresses a
/// directory-style path, carries visible text, and is not excluded by the
/// configured path fragments.
fn parse_index(document: &Html, ctx: &ParseContext<'_>) -> ParseResult<ParseOutput> {
    let base = Url::parse(&ctx.archive.base_url).map_err(|e| ParseError::Mismatch {
        url: ctx.url.to_string(),
        message: format!("unparseable base-url: {}", e),
    })?;
    let anchor = parse_selector("a[href]")?;

    let mut output = ParseOutput::default();
    let mut seen = HashSet::new();

    for element in document.select(&anchor) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(resolved) = resolve_link(href, &ctx.url) else {
            continue;
        };

        let text: String = element.text().collect::<String>().trim().to_string();

        if resolved.host_str() != base.host_str()
            || !resolved.path().ends_with('/')
            || text.is_empty()
            || resolved == ctx.url
        {
            continue;
        }
        if ctx
            .archive
            .selectors
            .exclude
            .iter()
            .any(|fragment| resolved.path().contains(fragment.as_str()))
        {
            continue;
        }
        if !seen.insert(resolved.to_string()) {
            continue;
        }

        output.follow_ups.push(FetchTask::new(
            resolved,
            &ctx.archive.name,
            TaskKind::Page,
            TaskRole::Detail,
        ));
    }

    if output.follow_ups.is_empty() {
        return Err(ParseError::Mismatch {
            url: ctx.url.to_string(),
            message: "no category links found on index page".to_string(),
        });
    }

    Ok(output)
}

/// Extracts one record per gallery item
fn parse_gallery(document: &Html, ctx: &ParseContext<'_>) -> ParseResult<ParseOutput> {
    let selectors = &ctx.archive.selectors;
    let item_selector = parse_selector(selectors.item.as_deref().unwrap_or(""))?;
    let image_link_selector = parse_selector(selectors.image_link.as_deref().unwrap_or(""))?;
    let caption_selector = selectors
        .caption
        .as_deref()
        .map(parse_selector)
        .transpose()?;
    let thumb_selector = parse_selector("img[src]")?;

    let mut output = ParseOutput::default();

    for item in document.select(&item_selector) {
        let Some(link) = item.select(&image_link_selector).next() else {
            output.skipped += 1;
            continue;
        };
        let Some(full_url) = link
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, &ctx.url))
        else {
            output.skipped += 1;
            continue;
        };

        let caption = caption_selector
            .as_ref()
            .and_then(|sel| item.select(sel).next())
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty());

        // Thumbnail src, if present, is the low-confidence fallback
        let mut candidates = Vec::new();
        if let Some(thumb) = item
            .select(&thumb_selector)
            .next()
            .and_then(|img| img.value().attr("src"))
            .and_then(|src| resolve_link(src, &ctx.url))
        {
            if thumb != full_url {
                candidates.push(thumb.to_string());
            }
        }
        candidates.push(full_url.to_string());

        let mut record = Record::new(&ctx.archive.name, slug(full_url.as_str()));
        record.title = caption.unwrap_or_else(|| "Untitled".to_string());
        record.push_attribute("gallery-page", ctx.url.as_str());
        record.image_refs.push(ImageRef::new(candidates));

        output.records.push(record);
    }

    if output.records.is_empty() && output.skipped == 0 {
        return Err(ParseError::Mismatch {
            url: ctx.url.to_string(),
            message: "no gallery items found".to_string(),
        });
    }

    Ok(output)
}
