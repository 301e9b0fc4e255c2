//! Adapter for paginated blog archives
//!
//! Shape: listing pages carry post links and an older-posts anchor; each
//! post page holds a title, a body of text, inline images (optionally
//! captioned by a wrapping figure or a sibling caption paragraph), and tag
//! anchors. The post-link, next-page, title, body, image, caption and tag
//! selectors come from configuration.

use crate::archives::{
    parse_selector, resolve_link, slug, Adapter, ParseContext, ParseError, ParseOutput,
    ParseResult,
};
use crate::fetch::FetchedPage;
use crate::model::{FetchTask, ImageRef, Record, TaskKind, TaskRole};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;

pub struct BlogAdapter;

impl Adapter for BlogAdapter {
    fn parse(&self, page: &FetchedPage, ctx: &ParseContext<'_>) -> ParseResult<ParseOutput> {
        let document = Html::parse_document(&page.text());
        match ctx.role {
            TaskRole::Listing => parse_listing(&document, ctx),
            TaskRole::Detail => parse_post(&document, ctx),
        }
    }
}

/// Collects post links and the older-posts link from a listing page
fn parse_listing(document: &Html, ctx: &ParseContext<'_>) -> ParseResult<ParseOutput> {
    let selectors = &ctx.archive.selectors;
    let post_link = parse_selector(selectors.post_link.as_deref().unwrap_or(""))?;

    let mut output = ParseOutput::default();
    let mut seen = HashSet::new();

    for element in document.select(&post_link) {
        let Some(resolved) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, &ctx.url))
        else {
            continue;
        };
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
            message: "no post links found on listing page".to_string(),
        });
    }

    // Pagination: follow the older-posts anchor until the blog runs out.
    if let Some(next_page) = selectors.next_page.as_deref() {
        let next_selector = parse_selector(next_page)?;
        if let Some(older) = document
            .select(&next_selector)
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| resolve_link(href, &ctx.url))
        {
            output.follow_ups.push(FetchTask::new(
                older,
                &ctx.archive.name,
                TaskKind::Page,
                TaskRole::Listing,
            ));
        }
    }

    Ok(output)
}

/// Extracts one record from a post page
fn parse_post(document: &Html, ctx: &ParseContext<'_>) -> ParseResult<ParseOutput> {
    let selectors = &ctx.archive.selectors;
    let title_selector = parse_selector(selectors.title.as_deref().unwrap_or(""))?;
    let body_selector = parse_selector(selectors.body.as_deref().unwrap_or(""))?;
    let image_selector = parse_selector(selectors.image.as_deref().unwrap_or(""))?;
    let caption_selector = selectors
        .caption
        .as_deref()
        .map(parse_selector)
        .transpose()?;
    let tag_selector = selectors.tag.as_deref().map(parse_selector).transpose()?;

    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    let Some(body) = document.select(&body_selector).next() else {
        return Err(ParseError::Mismatch {
            url: ctx.url.to_string(),
            message: format!(
                "post body '{}' not found",
                selectors.body.as_deref().unwrap_or("")
            ),
        });
    };

    let mut record = Record::new(&ctx.archive.name, slug(ctx.url.as_str()));
    record.title = title;
    record.description = block_text(&body);
    record.push_attribute("source-url", ctx.url.as_str());

    if let Some(tag_selector) = &tag_selector {
        for tag in document.select(tag_selector) {
            record.push_attribute("tags", tag.text().collect::<String>().trim());
        }
    }

    for image in body.select(&image_selector) {
        let Some(src) = image
            .value()
            .attr("src")
            .and_then(|src| resolve_link(src, &ctx.url))
        else {
            continue;
        };

        if let Some(caption) = image_caption(&image, caption_selector.as_ref()) {
            record.push_attribute("image-caption", caption);
        }
        record.image_refs.push(ImageRef::new(vec![src.to_string()]));
    }

    let mut output = ParseOutput::default();
    output.records.push(record);
    Ok(output)
}

/// Joins an element's text nodes into paragraph-separated plain text
fn block_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Finds the caption for an inline image
///
/// Checks the nearest wrapping figure for a configured caption element, then
/// the image's following siblings. Blogs mix both conventions, often within
/// a single post.
fn image_caption(image: &ElementRef<'_>, caption_selector: Option<&Selector>) -> Option<String> {
    let caption_selector = caption_selector?;

    for ancestor in image.ancestors() {
        let Some(element) = ElementRef::wrap(ancestor) else {
            continue;
        };
        if element.value().name() != "figure" {
            continue;
        }
        if let Some(caption) = element.select(caption_selector).next() {
            let text = caption.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    for sibling in image.next_siblings() {
        let Some(element) = ElementRef::wrap(sibling) else {
            continue;
        };
        if caption_selector.matches(&element) {
            let text = element.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    None
}
