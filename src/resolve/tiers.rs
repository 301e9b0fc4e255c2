//! Pure tier arithmetic for image URL families
//!
//! Two families are understood:
//! - IIIF Image API services, where `{service}/info.json` describes the
//!   exact sizes on offer and `{service}/full/...` addresses them
//! - Blogger-style size segments (`/s320/`, `/s1600/`, `/w400-h300/`),
//!   where rewriting one path segment walks the resolution ladder
//!
//! Everything here is a pure function of the URL text; the resolver decides
//! what to actually request.

use serde_json::Value;
use url::Url;

/// Size-segment ladder for Blogger-style image hosts, lowest to original
///
/// `s0` addresses the unscaled original.
const SIZE_LADDER: &[&str] = &["s320", "s640", "s1024", "s1600", "s0"];

/// Detects an IIIF image-service URL and returns the service base
///
/// Recognizes `{service}/info.json` and the four-segment image request form
/// `{service}/{region}/{size}/{rotation}/{quality}.{format}`.
pub fn iiif_service_base(url: &str) -> Option<String> {
    if let Some(base) = url.strip_suffix("/info.json") {
        return Some(base.to_string());
    }

    let parsed = Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.collect();
    let n = segments.len();
    if n < 5 {
        return None;
    }

    let region = segments[n - 4];
    let size = segments[n - 3];
    let quality = segments[n - 1];

    let region_ok = region == "full" || region == "square" || region.contains(',');
    let size_ok =
        size == "full" || size == "max" || size.contains(',') || size.starts_with("pct:");
    if !(region_ok && size_ok && quality.contains('.')) {
        return None;
    }

    let mut base = parsed.clone();
    base.set_path(&format!("/{}", segments[..n - 4].join("/")));
    base.set_query(None);
    Some(base.to_string())
}

/// URL of the information descriptor for a service base
pub fn info_url(service_base: &str) -> String {
    format!("{}/info.json", service_base.trim_end_matches('/'))
}

/// Selects the maximum-resolution image URL a descriptor advertises
///
/// Full native dimensions win when the descriptor carries `width`/`height`;
/// otherwise the largest entry of the `sizes` array is used. Returns None
/// for descriptors that describe neither.
pub fn max_url_from_descriptor(service_base: &str, descriptor: &Value) -> Option<String> {
    let base = service_base.trim_end_matches('/');

    if descriptor.get("width").and_then(Value::as_u64).is_some() {
        let size = if is_image_api_3(descriptor) {
            "max"
        } else {
            "full"
        };
        return Some(format!("{}/full/{}/0/default.jpg", base, size));
    }

    let sizes = descriptor.get("sizes")?.as_array()?;
    let (width, height) = sizes
        .iter()
        .filter_map(|size| {
            let w = size.get("width")?.as_u64()?;
            let h = size.get("height")?.as_u64()?;
            Some((w, h))
        })
        .max_by_key(|(w, h)| w * h)?;

    Some(format!("{}/full/{},{}/0/default.jpg", base, width, height))
}

fn is_image_api_3(descriptor: &Value) -> bool {
    if let Some(context) = descriptor.get("@context").and_then(Value::as_str) {
        if context.contains("/image/3/") {
            return true;
        }
    }
    descriptor
        .get("type")
        .and_then(Value::as_str)
        .map(|t| t.starts_with("ImageService3"))
        .unwrap_or(false)
}

/// Expands a sized image URL through the known ladder, lowest to highest
///
/// Returns an empty vector when the URL carries no recognized size segment,
/// in which case the caller falls back to the candidates it already has.
pub fn tier_ladder(url: &str) -> Vec<String> {
    let Ok(parsed) = Url::parse(url) else {
        return Vec::new();
    };
    let Some(segments) = parsed.path_segments() else {
        return Vec::new();
    };
    let segments: Vec<&str> = segments.collect();

    let Some(size_index) = segments.iter().position(|seg| is_size_segment(seg)) else {
        return Vec::new();
    };

    SIZE_LADDER
        .iter()
        .map(|rung| {
            let mut rewritten = segments.clone();
            rewritten[size_index] = rung;
            let mut out = parsed.clone();
            out.set_path(&format!("/{}", rewritten.join("/")));
            out.to_string()
        })
        .collect()
}

/// Recognizes Blogger/googleusercontent size segments
///
/// Matches `sNNN` (optionally with a `-c` crop suffix) and `wNNN-hNNN`.
fn is_size_segment(segment: &str) -> bool {
    let segment = segment.strip_suffix("-c").unwrap_or(segment);

    if let Some(rest) = segment.strip_prefix('s') {
        return !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit());
    }

    if let Some(rest) = segment.strip_prefix('w') {
        if let Some((w, h)) = rest.split_once("-h") {
            return !w.is_empty()
                && !h.is_empty()
                && w.chars().all(|c| c.is_ascii_digit())
                && h.chars().all(|c| c.is_ascii_digit());
        }
    }

    false
}
