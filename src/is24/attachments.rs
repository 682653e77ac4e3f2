//! Attachment collection lookup and picture URL templating.
//!
//! The vendor serves picture URLs as templates per scale mode, e.g.
//! `https://pictures.example/abc/ORIG/resize/%WIDTH%x%HEIGHT%/format/jpg`.
//! Documents and links carry a plain `url` instead.

use crate::estate::envelope::as_list;
use crate::is24::client::{FetchError, JsonFetch};
use crate::is24::config::ATTACHMENTS_ENVELOPE;
use crate::models::{Attachment, ImageSize, ScaleMode};
use serde_json::Value;
use tracing::debug;

const WIDTH_TOKEN: &str = "%WIDTH%";
const HEIGHT_TOKEN: &str = "%HEIGHT%";

pub async fn resolve_attachments(
    fetcher: &dyn JsonFetch,
    attachments_url: Option<&str>,
    size: ImageSize,
    scale: ScaleMode,
) -> Result<Vec<Attachment>, FetchError> {
    let Some(url) = attachments_url.filter(|u| !u.trim().is_empty()) else {
        return Ok(Vec::new());
    };

    let payload = fetcher.fetch_json(url).await?;
    let records = attachment_records(&payload);
    debug!(
        target: "is24.attachments",
        url = %url,
        count = records.len(),
        "attachments fetched"
    );

    Ok(records
        .into_iter()
        .map(|record| resolve_record(record, size, scale))
        .collect())
}

/// `{"common.attachments": [{"attachment": [...]}]}`; every level may also
/// arrive as a bare object.
fn attachment_records(payload: &Value) -> Vec<&Value> {
    let Some(collection) = payload
        .get(ATTACHMENTS_ENVELOPE)
        .and_then(|env| as_list(env).into_iter().next())
    else {
        return Vec::new();
    };
    collection
        .get("attachment")
        .map(as_list)
        .unwrap_or_default()
}

pub fn resolve_record(record: &Value, size: ImageSize, scale: ScaleMode) -> Attachment {
    let title = record
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_string);

    match record.get("urls") {
        Some(urls) => Attachment {
            title,
            url: scaled_url(urls, size, scale),
        },
        None => Attachment {
            title,
            url: record.get("url").and_then(plain_url),
        },
    }
}

fn plain_url(value: &Value) -> Option<String> {
    match value {
        Value::String(url) => Some(url.clone()),
        Value::Object(_) => attr(value, "href").map(str::to_string),
        _ => None,
    }
}

/// Picks the template for `scale` and fills in the target size. `None` when
/// the vendor offers no template for that scale.
pub fn scaled_url(urls: &Value, size: ImageSize, scale: ScaleMode) -> Option<String> {
    let template = scale_entries(urls)
        .into_iter()
        .find(|entry| attr(entry, "scale") == Some(scale.as_str()))
        .and_then(|entry| attr(entry, "href"))?;
    Some(fill_template(template, size))
}

pub fn fill_template(template: &str, size: ImageSize) -> String {
    template
        .replace(WIDTH_TOKEN, &size.width.to_string())
        .replace(HEIGHT_TOKEN, &size.height.to_string())
}

// `urls` is either `[{"url": [entry, ...]}]` or a flat `[entry, ...]`.
fn scale_entries(urls: &Value) -> Vec<&Value> {
    as_list(urls)
        .into_iter()
        .flat_map(|group| match group.get("url") {
            Some(nested) => as_list(nested),
            None => vec![group],
        })
        .collect()
}

// Vendor attributes arrive as `@name`, already-normalized ones as `name`.
fn attr<'a>(entry: &'a Value, name: &str) -> Option<&'a str> {
    entry
        .get(format!("@{name}").as_str())
        .or_else(|| entry.get(name))
        .and_then(Value::as_str)
}
