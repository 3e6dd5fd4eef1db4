//! API JSON → content model.
//!
//! Pages and blocks arrive as loosely shaped JSON objects. Parsing is
//! lenient about optional fields (missing captions, empty titles, unknown
//! annotations) and strict only about what identifies an object: its id,
//! its type tag, and the page's edit timestamp.

use super::{FetchedBlock, SourceError};
use crate::model::{Block, BlockKind, DocumentMeta, FileSource, RichSpan, Style};
use crate::naming::{fallback_slug, sanitize_slug};
use serde_json::Value;
use std::collections::BTreeMap;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Database properties the sync reads, with the property type each must have.
pub const REQUIRED_PROPERTIES: &[(&str, &str)] = &[
    ("Title", "title"),
    ("Published", "checkbox"),
    ("Date", "date"),
    ("Slug", "rich_text"),
    ("Tags", "multi_select"),
];

const UNTITLED: &str = "Untitled";

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn required_str<'a>(value: &'a Value, key: &str, what: &str) -> Result<&'a str, SourceError> {
    str_field(value, key).ok_or_else(|| SourceError::Decode(format!("{what} has no `{key}`")))
}

/// Timestamps are RFC 3339; date properties may also be a bare `YYYY-MM-DD`.
fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339).ok().or_else(|| {
        Date::parse(raw, format_description!("[year]-[month]-[day]"))
            .ok()
            .map(|d| d.midnight().assume_utc())
    })
}

/// Plain text of a rich-text array, ignoring styling.
fn plain(rich_text: Option<&Value>) -> String {
    rich_text
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| str_field(item, "plain_text"))
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a rich-text array into spans.
pub fn parse_rich_text(value: Option<&Value>) -> Vec<RichSpan> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| {
            let equation = str_field(item, "type") == Some("equation");
            let raw = if equation {
                item.pointer("/equation/expression")
                    .and_then(Value::as_str)
                    .or_else(|| str_field(item, "plain_text"))
            } else {
                str_field(item, "plain_text")
            };
            let text = raw.unwrap_or_default().to_string();
            let flag = |name: &str| {
                item.pointer(&format!("/annotations/{name}"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
            };
            let color = item
                .pointer("/annotations/color")
                .and_then(Value::as_str)
                .filter(|c| *c != "default")
                .map(str::to_string);
            RichSpan {
                text,
                style: Style {
                    bold: flag("bold"),
                    italic: flag("italic"),
                    code: flag("code"),
                    strikethrough: flag("strikethrough"),
                    underline: flag("underline"),
                    color,
                },
                href: str_field(item, "href").map(str::to_string),
                equation,
            }
        })
        .collect()
}

/// An `{type: external|file, external: {url}, file: {url}}` descriptor.
fn parse_file_source(value: &Value) -> FileSource {
    match str_field(value, "type") {
        Some("file") => FileSource::Managed(
            value
                .pointer("/file/url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        _ => FileSource::External(
            value
                .pointer("/external/url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
    }
}

/// Parse a database row into document metadata.
///
/// Missing title → "Untitled"; missing or unusable slug → the id without
/// hyphens; missing date → the page's creation time.
pub fn parse_page(page: &Value) -> Result<DocumentMeta, SourceError> {
    let id = required_str(page, "id", "page")?.to_string();
    let last_edited = parse_timestamp(required_str(page, "last_edited_time", "page")?)
        .ok_or_else(|| SourceError::Decode(format!("page {id} has a malformed last_edited_time")))?;
    let props = page.get("properties").unwrap_or(&Value::Null);

    let title = plain(props.pointer("/Title/title"));
    let title = if title.trim().is_empty() {
        UNTITLED.to_string()
    } else {
        title.trim().to_string()
    };

    let slug = sanitize_slug(&plain(props.pointer("/Slug/rich_text")))
        .unwrap_or_else(|| fallback_slug(&id));

    let created = props
        .pointer("/Date/date/start")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
        .or_else(|| str_field(page, "created_time").and_then(parse_timestamp))
        .unwrap_or(last_edited);

    let tags = props
        .pointer("/Tags/multi_select")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|t| str_field(t, "name"))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let cover = page
        .get("cover")
        .filter(|c| !c.is_null())
        .map(parse_file_source)
        .filter(|source| !source.url().is_empty());

    Ok(DocumentMeta {
        id,
        title,
        slug,
        created,
        last_edited,
        tags,
        cover,
    })
}

/// Parse one entry of a children listing.
///
/// Unknown block types become [`BlockKind::Unsupported`] carrying the tag.
pub fn parse_block(value: &Value) -> Result<FetchedBlock, SourceError> {
    let id = required_str(value, "id", "block")?;
    let tag = required_str(value, "type", "block")?;
    let has_children = value
        .get("has_children")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let body = value.get(tag).unwrap_or(&Value::Null);
    let text = || parse_rich_text(body.get("rich_text"));
    let caption = || parse_rich_text(body.get("caption"));
    let url = || str_field(body, "url").unwrap_or_default().to_string();

    let kind = match tag {
        "paragraph" => BlockKind::Paragraph { text: text() },
        "heading_1" | "heading_2" | "heading_3" => BlockKind::Heading {
            level: tag.as_bytes()[tag.len() - 1] - b'0',
            text: text(),
        },
        "bulleted_list_item" => BlockKind::BulletedListItem { text: text() },
        "numbered_list_item" => BlockKind::NumberedListItem { text: text() },
        "to_do" => BlockKind::ToDo {
            text: text(),
            checked: body.get("checked").and_then(Value::as_bool).unwrap_or(false),
        },
        "code" => BlockKind::Code {
            language: str_field(body, "language").map(str::to_string),
            text: plain(body.get("rich_text")),
        },
        "quote" => BlockKind::Quote { text: text() },
        "divider" => BlockKind::Divider,
        "image" => BlockKind::Image {
            source: parse_file_source(body),
            caption: caption(),
        },
        "video" => BlockKind::Video {
            source: parse_file_source(body),
            caption: caption(),
        },
        "audio" => BlockKind::Audio {
            source: parse_file_source(body),
            caption: caption(),
        },
        "pdf" => BlockKind::Pdf {
            source: parse_file_source(body),
            caption: caption(),
        },
        "file" => BlockKind::File {
            source: parse_file_source(body),
            caption: caption(),
            name: str_field(body, "name")
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        },
        "equation" => BlockKind::Equation {
            expression: str_field(body, "expression").unwrap_or_default().to_string(),
        },
        "toggle" => BlockKind::Toggle { text: text() },
        "callout" => BlockKind::Callout {
            icon: body
                .get("icon")
                .filter(|icon| str_field(icon, "type") == Some("emoji"))
                .and_then(|icon| str_field(icon, "emoji"))
                .map(str::to_string),
            text: text(),
        },
        "bookmark" => BlockKind::Bookmark {
            url: url(),
            caption: caption(),
        },
        "embed" => BlockKind::Embed {
            url: url(),
            caption: caption(),
        },
        "link_preview" => BlockKind::LinkPreview { url: url() },
        "table" => BlockKind::Table {
            width: body
                .get("table_width")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize,
            has_column_header: body
                .get("has_column_header")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        "table_row" => BlockKind::TableRow {
            cells: body
                .get("cells")
                .and_then(Value::as_array)
                .map(|cells| cells.iter().map(|c| parse_rich_text(Some(c))).collect())
                .unwrap_or_default(),
        },
        "column_list" => BlockKind::ColumnList,
        "column" => BlockKind::Column,
        "child_page" => BlockKind::ChildPage {
            title: str_field(body, "title").unwrap_or(UNTITLED).to_string(),
        },
        "table_of_contents" => BlockKind::TableOfContents,
        "synced_block" => BlockKind::SyncedBlock,
        other => BlockKind::Unsupported {
            kind: other.to_string(),
        },
    };

    Ok(FetchedBlock {
        block: Block::new(id, kind),
        has_children,
    })
}

/// Warnings for required database properties that are missing or mistyped.
///
/// `properties` maps property name → property type as reported by the API.
pub fn property_warnings(properties: &BTreeMap<String, String>) -> Vec<String> {
    let mut missing = Vec::new();
    let mut mistyped = Vec::new();
    for (name, expected) in REQUIRED_PROPERTIES {
        match properties.get(*name) {
            None => missing.push(*name),
            Some(actual) if actual != expected => {
                mistyped.push(format!("{name} (expected {expected}, got {actual})"))
            }
            Some(_) => {}
        }
    }
    let mut warnings = Vec::new();
    if !missing.is_empty() {
        warnings.push(format!("Missing properties: {}", missing.join(", ")));
    }
    if !mistyped.is_empty() {
        warnings.push(format!("Wrong property types: {}", mistyped.join(", ")));
    }
    warnings
}
