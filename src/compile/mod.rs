//! Block tree → Markdown compiler.
//!
//! The compiler walks a document's block tree depth-first and produces one
//! text fragment per block, composing children into their parents. Output is
//! Markdown with raw HTML and Hugo shortcodes where Markdown has no
//! equivalent (disclosures, media players, column layouts, embeds).
//!
//! The module is split into:
//! - **Dispatch** (this file): [`BlockCompiler`], one arm per [`BlockKind`]
//! - **Inline**: rich-text span rendering and link rewriting
//! - **Layout**: tables and column lists
//! - **Embed**: provider detection for video and embed URLs
//! - **Detect**: whole-tree scans for math and diagram content
//!
//! ## Failure isolation
//!
//! A block that cannot be compiled is logged and contributes nothing; its
//! siblings and the rest of the document are unaffected. Media never fails a
//! block: the [`Materializer`] falls back to the remote URL.
//!
//! ## Determinism
//!
//! Given the same tree and the same materializer answers, output is
//! byte-identical. Nothing here depends on iteration order of hash maps, time,
//! or randomness.

mod detect;
mod embed;
mod inline;
mod layout;

pub use detect::{DIAGRAM_LANGUAGE, code_language, has_diagram, has_math};
pub use embed::Provider;

use crate::links::LinkResolver;
use crate::media::{MediaKind, Materializer};
use crate::model::{Block, BlockKind, FileSource, RichSpan, plain_text};
use crate::naming::anchor_token;
use thiserror::Error;
use tracing::{debug, warn};

/// Glyph used for callouts without a usable emoji icon.
pub const DEFAULT_CALLOUT_ICON: &str = "💡";

/// Emitted in place of a table-of-contents block; themes render their own.
pub const TOC_PLACEHOLDER: &str = "<!-- table of contents -->";

/// Indentation unit for nested list content.
const INDENT: &str = "    ";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CompileError {
    #[error("heading level {0} is outside 1..=3")]
    HeadingLevel(u8),
    #[error("{0} block has no URL")]
    MissingUrl(&'static str),
    #[error("table row outside of a table")]
    OrphanTableRow,
}

/// Compiles block trees for one document.
///
/// Borrowing the resolver and materializer keeps the compiler cheap to build
/// per document while the underlying caches are shared across documents.
pub struct BlockCompiler<'a> {
    links: &'a LinkResolver,
    media: &'a dyn Materializer,
}

impl<'a> BlockCompiler<'a> {
    pub fn new(links: &'a LinkResolver, media: &'a dyn Materializer) -> Self {
        Self { links, media }
    }

    /// Compile a block sequence: non-empty fragments joined by a blank line.
    pub fn compile(&self, blocks: &[Block]) -> String {
        blocks
            .iter()
            .map(|block| self.compile_isolated(block))
            .filter(|fragment| !fragment.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Compile one block, turning any failure into empty output.
    fn compile_isolated(&self, block: &Block) -> String {
        match self.compile_block(block) {
            Ok(fragment) => fragment,
            Err(e) => {
                warn!(block = %block.id, error = %e, "Skipping block that failed to compile");
                String::new()
            }
        }
    }

    /// Compile a single block and its subtree.
    pub fn compile_block(&self, block: &Block) -> Result<String, CompileError> {
        let fragment = match &block.kind {
            BlockKind::Paragraph { text } => {
                self.with_children(self.inline(text), &block.children)
            }
            BlockKind::Heading { level, text } => self.heading(block, *level, text)?,
            BlockKind::BulletedListItem { text } => self.list_item("- ", text, &block.children),
            BlockKind::NumberedListItem { text } => self.list_item("1. ", text, &block.children),
            BlockKind::ToDo { text, checked } => {
                let marker = if *checked { "- [x] " } else { "- [ ] " };
                self.list_item(marker, text, &block.children)
            }
            BlockKind::Code { language, text } => code_fence(language.as_deref(), text),
            BlockKind::Quote { text } => {
                quote(&self.with_children(self.inline(text), &block.children))
            }
            BlockKind::Divider => "---".to_string(),
            BlockKind::Image { source, caption } => self.image(source, caption)?,
            BlockKind::Video { source, .. } => self.video(source)?,
            BlockKind::Audio { source, .. } => self.audio(source)?,
            BlockKind::Equation { expression } => equation(expression),
            BlockKind::Toggle { text } => self.toggle(text, &block.children),
            BlockKind::Callout { icon, text } => self.callout(icon.as_deref(), text, &block.children),
            BlockKind::Bookmark { url, caption } => {
                require_url("bookmark", url)?;
                let label = caption_or(caption, url);
                markdown_link(&label, &self.links.resolve(url))
            }
            BlockKind::LinkPreview { url } => {
                require_url("link preview", url)?;
                markdown_link(url, url)
            }
            BlockKind::Embed { url, .. } => {
                require_url("embed", url)?;
                embed::embed_markup(url)
            }
            BlockKind::Pdf { source, caption } => {
                let target = self.attachment(source, "pdf")?;
                let label = caption_or(caption, &file_name_from_url(source.url()));
                markdown_link(&label, &target)
            }
            BlockKind::File {
                source,
                caption,
                name,
            } => {
                let target = self.attachment(source, "file")?;
                let fallback = name
                    .as_deref()
                    .filter(|n| !n.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| file_name_from_url(source.url()));
                markdown_link(&caption_or(caption, &fallback), &target)
            }
            BlockKind::Table {
                width,
                has_column_header,
            } => layout::table(self, *width, *has_column_header, &block.children),
            BlockKind::TableRow { .. } => return Err(CompileError::OrphanTableRow),
            BlockKind::ColumnList => layout::column_list(self, &block.children),
            // Consumed by the enclosing column list.
            BlockKind::Column => String::new(),
            BlockKind::ChildPage { title } => self.child_page(&block.id, title),
            BlockKind::TableOfContents => TOC_PLACEHOLDER.to_string(),
            BlockKind::SyncedBlock => self.compile(&block.children),
            BlockKind::Unsupported { kind } => {
                debug!(block = %block.id, kind = %kind, "Unsupported block type");
                String::new()
            }
        };
        Ok(fragment)
    }

    fn inline(&self, spans: &[RichSpan]) -> String {
        inline::render_spans(spans, self.links)
    }

    /// `head`, then the compiled children after a blank line.
    fn with_children(&self, head: String, children: &[Block]) -> String {
        let body = self.compile(children);
        match (head.is_empty(), body.is_empty()) {
            (_, true) => head,
            (true, false) => body,
            (false, false) => format!("{head}\n\n{body}"),
        }
    }

    fn heading(&self, block: &Block, level: u8, text: &[RichSpan]) -> Result<String, CompileError> {
        if !(1..=3).contains(&level) {
            return Err(CompileError::HeadingLevel(level));
        }
        let hashes = "#".repeat(level as usize);
        let text = self.inline(text);
        let head = if block.id.is_empty() {
            format!("{hashes} {text}")
        } else {
            format!("{hashes} {text} {{#{}}}", anchor_token(&block.id))
        };
        Ok(self.with_children(head, &block.children))
    }

    /// A list item with each child compiled on its own and indented one unit,
    /// so the renderer keeps it inside the item (and keeps numbering going).
    fn list_item(&self, marker: &str, text: &[RichSpan], children: &[Block]) -> String {
        let mut out = format!("{marker}{}", self.inline(text));
        for child in children {
            let compiled = self.compile_isolated(child);
            if compiled.is_empty() {
                continue;
            }
            out.push('\n');
            out.push_str(&indent(&compiled));
        }
        out
    }

    fn image(&self, source: &FileSource, caption: &[RichSpan]) -> Result<String, CompileError> {
        require_url("image", source.url())?;
        let target = self.media.materialize(source.url(), MediaKind::Image);
        Ok(format!("![{}]({})", alt_text(caption), target))
    }

    fn video(&self, source: &FileSource) -> Result<String, CompileError> {
        require_url("video", source.url())?;
        Ok(match source {
            FileSource::External(url) => match embed::detect_video(url) {
                Some(provider) => provider.markup(),
                None => media_tag("video", url),
            },
            FileSource::Managed(url) => {
                media_tag("video", &self.media.materialize(url, MediaKind::Video))
            }
        })
    }

    fn audio(&self, source: &FileSource) -> Result<String, CompileError> {
        require_url("audio", source.url())?;
        Ok(match source {
            FileSource::External(url) => media_tag("audio", url),
            FileSource::Managed(url) => {
                media_tag("audio", &self.media.materialize(url, MediaKind::Audio))
            }
        })
    }

    /// Link target for a downloadable attachment.
    fn attachment(&self, source: &FileSource, what: &'static str) -> Result<String, CompileError> {
        require_url(what, source.url())?;
        Ok(match source {
            FileSource::External(url) => url.clone(),
            FileSource::Managed(url) => self.media.materialize(url, MediaKind::File),
        })
    }

    fn toggle(&self, text: &[RichSpan], children: &[Block]) -> String {
        let summary = self.inline(text);
        let body = self.compile(children);
        if body.is_empty() {
            format!("<details>\n<summary>{summary}</summary>\n</details>")
        } else {
            format!("<details>\n<summary>{summary}</summary>\n\n{body}\n\n</details>")
        }
    }

    fn callout(&self, icon: Option<&str>, text: &[RichSpan], children: &[Block]) -> String {
        let icon = icon
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .unwrap_or(DEFAULT_CALLOUT_ICON);
        let head = format!("{icon} {}", self.inline(text)).trim_end().to_string();
        quote(&self.with_children(head, children))
    }

    fn child_page(&self, id: &str, title: &str) -> String {
        let title = title.trim();
        match self.links.document_path(id) {
            Some(path) if !title.is_empty() => markdown_link(title, &path),
            _ => title.to_string(),
        }
    }
}

/// Every asset the compiler will ask a [`Materializer`] for, in tree order.
///
/// Lets a caller download a document's media up front, in parallel, before
/// the strictly sequential compile walks the tree.
pub fn asset_requests(blocks: &[Block]) -> Vec<(String, MediaKind)> {
    let mut requests = Vec::new();
    collect_assets(blocks, &mut requests);
    requests
}

fn collect_assets(blocks: &[Block], out: &mut Vec<(String, MediaKind)>) {
    for block in blocks {
        let request = match &block.kind {
            BlockKind::Image { source, .. } => Some((source.url(), MediaKind::Image)),
            BlockKind::Video {
                source: FileSource::Managed(url),
                ..
            } => Some((url.as_str(), MediaKind::Video)),
            BlockKind::Audio {
                source: FileSource::Managed(url),
                ..
            } => Some((url.as_str(), MediaKind::Audio)),
            BlockKind::Pdf {
                source: FileSource::Managed(url),
                ..
            }
            | BlockKind::File {
                source: FileSource::Managed(url),
                ..
            } => Some((url.as_str(), MediaKind::File)),
            BlockKind::Video { .. }
            | BlockKind::Audio { .. }
            | BlockKind::Pdf { .. }
            | BlockKind::File { .. }
            | BlockKind::Paragraph { .. }
            | BlockKind::Heading { .. }
            | BlockKind::BulletedListItem { .. }
            | BlockKind::NumberedListItem { .. }
            | BlockKind::ToDo { .. }
            | BlockKind::Code { .. }
            | BlockKind::Quote { .. }
            | BlockKind::Divider
            | BlockKind::Equation { .. }
            | BlockKind::Toggle { .. }
            | BlockKind::Callout { .. }
            | BlockKind::Bookmark { .. }
            | BlockKind::Embed { .. }
            | BlockKind::LinkPreview { .. }
            | BlockKind::Table { .. }
            | BlockKind::TableRow { .. }
            | BlockKind::ColumnList
            | BlockKind::Column
            | BlockKind::ChildPage { .. }
            | BlockKind::TableOfContents
            | BlockKind::SyncedBlock
            | BlockKind::Unsupported { .. } => None,
        };
        if let Some((url, kind)) = request
            && !url.trim().is_empty()
        {
            out.push((url.to_string(), kind));
        }
        collect_assets(&block.children, out);
    }
}

fn require_url(what: &'static str, url: &str) -> Result<(), CompileError> {
    if url.trim().is_empty() {
        Err(CompileError::MissingUrl(what))
    } else {
        Ok(())
    }
}

/// Prefix every non-empty line with one indentation unit.
fn indent(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{INDENT}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prefix every line with `> `.
fn quote(text: &str) -> String {
    text.lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn code_fence(language: Option<&str>, text: &str) -> String {
    let language = code_language(language, text);
    let fence = "`".repeat(longest_backtick_run(text).max(2) + 1);
    format!("{fence}{language}\n{text}\n{fence}")
}

fn longest_backtick_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn equation(expression: &str) -> String {
    let expression = expression.trim();
    if expression.is_empty() {
        String::new()
    } else {
        format!("$$\n{expression}\n$$")
    }
}

fn media_tag(tag: &str, src: &str) -> String {
    format!("<{tag} src=\"{}\" controls></{tag}>", escape_attr(src))
}

fn markdown_link(label: &str, target: &str) -> String {
    format!("[{}]({})", label.replace('\n', " "), target)
}

/// Caption as plain text, or `fallback` when there is none.
fn caption_or(caption: &[RichSpan], fallback: &str) -> String {
    let text = plain_text(caption);
    let text = text.trim();
    if text.is_empty() {
        fallback.to_string()
    } else {
        text.to_string()
    }
}

/// Image alt text: caption without brackets or line breaks.
fn alt_text(caption: &[RichSpan]) -> String {
    plain_text(caption)
        .replace(['\n', '\r'], " ")
        .replace(['[', ']'], "")
        .trim()
        .to_string()
}

/// Last path segment of a URL, percent-decoded; the URL itself if there is none.
fn file_name_from_url(raw: &str) -> String {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            url::form_urlencoded::parse(format!("n={segment}").as_bytes())
                .next()
                .map(|(_, v)| v.into_owned())
                .unwrap_or(segment)
        })
        .unwrap_or_else(|| raw.to_string())
}

pub(crate) fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
