//! Shared test utilities for the notion-hugo test suite.
//!
//! Provides block and document builders, link tables, and in-memory
//! stand-ins for the three outside seams: the media materializer, the HTTP
//! transport, and the content source.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let media = StubMedia::new().with("https://x/a.png", "/images/a.png");
//! let links = links_with(&[("1f2e3d4c-5b6a-4978-8695-a4b3c2d1e0f9", "target")]);
//! let compiler = BlockCompiler::new(&links, &media);
//!
//! let item = bulleted("text").with_children(vec![numbered("child")]);
//! assert_eq!(compiler.compile(&[item]), "- text\n    1. child");
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use time::macros::datetime;

use crate::links::{IdentitySlugTable, LinkResolver};
use crate::media::{FetchError, MediaKind, Materializer, Transport};
use crate::model::{Block, BlockKind, DocumentMeta, FileSource, RichSpan, Style};
use crate::source::{BlockBatch, ContentSource, FetchedBlock, SourceError};

// =========================================================================
// Model builders
// =========================================================================

/// Document metadata with fixed timestamps.
pub fn meta(id: &str, title: &str, slug: &str) -> DocumentMeta {
    DocumentMeta {
        id: id.to_string(),
        title: title.to_string(),
        slug: slug.to_string(),
        created: datetime!(2024-01-15 10:00 UTC),
        last_edited: datetime!(2024-02-01 12:00 UTC),
        tags: Vec::new(),
        cover: None,
    }
}

pub fn block(kind: BlockKind) -> Block {
    Block::new("block", kind)
}

/// A single unstyled span, or nothing for the empty string.
pub fn spans(text: &str) -> Vec<RichSpan> {
    if text.is_empty() {
        Vec::new()
    } else {
        vec![RichSpan::plain(text)]
    }
}

pub fn bold(text: &str) -> RichSpan {
    RichSpan {
        text: text.to_string(),
        style: Style {
            bold: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn paragraph(text: &str) -> Block {
    block(BlockKind::Paragraph { text: spans(text) })
}

pub fn heading(level: u8, text: &str) -> Block {
    block(BlockKind::Heading {
        level,
        text: spans(text),
    })
}

pub fn bulleted(text: &str) -> Block {
    block(BlockKind::BulletedListItem { text: spans(text) })
}

pub fn numbered(text: &str) -> Block {
    block(BlockKind::NumberedListItem { text: spans(text) })
}

pub fn image_block(source: FileSource, caption: &str) -> Block {
    block(BlockKind::Image {
        source,
        caption: spans(caption),
    })
}

pub fn table_row(cells: &[&str]) -> Block {
    block(BlockKind::TableRow {
        cells: cells.iter().map(|c| spans(c)).collect(),
    })
}

// =========================================================================
// Links
// =========================================================================

pub fn empty_links() -> LinkResolver {
    LinkResolver::new(IdentitySlugTable::new(), "posts")
}

/// Resolver over `(id, slug)` pairs in the `posts` section.
pub fn links_with(pairs: &[(&str, &str)]) -> LinkResolver {
    let mut table = IdentitySlugTable::new();
    for (id, slug) in pairs {
        table.insert(id, slug);
    }
    LinkResolver::new(table, "posts")
}

// =========================================================================
// Media
// =========================================================================

/// Materializer with canned answers. Unknown URLs come back unchanged, the
/// same way a failed download does.
#[derive(Default)]
pub struct StubMedia {
    answers: HashMap<String, String>,
    requests: Mutex<Vec<(String, MediaKind)>>,
}

impl StubMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, local: &str) -> Self {
        self.answers.insert(url.to_string(), local.to_string());
        self
    }

    /// Every `(url, kind)` asked for, in order.
    pub fn requests(&self) -> Vec<(String, MediaKind)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Materializer for StubMedia {
    fn materialize(&self, url: &str, kind: MediaKind) -> String {
        self.requests.lock().unwrap().push((url.to_string(), kind));
        self.answers
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string())
    }
}

/// In-memory HTTP transport. Unknown URLs answer 404.
#[derive(Default)]
pub struct MockTransport {
    bodies: HashMap<String, Vec<u8>>,
    statuses: HashMap<String, u16>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, body: impl AsRef<[u8]>) -> Self {
        self.bodies.insert(url.to_string(), body.as_ref().to_vec());
        self
    }

    pub fn failing(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    /// Hold every request open for `delay`, so overlapping requests show up
    /// in [`max_in_flight`](Self::max_in_flight).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(status) = self.statuses.get(url) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            });
        }
        self.bodies.get(url).cloned().ok_or_else(|| FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

// =========================================================================
// Content source
// =========================================================================

/// In-memory content source serving block trees page by page.
#[derive(Default)]
pub struct MockSource {
    documents: Vec<DocumentMeta>,
    children: HashMap<String, Vec<FetchedBlock>>,
    page_size: Option<usize>,
    failing: HashSet<String>,
    listing_fails: bool,
    calls: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a published document whose root children are `blocks`.
    pub fn with_document(mut self, meta: DocumentMeta, blocks: Vec<Block>) -> Self {
        self.insert_children(&meta.id, blocks);
        self.documents.push(meta);
        self
    }

    /// Serve children `size` at a time.
    pub fn paged(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Every children request for `id` fails with a permanent error.
    pub fn failing_children(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    /// Block ids whose children were requested, once per page.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn insert_children(&mut self, parent: &str, blocks: Vec<Block>) {
        let mut flat = Vec::with_capacity(blocks.len());
        for mut block in blocks {
            let children = std::mem::take(&mut block.children);
            let has_children = !children.is_empty();
            if has_children {
                self.insert_children(&block.id, children);
            }
            flat.push(FetchedBlock {
                block,
                has_children,
            });
        }
        self.children.insert(parent.to_string(), flat);
    }
}

impl ContentSource for MockSource {
    fn list_published_documents(&self) -> Result<Vec<DocumentMeta>, SourceError> {
        if self.listing_fails {
            return Err(SourceError::Api {
                status: 401,
                message: "unauthorized".into(),
            });
        }
        Ok(self.documents.clone())
    }

    fn list_block_children(
        &self,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<BlockBatch, SourceError> {
        self.calls.lock().unwrap().push(block_id.to_string());
        if self.failing.contains(block_id) {
            return Err(SourceError::Api {
                status: 404,
                message: format!("block {block_id} not found"),
            });
        }
        let all = self.children.get(block_id).cloned().unwrap_or_default();
        let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = match self.page_size {
            Some(size) => (start + size).min(all.len()),
            None => all.len(),
        };
        Ok(BlockBatch {
            blocks: all[start.min(end)..end].to_vec(),
            next_cursor: (end < all.len()).then(|| end.to_string()),
        })
    }
}
