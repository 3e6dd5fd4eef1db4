//! Content model shared by ingestion, compilation, and assembly.
//!
//! The block tree is built once by [`crate::source::fetch_tree`] and is
//! immutable afterwards: the compiler only ever borrows it.

use time::OffsetDateTime;

/// One node of a document's content tree.
///
/// A block exclusively owns its children, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Source identity, as delivered by the API (usually a hyphenated UUID).
    pub id: String,
    pub kind: BlockKind,
    pub children: Vec<Block>,
}

impl Block {
    pub fn new(id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Block>) -> Self {
        self.children = children;
        self
    }
}

/// Every block variant the compiler knows about.
///
/// Matching on this enum is exhaustive everywhere; adding a variant is a
/// compile error until each consumer handles it.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Paragraph {
        text: Vec<RichSpan>,
    },
    /// Level is 1..=3 in well-formed input.
    Heading {
        level: u8,
        text: Vec<RichSpan>,
    },
    BulletedListItem {
        text: Vec<RichSpan>,
    },
    NumberedListItem {
        text: Vec<RichSpan>,
    },
    ToDo {
        text: Vec<RichSpan>,
        checked: bool,
    },
    Code {
        language: Option<String>,
        text: String,
    },
    Quote {
        text: Vec<RichSpan>,
    },
    Divider,
    Image {
        source: FileSource,
        caption: Vec<RichSpan>,
    },
    Video {
        source: FileSource,
        caption: Vec<RichSpan>,
    },
    Audio {
        source: FileSource,
        caption: Vec<RichSpan>,
    },
    Equation {
        expression: String,
    },
    Toggle {
        text: Vec<RichSpan>,
    },
    Callout {
        icon: Option<String>,
        text: Vec<RichSpan>,
    },
    Bookmark {
        url: String,
        caption: Vec<RichSpan>,
    },
    Embed {
        url: String,
        caption: Vec<RichSpan>,
    },
    LinkPreview {
        url: String,
    },
    Pdf {
        source: FileSource,
        caption: Vec<RichSpan>,
    },
    File {
        source: FileSource,
        caption: Vec<RichSpan>,
        name: Option<String>,
    },
    Table {
        width: usize,
        has_column_header: bool,
    },
    TableRow {
        cells: Vec<Vec<RichSpan>>,
    },
    ColumnList,
    Column,
    ChildPage {
        title: String,
    },
    TableOfContents,
    SyncedBlock,
    /// Anything the ingestion layer did not recognise; carries the raw type tag.
    Unsupported {
        kind: String,
    },
}

/// Where an asset-bearing block points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// Hosted elsewhere; the URL is stable.
    External(String),
    /// Uploaded to the content source; the URL is usually presigned and expiring.
    Managed(String),
}

impl FileSource {
    pub fn url(&self) -> &str {
        match self {
            FileSource::External(url) | FileSource::Managed(url) => url,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, FileSource::External(_))
    }
}

/// A styled run of inline text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichSpan {
    pub text: String,
    pub style: Style,
    pub href: Option<String>,
    /// The text is an inline equation expression rather than prose.
    pub equation: bool,
}

impl RichSpan {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Style flags of a [`RichSpan`]. `code` excludes every other flag at render time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Style {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
    pub strikethrough: bool,
    pub underline: bool,
    /// Source color name; `None` for the default color.
    pub color: Option<String>,
}

/// Concatenate the plain text of a span run, ignoring all styling.
pub fn plain_text(spans: &[RichSpan]) -> String {
    spans.iter().map(|s| s.text.as_str()).collect()
}

/// Document-level fields, available without fetching the block tree.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMeta {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub created: OffsetDateTime,
    pub last_edited: OffsetDateTime,
    pub tags: Vec<String>,
    pub cover: Option<FileSource>,
}

/// A document together with its full content tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub meta: DocumentMeta,
    pub blocks: Vec<Block>,
}
