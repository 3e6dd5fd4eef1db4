//! Whole-tree content scans that drive front-matter flags.
//!
//! Both scans are recursive and pure. They look at the same tree the compiler
//! renders, so a document flagged for math or diagrams is one whose output
//! actually contains them.

use crate::model::{Block, BlockKind, RichSpan};
use regex::Regex;
use std::sync::LazyLock;

/// Fence language that marks a diagram block.
pub const DIAGRAM_LANGUAGE: &str = "mermaid";

/// Markers whose presence anywhere in an untagged code block makes it a diagram.
const DIAGRAM_MARKERS: &[&str] = &["graph TD", "flowchart", "sequenceDiagram"];

/// `$…$` with no whitespace just inside the dollars and no digit right after
/// the closing one, so prices like "$5 and $10" don't count.
static INLINE_DOLLAR_MATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$[^\s$](?:[^$]*[^\s$])?\$(?:[^0-9]|$)").expect("inline math pattern is valid")
});

/// Effective fence language for a code block.
///
/// An explicit language is lowercased; the source's "plain text" means none.
/// Without one, diagram-looking sources are tagged [`DIAGRAM_LANGUAGE`].
pub fn code_language(language: Option<&str>, text: &str) -> String {
    let explicit = language
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty() && l != "plain text");
    match explicit {
        Some(language) => language,
        None if looks_like_diagram(text) => DIAGRAM_LANGUAGE.to_string(),
        None => String::new(),
    }
}

fn looks_like_diagram(text: &str) -> bool {
    DIAGRAM_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Does the tree contain math: equation blocks, inline equations, or TeX
/// delimiters in prose?
pub fn has_math(blocks: &[Block]) -> bool {
    blocks
        .iter()
        .any(|block| block_has_math(block) || has_math(&block.children))
}

/// Does the tree contain a diagram code block?
pub fn has_diagram(blocks: &[Block]) -> bool {
    blocks.iter().any(|block| {
        let own = match &block.kind {
            BlockKind::Code { language, text } => {
                code_language(language.as_deref(), text) == DIAGRAM_LANGUAGE
            }
            _ => false,
        };
        own || has_diagram(&block.children)
    })
}

fn block_has_math(block: &Block) -> bool {
    if let BlockKind::Equation { expression } = &block.kind {
        return !expression.trim().is_empty();
    }
    text_runs(&block.kind)
        .into_iter()
        .any(|spans| spans.iter().any(span_has_math))
}

fn span_has_math(span: &RichSpan) -> bool {
    if span.equation {
        return !span.text.trim().is_empty();
    }
    // Code spans are literal.
    if span.style.code {
        return false;
    }
    text_has_math(&span.text)
}

fn text_has_math(text: &str) -> bool {
    text.contains("\\(")
        || text.contains("\\[")
        || text.contains("$$")
        || INLINE_DOLLAR_MATH.is_match(text)
}

/// Every rich-text run a block renders.
fn text_runs(kind: &BlockKind) -> Vec<&[RichSpan]> {
    match kind {
        BlockKind::Paragraph { text }
        | BlockKind::Heading { text, .. }
        | BlockKind::BulletedListItem { text }
        | BlockKind::NumberedListItem { text }
        | BlockKind::ToDo { text, .. }
        | BlockKind::Quote { text }
        | BlockKind::Toggle { text }
        | BlockKind::Callout { text, .. } => vec![text.as_slice()],
        BlockKind::Image { caption, .. }
        | BlockKind::Bookmark { caption, .. }
        | BlockKind::Pdf { caption, .. }
        | BlockKind::File { caption, .. } => vec![caption.as_slice()],
        BlockKind::TableRow { cells } => cells.iter().map(Vec::as_slice).collect(),
        // Captions of players and embeds are not rendered.
        BlockKind::Video { .. }
        | BlockKind::Audio { .. }
        | BlockKind::Embed { .. }
        | BlockKind::Code { .. }
        | BlockKind::Equation { .. }
        | BlockKind::Divider
        | BlockKind::LinkPreview { .. }
        | BlockKind::Table { .. }
        | BlockKind::ColumnList
        | BlockKind::Column
        | BlockKind::ChildPage { .. }
        | BlockKind::TableOfContents
        | BlockKind::SyncedBlock
        | BlockKind::Unsupported { .. } => Vec::new(),
    }
}
