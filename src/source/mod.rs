//! Content source: where documents and their block trees come from.
//!
//! The rest of the crate only sees the [`ContentSource`] trait, two calls
//! shaped like the remote API:
//!
//! - `list_published_documents`: metadata for every published document
//! - `list_block_children`: one page of a block's direct children
//!
//! [`fetch_tree`] turns the paginated, one-level-at-a-time API into the
//! immutable [`Block`] tree the compiler walks. [`NotionClient`] is the
//! production implementation.

mod notion;
mod parse;
mod retry;

pub use notion::{DatabaseInfo, NotionClient, NotionSettings};
pub use parse::{REQUIRED_PROPERTIES, parse_block, parse_page, property_warnings};
pub use retry::RetryPolicy;

use crate::model::{Block, BlockKind, Document, DocumentMeta};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl SourceError {
    /// Network failures, rate limiting, and server errors are worth retrying.
    /// Everything else will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Transport { .. } => true,
            SourceError::Api { status, .. } => *status == 429 || (500..600).contains(status),
            SourceError::Decode(_) => false,
        }
    }
}

/// A block as listed by the API, before its children are fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBlock {
    pub block: Block,
    pub has_children: bool,
}

/// One page of a children listing.
#[derive(Debug, Clone, Default)]
pub struct BlockBatch {
    pub blocks: Vec<FetchedBlock>,
    /// Cursor for the next page; `None` once the listing is exhausted.
    pub next_cursor: Option<String>,
}

/// The two read operations the sync needs from the remote API.
pub trait ContentSource: Sync {
    fn list_published_documents(&self) -> Result<Vec<DocumentMeta>, SourceError>;

    fn list_block_children(
        &self,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<BlockBatch, SourceError>;
}

/// Every direct child of `block_id`, following cursors until exhausted.
fn list_all_children(
    source: &dyn ContentSource,
    block_id: &str,
) -> Result<Vec<FetchedBlock>, SourceError> {
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let batch = source.list_block_children(block_id, cursor.as_deref())?;
        all.extend(batch.blocks);
        match batch.next_cursor {
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            _ => return Ok(all),
        }
    }
}

/// Build the complete block tree under `root_id`.
///
/// Children are fetched depth-first for every block that declares them,
/// except child pages: their content is a separate document. Failing to list
/// the root is an error; failing below it only loses that subtree.
pub fn fetch_tree(source: &dyn ContentSource, root_id: &str) -> Result<Vec<Block>, SourceError> {
    list_all_children(source, root_id)?
        .into_iter()
        .map(|fetched| {
            let mut block = fetched.block;
            let descend =
                fetched.has_children && !matches!(block.kind, BlockKind::ChildPage { .. });
            if descend {
                match fetch_tree(source, &block.id) {
                    Ok(children) => block.children = children,
                    Err(e) => {
                        warn!(block = %block.id, error = %e, "Dropping children that failed to load")
                    }
                }
            }
            Ok(block)
        })
        .collect()
}

/// Fetch a document's block tree and pair it with its metadata.
pub fn load_document(
    source: &dyn ContentSource,
    meta: DocumentMeta,
) -> Result<Document, SourceError> {
    let blocks = fetch_tree(source, &meta.id)?;
    debug!(document = %meta.id, blocks = blocks.len(), "Loaded block tree");
    Ok(Document { meta, blocks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    const DOC: &str = "doc-1";

    fn toggle(id: &str, children: Vec<Block>) -> Block {
        Block::new(id, BlockKind::Toggle { text: spans(id) }).with_children(children)
    }

    #[test]
    fn transient_classification() {
        let api = |status| SourceError::Api {
            status,
            message: String::new(),
        };
        assert!(api(429).is_transient());
        assert!(api(502).is_transient());
        assert!(!api(400).is_transient());
        assert!(!api(404).is_transient());
        assert!(
            SourceError::Transport {
                url: "u".into(),
                message: "timed out".into()
            }
            .is_transient()
        );
        assert!(!SourceError::Decode("x".into()).is_transient());
    }

    #[test]
    fn fetch_tree_rebuilds_nesting_in_order() {
        let tree = vec![
            toggle("a", vec![toggle("a1", vec![paragraph("deep")]), paragraph("a2")]),
            paragraph("b"),
        ];
        let source = MockSource::new().with_document(meta(DOC, "Doc", "doc"), tree.clone());

        let fetched = fetch_tree(&source, DOC).unwrap();
        assert_eq!(fetched, tree);
    }

    #[test]
    fn fetch_tree_follows_every_page() {
        let tree: Vec<Block> = (0..5)
            .map(|i| Block::new(format!("p{i}"), BlockKind::Paragraph { text: spans("x") }))
            .collect();
        let source = MockSource::new()
            .with_document(meta(DOC, "Doc", "doc"), tree.clone())
            .paged(2);

        assert_eq!(fetch_tree(&source, DOC).unwrap(), tree);
        assert_eq!(source.calls(), vec![DOC, DOC, DOC]);
    }

    #[test]
    fn child_pages_are_not_descended() {
        let page = Block::new(
            "sub",
            BlockKind::ChildPage {
                title: "Sub".into(),
            },
        )
        .with_children(vec![paragraph("belongs to another document")]);
        let source = MockSource::new().with_document(meta(DOC, "Doc", "doc"), vec![page]);

        let fetched = fetch_tree(&source, DOC).unwrap();
        assert!(fetched[0].children.is_empty());
        assert_eq!(source.calls(), vec![DOC]);
    }

    #[test]
    fn nested_failure_only_drops_that_subtree() {
        let tree = vec![toggle("broken", vec![paragraph("lost")]), paragraph("kept")];
        let source = MockSource::new()
            .with_document(meta(DOC, "Doc", "doc"), tree)
            .failing_children("broken");

        let fetched = fetch_tree(&source, DOC).unwrap();
        assert_eq!(fetched.len(), 2);
        assert!(fetched[0].children.is_empty());
    }

    #[test]
    fn root_failure_is_an_error() {
        let source = MockSource::new()
            .with_document(meta(DOC, "Doc", "doc"), vec![paragraph("x")])
            .failing_children(DOC);
        assert!(matches!(
            load_document(&source, meta(DOC, "Doc", "doc")),
            Err(SourceError::Api { status: 404, .. })
        ));
    }

    #[test]
    fn load_document_keeps_metadata() {
        let source = MockSource::new().with_document(meta(DOC, "Doc", "doc"), vec![paragraph("x")]);
        let doc = load_document(&source, meta(DOC, "Doc", "doc")).unwrap();
        assert_eq!(doc.meta.slug, "doc");
        assert_eq!(doc.blocks, vec![paragraph("x")]);
    }
}
