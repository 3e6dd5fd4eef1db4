//! Sync pipeline: published documents → Markdown files.
//!
//! ```text
//! list published ──► identity/slug table ──► per document (parallel):
//!                                             fresh? ─yes─► skip
//!                                               │no
//!                                             fetch tree ─► prefetch assets
//!                                               ─► assemble ─► write ─► record
//! ```
//!
//! A document is fresh when the cache has seen its current edit time and
//! its output file still exists. Fresh documents cost one listing row and
//! no block requests.
//!
//! ## Failure handling
//!
//! Only failing to list the documents aborts the run. Any later failure
//! (block tree, output write) marks that one document failed and the run
//! goes on; the caller decides the exit status from the report. The cache
//! only learns about a document after its file is fully written.
//!
//! ## Progress
//!
//! Pass a channel sender to receive a [`SyncEvent`] as each document
//! finishes, the way the binary prints progress while the run is going.

use crate::assemble::{AssembleError, DocumentAssembler};
use crate::cache::SyncCache;
use crate::compile::asset_requests;
use crate::links::{IdentitySlugTable, LinkResolver};
use crate::media::{MediaKind, MediaStats, MediaStore};
use crate::model::{Document, DocumentMeta};
use crate::source::{ContentSource, SourceError, load_document};
use rayon::prelude::*;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("listing published documents failed: {0}")]
    Source(#[from] SourceError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Assemble(#[from] AssembleError),
}

/// Flags of one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Delete existing documents in the section before syncing.
    pub clean: bool,
    /// Recompile every document, fresh or not.
    pub force: bool,
}

/// Where documents are written.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    /// `<content_dir>/<section>`
    pub section_dir: PathBuf,
    /// Section name used in cross-document links.
    pub section: String,
}

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStatus {
    Converted,
    /// Unchanged since the last sync.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOutcome {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub path: PathBuf,
    pub status: DocumentStatus,
}

/// Progress notifications, sent as the run goes.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Listed { count: usize },
    Cleaned { removed: usize },
    Document(DocumentOutcome),
}

/// Result of a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// One entry per published document, in listing order.
    pub documents: Vec<DocumentOutcome>,
    pub media: MediaStats,
    /// Files removed by `--clean`.
    pub removed: usize,
}

impl SyncReport {
    fn count(&self, pred: impl Fn(&DocumentStatus) -> bool) -> usize {
        self.documents.iter().filter(|d| pred(&d.status)).count()
    }

    pub fn converted(&self) -> usize {
        self.count(|s| *s == DocumentStatus::Converted)
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| *s == DocumentStatus::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Failed(_)))
    }

    /// True when no document failed.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Everything a document needs, shared across the parallel workers.
struct Pipeline<'a> {
    source: &'a dyn ContentSource,
    media: &'a MediaStore,
    cache: &'a SyncCache,
    links: LinkResolver,
    section_dir: &'a Path,
    force: bool,
    events: Option<&'a Sender<SyncEvent>>,
}

/// Run a full sync.
pub fn sync(
    source: &dyn ContentSource,
    media: &MediaStore,
    cache: &SyncCache,
    target: &SyncTarget,
    options: SyncOptions,
    events: Option<Sender<SyncEvent>>,
) -> Result<SyncReport, SyncError> {
    let send = |event: SyncEvent| {
        if let Some(tx) = &events {
            let _ = tx.send(event);
        }
    };

    let documents = source.list_published_documents()?;
    info!(count = documents.len(), "Found published documents");
    send(SyncEvent::Listed {
        count: documents.len(),
    });

    std::fs::create_dir_all(&target.section_dir)?;
    let removed = if options.clean {
        let removed = clean_section(&target.section_dir)?;
        send(SyncEvent::Cleaned { removed });
        removed
    } else {
        0
    };
    warn_duplicate_slugs(&documents);

    let pipeline = Pipeline {
        source,
        media,
        cache,
        links: LinkResolver::new(
            IdentitySlugTable::from_documents(&documents),
            &target.section,
        ),
        section_dir: &target.section_dir,
        force: options.force || options.clean,
        events: events.as_ref(),
    };

    let outcomes: Vec<DocumentOutcome> = documents
        .into_par_iter()
        .map(|meta| {
            let outcome = pipeline.sync_document(meta);
            if let Some(tx) = pipeline.events {
                let _ = tx.send(SyncEvent::Document(outcome.clone()));
            }
            outcome
        })
        .collect();

    cache.mark_synced(OffsetDateTime::now_utc());
    if let Err(e) = cache.persist() {
        warn!(path = %cache.path().display(), error = %e, "Could not save sync cache");
    }

    Ok(SyncReport {
        documents: outcomes,
        media: media.stats(),
        removed,
    })
}

impl Pipeline<'_> {
    fn output_path(&self, meta: &DocumentMeta) -> PathBuf {
        self.section_dir.join(format!("{}.md", meta.slug))
    }

    #[instrument(skip_all, fields(slug = %meta.slug))]
    fn sync_document(&self, meta: DocumentMeta) -> DocumentOutcome {
        let path = self.output_path(&meta);
        let mut outcome = DocumentOutcome {
            id: meta.id.clone(),
            title: meta.title.clone(),
            slug: meta.slug.clone(),
            path: path.clone(),
            status: DocumentStatus::Converted,
        };

        let fresh = !self.force && !self.cache.is_stale(&meta.id, meta.last_edited);
        if fresh && path.is_file() {
            debug!("Unchanged since last sync");
            outcome.status = DocumentStatus::Skipped;
            return outcome;
        }

        let last_edited = meta.last_edited;
        match self.convert(meta, &path) {
            Ok(()) => {
                self.cache.record_compiled(&outcome.id, last_edited);
                if let Err(e) = self.cache.persist() {
                    warn!(error = %e, "Could not save sync cache");
                }
                info!(path = %path.display(), "Converted");
            }
            Err(e) => {
                warn!(error = %e, "Conversion failed");
                outcome.status = DocumentStatus::Failed(e.to_string());
            }
        }
        outcome
    }

    fn convert(&self, meta: DocumentMeta, path: &Path) -> Result<(), SyncError> {
        let document = load_document(self.source, meta)?;
        self.media.prefetch(&document_assets(&document));
        let text = DocumentAssembler::new(&self.links, self.media).assemble(&document)?;
        write_atomic(path, &text)?;
        Ok(())
    }
}

/// Every asset a document will reference, cover first.
fn document_assets(document: &Document) -> Vec<(String, MediaKind)> {
    let cover = document
        .meta
        .cover
        .iter()
        .map(|source| (source.url().to_string(), MediaKind::Image))
        .filter(|(url, _)| !url.trim().is_empty());
    cover.chain(asset_requests(&document.blocks)).collect()
}

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Write through a temp file so a crash never leaves a truncated document.
///
/// Each call gets its own temp name, so documents sharing a slug never
/// write into the same temp file.
fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(
        ".{}.{}.tmp",
        std::process::id(),
        WRITE_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let tmp = PathBuf::from(tmp);
    let written = std::fs::write(&tmp, contents).and_then(|()| std::fs::rename(&tmp, path));
    if written.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    written
}

/// Remove the `.md` files directly inside the section directory.
fn clean_section(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    info!(removed, dir = %dir.display(), "Cleaned section");
    Ok(removed)
}

fn warn_duplicate_slugs(documents: &[DocumentMeta]) {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for meta in documents {
        if let Some(first) = seen.insert(&meta.slug, &meta.id) {
            warn!(
                slug = %meta.slug,
                first = %first,
                second = %meta.id,
                "Two documents share a slug; one will overwrite the other"
            );
        }
    }
}
