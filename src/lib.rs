//! # notion-hugo
//!
//! Incremental sync from a Notion database to a Hugo content section.
//! Every published row becomes one Markdown document with YAML front matter;
//! every asset it references is mirrored into the static tree, because the
//! file URLs Notion hands out expire after an hour.
//!
//! # Architecture: One Pass per Document
//!
//! ```text
//! list published rows ──► identity → slug table
//!        │
//!        ▼  (parallel, per document)
//! fresh in cache? ──yes──► skip
//!        │ no
//!        ▼
//! fetch block tree ──► prefetch media ──► compile blocks ──► front matter
//!        │                                                      │
//!        └────────────────── write content/<section>/<slug>.md ◄┘
//! ```
//!
//! The block tree is fetched into an owned [`model::Block`] tree first and
//! compiled afterwards, so compilation is a pure function of the tree plus
//! the answers of the [`media::Materializer`]. That split keeps all network
//! behavior behind two traits ([`source::ContentSource`] and
//! [`media::Transport`]) and lets the compiler be tested without either.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`source`] | Notion API client, JSON → model parsing, retry policy, tree fetching |
//! | [`model`] | Block tree, rich text spans, document metadata |
//! | [`compile`] | Block tree → Markdown with Hugo shortcodes |
//! | [`links`] | Identity → slug table; rewrites links between documents |
//! | [`naming`] | Identity canonicalization, anchors, slug sanitizing |
//! | [`media`] | Bounded downloads and URL → local path resolution |
//! | [`imaging`] | Pure-Rust image downscaling and re-encoding |
//! | [`assemble`] | Front matter + compiled body → output text |
//! | [`cache`] | Persistent record of edit times and mirrored assets |
//! | [`sync`] | The per-document pipeline and its report |
//! | [`config`] | `notion-hugo.toml` loading, merging, and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Incremental by Edit Time
//!
//! A document is recompiled only when its `last_edited_time` is newer than
//! the one recorded at its last successful write, or when its output file
//! is gone. Skipping costs one row of the listing; no block requests.
//!
//! ## Deterministic Asset Names
//!
//! Assets are named by a hash of their canonical URL (presigned signature
//! dropped), so URLs that differ only by signature share one local file and
//! a lost cache file costs no downloads.
//!
//! ## Degrade, Don't Abort
//!
//! A block that cannot be compiled contributes nothing; an asset that cannot
//! be downloaded keeps its remote URL; a document that cannot be fetched is
//! reported failed while the rest of the run continues. Only failing to list
//! the database stops a sync.

pub mod assemble;
pub mod cache;
pub mod compile;
pub mod config;
pub mod imaging;
pub mod links;
pub mod media;
pub mod model;
pub mod naming;
pub mod output;
pub mod source;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_helpers;
