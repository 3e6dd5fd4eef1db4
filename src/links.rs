//! Rewriting of intra-corpus links.
//!
//! Source documents link to each other with share links whose path ends in
//! the target's identity, and to their own headings with `#<block id>`
//! fragments. Neither survives publication as-is: the site addresses
//! documents by slug, and headings carry the [`anchor_token`] of their block.
//!
//! [`LinkResolver::resolve`] is pure. A URL it cannot map is returned
//! unchanged; resolution failure is never an error.

use crate::model::DocumentMeta;
use crate::naming::{anchor_token, parse_identity, trailing_identity};
use std::collections::HashMap;

/// Document identity → public slug, keyed by canonical identity so that
/// hyphenated and bare spellings hit the same entry.
#[derive(Debug, Clone, Default)]
pub struct IdentitySlugTable {
    slugs: HashMap<String, String>,
}

impl IdentitySlugTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table for a whole run. Must happen before any link is
    /// resolved, since any document may link to any other.
    pub fn from_documents<'a>(documents: impl IntoIterator<Item = &'a DocumentMeta>) -> Self {
        let mut table = Self::new();
        for doc in documents {
            table.insert(&doc.id, &doc.slug);
        }
        table
    }

    pub fn insert(&mut self, id: &str, slug: &str) {
        self.slugs.insert(anchor_token(id), slug.to_string());
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.slugs.get(&anchor_token(id)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }
}

/// Maps source URLs to site-relative paths.
#[derive(Debug, Clone)]
pub struct LinkResolver {
    table: IdentitySlugTable,
    /// Path prefix of the published section, always `/…/`.
    base: String,
}

impl LinkResolver {
    /// `section` is the content section documents are written to (e.g. `posts`).
    pub fn new(table: IdentitySlugTable, section: &str) -> Self {
        let section = section.trim_matches('/');
        let base = if section.is_empty() {
            "/".to_string()
        } else {
            format!("/{section}/")
        };
        Self { table, base }
    }

    pub fn table(&self) -> &IdentitySlugTable {
        &self.table
    }

    /// Site path of a document, if its identity is known.
    pub fn document_path(&self, id: &str) -> Option<String> {
        self.table.get(id).map(|slug| format!("{}{}/", self.base, slug))
    }

    /// Rewrite one link target.
    pub fn resolve(&self, url: &str) -> String {
        if let Some(fragment) = url.strip_prefix('#') {
            return format!("#{}", normalize_fragment(fragment));
        }

        let (without_fragment, fragment) = match url.split_once('#') {
            Some((head, frag)) => (head, Some(frag)),
            None => (url, None),
        };
        let path = without_fragment
            .split_once('?')
            .map_or(without_fragment, |(head, _)| head);
        let path = path.trim_end_matches('/');

        let Some(target) = trailing_identity(path).and_then(|id| self.document_path(&id)) else {
            return url.to_string();
        };

        match fragment {
            Some(frag) if !frag.is_empty() => format!("{}#{}", target, normalize_fragment(frag)),
            _ => target,
        }
    }
}

/// Identity-shaped fragments become anchor tokens; anything else is kept.
fn normalize_fragment(fragment: &str) -> String {
    parse_identity(fragment).unwrap_or_else(|| fragment.to_string())
}
