//! Document assembly: front matter + compiled body.
//!
//! ```text
//! ---
//! title: Hello World
//! date: 2024-01-15T10:00:00Z
//! lastmod: 2024-02-01T12:00:00Z
//! slug: hello-world
//! tags:
//! - rust
//! draft: false
//! math: false
//! mermaid: true                         # only when a diagram was found
//! cover: /images/3f1c0e2a9b7d4410.png   # only when the page has a cover
//! ---
//!
//! <compiled body>
//! ```
//!
//! `math` is always present so themes can test it directly; `mermaid` and
//! `cover` appear only when set.

use crate::compile::{BlockCompiler, has_diagram, has_math};
use crate::links::LinkResolver;
use crate::media::{MediaKind, Materializer};
use crate::model::Document;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("front matter could not be serialized: {0}")]
    FrontMatter(#[from] serde_yaml::Error),
}

/// Metadata header of an output document, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrontMatter {
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub lastmod: OffsetDateTime,
    pub slug: String,
    pub tags: Vec<String>,
    pub draft: bool,
    pub math: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mermaid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

/// Wraps compiled documents in front matter.
pub struct DocumentAssembler<'a> {
    links: &'a LinkResolver,
    media: &'a dyn Materializer,
}

impl<'a> DocumentAssembler<'a> {
    pub fn new(links: &'a LinkResolver, media: &'a dyn Materializer) -> Self {
        Self { links, media }
    }

    /// Front matter for a document; the cover, if any, is materialized.
    pub fn front_matter(&self, document: &Document) -> FrontMatter {
        let meta = &document.meta;
        let cover = meta
            .cover
            .as_ref()
            .filter(|source| !source.url().trim().is_empty())
            .map(|source| self.media.materialize(source.url(), MediaKind::Image));
        FrontMatter {
            title: meta.title.clone(),
            date: meta.created,
            lastmod: meta.last_edited,
            slug: meta.slug.clone(),
            tags: meta.tags.clone(),
            draft: false,
            math: has_math(&document.blocks),
            mermaid: has_diagram(&document.blocks).then_some(true),
            cover,
        }
    }

    /// The complete output text for a document.
    pub fn assemble(&self, document: &Document) -> Result<String, AssembleError> {
        let header = serde_yaml::to_string(&self.front_matter(document))?;
        let body = BlockCompiler::new(self.links, self.media).compile(&document.blocks);
        Ok(render(&header, &body))
    }
}

fn render(header: &str, body: &str) -> String {
    let header = header.strip_prefix("---\n").unwrap_or(header);
    if body.is_empty() {
        format!("---\n{header}---\n")
    } else {
        format!("---\n{header}---\n\n{body}\n")
    }
}
