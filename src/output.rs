//! CLI output formatting for the `sync` and `check` commands.
//!
//! # Information-First Display
//!
//! Every document is shown by its title first, with the file it was
//! written to as secondary context after `→`. Status and error details are
//! indented below the header line, so the output reads as a content
//! inventory of the run.
//!
//! # Output Format
//!
//! ## Sync (streamed while the run goes)
//!
//! ```text
//! Found 3 published documents
//! Hello World → hello-world.md
//!     converted
//! Draft Notes → draft-notes.md
//!     unchanged
//! Broken Post → broken-post.md
//!     failed: block 1f2e… not found
//! ```
//!
//! ## Sync (summary)
//!
//! ```text
//! Converted 1, unchanged 1, failed 1 of 3 documents
//! Media: 2 downloaded, 1 cached (3 total)
//!
//! Failed
//!     Broken Post: block 1f2e… not found
//! ```
//!
//! ## Check
//!
//! ```text
//! Database
//!     Title: Blog
//!     Id: 0a1b…
//! Properties
//!     Date: date
//!     Published: checkbox
//!     Title: title
//! Published documents: 12
//!
//! Warnings
//!     Missing properties: Slug, Tags
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::source::DatabaseInfo;
use crate::sync::{DocumentOutcome, DocumentStatus, SyncEvent, SyncReport};

/// Longest error message shown inline before it is cut.
const MAX_MESSAGE: usize = 120;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Truncate to `max` characters, appending "..." if truncated.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// `Title → file.md`, falling back to the slug for untitled documents.
fn document_header(outcome: &DocumentOutcome) -> String {
    let file = outcome
        .path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}.md", outcome.slug));
    let title = if outcome.title.is_empty() {
        &outcome.slug
    } else {
        &outcome.title
    };
    format!("{title} \u{2192} {file}")
}

fn status_line(status: &DocumentStatus) -> String {
    match status {
        DocumentStatus::Converted => "converted".to_string(),
        DocumentStatus::Skipped => "unchanged".to_string(),
        DocumentStatus::Failed(message) => format!("failed: {}", truncate(message, MAX_MESSAGE)),
    }
}

// ============================================================================
// Sync output
// ============================================================================

/// Format a single sync progress event as display lines.
pub fn format_sync_event(event: &SyncEvent) -> Vec<String> {
    match event {
        SyncEvent::Listed { count } => {
            vec![format!("Found {}", plural(*count, "published document"))]
        }
        SyncEvent::Cleaned { removed } => {
            vec![format!("Removed {}", plural(*removed, "existing document"))]
        }
        SyncEvent::Document(outcome) => vec![
            document_header(outcome),
            format!("{}{}", indent(1), status_line(&outcome.status)),
        ],
    }
}

/// Format the end-of-run summary.
pub fn format_sync_summary(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Converted {}, unchanged {}, failed {} of {}",
            report.converted(),
            report.skipped(),
            report.failed(),
            plural(report.documents.len(), "document"),
        ),
        format!("Media: {}", report.media),
    ];

    let failures: Vec<&DocumentOutcome> = report
        .documents
        .iter()
        .filter(|d| matches!(d.status, DocumentStatus::Failed(_)))
        .collect();
    if !failures.is_empty() {
        lines.push(String::new());
        lines.push("Failed".to_string());
        for outcome in failures {
            if let DocumentStatus::Failed(message) = &outcome.status {
                lines.push(format!(
                    "{}{}: {}",
                    indent(1),
                    outcome.title,
                    truncate(message, MAX_MESSAGE)
                ));
            }
        }
    }
    lines
}

pub fn print_sync_event(event: &SyncEvent) {
    for line in format_sync_event(event) {
        println!("{}", line);
    }
}

pub fn print_sync_summary(report: &SyncReport) {
    for line in format_sync_summary(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Check output
// ============================================================================

/// Format the result of a connection check.
pub fn format_check_output(info: &DatabaseInfo, published: usize) -> Vec<String> {
    let mut lines = vec![
        "Database".to_string(),
        format!("{}Title: {}", indent(1), info.title),
        format!("{}Id: {}", indent(1), info.id),
        "Properties".to_string(),
    ];
    for (name, kind) in &info.properties {
        lines.push(format!("{}{}: {}", indent(1), name, kind));
    }
    lines.push(format!("Published documents: {published}"));

    if !info.warnings.is_empty() {
        lines.push(String::new());
        lines.push("Warnings".to_string());
        for warning in &info.warnings {
            lines.push(format!("{}{}", indent(1), warning));
        }
    }
    lines
}

pub fn print_check_output(info: &DatabaseInfo, published: usize) {
    for line in format_check_output(info, published) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaStats;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn outcome(title: &str, slug: &str, status: DocumentStatus) -> DocumentOutcome {
        DocumentOutcome {
            id: format!("id-{slug}"),
            title: title.into(),
            slug: slug.into(),
            path: PathBuf::from(format!("content/posts/{slug}.md")),
            status,
        }
    }

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn truncate_short() {
        assert_eq!(truncate("Short text", 40), "Short text");
    }

    #[test]
    fn truncate_long() {
        let text = "a".repeat(50);
        assert_eq!(truncate(&text, 40), format!("{}...", "a".repeat(40)));
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate("héllo", 5), "héllo");
    }

    #[test]
    fn indent_levels() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }

    #[test]
    fn untitled_document_shows_slug() {
        let o = outcome("", "abc123", DocumentStatus::Converted);
        assert_eq!(document_header(&o), "abc123 \u{2192} abc123.md");
    }

    // =========================================================================
    // Sync output
    // =========================================================================

    #[test]
    fn listed_event() {
        assert_eq!(
            format_sync_event(&SyncEvent::Listed { count: 3 }),
            vec!["Found 3 published documents"]
        );
        assert_eq!(
            format_sync_event(&SyncEvent::Listed { count: 1 }),
            vec!["Found 1 published document"]
        );
    }

    #[test]
    fn document_events() {
        let lines = format_sync_event(&SyncEvent::Document(outcome(
            "Hello World",
            "hello-world",
            DocumentStatus::Converted,
        )));
        assert_eq!(lines, vec!["Hello World \u{2192} hello-world.md", "    converted"]);

        let lines = format_sync_event(&SyncEvent::Document(outcome(
            "Old",
            "old",
            DocumentStatus::Skipped,
        )));
        assert_eq!(lines[1], "    unchanged");

        let lines = format_sync_event(&SyncEvent::Document(outcome(
            "Broken",
            "broken",
            DocumentStatus::Failed("HTTP 404".into()),
        )));
        assert_eq!(lines[1], "    failed: HTTP 404");
    }

    #[test]
    fn cleaned_event() {
        assert_eq!(
            format_sync_event(&SyncEvent::Cleaned { removed: 2 }),
            vec!["Removed 2 existing documents"]
        );
    }

    #[test]
    fn summary_counts_and_media() {
        let report = SyncReport {
            documents: vec![
                outcome("A", "a", DocumentStatus::Converted),
                outcome("B", "b", DocumentStatus::Skipped),
            ],
            media: MediaStats {
                downloaded: 2,
                cached: 1,
                ..Default::default()
            },
            removed: 0,
        };
        let lines = format_sync_summary(&report);
        assert_eq!(lines[0], "Converted 1, unchanged 1, failed 0 of 2 documents");
        assert!(lines[1].starts_with("Media: "));
        assert!(lines[1].contains("2 downloaded"));
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn summary_lists_failures() {
        let report = SyncReport {
            documents: vec![
                outcome("A", "a", DocumentStatus::Converted),
                outcome("Broken", "broken", DocumentStatus::Failed("gone".into())),
            ],
            ..Default::default()
        };
        let lines = format_sync_summary(&report);
        assert_eq!(lines[0], "Converted 1, unchanged 0, failed 1 of 2 documents");
        assert_eq!(lines[1], "Media: no assets");
        assert_eq!(&lines[2..], ["", "Failed", "    Broken: gone"]);
    }

    // =========================================================================
    // Check output
    // =========================================================================

    fn info(warnings: Vec<String>) -> DatabaseInfo {
        let mut properties = BTreeMap::new();
        properties.insert("Title".to_string(), "title".to_string());
        properties.insert("Published".to_string(), "checkbox".to_string());
        DatabaseInfo {
            id: "db1".into(),
            title: "Blog".into(),
            properties,
            warnings,
        }
    }

    #[test]
    fn check_output_lists_properties_sorted() {
        let lines = format_check_output(&info(vec![]), 12);
        assert_eq!(
            lines,
            vec![
                "Database",
                "    Title: Blog",
                "    Id: db1",
                "Properties",
                "    Published: checkbox",
                "    Title: title",
                "Published documents: 12",
            ]
        );
    }

    #[test]
    fn check_output_with_warnings() {
        let lines = format_check_output(&info(vec!["Missing properties: Slug".into()]), 0);
        assert_eq!(
            &lines[lines.len() - 3..],
            ["", "Warnings", "    Missing properties: Slug"]
        );
    }
}
