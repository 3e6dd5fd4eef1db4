//! Centralized identity and slug conventions.
//!
//! Source identities are UUIDs that show up in two spellings: hyphenated
//! (`550e8400-e29b-41d4-a716-446655440000`, as the API returns them) and bare
//! (`550e8400e29b41d4a716446655440000`, as they appear in share links). Every
//! comparison, anchor, and table key in the crate goes through the canonical
//! form produced here: lowercase, no hyphens.
//!
//! ## Anchors
//!
//! Heading anchors and link fragments both use [`anchor_token`], so a link to
//! `#550e8400-E29B-...` lands on the heading emitted for that block.
//!
//! ## Slugs
//!
//! A document's slug comes from its `Slug` property. When that is empty the
//! canonical identity is used instead ([`fallback_slug`]). Slugs become file
//! names, so [`sanitize_slug`] strips anything that would escape the section
//! directory.

use regex::Regex;
use std::sync::LazyLock;

static IDENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[0-9a-f]{32}|[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})$")
        .expect("identity pattern is valid")
});

static TRAILING_IDENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|[^0-9a-f])([0-9a-f]{32}|[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})$",
    )
    .expect("trailing identity pattern is valid")
});

/// Lowercase and strip hyphens. Applied to any block id, well-formed or not.
pub fn anchor_token(id: &str) -> String {
    id.chars()
        .filter(|c| *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Parse a string that is exactly one identity (bare or hyphenated, any case).
///
/// Returns the canonical form, or `None` when the string is anything else.
pub fn parse_identity(s: &str) -> Option<String> {
    IDENTITY.is_match(s).then(|| anchor_token(s))
}

/// Find an identity at the very end of `s`, e.g. the id suffix of a share link
/// path like `/My-Post-550e8400e29b41d4a716446655440000`.
///
/// The identity must not be glued to further hex digits, so the tail of a
/// longer hex string (a commit hash, say) is not mistaken for one.
pub fn trailing_identity(s: &str) -> Option<String> {
    TRAILING_IDENTITY
        .captures(s)
        .and_then(|c| c.get(1))
        .map(|m| anchor_token(m.as_str()))
}

/// Slug used when a document has no explicit one.
pub fn fallback_slug(id: &str) -> String {
    anchor_token(id)
}

/// Make a user-provided slug safe to use as a file name.
///
/// Path separators become dashes and surrounding whitespace and dots are
/// trimmed. Returns `None` if nothing usable is left.
pub fn sanitize_slug(slug: &str) -> Option<String> {
    let cleaned: String = slug
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}
