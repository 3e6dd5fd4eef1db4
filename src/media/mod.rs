//! Local mirroring of remote media.
//!
//! Every asset referenced by a document (images, video, audio, attachments,
//! covers) is downloaded once into the static tree and referenced by its
//! public path from then on. Managed-file URLs from the content source are
//! presigned and expire, so published pages must never point at them.
//!
//! ## Naming
//!
//! Local names are content-independent and deterministic: the first 16 hex
//! chars of SHA-256 over the [canonical URL](canonical_url), plus the URL's
//! extension (or `.jpg`):
//!
//! ```text
//! https://s3.../photo.PNG?X-Amz-Signature=…  →  static/images/3f1c0e2a9b7d4410.png
//!                                                 /images/3f1c0e2a9b7d4410.png
//! ```
//!
//! The same URL maps to the same file on every run, so an existing file on
//! disk doubles as a cache hit even when the sync cache was lost.
//!
//! The module is split into:
//! - **Fetch**: [`BoundedFetcher`] and the [`Transport`] seam over HTTP
//! - **Store**: [`MediaStore`], URL → local path resolution with caching

mod fetch;
mod store;

pub use fetch::{BoundedFetcher, FetchError, Transport, UreqTransport};
pub use store::{MediaStore, OptimizeSettings};

use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use url::Url;

/// Extension used when the URL doesn't reveal one.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Length of the hash prefix used in local file names.
const NAME_HASH_LEN: usize = 16;

/// What an asset is, which decides where it lives and whether it is optimized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    /// PDFs and other attachments.
    File,
}

impl MediaKind {
    /// Directory under the static root, also the first public path segment.
    pub fn dir(self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Video => "videos",
            MediaKind::Audio => "audio",
            MediaKind::File => "files",
        }
    }
}

/// Anything that can turn a remote asset URL into the path a page should use.
///
/// Implementations never fail: when an asset cannot be mirrored they return
/// the original URL.
pub trait Materializer {
    fn materialize(&self, url: &str, kind: MediaKind) -> String;
}

/// Identity of an asset across runs.
///
/// The fragment is dropped. The query is dropped too when it carries presigned
/// storage credentials (`X-Amz-*`), which change on every API call for the
/// same file.
pub fn canonical_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.split('#').next().unwrap_or(raw).to_string();
    };
    url.set_fragment(None);
    let presigned = url
        .query_pairs()
        .any(|(key, _)| key.to_ascii_lowercase().starts_with("x-amz-"));
    if presigned {
        url.set_query(None);
    }
    url.to_string()
}

/// Deterministic local file name for a canonical URL.
pub fn asset_filename(canonical: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(canonical.as_bytes()));
    let extension = url_extension(canonical).unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    format!("{}.{}", &digest[..NAME_HASH_LEN], extension)
}

/// Lowercased extension of the URL's last path segment, if it looks like one.
fn url_extension(raw: &str) -> Option<String> {
    let path = match Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw.split(['?', '#']).next().unwrap_or(raw).to_string(),
    };
    let last = path.rsplit('/').next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    let valid = !stem.is_empty()
        && (1..=5).contains(&ext.len())
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

/// Live counters of one run's media work, shared across threads.
#[derive(Debug, Default)]
pub(crate) struct MediaCounters {
    cached: AtomicU32,
    reused: AtomicU32,
    downloaded: AtomicU32,
    failed: AtomicU32,
}

impl MediaCounters {
    pub(crate) fn cached(&self) {
        self.cached.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reused(&self) {
        self.reused.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn downloaded(&self) {
        self.downloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MediaStats {
        MediaStats {
            cached: self.cached.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            downloaded: self.downloaded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Summary of media work for a sync run.
///
/// - `cached`: answered from the sync cache, file still on disk
/// - `reused`: not in the cache but already on disk under its deterministic name
/// - `downloaded`: fetched this run
/// - `failed`: could not be fetched; pages keep the remote URL
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MediaStats {
    pub cached: u32,
    pub reused: u32,
    pub downloaded: u32,
    pub failed: u32,
}

impl MediaStats {
    pub fn total(&self) -> u32 {
        self.cached + self.reused + self.downloaded + self.failed
    }
}

impl fmt::Display for MediaStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total() == 0 {
            return write!(f, "no assets");
        }
        let parts: Vec<String> = [
            (self.downloaded, "downloaded"),
            (self.cached, "cached"),
            (self.reused, "reused"),
            (self.failed, "failed"),
        ]
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, label)| format!("{n} {label}"))
        .collect();
        if parts.len() > 1 {
            write!(f, "{} ({} total)", parts.join(", "), self.total())
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}
