//! Incremental sync cache.
//!
//! Fetching a document's block tree costs one API call per block with
//! children, and mirroring its media costs one download per asset. This
//! module lets a sync skip both when nothing changed since the last run.
//!
//! # Design
//!
//! The cache holds two independent indexes:
//!
//! - **documents**: document identity → the last-edited time of the version
//!   that was last compiled. A document is *stale* when it has no entry or its
//!   current last-edited time is strictly later than the recorded one.
//! - **assets**: canonical asset URL → public path of the local copy.
//!
//! Entries are recorded only after the corresponding side effect fully
//! succeeded (artifact written, file downloaded), so a crash between the two
//! leaves the cache behind reality, never ahead of it.
//!
//! ## Storage
//!
//! The cache is a JSON file (`.notion_cache.json` by default) in the working
//! directory:
//!
//! ```json
//! {
//!   "version": 1,
//!   "last_sync": "2026-01-02T03:04:05Z",
//!   "documents": { "550e8400e29b41d4a716446655440000": "2026-01-01T10:00:00Z" },
//!   "assets": { "https://example.com/a.png": "/images/0123456789abcdef.png" }
//! }
//! ```
//!
//! It is written atomically (temp file + rename), so an interrupted run never
//! leaves a half-written cache behind.
//!
//! ## Concurrency
//!
//! Documents compile in parallel and all of them record into the same cache.
//! One mutex guards the index; [`SyncCache::persist`] serializes under the same
//! lock so a snapshot is always consistent.
//!
//! ## Bypassing the cache
//!
//! Pass `--no-cache` to `sync` to start from [`SyncCache::empty`]: every
//! document is stale and every asset is looked up on disk again. The file is
//! still written at the end, so the next run is incremental again.

use crate::naming::anchor_token;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Version of the cache file format. Bump this to invalidate all existing
/// caches when the format or key computation changes.
const CACHE_VERSION: u32 = 1;

/// An RFC 3339 timestamp as stored in the cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Timestamp(#[serde(with = "time::serde::rfc3339")] pub OffsetDateTime);

/// On-disk cache contents.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CacheIndex {
    pub version: u32,
    #[serde(default)]
    pub last_sync: Option<Timestamp>,
    #[serde(default)]
    pub documents: BTreeMap<String, Timestamp>,
    #[serde(default)]
    pub assets: BTreeMap<String, String>,
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            last_sync: None,
            documents: BTreeMap::new(),
            assets: BTreeMap::new(),
        }
    }
}

/// The shared, internally synchronized sync cache.
#[derive(Debug)]
pub struct SyncCache {
    path: PathBuf,
    index: Mutex<CacheIndex>,
}

impl SyncCache {
    /// An empty cache that will persist to `path` (used for `--no-cache` or
    /// first sync).
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            index: Mutex::new(CacheIndex::default()),
        }
    }

    /// Load from `path`. Returns an empty cache if the file doesn't exist or
    /// can't be parsed (version mismatch, corruption).
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No sync cache, starting cold");
                return Self::empty(path);
            }
        };
        let index: CacheIndex = match serde_json::from_str(&content) {
            Ok(index) => index,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Sync cache is corrupt, starting cold");
                return Self::empty(path);
            }
        };
        if index.version != CACHE_VERSION {
            warn!(
                path = %path.display(),
                found = index.version,
                expected = CACHE_VERSION,
                "Sync cache version mismatch, starting cold"
            );
            return Self::empty(path);
        }
        Self {
            path,
            index: Mutex::new(index),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a document must be recompiled.
    pub fn is_stale(&self, id: &str, last_edited: OffsetDateTime) -> bool {
        match self.index.lock().documents.get(&anchor_token(id)) {
            Some(Timestamp(compiled)) => last_edited > *compiled,
            None => true,
        }
    }

    /// Record that the version of `id` edited at `last_edited` was written.
    pub fn record_compiled(&self, id: &str, last_edited: OffsetDateTime) {
        self.index
            .lock()
            .documents
            .insert(anchor_token(id), Timestamp(last_edited));
    }

    /// Public path previously recorded for a canonical asset URL.
    pub fn cached_asset(&self, url: &str) -> Option<String> {
        self.index.lock().assets.get(url).cloned()
    }

    pub fn record_asset(&self, url: &str, public_path: &str) {
        self.index
            .lock()
            .assets
            .insert(url.to_string(), public_path.to_string());
    }

    pub fn mark_synced(&self, at: OffsetDateTime) {
        self.index.lock().last_sync = Some(Timestamp(at));
    }

    pub fn last_sync(&self) -> Option<OffsetDateTime> {
        self.index.lock().last_sync.map(|Timestamp(t)| t)
    }

    pub fn document_count(&self) -> usize {
        self.index.lock().documents.len()
    }

    pub fn asset_count(&self) -> usize {
        self.index.lock().assets.len()
    }

    /// Write the cache atomically: serialize to a sibling temp file, then
    /// rename over the real one.
    pub fn persist(&self) -> io::Result<()> {
        let index = self.index.lock();
        let json = serde_json::to_string_pretty(&*index)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(&self.path);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use time::macros::datetime;

    const DOC: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn cache_in(tmp: &TempDir) -> SyncCache {
        SyncCache::empty(tmp.path().join(".notion_cache.json"))
    }

    // =========================================================================
    // Staleness
    // =========================================================================

    #[test]
    fn unknown_document_is_stale() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_in(&tmp);
        assert!(cache.is_stale(DOC, datetime!(2024-01-01 0:00 UTC)));
    }

    #[test]
    fn recorded_document_is_fresh_until_edited() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_in(&tmp);
        let edited = datetime!(2024-05-01 12:00 UTC);
        cache.record_compiled(DOC, edited);

        assert!(!cache.is_stale(DOC, edited));
        assert!(!cache.is_stale(DOC, datetime!(2024-04-01 0:00 UTC)));
        assert!(cache.is_stale(DOC, datetime!(2024-05-01 12:01 UTC)));
    }

    #[test]
    fn identity_spelling_does_not_matter() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_in(&tmp);
        let edited = datetime!(2024-05-01 12:00 UTC);
        cache.record_compiled(DOC, edited);
        assert!(!cache.is_stale("550E8400E29B41D4A716446655440000", edited));
    }

    #[test]
    fn offsets_compare_as_instants() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_in(&tmp);
        cache.record_compiled(DOC, datetime!(2024-05-01 12:00 UTC));
        // Same instant, different offset.
        assert!(!cache.is_stale(DOC, datetime!(2024-05-01 14:00 +2)));
    }

    // =========================================================================
    // Assets
    // =========================================================================

    #[test]
    fn asset_lookup() {
        let tmp = TempDir::new().unwrap();
        let cache = cache_in(&tmp);
        assert_eq!(cache.cached_asset("https://a/x.png"), None);
        cache.record_asset("https://a/x.png", "/images/abc.png");
        assert_eq!(
            cache.cached_asset("https://a/x.png").as_deref(),
            Some("/images/abc.png")
        );
        assert_eq!(cache.asset_count(), 1);
    }

    // =========================================================================
    // Persist / Load roundtrip
    // =========================================================================

    #[test]
    fn persist_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".notion_cache.json");
        let cache = SyncCache::empty(&path);
        let edited = datetime!(2024-05-01 12:00 UTC);
        cache.record_compiled(DOC, edited);
        cache.record_asset("https://a/x.png", "/images/abc.png");
        cache.mark_synced(datetime!(2024-05-02 8:00 UTC));
        cache.persist().unwrap();

        let loaded = SyncCache::load(&path);
        assert!(!loaded.is_stale(DOC, edited));
        assert_eq!(
            loaded.cached_asset("https://a/x.png").as_deref(),
            Some("/images/abc.png")
        );
        assert_eq!(loaded.last_sync(), Some(datetime!(2024-05-02 8:00 UTC)));
        assert_eq!(loaded.document_count(), 1);
    }

    #[test]
    fn persisted_file_has_documented_shape() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        let cache = SyncCache::empty(&path);
        cache.record_compiled(DOC, datetime!(2024-05-01 12:00 UTC));
        cache.persist().unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["version"], 1);
        assert!(value["last_sync"].is_null());
        assert_eq!(
            value["documents"]["550e8400e29b41d4a716446655440000"],
            "2024-05-01T12:00:00Z"
        );
        assert!(value["assets"].as_object().unwrap().is_empty());
    }

    #[test]
    fn persist_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/cache.json");
        SyncCache::empty(&path).persist().unwrap();
        assert!(path.exists());
        assert!(!tmp.path().join("nested/dir/cache.json.tmp").exists());
    }

    #[test]
    fn load_missing_file_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let cache = SyncCache::load(tmp.path().join("absent.json"));
        assert_eq!(cache.document_count(), 0);
        assert_eq!(cache.asset_count(), 0);
    }

    #[test]
    fn load_corrupt_json_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        fs::write(&path, "not json").unwrap();
        let cache = SyncCache::load(&path);
        assert_eq!(cache.document_count(), 0);
        // A corrupt cache is replaced on the next persist.
        cache.persist().unwrap();
        assert!(serde_json::from_str::<CacheIndex>(&fs::read_to_string(&path).unwrap()).is_ok());
    }

    #[test]
    fn load_wrong_version_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        let json = format!(
            r#"{{"version": {}, "documents": {{"a": "2024-01-01T00:00:00Z"}}, "assets": {{}}}}"#,
            CACHE_VERSION + 1
        );
        fs::write(&path, json).unwrap();
        let cache = SyncCache::load(&path);
        assert_eq!(cache.document_count(), 0);
    }

    #[test]
    fn load_tolerates_missing_optional_sections() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cache.json");
        fs::write(&path, r#"{"version": 1}"#).unwrap();
        let cache = SyncCache::load(&path);
        assert_eq!(cache.last_sync(), None);
        assert_eq!(cache.document_count(), 0);
    }

    #[test]
    fn concurrent_records_are_all_kept() {
        use rayon::prelude::*;
        let tmp = TempDir::new().unwrap();
        let cache = cache_in(&tmp);
        (0..64u32).into_par_iter().for_each(|i| {
            cache.record_asset(&format!("https://a/{i}.png"), &format!("/images/{i}.png"));
            cache.record_compiled(&format!("doc-{i}"), datetime!(2024-01-01 0:00 UTC));
        });
        assert_eq!(cache.asset_count(), 64);
        assert_eq!(cache.document_count(), 64);
    }
}
