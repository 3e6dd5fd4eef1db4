//! URL → local path resolution with caching.

use super::fetch::BoundedFetcher;
use super::{MediaCounters, MediaKind, MediaStats, Materializer, asset_filename, canonical_url};
use crate::cache::SyncCache;
use crate::imaging::{ImageBackend, OptimizeParams, Quality, is_optimizable};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Image optimization settings applied to every downloaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeSettings {
    pub max_width: u32,
    pub quality: Quality,
    pub background: [u8; 3],
}

/// Mirrors remote assets into the static tree.
///
/// Each canonical URL is resolved at most once per run: the first caller
/// does the work, concurrent callers for the same URL wait for its answer,
/// later callers get it from memory. Failures are final for the run too.
pub struct MediaStore {
    static_dir: PathBuf,
    cache: Arc<SyncCache>,
    fetcher: BoundedFetcher,
    backend: Arc<dyn ImageBackend>,
    optimize: OptimizeSettings,
    resolved: Mutex<HashMap<String, Arc<OnceLock<String>>>>,
    counters: MediaCounters,
}

impl MediaStore {
    pub fn new(
        static_dir: impl Into<PathBuf>,
        cache: Arc<SyncCache>,
        fetcher: BoundedFetcher,
        backend: Arc<dyn ImageBackend>,
        optimize: OptimizeSettings,
    ) -> Self {
        Self {
            static_dir: static_dir.into(),
            cache,
            fetcher,
            backend,
            optimize,
            resolved: Mutex::new(HashMap::new()),
            counters: MediaCounters::default(),
        }
    }

    pub fn static_dir(&self) -> &Path {
        &self.static_dir
    }

    /// Statistics for everything resolved so far.
    pub fn stats(&self) -> MediaStats {
        self.counters.snapshot()
    }

    /// Resolve a batch of assets on the download pool, ahead of compilation.
    ///
    /// Afterwards every request answers from memory, so compiling the
    /// document does no network work.
    pub fn prefetch(&self, requests: &[(String, MediaKind)]) {
        self.fetcher.for_each(requests, |(url, kind)| {
            self.materialize(url, *kind);
        });
    }

    /// The once-cell for a canonical URL, created on first use.
    fn cell(&self, key: &str) -> Arc<OnceLock<String>> {
        self.resolved
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Local file for a public path like `/images/abc.png`.
    fn disk_path(&self, public: &str) -> PathBuf {
        self.static_dir.join(public.trim_start_matches('/'))
    }

    fn resolve(&self, url: &str, key: &str, kind: MediaKind) -> String {
        if let Some(cached) = self.cache.cached_asset(key)
            && self.disk_path(&cached).is_file()
        {
            self.counters.cached();
            return cached;
        }

        let filename = asset_filename(key);
        let public = format!("/{}/{}", kind.dir(), filename);
        let dest = self.disk_path(&public);

        if dest.is_file() {
            self.cache.record_asset(key, &public);
            self.counters.reused();
            return public;
        }

        if let Err(e) = self.fetcher.fetch_one(url, &dest) {
            warn!(url = %url, error = %e, "Keeping remote URL for asset that failed to download");
            self.counters.failed();
            return url.to_string();
        }

        if kind == MediaKind::Image && is_optimizable(&dest) {
            let params = OptimizeParams {
                source: dest.clone(),
                output: dest.clone(),
                max_width: self.optimize.max_width,
                quality: self.optimize.quality,
                background: self.optimize.background,
            };
            if let Err(e) = self.backend.optimize(&params) {
                warn!(path = %dest.display(), error = %e, "Keeping image as downloaded");
            }
        }

        self.cache.record_asset(key, &public);
        self.counters.downloaded();
        info!(kind = kind.dir(), path = %public, "Downloaded asset");
        public
    }
}

impl Materializer for MediaStore {
    fn materialize(&self, url: &str, kind: MediaKind) -> String {
        let key = canonical_url(url);
        self.cell(&key)
            .get_or_init(|| self.resolve(url, &key, kind))
            .clone()
    }
}
