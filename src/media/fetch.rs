//! Bounded parallel downloads.
//!
//! Every download takes one of `max_concurrent` permits first, so at most
//! that many are ever in flight, whichever thread or document asked for
//! them. Batches run on a dedicated rayon pool of the same size.
//!
//! Single downloads run on the calling thread and block on the permit. They
//! never hop pools, so a caller holding a once-cell can't be handed another
//! job that waits on the same cell.

use parking_lot::{Condvar, Mutex};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Upper bound on a single asset body.
const MAX_ASSET_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("GET {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("GET {url} is larger than {limit} bytes")]
    TooLarge { url: String, limit: u64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("download pool could not start: {0}")]
    Pool(String),
}

/// Fetch the bytes behind a URL.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP transport with a per-request timeout.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(status, _) => FetchError::Status {
                url: url.to_string(),
                status,
            },
            ureq::Error::Transport(t) => FetchError::Transport {
                url: url.to_string(),
                message: t.to_string(),
            },
        })?;
        read_limited(response.into_reader(), MAX_ASSET_BYTES, url)
    }
}

/// Read a whole body, failing instead of truncating past `limit` bytes.
fn read_limited(reader: impl Read, limit: u64, url: &str) -> Result<Vec<u8>, FetchError> {
    let mut bytes = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        return Err(FetchError::TooLarge {
            url: url.to_string(),
            limit,
        });
    }
    Ok(bytes)
}

/// Counting semaphore.
struct Permits {
    available: Mutex<usize>,
    freed: Condvar,
}

struct Permit<'a>(&'a Permits);

impl Permits {
    fn new(n: usize) -> Self {
        Self {
            available: Mutex::new(n),
            freed: Condvar::new(),
        }
    }

    fn acquire(&self) -> Permit<'_> {
        let mut available = self.available.lock();
        while *available == 0 {
            self.freed.wait(&mut available);
        }
        *available -= 1;
        Permit(self)
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        *self.0.available.lock() += 1;
        self.0.freed.notify_one();
    }
}

/// Runs downloads with a fixed concurrency ceiling.
pub struct BoundedFetcher {
    transport: Arc<dyn Transport>,
    pool: rayon::ThreadPool,
    permits: Permits,
    max_concurrent: usize,
    /// Makes `.part` names unique when two callers race on one destination.
    part_seq: AtomicU64,
}

impl BoundedFetcher {
    pub fn new(transport: Arc<dyn Transport>, max_concurrent: usize) -> Result<Self, FetchError> {
        let max_concurrent = max_concurrent.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_concurrent)
            .thread_name(|i| format!("fetch-{i}"))
            .build()
            .map_err(|e| FetchError::Pool(e.to_string()))?;
        Ok(Self {
            transport,
            pool,
            permits: Permits::new(max_concurrent),
            max_concurrent,
            part_seq: AtomicU64::new(0),
        })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Download every `(url, destination)` pair, at most `max_concurrent` at a
    /// time. Duplicate URLs are fetched once. Returns per-URL success after all
    /// downloads finished; one failure never affects the others.
    ///
    /// This is the batch API for plain `(url, destination)` lists.
    /// [`MediaStore::prefetch`](super::MediaStore::prefetch) drives the same
    /// pool and permits through [`for_each`](Self::for_each) plus
    /// [`fetch_one`](Self::fetch_one), because each of its URLs has to pass
    /// its once-cell and the asset cache before any download starts.
    pub fn fetch_all(&self, requests: &[(String, PathBuf)]) -> HashMap<String, bool> {
        let mut seen = HashSet::new();
        let unique: Vec<&(String, PathBuf)> = requests
            .iter()
            .filter(|(url, _)| seen.insert(url.as_str()))
            .collect();
        self.pool.install(|| {
            unique
                .par_iter()
                .map(|(url, dest)| {
                    let ok = match self.download(url, dest) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(url = %url, error = %e, "Download failed");
                            false
                        }
                    };
                    (url.clone(), ok)
                })
                .collect()
        })
    }

    /// Download one URL on the calling thread, waiting for a free permit.
    pub fn fetch_one(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        self.download(url, dest)
    }

    /// Run `f` over `items` on the download pool.
    pub fn for_each<T, F>(&self, items: &[T], f: F)
    where
        T: Sync,
        F: Fn(&T) + Sync + Send,
    {
        self.pool.install(|| items.par_iter().for_each(f));
    }

    /// Fetch into a uniquely named `.part` sibling, then rename into place so
    /// a partial file never sits at the final path.
    fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let bytes = {
            let _permit = self.permits.acquire();
            self.transport.get(url)?
        };
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let part = part_path(dest, self.part_seq.fetch_add(1, Ordering::Relaxed));
        if let Err(e) = std::fs::write(&part, &bytes).and_then(|()| std::fs::rename(&part, dest)) {
            let _ = std::fs::remove_file(&part);
            return Err(e.into());
        }
        debug!(url = %url, path = %dest.display(), bytes = bytes.len(), "Fetched");
        Ok(())
    }
}

fn part_path(dest: &Path, seq: u64) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{seq}.part"));
    dest.with_file_name(name)
}
