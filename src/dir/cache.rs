//! LRU cache for parsed DIR documents.
//!
//! Parsing a DIR archive is the expensive part of a prediction run, so the
//! caller keeps one cache per process and passes it to each reader
//! explicitly — there is no global state. Cached documents are immutable
//! (`Arc<DirDocument>`), so concurrent readers of disjoint documents need
//! no coordination; the lock guards only the recency list.

use crate::dir::model::DirDocument;
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A bounded least-recently-used cache keyed by archive path.
///
/// # Examples
///
/// ```
/// use dir_insight::dir::{DirCache, DirDocument};
/// use std::sync::Arc;
///
/// let cache = DirCache::new(2);
/// cache.insert("a.zip", Arc::new(DirDocument::default()));
/// cache.insert("b.zip", Arc::new(DirDocument::default()));
/// cache.insert("c.zip", Arc::new(DirDocument::default()));
/// assert!(cache.get("a.zip").is_none()); // evicted
/// assert!(cache.get("c.zip").is_some());
/// ```
#[derive(Debug)]
pub struct DirCache {
    capacity: usize,
    // most recently used last
    entries: Mutex<Vec<(PathBuf, Arc<DirDocument>)>>,
}

impl DirCache {
    /// Create a cache holding at most `capacity` documents.
    pub fn new(capacity: usize) -> Self {
        DirCache {
            capacity: capacity.max(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Fetch a document and mark it most recently used.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<Arc<DirDocument>> {
        let path = path.as_ref();
        let mut entries = self.entries.lock().ok()?;
        let pos = entries.iter().position(|(p, _)| p == path)?;
        let entry = entries.remove(pos);
        let doc = Arc::clone(&entry.1);
        entries.push(entry);
        Some(doc)
    }

    /// Insert a document, evicting the least recently used entry when full.
    pub fn insert(&self, path: impl Into<PathBuf>, doc: Arc<DirDocument>) {
        let path = path.into();
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(pos) = entries.iter().position(|(p, _)| *p == path) {
                entries.remove(pos);
            }
            entries.push((path, doc));
            while entries.len() > self.capacity {
                entries.remove(0);
            }
        }
    }

    /// Fetch a document, loading and caching it on a miss.
    pub fn get_or_load<F>(&self, path: impl AsRef<Path>, load: F) -> Result<Arc<DirDocument>>
    where
        F: FnOnce() -> Result<DirDocument>,
    {
        let path = path.as_ref();
        if let Some(doc) = self.get(path) {
            return Ok(doc);
        }
        let doc = Arc::new(load()?);
        self.insert(path.to_path_buf(), Arc::clone(&doc));
        Ok(doc)
    }

    /// Drop a single cached document.
    pub fn close(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|(p, _)| p != path);
        }
    }

    /// Drop every cached document.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// Number of cached documents.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
