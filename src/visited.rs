//! Exact-membership dedup set gating frontier admission.

use std::collections::HashSet;
use std::sync::Mutex;

/// Concurrency-safe set of normalized URLs that only ever grows.
///
/// The set deliberately exposes no `contains`/`insert` pair: a separate
/// check-then-insert is a race between workers discovering the same link, so
/// [`VisitedSet::claim`] is the only admission operation. A URL may be pushed
/// onto the frontier only after a successful claim.
pub struct VisitedSet {
    inner: Mutex<HashSet<String>>,
}

impl VisitedSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashSet::new()),
        }
    }

    /// Atomically inserts `url` if absent.
    ///
    /// Returns `true` exactly once per URL for the lifetime of the crawl,
    /// regardless of how many workers race on it.
    pub fn claim(&self, url: &str) -> bool {
        let mut set = self.inner.lock().expect("visited set lock poisoned");
        set.insert(url.to_string())
    }

    /// Number of URLs claimed so far.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("visited set lock poisoned").len()
    }

    /// True when nothing has been claimed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for VisitedSet {
    fn default() -> Self {
        Self::new()
    }
}
