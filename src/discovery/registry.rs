use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Default)]
struct Entries {
    order: Vec<String>,
    seen: HashSet<String>,
}

/// Normalized media URLs observed on one page, deduplicated by value.
///
/// Cloning hands out another handle to the same set; a fresh registry is
/// created per engine instance.
#[derive(Clone, Default)]
pub struct MediaRegistry {
    entries: Arc<Mutex<Entries>>,
}

impl MediaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the URL was not yet known.
    pub fn insert(&self, url: impl Into<String>) -> bool {
        let url = url.into();
        let mut entries = self.entries.lock();
        if entries.seen.contains(&url) {
            return false;
        }
        entries.seen.insert(url.clone());
        entries.order.push(url);
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.lock().seen.contains(url)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current members in first-seen order.
    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().order.clone()
    }
}

impl std::fmt::Debug for MediaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaRegistry").field("len", &self.len()).finish()
    }
}
