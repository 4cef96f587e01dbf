//! Bounded memo of node type hierarchy answers.

use lru::LruCache;
use parking_lot::Mutex;

use super::capacity;

/// LRU memo for `is_type_or_subtype(type, ancestor)` answers.
///
/// Type hierarchies change only on node type registration, which is a
/// structural change that reopens sessions, so entries are never invalidated
/// individually.
#[derive(Debug)]
pub struct TypeCache {
    entries: Mutex<LruCache<(String, String), bool>>,
}

impl TypeCache {
    pub fn new(size: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity(size))),
        }
    }

    /// Returns the memoised answer or computes and stores it.
    pub fn get_or_compute<F>(&self, type_name: &str, ancestor: &str, compute: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let key = (type_name.to_string(), ancestor.to_string());
        if let Some(answer) = self.entries.lock().get(&key) {
            return *answer;
        }
        let answer = compute();
        self.entries.lock().put(key, answer);
        answer
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_answer_is_computed_once() {
        let cache = TypeCache::new(4);
        let calls = Cell::new(0);
        for _ in 0..3 {
            let answer = cache.get_or_compute("doc:article", "hippo:document", || {
                calls.set(calls.get() + 1);
                true
            });
            assert!(answer);
        }
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_bounded_by_capacity() {
        let cache = TypeCache::new(2);
        cache.get_or_compute("a", "x", || true);
        cache.get_or_compute("b", "x", || true);
        cache.get_or_compute("c", "x", || false);
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
