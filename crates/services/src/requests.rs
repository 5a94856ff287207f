use std::collections::HashMap;
use std::hash::Hash;

/// Id handed out when a request is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Tracks the latest in-flight request per key.
///
/// Ids grow monotonically across all keys; a response is current only if its
/// id is still the latest one issued for its key.
#[derive(Debug)]
pub struct RequestTracker<K> {
    next: u64,
    latest: HashMap<K, RequestId>,
}

impl<K: Eq + Hash> Default for RequestTracker<K> {
    fn default() -> Self {
        Self {
            next: 1,
            latest: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> RequestTracker<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new id for `key`, superseding any earlier one.
    pub fn begin(&mut self, key: K) -> RequestId {
        let id = RequestId(self.next);
        self.next += 1;
        self.latest.insert(key, id);
        id
    }

    #[must_use]
    pub fn is_current(&self, key: &K, id: RequestId) -> bool {
        self.latest.get(key) == Some(&id)
    }

    /// Marks `id` as done. Returns `false` (and keeps the newer entry) if the
    /// request was superseded.
    pub fn finish(&mut self, key: &K, id: RequestId) -> bool {
        if self.is_current(key, id) {
            self.latest.remove(key);
            true
        } else {
            false
        }
    }

    /// Forgets every in-flight request; their responses become stale.
    pub fn reset(&mut self) {
        self.latest.clear();
    }
}
