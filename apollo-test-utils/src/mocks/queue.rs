use std::collections::HashMap;
use std::collections::VecDeque;

use crate::fingerprint::Fingerprint;

/// Why nothing could be consumed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum QueueMiss {
    /// Nothing was ever registered for the fingerprint.
    Unknown,
    /// Everything registered for the fingerprint was already consumed.
    Exhausted,
}

/// Pending fixtures per fingerprint, consumed oldest first.
#[derive(Debug)]
pub(crate) struct ResponseQueue<T> {
    by_key: HashMap<Fingerprint, VecDeque<T>>,
}

impl<T> Default for ResponseQueue<T> {
    fn default() -> Self {
        Self {
            by_key: HashMap::new(),
        }
    }
}

impl<T> ResponseQueue<T> {
    pub(crate) fn register(&mut self, fingerprint: Fingerprint, item: T) {
        self.by_key.entry(fingerprint).or_default().push_back(item);
    }

    pub(crate) fn consume(&mut self, fingerprint: &Fingerprint) -> Result<T, QueueMiss> {
        // drained keys stay in the map so that over-consumption is told apart from a missing mock
        let pending = self.by_key.get_mut(fingerprint).ok_or(QueueMiss::Unknown)?;
        pending.pop_front().ok_or(QueueMiss::Exhausted)
    }

    pub(crate) fn pending(&self, fingerprint: &Fingerprint) -> usize {
        self.by_key.get(fingerprint).map_or(0, VecDeque::len)
    }
}
