use std::collections::BTreeSet;

use carelink_api::ThreadId;

/// The threads the caller wants events for.
///
/// Survives reconnects: it is what the manager replays after every
/// `connected` acknowledgement. Iteration is ascending, so replay order is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    threads: BTreeSet<ThreadId>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the thread was not already present.
    pub fn insert(&mut self, thread_id: ThreadId) -> bool {
        self.threads.insert(thread_id)
    }

    /// Returns `true` if the thread was present.
    pub fn remove(&mut self, thread_id: ThreadId) -> bool {
        self.threads.remove(&thread_id)
    }

    pub fn contains(&self, thread_id: ThreadId) -> bool {
        self.threads.contains(&thread_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.threads.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ThreadId> {
        self.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove_report_changes() {
        let mut set = SubscriptionSet::new();
        assert!(set.insert(12));
        assert!(set.insert(7));
        assert!(!set.insert(12));
        assert_eq!(set.to_vec(), vec![7, 12]);

        assert!(set.remove(7));
        assert!(!set.remove(7));
        assert!(!set.contains(7));
        assert_eq!(set.len(), 1);
    }
}
