//! Per-client candidate bookkeeping.
//!
//! Both structures are owned by exactly one client instance.  There is no
//! process-wide table: two clients in the same process never see each other's
//! candidates.

use std::collections::HashSet;

use crate::domain::remote::{Remote, ServerKey};

/// Remembers which candidates were accepted during the current discovery cycle.
///
/// A key is inserted when a response is accepted and removed when the
/// connection to that candidate closes, so the server can be rediscovered.
#[derive(Debug, Default)]
pub struct DedupRegistry {
    seen: HashSet<ServerKey>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key`.  Returns `false` if it was already present.
    pub fn insert(&mut self, key: ServerKey) -> bool {
        self.seen.insert(key)
    }

    pub fn contains(&self, key: &ServerKey) -> bool {
        self.seen.contains(key)
    }

    /// Forgets `key`.  Returns `false` if it was not present.
    pub fn remove(&mut self, key: &ServerKey) -> bool {
        self.seen.remove(key)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Drops every entry.  Only used when the client shuts down.
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

/// Spare candidates discovered while a connection attempt was in flight.
///
/// Last in, first out: the most recently discovered backup is tried first.
#[derive(Debug, Default)]
pub struct BackupQueue {
    remotes: Vec<Remote>,
}

impl BackupQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, remote: Remote) {
        self.remotes.push(remote);
    }

    /// Removes and returns the most recently pushed candidate.
    pub fn pop(&mut self) -> Option<Remote> {
        self.remotes.pop()
    }

    pub fn len(&self) -> usize {
        self.remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    pub fn clear(&mut self) {
        self.remotes.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(last_octet: u8, port: u16) -> Remote {
        Remote::new(format!("10.0.0.{last_octet}").parse().unwrap(), port)
    }

    #[test]
    fn test_registry_insert_reports_duplicates() {
        // Arrange
        let mut registry = DedupRegistry::new();
        let key = remote(1, 7000).key();

        // Act
        let first = registry.insert(key);
        let second = registry.insert(key);

        // Assert
        assert!(first);
        assert!(!second, "second insert of the same key must report a duplicate");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_remove_allows_rediscovery() {
        let mut registry = DedupRegistry::new();
        let key = remote(1, 7000).key();
        registry.insert(key);

        assert!(registry.remove(&key));
        assert!(!registry.contains(&key));
        assert!(registry.insert(key), "removed key must be accepted again");
    }

    #[test]
    fn test_registry_remove_of_unknown_key_returns_false() {
        let mut registry = DedupRegistry::new();
        assert!(!registry.remove(&remote(9, 1).key()));
    }

    #[test]
    fn test_registries_are_independent_per_instance() {
        let mut a = DedupRegistry::new();
        let b = DedupRegistry::new();
        a.insert(remote(1, 7000).key());
        assert!(b.is_empty());
    }

    #[test]
    fn test_backup_queue_pops_most_recent_first() {
        // Arrange
        let mut queue = BackupQueue::new();
        queue.push(remote(1, 7000));
        queue.push(remote(2, 7000));
        queue.push(remote(3, 7000));

        // Act / Assert
        assert_eq!(queue.pop(), Some(remote(3, 7000)));
        assert_eq!(queue.pop(), Some(remote(2, 7000)));
        assert_eq!(queue.pop(), Some(remote(1, 7000)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_backup_queue_clear_empties_queue() {
        let mut queue = BackupQueue::new();
        queue.push(remote(1, 1));
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
    }
}
