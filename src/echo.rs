//! Feedback suppression between the two replication directions.
//!
//! When the opposite-direction replicator writes files it received, the
//! watcher sees those writes like any other local change. The guard keeps
//! two records so such echoes are recognized and dropped: a time-windowed
//! set of recently-written paths (the cheap early check) and the last
//! content hash exchanged per path (the authoritative late check).

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct EchoGuard {
    window: Duration,
    /// Paths the opposite direction wrote recently, with the mark time.
    recently_synced: HashMap<String, Instant>,
    /// Last content hash exchanged per path, in either direction.
    last_synced_hash: HashMap<String, String>,
}

impl EchoGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            recently_synced: HashMap::new(),
            last_synced_hash: HashMap::new(),
        }
    }

    /// Register a path as just written by the opposite direction. Arms the
    /// timing entry; a supplied hash replaces the stored one.
    pub fn mark(&mut self, path: &str, hash: Option<&str>) {
        self.purge_expired();
        self.recently_synced.insert(path.to_string(), Instant::now());
        if let Some(hash) = hash {
            self.last_synced_hash.insert(path.to_string(), hash.to_string());
        }
    }

    /// Early checkpoint: is the path inside the suppression window?
    pub fn is_recently_synced(&mut self, path: &str) -> bool {
        match self.recently_synced.get(path) {
            Some(marked_at) if marked_at.elapsed() < self.window => true,
            Some(_) => {
                self.recently_synced.remove(path);
                false
            }
            None => false,
        }
    }

    /// Late checkpoint: does freshly-read content match the last exchange?
    pub fn hash_matches(&self, path: &str, hash: &str) -> bool {
        self.last_synced_hash.get(path).map(String::as_str) == Some(hash)
    }

    /// Store the hash of content just emitted for `path`.
    pub fn record_hash(&mut self, path: &str, hash: &str) {
        self.last_synced_hash.insert(path.to_string(), hash.to_string());
    }

    /// Forget the stored hash for `path`. Called whenever either direction
    /// processes a delete; a recreated file must not be suppressed.
    pub fn clear_hash(&mut self, path: &str) {
        self.last_synced_hash.remove(path);
    }

    fn purge_expired(&mut self) {
        let window = self.window;
        self.recently_synced
            .retain(|_, marked_at| marked_at.elapsed() < window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_mark_suppresses_within_window() {
        let mut guard = EchoGuard::new(Duration::from_secs(3));

        guard.mark("src/lib.rs", None);

        assert!(guard.is_recently_synced("src/lib.rs"));
        assert!(!guard.is_recently_synced("src/main.rs"));
    }

    #[test]
    fn test_window_expires() {
        let mut guard = EchoGuard::new(Duration::from_millis(20));

        guard.mark("a.txt", None);
        thread::sleep(Duration::from_millis(40));

        assert!(!guard.is_recently_synced("a.txt"));
    }

    #[test]
    fn test_hash_survives_window_expiry() {
        let mut guard = EchoGuard::new(Duration::from_millis(20));

        guard.mark("a.txt", Some("deadbeef"));
        thread::sleep(Duration::from_millis(40));

        assert!(!guard.is_recently_synced("a.txt"));
        assert!(guard.hash_matches("a.txt", "deadbeef"));
        assert!(!guard.hash_matches("a.txt", "cafebabe"));
    }

    #[test]
    fn test_mark_replaces_stored_hash() {
        let mut guard = EchoGuard::new(Duration::from_secs(3));

        guard.mark("a.txt", Some("old"));
        guard.mark("a.txt", Some("new"));

        assert!(guard.hash_matches("a.txt", "new"));
        assert!(!guard.hash_matches("a.txt", "old"));
    }

    #[test]
    fn test_clear_hash() {
        let mut guard = EchoGuard::new(Duration::from_secs(3));

        guard.mark("a.txt", Some("deadbeef"));
        guard.clear_hash("a.txt");

        assert!(!guard.hash_matches("a.txt", "deadbeef"));
    }

    #[test]
    fn test_mark_without_hash_keeps_existing_hash() {
        let mut guard = EchoGuard::new(Duration::from_secs(3));

        guard.mark("a.txt", Some("deadbeef"));
        guard.mark("a.txt", None);

        assert!(guard.hash_matches("a.txt", "deadbeef"));
    }
}
