//! Configuration for sync sessions.

use std::time::Duration;

use crate::exclude::ExcludePatterns;

/// Limits and delays governing a sync session.
///
/// The defaults are the production values; tests shrink the timing values
/// to keep themselves fast.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period before a burst of changes is flushed.
    pub debounce: Duration,
    /// Delay before retrying after a failed flush.
    pub retry_backoff: Duration,
    /// How long a marked path suppresses watcher events.
    pub echo_window: Duration,
    /// Per-file ceiling; larger files are never transmitted.
    pub max_file_bytes: u64,
    /// Maximum entries per emitted batch.
    pub max_batch_files: usize,
    /// Maximum cumulative encoded content bytes per emitted batch.
    pub max_batch_bytes: usize,
    /// Paths excluded from watching and reconciliation.
    pub exclude: ExcludePatterns,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            retry_backoff: Duration::from_secs(2),
            echo_window: Duration::from_secs(3),
            max_file_bytes: 50 * 1024 * 1024,
            max_batch_files: 200,
            max_batch_bytes: 6 * 1024 * 1024,
            exclude: ExcludePatterns::with_defaults(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();

        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.max_batch_files, 200);
        assert_eq!(config.max_file_bytes, 50 * 1024 * 1024);
        assert!(config.exclude.is_excluded(".git/config"));
    }
}
