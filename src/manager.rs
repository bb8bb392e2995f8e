//! Registry of active sync sessions.
//!
//! Owns session lifecycle and the marking surface used by the
//! opposite-direction replicator. Callers that do not know which session's
//! workspace they touched use the broadcast variants, which apply to every
//! registered session.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::session::SessionHandle;
use crate::transport::BatchTransport;

/// Outcome of a full reconciliation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullSyncReport {
    pub files_sent: usize,
}

pub struct SyncManager {
    config: SyncConfig,
    transport: Arc<dyn BatchTransport>,
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SyncManager {
    pub fn new(config: SyncConfig, transport: Arc<dyn BatchTransport>) -> Self {
        Self {
            config,
            transport,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start syncing `root` under `session_id`. A second start for the same
    /// id is a no-op.
    pub async fn start_sync(&self, session_id: &str, root: &Path) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(session_id) {
            debug!(session = %session_id, "sync already running");
            return Ok(());
        }

        let handle = SessionHandle::spawn(
            session_id,
            root,
            self.config.clone(),
            Arc::clone(&self.transport),
        )?;
        sessions.insert(session_id.to_string(), handle);
        info!(session = %session_id, root = %root.display(), "sync started");
        Ok(())
    }

    /// Dispose the session and drop it from the registry. Idempotent.
    pub async fn stop_sync(&self, session_id: &str) {
        let handle = self.sessions.lock().await.remove(session_id);
        if let Some(handle) = handle {
            handle.dispose().await;
            info!(session = %session_id, "sync stopped");
        }
    }

    /// Look up a live session handle.
    pub async fn session(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Mark paths as just written by the opposite direction, for one session.
    pub async fn mark_synced_from_local(&self, session_id: &str, paths: &[String]) {
        if let Some(handle) = self.session(session_id).await {
            handle.mark_synced(paths.iter().map(|p| (p.clone(), None)).collect());
        }
    }

    /// Broadcast variant of [`SyncManager::mark_synced_from_local`], for
    /// callers that do not know which session's workspace they touched.
    pub async fn mark_synced_from_local_all_sessions(&self, paths: &[String]) {
        for handle in self.handles().await {
            handle.mark_synced(paths.iter().map(|p| (p.clone(), None)).collect());
        }
    }

    /// Mark `(path, content hash)` pairs for one session.
    pub async fn mark_synced_from_local_with_hashes(
        &self,
        session_id: &str,
        entries: &[(String, String)],
    ) {
        if let Some(handle) = self.session(session_id).await {
            handle.mark_synced(
                entries
                    .iter()
                    .map(|(p, h)| (p.clone(), Some(h.clone())))
                    .collect(),
            );
        }
    }

    /// Broadcast variant of
    /// [`SyncManager::mark_synced_from_local_with_hashes`].
    pub async fn mark_synced_from_local_with_hashes_all_sessions(
        &self,
        entries: &[(String, String)],
    ) {
        for handle in self.handles().await {
            handle.mark_synced(
                entries
                    .iter()
                    .map(|(p, h)| (p.clone(), Some(h.clone())))
                    .collect(),
            );
        }
    }

    /// Broadcast hash-clear, used for batch deletes whose originating
    /// session is unknown.
    pub async fn clear_synced_hashes_all_sessions(&self, paths: &[String]) {
        for handle in self.handles().await {
            handle.clear_hashes(paths.to_vec());
        }
    }

    /// Run a full reconciliation for one session. Reports zero files for an
    /// unknown id.
    pub async fn trigger_full_sync(&self, session_id: &str) -> FullSyncReport {
        let Some(handle) = self.session(session_id).await else {
            return FullSyncReport { files_sent: 0 };
        };
        // The registry lock is already released; a long walk never blocks
        // operations on other sessions.
        let files_sent = handle.trigger_full_sync().await;
        info!(session = %session_id, files_sent, "full sync finished");
        FullSyncReport { files_sent }
    }

    /// Dispose every session concurrently and clear the registry.
    pub async fn dispose_all(&self) {
        let handles: Vec<SessionHandle> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, handle)| handle).collect()
        };
        join_all(handles.iter().map(|handle| handle.dispose())).await;
    }

    async fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.lock().await.values().cloned().collect()
    }
}
