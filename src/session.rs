//! Per-workspace sync session.
//!
//! Each session is a single-writer actor: watcher callbacks, timers, and
//! manager calls all send commands into one queue, and the actor task owns
//! every piece of mutable state (pending map, echo guard, timer handles).
//! No locks are needed around session state; sessions run independently of
//! each other.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::echo::EchoGuard;
use crate::hash::hash_bytes;
use crate::paths::wire_relative;
use crate::transport::BatchTransport;
use crate::watcher::{self, ChangeEvent, ChangeKind, WatcherGuard};
use crate::wire::{BatchBuilder, FileAction, SyncBatch, WireFile};

/// A change waiting for the next flush. Later events for the same path
/// replace earlier ones, so the map holds at most one entry per path.
#[derive(Debug, Clone)]
struct PendingChange {
    action: FileAction,
    abs_path: PathBuf,
}

enum SessionCommand {
    Change(ChangeEvent),
    FlushTimer,
    Mark { entries: Vec<(String, Option<String>)> },
    ClearHashes { paths: Vec<String> },
    FullSync { reply: oneshot::Sender<usize> },
    Dispose { reply: oneshot::Sender<()> },
}

/// Handle to a running session actor.
///
/// Cloneable; the actor shuts itself down once every handle is dropped or
/// after an explicit [`SessionHandle::dispose`].
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Start a session: build its state, start its watcher, spawn the
    /// actor task.
    pub fn spawn(
        session_id: &str,
        root: &Path,
        config: SyncConfig,
        transport: Arc<dyn BatchTransport>,
    ) -> Result<Self> {
        let id = session_id.to_string();
        let root = root.to_path_buf();
        let (tx, rx) = mpsc::unbounded_channel();

        // The watcher holds only a weak sender so a session whose handles
        // are all dropped can wind down instead of keeping itself alive.
        let watcher = {
            let weak = tx.downgrade();
            watcher::spawn(&root, &id, move |event| {
                if let Some(tx) = weak.upgrade() {
                    let _ = tx.send(SessionCommand::Change(event));
                }
            })
            .with_context(|| format!("failed to watch {}", root.display()))?
        };

        let echo = EchoGuard::new(config.echo_window);
        let actor = SyncSession {
            id: id.clone(),
            root,
            config,
            transport,
            pending: HashMap::new(),
            echo,
            watcher: Some(watcher),
            flush_timer: None,
            flushing: false,
            tx: tx.downgrade(),
        };
        tokio::spawn(actor.run(rx));

        Ok(Self { id, tx })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Feed one change event into the session. This is the entry point the
    /// watcher bridge uses; tests use it to drive sessions deterministically.
    pub fn notify_change(&self, kind: ChangeKind, path: PathBuf) {
        let _ = self.tx.send(SessionCommand::Change(ChangeEvent { kind, path }));
    }

    /// Register paths as just written by the opposite direction, with the
    /// content hash where the caller knows it.
    pub fn mark_synced(&self, entries: Vec<(String, Option<String>)>) {
        let _ = self.tx.send(SessionCommand::Mark { entries });
    }

    /// Forget stored content hashes for the given paths.
    pub fn clear_hashes(&self, paths: Vec<String>) {
        let _ = self.tx.send(SessionCommand::ClearHashes { paths });
    }

    /// Walk the whole tree and retransmit it unconditionally. Returns the
    /// number of files sent; zero if the session is already gone.
    pub async fn trigger_full_sync(&self) -> usize {
        let (reply, response) = oneshot::channel();
        if self.tx.send(SessionCommand::FullSync { reply }).is_err() {
            return 0;
        }
        response.await.unwrap_or(0)
    }

    /// Stop the session: cancel timers, close the watcher, end the actor.
    /// Resolves once nothing can emit for this session anymore.
    pub async fn dispose(&self) {
        let (reply, response) = oneshot::channel();
        if self.tx.send(SessionCommand::Dispose { reply }).is_ok() {
            let _ = response.await;
        }
    }
}

struct SyncSession {
    id: String,
    root: PathBuf,
    config: SyncConfig,
    transport: Arc<dyn BatchTransport>,
    pending: HashMap<String, PendingChange>,
    echo: EchoGuard,
    watcher: Option<WatcherGuard>,
    flush_timer: Option<JoinHandle<()>>,
    flushing: bool,
    tx: mpsc::WeakUnboundedSender<SessionCommand>,
}

impl SyncSession {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                SessionCommand::Change(event) => self.handle_change(event),
                SessionCommand::FlushTimer => self.flush().await,
                SessionCommand::Mark { entries } => {
                    for (path, hash) in &entries {
                        self.echo.mark(path, hash.as_deref());
                    }
                }
                SessionCommand::ClearHashes { paths } => {
                    for path in &paths {
                        self.echo.clear_hash(path);
                    }
                }
                SessionCommand::FullSync { reply } => {
                    let sent = self.full_sync().await;
                    let _ = reply.send(sent);
                }
                SessionCommand::Dispose { reply } => {
                    self.shutdown();
                    let _ = reply.send(());
                    return;
                }
            }
        }
        // All handles dropped without an explicit dispose.
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
        self.watcher.take();
        self.pending.clear();
    }

    fn handle_change(&mut self, event: ChangeEvent) {
        let Some(rel) = wire_relative(&self.root, &event.path) else {
            return;
        };
        if self.config.exclude.is_excluded(&rel) {
            return;
        }

        let action = match event.kind {
            ChangeKind::Created | ChangeKind::Modified => FileAction::Write,
            ChangeKind::Deleted => FileAction::Delete,
        };

        // Early checkpoint. Deletes are always forwarded, so only writes
        // consult the suppression window.
        if action == FileAction::Write && self.echo.is_recently_synced(&rel) {
            debug!(session = %self.id, path = %rel, "dropping change inside echo window");
            return;
        }

        self.pending.insert(
            rel,
            PendingChange {
                action,
                abs_path: event.path,
            },
        );
        self.schedule_flush(self.config.debounce);
    }

    /// Cancel-then-restart; at most one flush timer exists per session.
    fn schedule_flush(&mut self, delay: Duration) {
        if let Some(timer) = self.flush_timer.take() {
            timer.abort();
        }
        let tx = self.tx.clone();
        self.flush_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(SessionCommand::FlushTimer);
            }
        }));
    }

    async fn flush(&mut self) {
        if self.flushing || self.pending.is_empty() {
            return;
        }
        self.flushing = true;
        let snapshot = std::mem::take(&mut self.pending);
        let result = self.flush_snapshot(&snapshot).await;
        self.flushing = false;

        if let Err(err) = result {
            warn!(
                session = %self.id,
                error = %err,
                "flush failed; restoring pending changes for retry"
            );
            // Merge back without clobbering anything newer.
            for (path, change) in snapshot {
                self.pending.entry(path).or_insert(change);
            }
            self.schedule_flush(self.config.retry_backoff);
        }
    }

    async fn flush_snapshot(
        &mut self,
        snapshot: &HashMap<String, PendingChange>,
    ) -> Result<()> {
        let mut builder = BatchBuilder::new(
            &self.id,
            self.config.max_batch_files,
            self.config.max_batch_bytes,
        );
        // Hash updates for entries still in the builder; applied only once
        // the batch containing them has been handed to the transport.
        let mut staged: Vec<(String, String)> = Vec::new();

        for (rel, change) in snapshot {
            let entry = match change.action {
                FileAction::Delete => {
                    self.echo.clear_hash(rel);
                    Some(WireFile::delete(rel.clone()))
                }
                FileAction::Write => match self.read_write_entry(rel, &change.abs_path).await? {
                    Some((file, hash)) => {
                        staged.push((rel.clone(), hash));
                        Some(file)
                    }
                    None => None,
                },
            };

            if let Some(file) = entry {
                if let Some(batch) = builder.push(file) {
                    self.emit(batch).await;
                    for (path, hash) in staged.drain(..) {
                        self.echo.record_hash(&path, &hash);
                    }
                }
            }
        }

        if let Some(batch) = builder.finish() {
            self.emit(batch).await;
            for (path, hash) in staged.drain(..) {
                self.echo.record_hash(&path, &hash);
            }
        }
        Ok(())
    }

    /// Build the wire entry for one pending write, or `None` when the path
    /// should be skipped. Read failures on an existing file propagate and
    /// fail the whole flush, which re-queues the snapshot.
    async fn read_write_entry(
        &self,
        rel: &str,
        abs_path: &Path,
    ) -> Result<Option<(WireFile, String)>> {
        let meta = match tokio::fs::metadata(abs_path).await {
            Ok(meta) => meta,
            // Gone between the event and the flush
            Err(_) => return Ok(None),
        };
        if !meta.is_file() {
            return Ok(None);
        }
        if meta.len() > self.config.max_file_bytes {
            warn!(
                session = %self.id,
                path = %rel,
                size = meta.len(),
                "skipping file above per-file size ceiling"
            );
            return Ok(None);
        }

        let content = tokio::fs::read(abs_path)
            .await
            .with_context(|| format!("failed to read {}", abs_path.display()))?;
        let hash = hash_bytes(&content);

        // Late checkpoint: content identical to the last exchange is an
        // echo even if it arrived after the timing window expired.
        if self.echo.hash_matches(rel, &hash) {
            debug!(session = %self.id, path = %rel, "dropping change with unchanged synced content");
            return Ok(None);
        }

        let file = WireFile::write(rel.to_string(), BASE64.encode(&content), file_mode(&meta));
        Ok(Some((file, hash)))
    }

    /// Depth-first walk of the whole tree, retransmitting every eligible
    /// file in bounded batches. Bypasses the echo guard: a full
    /// reconciliation is an intentional authoritative resend.
    async fn full_sync(&mut self) -> usize {
        let mut builder = BatchBuilder::new(
            &self.id,
            self.config.max_batch_files,
            self.config.max_batch_bytes,
        );
        let mut sent = 0usize;
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(
                        session = %self.id,
                        path = %dir.display(),
                        error = %err,
                        "skipping unreadable directory"
                    );
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(err) => {
                        warn!(
                            session = %self.id,
                            path = %dir.display(),
                            error = %err,
                            "stopping listing of directory"
                        );
                        break;
                    }
                };
                let path = entry.path();
                let Some(rel) = wire_relative(&self.root, &path) else {
                    continue;
                };
                let meta = match entry.metadata().await {
                    Ok(meta) => meta,
                    Err(err) => {
                        warn!(session = %self.id, path = %rel, error = %err, "skipping unstatable entry");
                        continue;
                    }
                };

                if meta.is_dir() {
                    if self.config.exclude.is_excluded(&format!("{rel}/")) {
                        continue;
                    }
                    stack.push(path);
                } else if meta.is_file() {
                    if self.config.exclude.is_excluded(&rel) {
                        continue;
                    }
                    if meta.len() > self.config.max_file_bytes {
                        warn!(
                            session = %self.id,
                            path = %rel,
                            size = meta.len(),
                            "skipping file above per-file size ceiling"
                        );
                        continue;
                    }
                    let content = match tokio::fs::read(&path).await {
                        Ok(content) => content,
                        Err(err) => {
                            warn!(session = %self.id, path = %rel, error = %err, "skipping unreadable file");
                            continue;
                        }
                    };

                    let file = WireFile::write(rel, BASE64.encode(&content), file_mode(&meta));
                    sent += 1;
                    if let Some(batch) = builder.push(file) {
                        self.emit(batch).await;
                    }
                }
            }
        }

        if let Some(batch) = builder.finish() {
            self.emit(batch).await;
        }
        sent
    }

    /// Hand a batch to the transport. Fire-and-forget: a failed send is
    /// logged, never retried.
    async fn emit(&self, batch: SyncBatch) {
        let files = batch.files.len();
        match self.transport.send(batch).await {
            Ok(()) => debug!(session = %self.id, files, "emitted batch"),
            Err(err) => {
                warn!(session = %self.id, files, error = %err, "transport rejected batch")
            }
        }
    }
}

#[cfg(unix)]
fn file_mode(meta: &std::fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:o}", meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(_meta: &std::fs::Metadata) -> String {
    "644".to_string()
}
