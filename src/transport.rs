//! Transport boundary for outgoing batches.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::wire::SyncBatch;

/// Delivery mechanism for emitted batches.
///
/// Emission is fire-and-forget from the engine's side: a failed send is
/// logged by the caller and never retried. Delivery reliability belongs to
/// the transport implementation.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    async fn send(&self, batch: SyncBatch) -> Result<()>;
}

/// In-memory transport backed by a tokio channel.
///
/// Used by tests and by embedders that forward batches from a local queue.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<SyncBatch>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncBatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl BatchTransport for ChannelTransport {
    async fn send(&self, batch: SyncBatch) -> Result<()> {
        self.tx
            .send(batch)
            .map_err(|_| anyhow!("batch receiver dropped"))
    }
}
