// Library crate for riptide
// Bidirectional directory replication with echo suppression between a
// cloud workspace and a local workspace

pub mod config;
pub mod echo;
pub mod exclude;
pub mod hash;
pub mod manager;
pub mod paths;
pub mod session;
pub mod transport;
pub mod watcher;
pub mod wire;

pub use config::SyncConfig;
pub use exclude::ExcludePatterns;
pub use manager::{FullSyncReport, SyncManager};
pub use session::SessionHandle;
pub use transport::{BatchTransport, ChannelTransport};
pub use watcher::{ChangeEvent, ChangeKind};
pub use wire::{BatchBuilder, FileAction, SyncBatch, WireFile};
