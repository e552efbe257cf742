//! Download lifecycle management for embedded web engines
//!
//! This crate tracks the life of file downloads started by a host browsing
//! engine: destination negotiation, periodic status aggregation, user-facing
//! notification and orderly cancellation. It supports:
//! - A pluggable transport boundary (the engine owns the transfers)
//! - One-shot asynchronous destination negotiation with listener override
//!   and save-dialog fallback
//! - A self-stopping 1 Hz status poller with exactly-once auto-open
//! - A typed event bus for status, removal, tick and shutdown-veto listeners

pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod registry;
pub mod state;
pub mod traits;

pub use config::{default_download_dir, DownloadsConfig};
pub use error::{DownloadsError, ErrorKind, Result};
pub use events::{
    CloseGuard, DestinationResolver, DownloadObserver, EventBus, Handled, OpenHandler,
};
pub use manager::{AddOptions, DownloadSource, Downloads};
pub use registry::{DownloadEntry, DownloadRef, IdAllocator, Registry};
pub use state::{DownloadMeta, DownloadStatus};
pub use traits::{DownloadHandle, HostWindow, SaveDialog, SaveDialogRequest, TransportEngine};
