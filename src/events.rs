//! Typed event bus for download lifecycle events
//!
//! Listener return-value protocols are explicit types: destination queries
//! answer `Option<PathBuf>` (first `Some` wins), open requests answer
//! `Handled`, shutdown queries answer an optional veto reason.

use crate::error::{DownloadsError, Result};
use crate::state::DownloadMeta;
use crate::traits::{DownloadHandle, HostWindow};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Observer trait for broadcast lifecycle events
#[async_trait]
pub trait DownloadObserver: Send + Sync {
    /// Called when a download's observed status changes (and once at registration)
    async fn on_status(&self, _download: Arc<dyn DownloadHandle>, _meta: DownloadMeta) {}

    /// Called when a download is removed from the registry
    async fn on_removed(&self, _download: Arc<dyn DownloadHandle>, _meta: DownloadMeta) {}

    /// Called once per `clear()` call
    async fn on_cleared(&self) {}

    /// Called on every poll tick with the current running count
    async fn on_tick(&self, _running: usize) {}
}

/// Destination query listener; the first non-`None` answer is authoritative
#[async_trait]
pub trait DestinationResolver: Send + Sync {
    async fn resolve(&self, uri: &str, suggested_name: &str, mime_type: &str) -> Option<PathBuf>;
}

/// Whether an open-file request was claimed by a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Yes,
    No,
}

/// Open-file request listener
#[async_trait]
pub trait OpenHandler: Send + Sync {
    async fn open(
        &self,
        path: &Path,
        mime_type: &str,
        window: Option<Arc<dyn HostWindow>>,
    ) -> Handled;
}

/// Shutdown query listener; a `Some` reason vetoes process termination
#[async_trait]
pub trait CloseGuard: Send + Sync {
    async fn can_close(&self) -> Option<String>;
}

/// In-process publish/subscribe hub for download lifecycle events
#[derive(Default)]
pub struct EventBus {
    observers: Mutex<Vec<Arc<dyn DownloadObserver>>>,
    resolvers: Mutex<Vec<Arc<dyn DestinationResolver>>>,
    open_handlers: Mutex<Vec<Arc<dyn OpenHandler>>>,
    close_guards: Mutex<Vec<Arc<dyn CloseGuard>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_observer(&self, observer: Arc<dyn DownloadObserver>) {
        self.observers.lock().await.push(observer);
    }

    pub async fn add_resolver(&self, resolver: Arc<dyn DestinationResolver>) {
        self.resolvers.lock().await.push(resolver);
    }

    pub async fn add_open_handler(&self, handler: Arc<dyn OpenHandler>) {
        self.open_handlers.lock().await.push(handler);
    }

    pub async fn add_close_guard(&self, guard: Arc<dyn CloseGuard>) {
        self.close_guards.lock().await.push(guard);
    }

    /// Unregister every listener
    pub async fn clear(&self) {
        self.observers.lock().await.clear();
        self.resolvers.lock().await.clear();
        self.open_handlers.lock().await.clear();
        self.close_guards.lock().await.clear();
    }

    pub async fn observer_count(&self) -> usize {
        self.observers.lock().await.len()
    }

    pub async fn notify_status(&self, download: Arc<dyn DownloadHandle>, meta: DownloadMeta) {
        // Snapshot first so listeners may subscribe re-entrantly
        let observers = self.observers.lock().await.clone();
        for observer in observers {
            observer.on_status(download.clone(), meta.clone()).await;
        }
    }

    pub async fn notify_removed(&self, download: Arc<dyn DownloadHandle>, meta: DownloadMeta) {
        let observers = self.observers.lock().await.clone();
        for observer in observers {
            observer.on_removed(download.clone(), meta.clone()).await;
        }
    }

    pub async fn notify_cleared(&self) {
        let observers = self.observers.lock().await.clone();
        for observer in observers {
            observer.on_cleared().await;
        }
    }

    pub async fn notify_tick(&self, running: usize) {
        let observers = self.observers.lock().await.clone();
        for observer in observers {
            observer.on_tick(running).await;
        }
    }

    /// Ask resolvers for a destination; the first `Some` wins
    ///
    /// A returned path shorter than two characters violates the listener
    /// contract and surfaces as an assertion failure.
    pub async fn resolve_destination(
        &self,
        uri: &str,
        suggested_name: &str,
        mime_type: &str,
    ) -> Result<Option<PathBuf>> {
        let resolvers = self.resolvers.lock().await.clone();
        for resolver in resolvers {
            if let Some(path) = resolver.resolve(uri, suggested_name, mime_type).await {
                if path.as_os_str().len() <= 1 {
                    return Err(DownloadsError::assertion(format!(
                        "destination resolver returned invalid path {:?} for {}",
                        path, uri
                    )));
                }
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Ask open handlers to open a file; the first `Handled::Yes` claims it
    pub async fn request_open(
        &self,
        path: &Path,
        mime_type: &str,
        window: Option<Arc<dyn HostWindow>>,
    ) -> Handled {
        let handlers = self.open_handlers.lock().await.clone();
        for handler in handlers {
            if handler.open(path, mime_type, window.clone()).await == Handled::Yes {
                return Handled::Yes;
            }
        }
        Handled::No
    }

    /// Query every shutdown guard; `Some` is the combined veto reason
    pub async fn query_can_close(&self) -> Option<String> {
        let guards = self.close_guards.lock().await.clone();
        let mut reasons = Vec::new();
        for guard in guards {
            if let Some(reason) = guard.can_close().await {
                reasons.push(reason);
            }
        }
        if reasons.is_empty() {
            None
        } else {
            Some(reasons.join("\n"))
        }
    }
}
