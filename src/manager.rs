//! Download lifecycle manager
//!
//! `Downloads` is the context object owning the registry, the poller state
//! and the event bus. The host hands it a transport engine and a save
//! dialog; everything else flows through the lifecycle API.

use crate::config::DownloadsConfig;
use crate::error::{DownloadsError, Result};
use crate::events::{
    CloseGuard, DestinationResolver, DownloadObserver, EventBus, Handled, OpenHandler,
};
use crate::registry::{DownloadEntry, DownloadRef, IdAllocator, Registry};
use crate::state::{DownloadMeta, DownloadStatus};
use crate::traits::{DownloadHandle, HostWindow, SaveDialog, SaveDialogRequest, TransportEngine};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Fixed poll period for status aggregation
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Input to `add`: a raw URI or an engine-created handle
#[derive(Clone)]
pub enum DownloadSource {
    Uri(String),
    Handle(Arc<dyn DownloadHandle>),
}

impl From<&str> for DownloadSource {
    fn from(uri: &str) -> Self {
        DownloadSource::Uri(uri.to_string())
    }
}

impl From<String> for DownloadSource {
    fn from(uri: String) -> Self {
        DownloadSource::Uri(uri)
    }
}

impl From<Arc<dyn DownloadHandle>> for DownloadSource {
    fn from(handle: Arc<dyn DownloadHandle>) -> Self {
        DownloadSource::Handle(handle)
    }
}

/// Options accepted by `add`
#[derive(Clone, Default)]
pub struct AddOptions {
    /// Destination filename override, takes precedence over every suggestion
    pub filename: Option<String>,
    /// Caller-supplied filename suggestion
    pub suggested_filename: Option<String>,
    /// Window the request originated from
    pub window: Option<Arc<dyn HostWindow>>,
}

/// Download lifecycle manager
pub struct Downloads {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<dyn TransportEngine>,
    dialog: Arc<dyn SaveDialog>,
    bus: EventBus,
    registry: Arc<Mutex<Registry>>,
    ids: IdAllocator,
    config: DownloadsConfig,
    // Only flipped while the registry lock is held, so the poller invariant
    // holds at every observation point between callbacks.
    poller_armed: AtomicBool,
    status_window: Mutex<Option<Arc<dyn HostWindow>>>,
}

/// Registry-backed shutdown guard, registered on the bus at construction
struct RegistryGuard {
    registry: Arc<Mutex<Registry>>,
}

#[async_trait]
impl CloseGuard for RegistryGuard {
    async fn can_close(&self) -> Option<String> {
        let running = self.registry.lock().await.running_count();
        if running == 0 {
            None
        } else {
            Some(format!("{} download(s) still running", running))
        }
    }
}

impl Downloads {
    /// Create a manager wired to the host's engine and save dialog
    pub async fn new(
        engine: Arc<dyn TransportEngine>,
        dialog: Arc<dyn SaveDialog>,
        config: DownloadsConfig,
    ) -> Self {
        let registry = Arc::new(Mutex::new(Registry::new()));
        let inner = Arc::new(Inner {
            engine,
            dialog,
            bus: EventBus::new(),
            registry: registry.clone(),
            ids: IdAllocator::new(),
            config,
            poller_armed: AtomicBool::new(false),
            status_window: Mutex::new(None),
        });
        inner
            .bus
            .add_close_guard(Arc::new(RegistryGuard { registry }))
            .await;
        Self { inner }
    }

    pub fn config(&self) -> &DownloadsConfig {
        &self.inner.config
    }

    pub async fn add_observer(&self, observer: Arc<dyn DownloadObserver>) {
        self.inner.bus.add_observer(observer).await;
    }

    pub async fn add_resolver(&self, resolver: Arc<dyn DestinationResolver>) {
        self.inner.bus.add_resolver(resolver).await;
    }

    pub async fn add_open_handler(&self, handler: Arc<dyn OpenHandler>) {
        self.inner.bus.add_open_handler(handler).await;
    }

    pub async fn add_close_guard(&self, guard: Arc<dyn CloseGuard>) {
        self.inner.bus.add_close_guard(guard).await;
    }

    /// Attach the window whose indicator reflects the running count
    pub async fn set_status_window(&self, window: Option<Arc<dyn HostWindow>>) {
        *self.inner.status_window.lock().await = window;
    }

    /// Begin a download from a URI or an engine-created handle
    ///
    /// Runs destination negotiation. Returns `Ok(Some(handle))` once the
    /// download is registered, `Ok(None)` when negotiation ended without a
    /// registration (user cancelled the dialog, or the transfer failed
    /// before the destination was created).
    pub async fn add(
        &self,
        source: impl Into<DownloadSource>,
        opts: AddOptions,
    ) -> Result<Option<Arc<dyn DownloadHandle>>> {
        let handle = match source.into() {
            DownloadSource::Uri(uri) => {
                if uri.trim().is_empty() {
                    return Err(DownloadsError::type_mismatch(
                        "download source must be a non-empty URI or a live handle",
                    ));
                }
                self.inner.engine.spawn(&uri)
            }
            DownloadSource::Handle(handle) => handle,
        };
        self.negotiate(handle, opts).await
    }

    /// Resolve a destination for the handle and register it on success
    async fn negotiate(
        &self,
        handle: Arc<dyn DownloadHandle>,
        opts: AddOptions,
    ) -> Result<Option<Arc<dyn DownloadHandle>>> {
        let inner = &self.inner;
        let uri = handle.uri();
        let mime = handle.mime_type();

        // Candidate name: caller override, then caller suggestion, then the
        // engine's own suggestion.
        let candidate = opts
            .filename
            .clone()
            .or_else(|| opts.suggested_filename.clone())
            .unwrap_or_else(|| handle.suggested_filename());

        // Listeners get the first say; the save dialog is the fallback.
        let destination = match inner
            .bus
            .resolve_destination(&uri, &candidate, &mime)
            .await?
        {
            Some(path) => path,
            None => {
                let request = SaveDialogRequest {
                    title: "Save file".to_string(),
                    default_dir: inner.config.default_dir.clone(),
                    suggested_name: candidate,
                };
                match inner.dialog.pick_destination(request, opts.window.clone()).await {
                    Some(path) => path,
                    None => {
                        debug!(uri = %uri, "save dialog cancelled, aborting download");
                        handle.cancel().await;
                        return Ok(None);
                    }
                }
            }
        };

        handle.set_destination(&destination);
        // Last write wins at the chosen path, no collision renaming.
        handle.set_allow_overwrite(true);

        // The engine confirms the destination exists before we register.
        if !handle.start().await {
            warn!(uri = %uri, "transfer failed before destination creation");
            return Ok(None);
        }

        let id = inner.ids.next_id();
        let mut meta = DownloadMeta::new(&id);
        meta.record_status(handle.status());
        {
            let mut registry = inner.registry.lock().await;
            registry.insert(handle.clone(), meta.clone());
        }
        Inner::arm_poller(inner).await;
        info!(id = %id, uri = %uri, destination = %destination.display(), "registered download");
        inner.bus.notify_status(handle.clone(), meta).await;
        Ok(Some(handle))
    }

    /// Cancel a download
    ///
    /// Accepts unregistered handles (negotiation may still be in flight);
    /// the status event is published only for registered downloads.
    pub async fn cancel(&self, r: impl Into<DownloadRef>) -> Result<()> {
        let r = r.into();
        let handle = { self.inner.registry.lock().await.resolve(&r)? };
        handle.cancel().await;
        let entry = {
            self.inner
                .registry
                .lock()
                .await
                .find_handle(&handle)
                .cloned()
        };
        if let Some(entry) = entry {
            self.inner.bus.notify_status(entry.handle, entry.meta).await;
        }
        Ok(())
    }

    /// Remove a download from the registry, cancelling it first if running
    pub async fn remove(&self, r: impl Into<DownloadRef>) -> Result<()> {
        let entry = { self.inner.registry.lock().await.lookup(&r.into())? };
        if entry.handle.status().is_running() {
            entry.handle.cancel().await;
        }
        self.inner
            .bus
            .notify_removed(entry.handle.clone(), entry.meta.clone())
            .await;
        self.inner
            .registry
            .lock()
            .await
            .remove_id(&entry.meta.id);
        info!(id = %entry.meta.id, "removed download");
        Ok(())
    }

    /// Start a fresh download with the same URI, removing the old entry only
    /// if the new one was accepted
    ///
    /// The original request options are not carried over.
    pub async fn restart(&self, r: impl Into<DownloadRef>) -> Result<Option<Arc<dyn DownloadHandle>>> {
        let old = { self.inner.registry.lock().await.lookup(&r.into())? };
        let new = self.add(old.handle.uri(), AddOptions::default()).await?;
        if new.is_some() {
            self.remove(DownloadRef::Id(old.meta.id.clone())).await?;
        }
        Ok(new)
    }

    /// Open a finished download now, or mark it for auto-open on completion
    pub async fn open(
        &self,
        r: impl Into<DownloadRef>,
        window: Option<Arc<dyn HostWindow>>,
    ) -> Result<()> {
        let r = r.into();
        let (handle, entry) = {
            let registry = self.inner.registry.lock().await;
            let handle = registry.resolve(&r)?;
            let entry = registry.find_handle(&handle).cloned();
            (handle, entry)
        };
        let entry = entry.ok_or_else(|| {
            DownloadsError::assertion(format!(
                "no registry entry for resolved download {}",
                handle.uri()
            ))
        })?;

        if handle.status() == DownloadStatus::Finished {
            Inner::do_open(&self.inner, handle, window).await;
        } else {
            let mut registry = self.inner.registry.lock().await;
            if let Some(entry) = registry.get_id_mut(&entry.meta.id) {
                entry.meta.opening = true;
            }
        }
        Ok(())
    }

    /// Remove every non-running download; publishes `cleared-downloads` once
    /// per call
    pub async fn clear(&self) {
        let removed = { self.inner.registry.lock().await.drain_not_running() };
        debug!(count = removed.len(), "cleared finished downloads");
        self.inner.bus.notify_cleared().await;
    }

    /// Snapshot read of one download
    pub async fn get(&self, r: impl Into<DownloadRef>) -> Result<DownloadEntry> {
        self.inner.registry.lock().await.lookup(&r.into())
    }

    /// Snapshot read of every registered download, ordered by numeric id
    pub async fn get_all(&self) -> Vec<DownloadEntry> {
        self.inner.registry.lock().await.all()
    }

    /// Shutdown query: `Some` is the combined veto reason
    pub async fn can_close(&self) -> Option<String> {
        self.inner.bus.query_can_close().await
    }
}

impl Inner {
    /// Idempotently arm the poller
    async fn arm_poller(inner: &Arc<Inner>) {
        let _registry = inner.registry.lock().await;
        if inner.poller_armed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("status poller armed");
        let inner = inner.clone();
        tokio::spawn(async move {
            Inner::poll_loop(inner).await;
        });
    }

    async fn poll_loop(inner: Arc<Inner>) {
        loop {
            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
            if !Inner::poll_once(&inner).await {
                break;
            }
        }
        debug!("status poller idle, disarmed");
    }

    /// One poll tick. Returns false once the poller has disarmed itself.
    async fn poll_once(inner: &Arc<Inner>) -> bool {
        let mut transitions: Vec<(Arc<dyn DownloadHandle>, DownloadMeta)> = Vec::new();
        let mut to_open: Vec<Arc<dyn DownloadHandle>> = Vec::new();
        let mut running = 0usize;
        let keep_polling;
        {
            let mut registry = inner.registry.lock().await;
            for entry in registry.entries_mut() {
                let status = entry.handle.status();
                if status.is_running() {
                    running += 1;
                }
                if entry.meta.record_status(status) {
                    if status == DownloadStatus::Finished && entry.meta.opening {
                        to_open.push(entry.handle.clone());
                    }
                    transitions.push((entry.handle.clone(), entry.meta.clone()));
                }
            }
            keep_polling = running > 0;
            if !keep_polling {
                inner.poller_armed.store(false, Ordering::SeqCst);
            }
        }

        for (handle, meta) in transitions {
            inner.bus.notify_status(handle, meta).await;
        }
        for handle in to_open {
            Inner::do_open(inner, handle, None).await;
        }
        // The tick event fires every tick, changes or not; it drives live
        // UI counters.
        inner.bus.notify_tick(running).await;

        let window = inner.status_window.lock().await.clone();
        if let Some(window) = window {
            let text = if running == 0 {
                String::new()
            } else {
                format!("⇣ {}", running)
            };
            window.set_download_indicator(&text);
        }

        keep_polling
    }

    /// Route an open request through the bus, surfacing failure in the window
    async fn do_open(
        inner: &Arc<Inner>,
        handle: Arc<dyn DownloadHandle>,
        window: Option<Arc<dyn HostWindow>>,
    ) {
        let destination = handle.destination().unwrap_or_default();
        let mime = handle.mime_type();
        match inner
            .bus
            .request_open(&destination, &mime, window.clone())
            .await
        {
            Handled::Yes => {}
            Handled::No => {
                warn!(destination = %destination.display(), mime = %mime, "no handler claimed open-file request");
                if let Some(window) = window {
                    window.show_error(&format!(
                        "Can't open {} ({})",
                        destination.display(),
                        mime
                    ));
                }
            }
        }
    }
}
