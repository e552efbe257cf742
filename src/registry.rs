//! Registry of negotiated downloads and id allocation

use crate::error::{DownloadsError, Result};
use crate::state::DownloadMeta;
use crate::traits::DownloadHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic allocator for download identifiers
///
/// Ids are strictly increasing decimal strings and are never reused within
/// the process lifetime.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        n.to_string()
    }
}

/// Reference to a download at the API boundary: a previously issued id or a
/// live handle
#[derive(Clone)]
pub enum DownloadRef {
    Id(String),
    Handle(Arc<dyn DownloadHandle>),
}

impl From<&str> for DownloadRef {
    fn from(id: &str) -> Self {
        DownloadRef::Id(id.to_string())
    }
}

impl From<String> for DownloadRef {
    fn from(id: String) -> Self {
        DownloadRef::Id(id)
    }
}

impl From<Arc<dyn DownloadHandle>> for DownloadRef {
    fn from(handle: Arc<dyn DownloadHandle>) -> Self {
        DownloadRef::Handle(handle)
    }
}

/// One registered download: the engine's handle plus our metadata
#[derive(Clone)]
pub struct DownloadEntry {
    pub handle: Arc<dyn DownloadHandle>,
    pub meta: DownloadMeta,
}

/// Mapping of negotiated downloads; the single source of truth for which
/// transfers are known
///
/// The registry never emits events — callers publish after mutating it.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<String, DownloadEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: Arc<dyn DownloadHandle>, meta: DownloadMeta) {
        self.entries
            .insert(meta.id.clone(), DownloadEntry { handle, meta });
    }

    pub fn remove_id(&mut self, id: &str) -> Option<DownloadEntry> {
        self.entries.remove(id)
    }

    pub fn get_id(&self, id: &str) -> Option<&DownloadEntry> {
        self.entries.get(id)
    }

    /// Find the entry holding exactly this handle
    pub fn find_handle(&self, handle: &Arc<dyn DownloadHandle>) -> Option<&DownloadEntry> {
        self.entries
            .values()
            .find(|entry| Arc::ptr_eq(&entry.handle, handle))
    }

    /// Resolve a reference to a live handle
    ///
    /// Unknown ids fail with NotFound. Handles pass through unchanged even
    /// when not registered, so callers can operate uniformly on downloads
    /// whose negotiation is still in flight.
    pub fn resolve(&self, r: &DownloadRef) -> Result<Arc<dyn DownloadHandle>> {
        match r {
            DownloadRef::Id(id) => self
                .get_id(id)
                .map(|entry| entry.handle.clone())
                .ok_or_else(|| DownloadsError::not_found(id)),
            DownloadRef::Handle(handle) => Ok(handle.clone()),
        }
    }

    /// Look up the entry for a reference; hard NotFound for both forms
    pub fn lookup(&self, r: &DownloadRef) -> Result<DownloadEntry> {
        match r {
            DownloadRef::Id(id) => self
                .get_id(id)
                .cloned()
                .ok_or_else(|| DownloadsError::not_found(id)),
            DownloadRef::Handle(handle) => self
                .find_handle(handle)
                .cloned()
                .ok_or_else(|| DownloadsError::not_found(handle.uri())),
        }
    }

    /// Defensive snapshot of every entry, ordered by numeric id
    pub fn all(&self) -> Vec<DownloadEntry> {
        let mut entries: Vec<DownloadEntry> = self.entries.values().cloned().collect();
        entries.sort_by_key(|entry| entry.meta.id.parse::<u64>().unwrap_or(u64::MAX));
        entries
    }

    /// Number of registered downloads whose live status is running
    pub fn running_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.handle.status().is_running())
            .count()
    }

    /// Remove and return every entry whose live status is not running
    pub fn drain_not_running(&mut self) -> Vec<DownloadEntry> {
        let ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.handle.status().is_running())
            .map(|(id, _)| id.clone())
            .collect();
        ids.iter()
            .filter_map(|id| self.entries.remove(id))
            .collect()
    }

    pub(crate) fn get_id_mut(&mut self, id: &str) -> Option<&mut DownloadEntry> {
        self.entries.get_mut(id)
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut DownloadEntry> {
        self.entries.values_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
