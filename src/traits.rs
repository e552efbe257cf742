//! Collaborator traits at the host-environment boundary
//!
//! The host (rendering engine, window manager, dialog layer) implements
//! these seams; the lifecycle core never talks to the platform directly.

use crate::state::DownloadStatus;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One transfer, owned by the host's transport engine
///
/// The lifecycle core never constructs or destroys a handle; it reacts to
/// status it reads here and issues `start`/`cancel` commands. Transport
/// failures (network, disk) are reported only through `status` reaching
/// `error` or `cancelled`.
#[async_trait]
pub trait DownloadHandle: Send + Sync {
    /// Source URI of the transfer
    fn uri(&self) -> String;

    /// MIME type, empty until the engine has determined it
    fn mime_type(&self) -> String;

    /// Filename suggested by the engine, empty if unknown
    fn suggested_filename(&self) -> String;

    /// Live status of the transfer
    fn status(&self) -> DownloadStatus;

    /// Resolved destination path, if one has been set
    fn destination(&self) -> Option<PathBuf>;

    /// Set the destination path for the transfer
    fn set_destination(&self, path: &Path);

    /// Permit the engine to overwrite an existing file at the destination
    fn set_allow_overwrite(&self, allow: bool);

    /// Begin the transfer. Resolves to true once the engine has created the
    /// destination file, false when the transfer failed before that point.
    async fn start(&self) -> bool;

    /// Cancel the transfer
    async fn cancel(&self);
}

impl fmt::Debug for dyn DownloadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadHandle")
            .field("uri", &self.uri())
            .field("status", &self.status())
            .field("destination", &self.destination())
            .finish()
    }
}

/// The transport engine: the only way to turn a URI into a live handle
pub trait TransportEngine: Send + Sync {
    /// Create a new transfer for the given URI, initially in `Created`
    fn spawn(&self, uri: &str) -> Arc<dyn DownloadHandle>;
}

/// Parameters for a save-file dialog invocation
#[derive(Debug, Clone)]
pub struct SaveDialogRequest {
    pub title: String,
    pub default_dir: PathBuf,
    pub suggested_name: String,
}

/// Modal save-file dialog supplied by the host
#[async_trait]
pub trait SaveDialog: Send + Sync {
    /// Ask the user for a destination. None means the user cancelled.
    async fn pick_destination(
        &self,
        request: SaveDialogRequest,
        window: Option<Arc<dyn HostWindow>>,
    ) -> Option<PathBuf>;
}

/// A host window the core can surface state into
pub trait HostWindow: Send + Sync {
    /// Show a user-visible error message in this window
    fn show_error(&self, message: &str);

    /// Update the window's download indicator text, "" when idle
    fn set_download_indicator(&self, text: &str);
}
