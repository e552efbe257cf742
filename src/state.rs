//! Download status and per-download metadata types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live status of one transfer, as reported by the transport engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Transfer exists but no bytes have moved yet
    Created,
    /// Transfer is in progress
    Started,
    /// Transfer completed successfully
    Finished,
    /// Transfer was cancelled
    Cancelled,
    /// Transfer failed
    Error,
}

impl DownloadStatus {
    /// Check if the transfer is still running (created or started)
    pub fn is_running(&self) -> bool {
        matches!(self, DownloadStatus::Created | DownloadStatus::Started)
    }

    /// Check if the transfer is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Finished | DownloadStatus::Cancelled | DownloadStatus::Error
        )
    }
}

/// Per-download metadata owned by the registry
///
/// Created once destination negotiation completes. `last_status` starts as
/// `None`, a sentinel distinct from every real status; each recorded
/// observation replaces it with `Some(_)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadMeta {
    /// Unique identifier, assigned at destination resolution
    pub id: String,

    /// Timestamp of destination resolution
    pub created: DateTime<Utc>,

    /// Last status observed by the poller (or at registration)
    pub last_status: Option<DownloadStatus>,

    /// Open the file automatically once the transfer finishes
    pub opening: bool,
}

impl DownloadMeta {
    /// Create metadata for a freshly negotiated download
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created: Utc::now(),
            last_status: None,
            opening: false,
        }
    }

    /// Record a status observation, returning true when it differs from the
    /// previous one
    pub fn record_status(&mut self, status: DownloadStatus) -> bool {
        if self.last_status == Some(status) {
            return false;
        }
        self.last_status = Some(status);
        true
    }
}
