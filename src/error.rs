//! Error types for download lifecycle operations

use std::fmt;

/// Error type for download lifecycle operations
#[derive(Debug, Clone)]
pub struct DownloadsError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Kinds of download lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation was given an id or handle with no registry entry
    NotFound,
    /// Input was neither a usable URI nor a live handle
    TypeMismatch,
    /// Internal invariant violated; indicates a logic defect in the host or this crate
    Assertion,
}

impl DownloadsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, format!("download not found: {}", what))
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, message)
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assertion, message)
    }
}

impl fmt::Display for DownloadsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for DownloadsError {}

/// Result type for download lifecycle operations
pub type Result<T> = std::result::Result<T, DownloadsError>;
